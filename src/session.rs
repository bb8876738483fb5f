//! Per-connection state: the pending-reply table, the request-id
//! allocator, the frame read loop, and a single serialized writer task.
//!
//! A [`Session`] is the shared handle both the application (to issue
//! outbound calls) and the read loop (to resolve inbound responses and
//! dispatch inbound requests) hold. [`new_session`] splits those two
//! responsibilities: it returns the `Arc<Session>` handle plus a
//! [`SessionReader`] that owns the read half and must be driven exactly
//! once, by whichever task is responsible for this connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::io::{AsyncBufReadExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::codec::{decode_frame, encode_request, encode_response, Fault, Frame, Outcome, Params};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, RpcError};

/// Anything a session can be built on top of: a plain `TcpStream`, a
/// `tokio_rustls` `TlsStream`, or (in tests) an in-memory duplex half.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

pub type BoxedConn = Box<dyn Connection>;

enum PendingOutcome {
    Result(Value),
    Fault(Fault),
    ConnectionClosed,
}

type PendingMap = HashMap<u32, oneshot::Sender<PendingOutcome>>;

/// Shared per-connection state. Cheap to clone via `Arc`; every clone
/// refers to the same underlying connection.
pub struct Session {
    pub peer_name: String,
    next_request_id: Mutex<u32>,
    pending: Arc<Mutex<PendingMap>>,
    outbound_tx: mpsc::UnboundedSender<String>,
    request_timeout: Mutex<Option<Duration>>,
    alive: Arc<AtomicBool>,
    dispatcher: Arc<Dispatcher>,
    /// Whether a garbage frame gets an Invalid-JSON-RPC response before the
    /// connection is torn down. Servers do this; clients just tear down.
    announce_bad_message: bool,
}

/// The read half of a session, not yet driven. Call [`SessionReader::serve`]
/// exactly once, typically from a spawned task.
pub struct SessionReader {
    session: Arc<Session>,
    read_half: ReadHalf<BoxedConn>,
}

/// Builds a session over `conn`. `announce_bad_message` should be `true`
/// for server-accepted connections (the server owes its peer an
/// Invalid-JSON-RPC response before hanging up) and `false` for
/// client-initiated ones.
pub fn new_session(
    conn: BoxedConn,
    dispatcher: Arc<Dispatcher>,
    peer_name: String,
    announce_bad_message: bool,
) -> (Arc<Session>, SessionReader) {
    let (read_half, write_half) = tokio::io::split(conn);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
    let alive = Arc::new(AtomicBool::new(true));

    let session = Arc::new(Session {
        peer_name,
        next_request_id: Mutex::new(1),
        pending: Arc::new(Mutex::new(HashMap::new())),
        outbound_tx,
        request_timeout: Mutex::new(None),
        alive: Arc::clone(&alive),
        dispatcher,
        announce_bad_message,
    });

    spawn_writer(write_half, outbound_rx, alive);

    let reader = SessionReader {
        session: Arc::clone(&session),
        read_half,
    };

    (session, reader)
}

fn spawn_writer(
    mut write_half: WriteHalf<BoxedConn>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    alive: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            let write_failed = write_half.write_all(line.as_bytes()).await.is_err()
                || write_half.write_all(b"\n").await.is_err();
            if write_failed {
                alive.store(false, Ordering::SeqCst);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });
}

impl Session {
    /// Queues one already-encoded line for the writer task. Every line
    /// passes through the same unbounded channel and the same writer
    /// task, so two concurrent calls can never interleave their bytes.
    pub fn write_line(&self, line: String) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        self.outbound_tx.send(line).is_ok()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub async fn set_request_timeout(&self, timeout: Option<Duration>) {
        *self.request_timeout.lock().await = timeout;
    }

    pub async fn request_timeout(&self) -> Option<Duration> {
        *self.request_timeout.lock().await
    }

    async fn next_id(&self) -> u32 {
        let mut guard = self.next_request_id.lock().await;
        let id = *guard;
        *guard += 1;
        if *guard == 0xFFFF_FFFF {
            *guard = 1;
        }
        id
    }

    /// Issues a call and waits for its reply (or timeout, or teardown).
    /// At most one of `positional`/`named` may be non-empty; supplying
    /// both is a local misuse, not a wire fault.
    pub async fn call(
        &self,
        method: &str,
        positional: Option<Vec<Value>>,
        named: Option<Map<String, Value>>,
    ) -> Result<Value> {
        let positional_nonempty = positional.as_ref().is_some_and(|v| !v.is_empty());
        let named_nonempty = named.as_ref().is_some_and(|m| !m.is_empty());

        if positional_nonempty && named_nonempty {
            return Err(RpcError::LocalMisuse(
                "call accepts only one of positional or named params".into(),
            ));
        }

        let params = if positional_nonempty {
            Some(Params::Positional(positional.unwrap()))
        } else if named_nonempty {
            Some(Params::Named(named.unwrap()))
        } else {
            None
        };

        self.call_with_params(method, params).await
    }

    pub async fn call_with_params(&self, method: &str, params: Option<Params>) -> Result<Value> {
        if !self.is_alive() {
            return Err(RpcError::ConnectionClosed);
        }

        let id = self.next_id().await;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let line = encode_request(id, method, params.as_ref()).map_err(RpcError::Protocol)?;
        if !self.write_line(line) {
            self.pending.lock().await.remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        let timeout = self.request_timeout().await;
        let recv_result = match timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(inner) => inner,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    return Err(RpcError::Timeout {
                        method: method.to_string(),
                    });
                }
            },
            None => rx.await,
        };

        match recv_result {
            Ok(PendingOutcome::Result(value)) => Ok(value),
            Ok(PendingOutcome::Fault(fault)) => Err(RpcError::Protocol(fault)),
            Ok(PendingOutcome::ConnectionClosed) | Err(_) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Tears the session down: marks it dead, drains every pending slot,
    /// and completes each with a connection-closed outcome. Idempotent.
    pub async fn abandon(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(PendingOutcome::ConnectionClosed);
        }
    }

    async fn handle_request(&self, request: crate::codec::Request) {
        let response = self.dispatcher.dispatch(request).await;
        self.send_response(response);
    }

    fn send_response(&self, response: crate::codec::Response) {
        match encode_response(response.id, &response.outcome) {
            Ok(line) => {
                self.write_line(line);
            }
            Err(fault) => {
                tracing::error!(error = %fault, "failed to encode RPC response");
                if let Ok(line) = encode_response(response.id, &Outcome::Error(fault)) {
                    self.write_line(line);
                }
            }
        }
    }

    async fn handle_response(&self, response: crate::codec::Response) {
        let Some(id) = response.id else {
            return;
        };
        let Some(tx) = self.pending.lock().await.remove(&id) else {
            // Response to an id we never issued, or already resolved by
            // timeout. Drop it silently.
            return;
        };
        let outcome = match response.outcome {
            Outcome::Result(value) => PendingOutcome::Result(value),
            Outcome::Error(fault) => PendingOutcome::Fault(fault),
        };
        let _ = tx.send(outcome);
    }

    fn handle_bad_message(&self, raw: &str) {
        tracing::warn!(peer = %self.peer_name, raw, "received unclassifiable frame; closing connection");
        if self.announce_bad_message {
            self.send_response(crate::codec::Response {
                id: None,
                outcome: Outcome::Error(Fault::invalid_request()),
            });
        }
    }
}

impl SessionReader {
    /// Drives the read loop until EOF or a read error, dispatching
    /// requests (each on its own spawned task, so a slow handler never
    /// blocks reading the next frame), resolving responses, and closing
    /// the connection on the first unclassifiable frame. Always abandons
    /// the session on the way out.
    pub async fn serve(self) {
        let SessionReader { session, read_half } = self;
        let mut lines = BufReader::new(read_half).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(peer = %session.peer_name, error = %err, "session read error");
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match decode_frame(trimmed) {
                Frame::Request(request) => {
                    let session = Arc::clone(&session);
                    tokio::spawn(async move {
                        session.handle_request(request).await;
                    });
                }
                Frame::Response(response) => {
                    session.handle_response(response).await;
                }
                Frame::Invalid(fault, id) => {
                    session.send_response(crate::codec::Response {
                        id,
                        outcome: Outcome::Error(fault),
                    });
                }
                Frame::Unclassifiable => {
                    session.handle_bad_message(trimmed);
                    break;
                }
            }
        }

        session.abandon().await;
    }
}
