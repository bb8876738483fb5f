//! Accept loop, live-session registry, and broadcast fan-out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;

use crate::codec::{encode_request, Fault, Params};
use crate::dispatcher::{Dispatcher, Handler, MethodError};
use crate::error::{Result, RpcError};
use crate::session::{new_session, BoxedConn, Session};

struct SessionEntry {
    session: Arc<Session>,
    #[allow(dead_code)]
    connected_at: Instant,
}

/// Accepts connections, hands each one a fresh per-session dispatcher
/// built from `H` plus a session-scoped `broadcast` method, and keeps a
/// registry of live sessions for fan-out.
pub struct Server<H: Handler> {
    handler: Arc<H>,
    sessions: Mutex<HashMap<u64, SessionEntry>>,
    next_session_id: AtomicU64,
    tls_acceptor: Option<TlsAcceptor>,
}

impl<H: Handler> Server<H> {
    pub fn new(handler: Arc<H>, tls_acceptor: Option<TlsAcceptor>) -> Arc<Self> {
        Arc::new(Self {
            handler,
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            tls_acceptor,
        })
    }

    /// Binds `bind_addr` and accepts connections until the listener
    /// itself fails; a single connection's TLS handshake or read-loop
    /// failure never brings the whole server down.
    pub async fn serve(self: Arc<Self>, bind_addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(RpcError::Transport)?;
        tracing::info!(%bind_addr, "RPC server listening");
        self.serve_listener(listener).await;
        Ok(())
    }

    /// Accepts connections from an already-bound listener until it fails.
    /// Split out from [`Server::serve`] so tests can bind an ephemeral
    /// port (`127.0.0.1:0`) and learn the real address before serving.
    pub async fn serve_listener(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.handle_connection(stream, peer_addr).await;
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let _ = stream.set_nodelay(true);

        let conn: BoxedConn = match &self.tls_acceptor {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls_stream) => Box::new(tls_stream),
                Err(err) => {
                    tracing::warn!(%peer_addr, error = %err, "TLS handshake failed");
                    return;
                }
            },
            None => Box::new(stream),
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let mut dispatcher = self.handler.build_dispatcher();
        self.expose_broadcast(&mut dispatcher, session_id);

        let (session, reader) = new_session(conn, Arc::new(dispatcher), peer_addr.to_string(), true);

        self.sessions.lock().await.insert(
            session_id,
            SessionEntry {
                session: Arc::clone(&session),
                connected_at: Instant::now(),
            },
        );
        tracing::info!(peer = %session.peer_name, "client connected");

        reader.serve().await;

        self.sessions.lock().await.remove(&session_id);
        tracing::info!(peer = %session.peer_name, "client disconnected");
    }

    /// `broadcast` is not part of any `Handler`'s method table: every
    /// session needs its own closure so the handler can skip its own
    /// origin when fanning a call out to the rest of the registry.
    fn expose_broadcast(self: &Arc<Self>, dispatcher: &mut Dispatcher, origin_id: u64) {
        let server = Arc::clone(self);
        dispatcher.expose(
            "broadcast",
            Box::new(move |params| {
                let server = Arc::clone(&server);
                Box::pin(async move { server.handle_broadcast_call(origin_id, params).await })
            }),
        );
    }

    async fn handle_broadcast_call(
        &self,
        origin_id: u64,
        params: Option<Params>,
    ) -> std::result::Result<Value, MethodError> {
        let payload = extract_broadcast_payload(params).ok_or(MethodError::InvalidParams)?;
        let count = self
            .broadcast(origin_id, &payload.method, payload.params)
            .await
            .map_err(|fault| MethodError::Internal(anyhow::anyhow!(fault)))?;
        Ok(Value::from(count))
    }

    /// Fans `method`/`params` out to every live session except `origin_id`,
    /// returning how many sessions accepted the write. A session whose
    /// writer has already given up is simply skipped, not an error.
    pub async fn broadcast(
        &self,
        origin_id: u64,
        method: &str,
        params: Option<Params>,
    ) -> std::result::Result<u64, Fault> {
        let line = encode_request(0, method, params.as_ref())?;

        let snapshot: Vec<Arc<Session>> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|(id, _)| **id != origin_id)
                .map(|(_, entry)| Arc::clone(&entry.session))
                .collect()
        };

        let mut delivered = 0u64;
        for session in snapshot {
            if session.write_line(line.clone()) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

struct BroadcastPayload {
    method: String,
    params: Option<Params>,
}

/// A `broadcast` call's single argument is `{"method": ..., "params": ...}`,
/// matching how [`crate::client::Client::broadcast`] shapes its call. A
/// payload of any other shape is the caller's mistake, not ours, so it is
/// reported as `InvalidParams` rather than an internal error.
fn extract_broadcast_payload(params: Option<Params>) -> Option<BroadcastPayload> {
    let nested = match params? {
        Params::Positional(mut values) if values.len() == 1 => values.remove(0),
        Params::Named(map) if map.len() == 1 => map.into_iter().next().map(|(_, v)| v)?,
        _ => return None,
    };

    let obj = nested.as_object()?;
    let method = obj.get("method")?.as_str()?.to_string();
    let params = match obj.get("params") {
        None | Some(Value::Null) => None,
        Some(Value::Array(values)) => Some(Params::Positional(values.clone())),
        Some(Value::Object(map)) => Some(Params::Named(map.clone())),
        Some(_) => return None,
    };

    Some(BroadcastPayload { method, params })
}
