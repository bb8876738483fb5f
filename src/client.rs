//! Client side (C5): one connection, one [`Session`], a thin call/broadcast
//! surface for application code.
//!
//! A `Client` is a degenerate [`crate::server::Server`] — one session, no
//! accept loop, no live-session registry. `broadcast` is not a primitive
//! of its own; it is a `call("broadcast", ...)` whose single argument
//! nests the request the server should fan out, matching how
//! [`crate::server::Server::expose_broadcast`] unpacks it on the other end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::codec::Params;
use crate::dispatcher::{Dispatcher, Handler};
use crate::error::{Result, RpcError};
use crate::session::{new_session, BoxedConn, Session};

/// Opens one connection, plain or TLS, and hosts a [`Session`] over it.
///
/// The session's read loop runs on a spawned task for the lifetime of the
/// `Client`; inbound requests (the server calling back into this side) are
/// dispatched against whatever `Handler` the caller supplied at connect
/// time, exactly as a server session dispatches inbound calls against its
/// own handler.
pub struct Client {
    session: Arc<Session>,
}

impl Client {
    /// Connects to `addr` in plaintext and hosts `handler`'s methods for
    /// any inbound calls the peer makes on this connection.
    pub async fn connect<H: Handler>(addr: SocketAddr, handler: Arc<H>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(RpcError::Transport)?;
        let _ = stream.set_nodelay(true);
        let conn: BoxedConn = Box::new(stream);
        Self::from_connection(conn, handler, addr.to_string())
    }

    /// Connects to `addr` and performs a TLS handshake via `connector`
    /// before hosting the session. `server_name` is the name the peer
    /// certificate is validated against.
    pub async fn connect_tls<H: Handler>(
        addr: SocketAddr,
        server_name: &str,
        connector: TlsConnector,
        handler: Arc<H>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(RpcError::Transport)?;
        let _ = stream.set_nodelay(true);

        let name = tokio_rustls::rustls::ServerName::try_from(server_name)
            .map_err(|err| RpcError::Tls(format!("invalid server name `{server_name}`: {err}")))?;

        let tls_stream = connector
            .connect(name, stream)
            .await
            .map_err(|err| RpcError::Tls(err.to_string()))?;

        let conn: BoxedConn = Box::new(tls_stream);
        Self::from_connection(conn, handler, addr.to_string())
    }

    fn from_connection<H: Handler>(conn: BoxedConn, handler: Arc<H>, peer_name: String) -> Result<Self> {
        let dispatcher: Dispatcher = handler.build_dispatcher();
        let (session, reader) = new_session(conn, Arc::new(dispatcher), peer_name, false);
        tokio::spawn(reader.serve());
        Ok(Self { session })
    }

    /// Sets the timeout subsequent [`Client::call`]s wait for a reply.
    /// `None` (the default) means a call blocks until answered or the
    /// connection closes.
    pub async fn set_request_timeout(&self, timeout: Option<Duration>) {
        self.session.set_request_timeout(timeout).await;
    }

    /// Issues one request. At most one of `positional`/`named` may carry
    /// arguments; supplying both fails locally with no write to the wire.
    pub async fn call(
        &self,
        method: &str,
        positional: Option<Vec<Value>>,
        named: Option<Map<String, Value>>,
    ) -> Result<Value> {
        self.session.call(method, positional, named).await
    }

    /// Asks the server this client is connected to fan `method`/`args` out
    /// to every other live session, returning the delivery count. This is
    /// purely a nested `call`; the server decides what "broadcast" means.
    pub async fn broadcast(&self, method: &str, args: Option<Vec<Value>>) -> Result<u64> {
        let mut payload = Map::new();
        payload.insert("method".into(), Value::from(method));
        payload.insert(
            "params".into(),
            args.map(Value::Array).unwrap_or(Value::Null),
        );

        let result = self
            .session
            .call_with_params("broadcast", Some(Params::Positional(vec![Value::Object(payload)])))
            .await?;

        result
            .as_u64()
            .ok_or_else(|| RpcError::Protocol(crate::codec::Fault::internal_error()))
    }

    /// Idempotently closes the connection and completes any still-pending
    /// calls with a connection-closed fault.
    pub async fn disconnect(&self) {
        self.session.abandon().await;
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_alive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::EchoHandler;
    use crate::server::Server;

    async fn spawn_echo_server() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(Arc::new(EchoHandler), None);
        tokio::spawn(async move { server.serve_listener(listener).await });
        addr
    }

    #[tokio::test]
    async fn call_echo_round_trips_over_a_real_socket() {
        let addr = spawn_echo_server().await;
        let client = Client::connect(addr, Arc::new(EchoHandler)).await.unwrap();

        let result = client
            .call("echo", Some(vec![Value::from("hi there")]), None)
            .await
            .unwrap();
        assert_eq!(result, Value::from("hi there"));
    }

    #[tokio::test]
    async fn disconnect_fails_subsequent_calls() {
        let addr = spawn_echo_server().await;
        let client = Client::connect(addr, Arc::new(EchoHandler)).await.unwrap();
        client.disconnect().await;

        let err = client.call("echo", Some(vec![Value::from(1)]), None).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
    }
}
