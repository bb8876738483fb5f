//! TLS scenarios (spec §8 E6) against real sockets, using fixture PEM
//! material checked in under `tests/fixtures/`.

use std::sync::Arc;

use tokio::net::TcpListener;

use rpc_line::client::Client;
use rpc_line::config::TlsConfig;
use rpc_line::error::RpcError;
use rpc_line::handlers::EchoHandler;
use rpc_line::server::Server;
use rpc_line::tls;

fn fixture(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

async fn spawn_tls_server() -> std::net::SocketAddr {
    let tls_config = TlsConfig {
        cert_path: Some(fixture("server-cert.pem")),
        key_path: Some(fixture("server-key.pem")),
        ca_path: None,
    };
    let acceptor = tls::server_acceptor(Some(&tls_config)).unwrap().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(Arc::new(EchoHandler), Some(acceptor));
    tokio::spawn(async move { server.serve_listener(listener).await });
    addr
}

/// A client trusting the CA that actually signed the server's certificate
/// completes the handshake and can call through it.
#[tokio::test]
async fn client_with_matching_ca_completes_handshake() {
    let addr = spawn_tls_server().await;

    let tls_config = TlsConfig {
        cert_path: None,
        key_path: None,
        ca_path: Some(fixture("ca-cert.pem")),
    };
    let connector = tls::client_connector(Some(&tls_config)).unwrap().unwrap();

    let client = Client::connect_tls(addr, "127.0.0.1", connector, Arc::new(EchoHandler))
        .await
        .expect("handshake with the correct CA should succeed");

    let result = client
        .call("echo", Some(vec!["over tls".into()]), None)
        .await
        .unwrap();
    assert_eq!(result, serde_json::Value::from("over tls"));
}

/// E6: a client configured with a CA that did not sign the server's
/// certificate fails at connect time with a TLS error, and no session is
/// ever created (the failure surfaces before any call can be attempted).
#[tokio::test]
async fn e6_tls_handshake_fails_with_wrong_ca() {
    let addr = spawn_tls_server().await;

    let tls_config = TlsConfig {
        cert_path: None,
        key_path: None,
        ca_path: Some(fixture("wrong-ca-cert.pem")),
    };
    let connector = tls::client_connector(Some(&tls_config)).unwrap().unwrap();

    let result = Client::connect_tls(addr, "127.0.0.1", connector, Arc::new(EchoHandler)).await;

    match result {
        Err(RpcError::Tls(_)) => {}
        other => panic!("expected a TLS error, got {other:?}"),
    }
}
