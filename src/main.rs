//! rpc-line - bidirectional, line-framed JSON-RPC over TCP
//!
//! Entry point for the `rpc-line` binary: parses the CLI, loads the
//! layered YAML/flag configuration, and dispatches to either the `serve`
//! accept loop or a one-shot `client` call.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rpc_line::cli::{Cli, Commands};
use rpc_line::client::Client;
use rpc_line::config::{RpcConfig, TlsConfig};
use rpc_line::handlers::EchoHandler;
use rpc_line::server::Server;
use rpc_line::tls;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("rpc-line.yaml");
    let config = RpcConfig::load(config_path).context("loading configuration")?;

    match cli.command {
        Commands::Serve {
            bind,
            tls_cert,
            tls_key,
        } => run_serve(config, bind, tls_cert, tls_key).await,
        Commands::Client {
            connect,
            call,
            params_json,
            tls_ca,
            tls_server_name,
            timeout_secs,
        } => run_client(config, connect, call, params_json, tls_ca, tls_server_name, timeout_secs).await,
    }
}

async fn run_serve(
    config: RpcConfig,
    bind: Option<SocketAddr>,
    tls_cert: Option<std::path::PathBuf>,
    tls_key: Option<std::path::PathBuf>,
) -> Result<()> {
    let bind_addr = bind
        .or(config.bind_addr)
        .context("no bind address given; pass --bind or set bind_addr in the config file")?;

    let tls_config = match (tls_cert, tls_key) {
        (Some(cert_path), Some(key_path)) => Some(TlsConfig {
            cert_path: Some(cert_path),
            key_path: Some(key_path),
            ca_path: None,
        }),
        (None, None) => config.tls.clone(),
        _ => bail!("--tls-cert and --tls-key must be supplied together"),
    };

    let acceptor = tls::server_acceptor(tls_config.as_ref()).context("loading server TLS material")?;
    let server = Server::new(Arc::new(EchoHandler), acceptor);

    tracing::info!(%bind_addr, tls = tls_config.is_some(), "starting rpc-line server");
    server.serve(bind_addr).await.context("server accept loop failed")?;
    Ok(())
}

async fn run_client(
    config: RpcConfig,
    connect: Option<SocketAddr>,
    method: String,
    params_json: Option<String>,
    tls_ca: Option<std::path::PathBuf>,
    tls_server_name: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let connect_addr = connect
        .or(config.connect_addr)
        .context("no address to connect to; pass --connect or set connect_addr in the config file")?;

    let tls_config = tls_ca
        .map(|ca_path| TlsConfig {
            cert_path: None,
            key_path: None,
            ca_path: Some(ca_path),
        })
        .or_else(|| config.tls.clone());

    let connector = tls::client_connector(tls_config.as_ref()).context("loading client TLS material")?;

    let (positional, named) = match params_json {
        Some(raw) => parse_params(&raw)?,
        None => (None, None),
    };

    let client = match connector {
        Some(connector) => {
            let server_name = tls_server_name.unwrap_or_else(|| connect_addr.ip().to_string());
            Client::connect_tls(connect_addr, &server_name, connector, Arc::new(EchoHandler))
                .await
                .context("TLS connection failed")?
        }
        None => Client::connect(connect_addr, Arc::new(EchoHandler))
            .await
            .context("connection failed")?,
    };

    if let Some(secs) = timeout_secs.or(config.request_timeout_secs) {
        client
            .set_request_timeout(Some(std::time::Duration::from_secs(secs)))
            .await;
    }

    let result = client.call(&method, positional, named).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    client.disconnect().await;
    Ok(())
}

/// Splits a `--params-json` argument into the positional/named shape
/// `Client::call` expects: a JSON array becomes positional arguments, a
/// JSON object becomes named arguments. Any other top-level shape is a
/// usage error, caught here rather than smuggled onto the wire.
fn parse_params(raw: &str) -> Result<(Option<Vec<Value>>, Option<Map<String, Value>>)> {
    let value: Value = serde_json::from_str(raw).context("--params-json is not valid JSON")?;
    match value {
        Value::Array(values) => Ok((Some(values), None)),
        Value::Object(map) => Ok((None, Some(map))),
        other => bail!("--params-json must be a JSON array or object, got {other}"),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "rpc_line=debug" } else { "rpc_line=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
