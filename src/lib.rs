//! rpc-line - a bidirectional, line-framed JSON-RPC transport
//!
//! This library provides a symmetric JSON-RPC dialect over a single
//! full-duplex TCP (optionally TLS) connection: either peer may issue
//! calls, many calls may be in flight at once, and a server can fan one
//! request out to every other connected peer.
//!
//! # Architecture
//!
//! - `codec`: wire framing — encode/decode/classify one JSON-RPC line.
//! - `dispatcher`: resolves a method name against a per-session table and
//!   invokes it, turning the outcome into a response envelope.
//! - `session`: owns one connection; multiplexes concurrent in-flight
//!   calls and inbound requests over it.
//! - `server`: accept loop, live-session registry, broadcast fan-out.
//! - `client`: opens one connection and hosts a session over it.
//! - `handlers`: stock `Handler` implementations (`echo`).
//! - `config`: layered YAML + CLI configuration.
//! - `tls`: PEM cert/key/CA loading into `rustls` acceptors/connectors.
//! - `error`: the crate's error type.
//! - `cli`: command-line interface definition for the `rpc-line` binary.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rpc_line::client::Client;
//! use rpc_line::handlers::EchoHandler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let addr = "127.0.0.1:7890".parse()?;
//!     let client = Client::connect(addr, Arc::new(EchoHandler)).await?;
//!     let reply = client.call("echo", Some(vec!["hello".into()]), None).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod server;
pub mod session;
pub mod tls;

pub use client::Client;
pub use config::RpcConfig;
pub use dispatcher::{Dispatcher, Handler};
pub use error::{Result, RpcError};
pub use server::Server;
