//! Command-line interface definition for `rpc-line`.
//!
//! This module defines the CLI structure using clap's derive API,
//! providing a `serve` command that runs the accept loop and a `client`
//! command that opens one connection, issues a single call, and prints
//! the result.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// rpc-line - bidirectional, line-framed JSON-RPC over TCP
#[derive(Parser, Debug, Clone)]
#[command(name = "rpc-line")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file. A missing file falls back to
    /// defaults overridden by whatever flags are present on this command.
    #[arg(short, long, default_value = "rpc-line.yaml")]
    pub config: Option<String>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for `rpc-line`.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the accept loop: bind a listener and serve inbound connections
    /// until interrupted.
    Serve {
        /// Address to bind, e.g. `127.0.0.1:7890`. Overrides the config
        /// file's `bind_addr` when present.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// PEM certificate chain for TLS. Requires `--tls-key`.
        #[arg(long)]
        tls_cert: Option<PathBuf>,

        /// PEM private key for TLS. Requires `--tls-cert`.
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Open one connection, issue a single call, print the JSON result,
    /// and exit.
    Client {
        /// Address to connect to, e.g. `127.0.0.1:7890`. Overrides the
        /// config file's `connect_addr` when present.
        #[arg(short = 'a', long)]
        connect: Option<SocketAddr>,

        /// Method to call.
        #[arg(long)]
        call: String,

        /// Positional or named parameters as a JSON array or object.
        /// Absent means the call takes no arguments.
        #[arg(long)]
        params_json: Option<String>,

        /// PEM CA bundle used to validate the server's certificate. When
        /// present the connection is wrapped in TLS.
        #[arg(long)]
        tls_ca: Option<PathBuf>,

        /// Hostname the server's certificate is validated against.
        /// Defaults to the host portion of `--connect`.
        #[arg(long)]
        tls_server_name: Option<String>,

        /// Per-call timeout, in seconds. Absent means block until the
        /// reply arrives or the connection closes.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}
