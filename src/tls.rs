//! TLS material loading for the optional encrypted wrap around the raw
//! TCP transport.
//!
//! Loading key/cert/CA material is explicitly out of scope for the core
//! transport (§1 of the design treats it as an external collaborator), but
//! a usable crate still needs somewhere to turn the paths in [`TlsConfig`]
//! into the `rustls` types [`crate::server::Server`] and [`crate::client::Client`]
//! actually consume. `tokio-rustls` is the idiomatic pairing for this
//! codebase's `tokio` runtime; plain PEM files (as opposed to a platform
//! keystore) match how the teacher hands TLS material to `reqwest`'s
//! `rustls-tls` backend.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use tokio_rustls::rustls::{self, Certificate, PrivateKey};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::TlsConfig;
use crate::error::{Result, RpcError};

fn tls_err(context: &str, err: impl std::fmt::Display) -> RpcError {
    RpcError::Tls(format!("{context}: {err}"))
}

fn load_certs(path: &Path) -> Result<Vec<Certificate>> {
    let file = File::open(path).map_err(|err| tls_err("reading certificate file", err))?;
    let mut reader = BufReader::new(file);
    let raw = certs(&mut reader).map_err(|err| tls_err("parsing PEM certificates", err))?;
    if raw.is_empty() {
        return Err(tls_err("certificate file", "no certificates found"));
    }
    Ok(raw.into_iter().map(Certificate).collect())
}

fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let file = File::open(path).map_err(|err| tls_err("reading private key file", err))?;
    let mut reader = BufReader::new(file);
    let pkcs8 = pkcs8_private_keys(&mut reader).map_err(|err| tls_err("parsing PKCS8 key", err))?;
    if let Some(key) = pkcs8.into_iter().next() {
        return Ok(PrivateKey(key));
    }

    // Re-open: the PKCS8 parser consumes the reader even on a miss.
    let file = File::open(path).map_err(|err| tls_err("reading private key file", err))?;
    let mut reader = BufReader::new(file);
    let rsa = rsa_private_keys(&mut reader).map_err(|err| tls_err("parsing RSA key", err))?;
    rsa.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| tls_err("private key file", "no PKCS8 or RSA private key found"))
}

/// Builds a server-side acceptor from `cert_path`/`key_path`. Returns `Ok(None)`
/// when `tls` is absent, meaning the server should run in plaintext.
pub fn server_acceptor(tls: Option<&TlsConfig>) -> Result<Option<TlsAcceptor>> {
    let Some(tls) = tls else { return Ok(None) };
    let cert_path = tls
        .cert_path
        .as_ref()
        .ok_or_else(|| tls_err("server TLS config", "cert_path is required"))?;
    let key_path = tls
        .key_path
        .as_ref()
        .ok_or_else(|| tls_err("server TLS config", "key_path is required"))?;

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| tls_err("building server TLS config", err))?;

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

/// Builds a client-side connector from `ca_path`. Returns `Ok(None)` when
/// `tls` is absent, meaning the client should connect in plaintext.
pub fn client_connector(tls: Option<&TlsConfig>) -> Result<Option<TlsConnector>> {
    let Some(tls) = tls else { return Ok(None) };
    let ca_path = tls
        .ca_path
        .as_ref()
        .ok_or_else(|| tls_err("client TLS config", "ca_path is required"))?;

    let mut roots = rustls::RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots
            .add(&cert)
            .map_err(|err| tls_err("adding CA certificate", err))?;
    }

    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Some(TlsConnector::from(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_acceptor_is_none_without_tls_config() {
        assert!(server_acceptor(None).unwrap().is_none());
    }

    #[test]
    fn client_connector_is_none_without_tls_config() {
        assert!(client_connector(None).unwrap().is_none());
    }

    #[test]
    fn server_acceptor_rejects_missing_cert_path() {
        let tls = TlsConfig {
            cert_path: None,
            key_path: Some("key.pem".into()),
            ca_path: None,
        };
        let err = server_acceptor(Some(&tls)).unwrap_err();
        assert!(matches!(err, RpcError::Tls(_)));
    }

    #[test]
    fn client_connector_rejects_missing_ca_path() {
        let tls = TlsConfig {
            cert_path: None,
            key_path: None,
            ca_path: None,
        };
        let err = client_connector(Some(&tls)).unwrap_err();
        assert!(matches!(err, RpcError::Tls(_)));
    }
}
