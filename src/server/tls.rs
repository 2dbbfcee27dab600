//! TLS context setup: one server config, daemon cert/key as both the
//! server identity and the mutual-TLS trust anchor. A connecting panel
//! must present a certificate signed by (or equal to) the daemon's own
//! certificate; anything else is rejected during the handshake.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::DaemonConfig;
use crate::error::DaemonError;

pub fn build_acceptor(config: &DaemonConfig) -> Result<TlsAcceptor, DaemonError> {
    // installing twice (e.g. in tests that build more than one acceptor)
    // is harmless to ignore: it only means a prior call already won
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certs = load_certs(&config.server_cert_file)?;
    let key = load_key(&config.server_key_file)?;

    let mut roots = RootCertStore::empty();
    for cert in &certs {
        roots
            .add(cert.clone())
            .map_err(|e| DaemonError::TlsSetup(format!("trust anchor: {e}")))?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| DaemonError::TlsSetup(format!("client verifier: {e}")))?;

    let server_config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| DaemonError::TlsSetup(format!("server config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, DaemonError> {
    let file = File::open(path).map_err(|e| DaemonError::TlsSetup(format!("{path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DaemonError::TlsSetup(format!("{path}: {e}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, DaemonError> {
    let file = File::open(path).map_err(|e| DaemonError::TlsSetup(format!("{path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| DaemonError::TlsSetup(format!("{path}: {e}")))?
        .ok_or_else(|| DaemonError::TlsSetup(format!("{path}: no private key found")))
}
