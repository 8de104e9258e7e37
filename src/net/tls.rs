//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load one certified key per vhost from its PEM pair
//! - Index certificates by vhost hostname for SNI selection
//! - Build the rustls `ServerConfig` served by the HTTPS listener
//!
//! # Design Decisions
//! - The SNI index is keyed by registry hostnames, never by names parsed
//!   out of certificates
//! - Any key pair that fails to load aborts startup; a partial index
//!   would serve the wrong certificate for some hosts
//! - Unknown or missing SNI gets no certificate (handshake refused)
//! - A private key must match its certificate's public key

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;

use crate::routing::VhostRegistry;

/// Error type for TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {}", .0.display())]
    NoCertificate(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("failed to load keypair for {host}: {source}")]
    KeyPair {
        host: String,
        #[source]
        source: rustls::Error,
    },

    #[error("failed to build TLS config: {0}")]
    Config(#[from] rustls::Error),
}

/// SNI hostname → certificate index.
#[derive(Debug, Default)]
pub struct SniCertResolver {
    certs: HashMap<String, Arc<CertifiedKey>>,
}

impl SniCertResolver {
    /// Certificate for a server name, if a vhost owns it.
    pub fn resolve_name(&self, server_name: &str) -> Option<Arc<CertifiedKey>> {
        let cert = self.certs.get(&server_name.to_ascii_lowercase()).cloned();
        if cert.is_none() {
            tracing::debug!(server_name = %server_name, "No certificate for SNI name");
        }
        cert
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Indexed hostnames, sorted.
    pub fn hostnames(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.certs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ResolvesServerCert for SniCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        match client_hello.server_name() {
            Some(name) => self.resolve_name(name),
            None => {
                tracing::debug!("TLS client sent no SNI name");
                None
            }
        }
    }
}

/// Crypto provider used for both key loading and the server config.
fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Load every vhost certificate into an SNI index.
pub fn build_sni_resolver(registry: &VhostRegistry) -> Result<SniCertResolver, TlsError> {
    let provider = crypto_provider();
    let mut certs = HashMap::new();

    for vhost in registry.entries() {
        let Some(pair) = &vhost.cert else { continue };
        let key = load_certified_key(&provider, &vhost.host, &pair.cert_file, &pair.key_file)?;
        tracing::debug!(
            host = %vhost.host,
            cert_file = %pair.cert_file.display(),
            "Registered SNI certificate"
        );
        certs.insert(vhost.host.to_ascii_lowercase(), Arc::new(key));
    }

    tracing::debug!(certs = certs.len(), "SNI resolver initialized");
    Ok(SniCertResolver { certs })
}

/// Build the rustls server config around an SNI resolver.
pub fn server_config(resolver: SniCertResolver) -> Result<Arc<ServerConfig>, TlsError> {
    let mut config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(resolver));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Wrap a server config for axum-server.
pub fn rustls_config(config: Arc<ServerConfig>) -> RustlsConfig {
    RustlsConfig::from_config(config)
}

fn load_certified_key(
    provider: &CryptoProvider,
    host: &str,
    cert_path: &Path,
    key_path: &Path,
) -> Result<CertifiedKey, TlsError> {
    let mut cert_reader = open(cert_path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Read {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(cert_path.to_path_buf()));
    }

    let mut key_reader = open(key_path)?;
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|source| TlsError::Read {
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

    let signing_key = provider
        .key_provider
        .load_private_key(key)
        .map_err(|source| TlsError::KeyPair {
            host: host.to_string(),
            source,
        })?;

    let certified = CertifiedKey::new(certs, signing_key);
    certified.keys_match().map_err(|source| TlsError::KeyPair {
        host: host.to_string(),
        source,
    })?;
    Ok(certified)
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}
