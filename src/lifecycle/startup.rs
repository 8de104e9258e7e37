//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn resolved daemon settings into a ready `ProxyServer`
//! - Provision a certificate per vhost when HTTPS is enabled
//! - Collect every startup failure into one error type
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Steps run in order: bindings, certificates, registry, TLS, listeners
//! - One shared upstream client for every vhost handler
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use crate::certs::{CertError, CertIssuer, CertProvisioner, IssueError, LocalCa};
use crate::config::{ConfigError, DaemonSettings};
use crate::http::forward::{http_client, target_url};
use crate::http::{ForwardingHandler, ProxyServer, ServerError, ServerOptions};
use crate::net::tls::{build_sni_resolver, TlsError};
use crate::routing::{parse_bindings, Binding, BindingError, VhostEntry, VhostRegistry};

/// Any failure that stops the process before or while serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid bindings: {0}")]
    Binding(#[from] BindingError),

    #[error("invalid target URL: {0}")]
    TargetUrl(#[from] url::ParseError),

    #[error("certificate authority unavailable: {0}")]
    Issuer(#[from] IssueError),

    #[error(transparent)]
    Cert(#[from] CertError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Build one registry entry per binding, with a certificate when a
/// provisioner is given.
pub fn build_registry(
    bindings: &[Binding],
    provisioner: Option<&CertProvisioner>,
) -> Result<VhostRegistry, StartupError> {
    let client = http_client();
    let mut entries = Vec::with_capacity(bindings.len());

    for binding in bindings {
        let handler = ForwardingHandler::new(target_url(binding.target_port)?, client.clone());
        let cert = provisioner
            .map(|p| p.ensure_cert(&binding.hostname))
            .transpose()?;
        tracing::debug!(
            host = %binding.hostname,
            target_port = binding.target_port,
            tls = cert.is_some(),
            "Registered vhost"
        );
        entries.push(VhostEntry {
            host: binding.hostname.clone(),
            target_port: binding.target_port,
            handler,
            cert,
        });
    }

    Ok(VhostRegistry::new(entries))
}

/// Assemble the server from resolved settings. Certificates are only
/// provisioned when HTTPS is enabled and a provisioner is supplied.
pub fn assemble(
    settings: &DaemonSettings,
    provisioner: Option<&CertProvisioner>,
) -> Result<ProxyServer, StartupError> {
    let bindings = parse_bindings(settings.bind.value())?;
    tracing::info!(vhosts = bindings.len(), "Parsed bindings");

    let https_enabled = settings.https.get() != 0;
    let provisioner = provisioner.filter(|_| https_enabled);

    let registry = build_registry(&bindings, provisioner)?;
    let resolver = build_sni_resolver(&registry)?;

    let options = ServerOptions {
        listen: settings.listen.value().clone(),
        http_port: settings.http.get(),
        https_port: settings.https.get(),
    };
    Ok(ProxyServer::new(registry, resolver, options)?)
}

/// Run the daemon until a listener fails.
pub async fn run_daemon(settings: DaemonSettings) -> Result<(), StartupError> {
    let provisioner = if settings.https.get() != 0 {
        let ca = LocalCa::from_env()?;
        tracing::info!(
            caroot = %ca.root().display(),
            root_cert = %ca.root_cert_path().display(),
            "Using local CA"
        );
        let issuer: Arc<dyn CertIssuer> = Arc::new(ca);
        let provisioner = CertProvisioner::from_env(issuer)?;
        tracing::debug!(cert_dir = %provisioner.cert_dir().display(), "Certificate directory");
        Some(provisioner)
    } else {
        None
    };

    let server = assemble(&settings, provisioner.as_ref())?;
    server.run().await?;
    Ok(())
}
