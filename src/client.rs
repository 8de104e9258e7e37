//! `vproxy client`: check bindings against a running daemon.
//!
//! Each binding is requested through the daemon's HTTP listener with the
//! binding's hostname in `Host`, the same way a browser would reach it.

use std::time::Duration;

use reqwest::header::HOST;
use reqwest::StatusCode;

use crate::config::ClientSettings;
use crate::routing::{parse_bindings, Binding, BindingError};

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid bindings: {0}")]
    Binding(#[from] BindingError),

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{failed} of {total} bindings unreachable through {daemon}")]
    Unreachable {
        failed: usize,
        total: usize,
        daemon: String,
    },
}

/// Result of checking one binding.
#[derive(Debug)]
pub struct BindingCheck {
    pub binding: Binding,
    pub outcome: Result<StatusCode, String>,
}

impl BindingCheck {
    pub fn is_reachable(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Base URL of the daemon's HTTP listener.
pub fn daemon_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

/// Request `/` for every binding through the daemon.
pub async fn check_bindings(daemon: &str, bindings: &[Binding]) -> Result<Vec<BindingCheck>, ClientError> {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(CHECK_TIMEOUT)
        .build()
        .map_err(ClientError::Build)?;

    let mut checks = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let outcome = client
            .get(format!("{daemon}/"))
            .header(HOST, binding.hostname.as_str())
            .send()
            .await
            .map(|res| res.status())
            .map_err(|e| e.to_string());
        tracing::debug!(host = %binding.hostname, outcome = ?outcome, "Checked binding");
        checks.push(BindingCheck {
            binding: binding.clone(),
            outcome,
        });
    }
    Ok(checks)
}

/// Run the client command and print one line per binding.
pub async fn run_client(settings: &ClientSettings) -> Result<(), ClientError> {
    let bindings = parse_bindings(settings.bind.value())?;
    let daemon = daemon_url(settings.host.value(), settings.http.get());

    println!("[*] checking {} binding(s) via {}", bindings.len(), daemon);
    let checks = check_bindings(&daemon, &bindings).await?;
    for check in &checks {
        match &check.outcome {
            Ok(status) => println!(
                "    - {} -> {}: {}",
                check.binding.hostname, check.binding.target_port, status
            ),
            Err(err) => println!(
                "    - {} -> {}: unreachable ({})",
                check.binding.hostname, check.binding.target_port, err
            ),
        }
    }

    let failed = checks.iter().filter(|c| !c.is_reachable()).count();
    if failed > 0 {
        return Err(ClientError::Unreachable {
            failed,
            total: checks.len(),
            daemon,
        });
    }
    Ok(())
}
