//! Per-host certificate provisioning.
//!
//! # Responsibilities
//! - Resolve and create the certificate directory
//! - Reuse an existing pair for a hostname
//! - Ask the issuer for a new pair otherwise
//!
//! # Design Decisions
//! - Fail fast: any error aborts startup, there is no retry
//! - Runs during single-threaded startup, before any listener serves

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::certs::issuer::{CertIssuer, IssueError};
use crate::certs::{cert_path, CertPair};

/// Error type for certificate provisioning.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("could not determine the certificate directory")]
    NoCertDir,

    #[error("failed to create certificate directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to generate certificate for {host}: {source}")]
    Issue {
        host: String,
        #[source]
        source: IssueError,
    },
}

/// Ensures every vhost has a certificate/key pair on disk.
pub struct CertProvisioner {
    issuer: Arc<dyn CertIssuer>,
    cert_dir: PathBuf,
}

impl CertProvisioner {
    pub fn new(issuer: Arc<dyn CertIssuer>, cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            issuer,
            cert_dir: cert_dir.into(),
        }
    }

    /// Use `CERT_PATH`, or `~/.vproxy`, as the certificate directory.
    pub fn from_env(issuer: Arc<dyn CertIssuer>) -> Result<Self, CertError> {
        let cert_dir = cert_path().ok_or(CertError::NoCertDir)?;
        Ok(Self::new(issuer, cert_dir))
    }

    pub fn cert_dir(&self) -> &Path {
        &self.cert_dir
    }

    /// Return the pair for `hostname`, issuing it first if needed.
    pub fn ensure_cert(&self, hostname: &str) -> Result<CertPair, CertError> {
        fs::create_dir_all(&self.cert_dir).map_err(|source| CertError::CreateDir {
            path: self.cert_dir.clone(),
            source,
        })?;

        let hosts = [hostname.to_string()];
        if self.issuer.cert_exists(&hosts, &self.cert_dir) {
            let pair = self.issuer.cert_file(&hosts, &self.cert_dir);
            tracing::debug!(host = %hostname, cert_file = %pair.cert_file.display(), "Reusing certificate");
            return Ok(pair);
        }

        let pair = self
            .issuer
            .issue_cert(&hosts, &self.cert_dir)
            .map_err(|source| CertError::Issue {
                host: hostname.to_string(),
                source,
            })?;

        tracing::info!(
            host = %hostname,
            cert_file = %pair.cert_file.display(),
            "Generated certificate"
        );
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::issuer::cert_file_names;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes placeholder files and counts issuance calls.
    #[derive(Default)]
    struct CountingIssuer {
        issued: AtomicUsize,
        fail: bool,
    }

    impl CertIssuer for CountingIssuer {
        fn cert_file(&self, hosts: &[String], out_dir: &Path) -> CertPair {
            cert_file_names(hosts, out_dir)
        }

        fn issue_cert(&self, hosts: &[String], out_dir: &Path) -> Result<CertPair, IssueError> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IssueError::NoCaRoot);
            }
            let pair = self.cert_file(hosts, out_dir);
            fs::write(&pair.cert_file, "cert").unwrap();
            fs::write(&pair.key_file, "key").unwrap();
            Ok(pair)
        }
    }

    #[test]
    fn second_call_reuses_existing_pair() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(CountingIssuer::default());
        let provisioner = CertProvisioner::new(issuer.clone(), dir.path());

        let first = provisioner.ensure_cert("a.local").unwrap();
        let second = provisioner.ensure_cert("a.local").unwrap();

        assert_eq!(first, second);
        assert_eq!(issuer.issued.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn half_written_pair_is_reissued() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.local.pem"), "cert").unwrap();
        let issuer = Arc::new(CountingIssuer::default());
        let provisioner = CertProvisioner::new(issuer.clone(), dir.path());

        provisioner.ensure_cert("a.local").unwrap();
        assert_eq!(issuer.issued.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn creates_missing_cert_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("certs");
        let provisioner = CertProvisioner::new(Arc::new(CountingIssuer::default()), &nested);

        let pair = provisioner.ensure_cert("b.local").unwrap();
        assert!(nested.is_dir());
        assert!(pair.exists());
    }

    #[test]
    fn issuer_failure_names_the_host() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(CountingIssuer {
            fail: true,
            ..Default::default()
        });
        let provisioner = CertProvisioner::new(issuer, dir.path());

        let err = provisioner.ensure_cert("c.local").unwrap_err();
        assert!(matches!(err, CertError::Issue { ref host, .. } if host == "c.local"));
    }

    #[test]
    fn unusable_cert_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "").unwrap();
        let provisioner = CertProvisioner::new(Arc::new(CountingIssuer::default()), &file);

        assert!(matches!(
            provisioner.ensure_cert("d.local"),
            Err(CertError::CreateDir { .. })
        ));
    }
}
