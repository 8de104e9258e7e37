//! Certificate subsystem.
//!
//! # Data Flow
//! ```text
//! hostname
//!     → provisioner.rs (cert dir, cache check)
//!     → issuer.rs (local CA: load/create root, sign leaf)
//!     → <cert dir>/<host>.pem + <host>-key.pem
//!     → CertPair attached to the vhost
//! ```
//!
//! # Design Decisions
//! - Both files on disk is the only validity signal (no expiry check)
//! - The CA handle is built once at startup and injected, never global
//! - Directory overrides come from the environment so the config layer
//!   does not depend on this module's internals

use std::path::PathBuf;

pub mod issuer;
pub mod provisioner;

pub use issuer::{CertIssuer, IssueError, LocalCa};
pub use provisioner::{CertError, CertProvisioner};

/// Overrides the root CA directory.
pub const CAROOT_PATH_ENV: &str = "CAROOT_PATH";

/// Overrides the per-host certificate directory.
pub const CERT_PATH_ENV: &str = "CERT_PATH";

/// mkcert's own CA root variable, honoured so an already trusted mkcert
/// root is reused.
pub const MKCERT_CAROOT_ENV: &str = "CAROOT";

/// Certificate and private key files for one vhost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPair {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl CertPair {
    /// Both files present.
    pub fn exists(&self) -> bool {
        self.cert_file.is_file() && self.key_file.is_file()
    }
}

/// Directory holding the root CA.
pub fn caroot_path() -> Option<PathBuf> {
    env_path(CAROOT_PATH_ENV)
        .or_else(|| env_path(MKCERT_CAROOT_ENV))
        .or_else(|| dirs::data_dir().map(|d| d.join("mkcert")))
}

/// Directory per-host certificates are written to (`~/.vproxy` by default).
pub fn cert_path() -> Option<PathBuf> {
    env_path(CERT_PATH_ENV).or_else(|| dirs::home_dir().map(|d| d.join(".vproxy")))
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
