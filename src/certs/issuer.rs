//! Local certificate authority.
//!
//! Issues development certificates signed by a root that lives on the
//! developer's machine. The on-disk layout matches mkcert (`rootCA.pem`,
//! `rootCA-key.pem`, `<host>.pem`, `<host>-key.pem`), so a root that was
//! already installed in the trust store by mkcert is picked up as is.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};

use crate::certs::{caroot_path, CertPair};

pub const ROOT_CERT_FILE: &str = "rootCA.pem";
pub const ROOT_KEY_FILE: &str = "rootCA-key.pem";

/// Leaf validity, the longest span browsers accept for private roots.
const LEAF_VALIDITY_DAYS: i64 = 825;
const ROOT_VALIDITY_DAYS: i64 = 3650;

/// Error type for certificate issuance.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("no hostnames given")]
    NoHosts,

    #[error("could not determine the CA root directory")]
    NoCaRoot,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),
}

/// Something that can mint certificate/key pairs for a set of hostnames.
pub trait CertIssuer: Send + Sync {
    /// Paths the pair for `hosts` lives at in `out_dir`, whether or not it
    /// exists yet.
    fn cert_file(&self, hosts: &[String], out_dir: &Path) -> CertPair;

    /// Whether a pair for `hosts` is already on disk.
    fn cert_exists(&self, hosts: &[String], out_dir: &Path) -> bool {
        self.cert_file(hosts, out_dir).exists()
    }

    /// Generate and persist a pair whose SANs are `hosts`.
    fn issue_cert(&self, hosts: &[String], out_dir: &Path) -> Result<CertPair, IssueError>;
}

/// File names for a host set: `app.local.pem`, `_wildcard.app.local.pem`,
/// `app.local+2.pem` for three names.
pub fn cert_file_names(hosts: &[String], out_dir: &Path) -> CertPair {
    let mut stem = hosts
        .first()
        .map(|h| h.replace('*', "_wildcard").replace(':', "_"))
        .unwrap_or_default();
    if hosts.len() > 1 {
        stem.push_str(&format!("+{}", hosts.len() - 1));
    }
    CertPair {
        cert_file: out_dir.join(format!("{stem}.pem")),
        key_file: out_dir.join(format!("{stem}-key.pem")),
    }
}

/// A root CA loaded from (or created in) a CA root directory.
pub struct LocalCa {
    root: PathBuf,
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl std::fmt::Debug for LocalCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCa").field("root", &self.root).finish_non_exhaustive()
    }
}

impl LocalCa {
    /// Open the CA at the configured root (`CAROOT_PATH`, `CAROOT`, or the
    /// mkcert default directory).
    pub fn from_env() -> Result<Self, IssueError> {
        let root = caroot_path().ok_or(IssueError::NoCaRoot)?;
        Self::load_or_create(&root)
    }

    /// Load the root CA in `root`, generating one if none exists.
    pub fn load_or_create(root: &Path) -> Result<Self, IssueError> {
        let cert_path = root.join(ROOT_CERT_FILE);
        let key_path = root.join(ROOT_KEY_FILE);

        if cert_path.is_file() && key_path.is_file() {
            return Self::load(root, &cert_path, &key_path);
        }
        Self::create(root, &cert_path, &key_path)
    }

    fn load(root: &Path, cert_path: &Path, key_path: &Path) -> Result<Self, IssueError> {
        let cert_pem = read_to_string(cert_path)?;
        let key_pem = read_to_string(key_path)?;

        let ca_key = KeyPair::from_pem(&key_pem)?;
        // Re-signing the parsed params reproduces the issuer name and key
        // identifier that leaves need; the original signature is not used.
        let ca_cert = CertificateParams::from_ca_cert_pem(&cert_pem)?.self_signed(&ca_key)?;

        tracing::debug!(root = %root.display(), "Loaded local CA");
        Ok(Self {
            root: root.to_path_buf(),
            ca_cert,
            ca_key,
        })
    }

    fn create(root: &Path, cert_path: &Path, key_path: &Path) -> Result<Self, IssueError> {
        fs::create_dir_all(root).map_err(|source| IssueError::Write {
            path: root.to_path_buf(),
            source,
        })?;

        let ca_key = KeyPair::generate()?;
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "vproxy development CA");
        dn.push(DnType::OrganizationName, "vproxy development CA");
        params.distinguished_name = dn;
        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(ROOT_VALIDITY_DAYS);

        let ca_cert = params.self_signed(&ca_key)?;

        write_file(cert_path, ca_cert.pem().as_bytes(), 0o644)?;
        write_file(key_path, ca_key.serialize_pem().as_bytes(), 0o400)?;

        tracing::info!(
            root = %root.display(),
            "Created a new local CA; trust {} to make browsers accept vproxy certificates",
            cert_path.display()
        );
        Ok(Self {
            root: root.to_path_buf(),
            ca_cert,
            ca_key,
        })
    }

    /// CA root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the root certificate to add to trust stores.
    pub fn root_cert_path(&self) -> PathBuf {
        self.root.join(ROOT_CERT_FILE)
    }
}

impl CertIssuer for LocalCa {
    fn cert_file(&self, hosts: &[String], out_dir: &Path) -> CertPair {
        cert_file_names(hosts, out_dir)
    }

    fn issue_cert(&self, hosts: &[String], out_dir: &Path) -> Result<CertPair, IssueError> {
        if hosts.is_empty() {
            return Err(IssueError::NoHosts);
        }

        let mut params = CertificateParams::new(hosts.to_vec())?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "vproxy development certificate");
        params.distinguished_name = dn;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;
        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::minutes(5);
        params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);

        let key = KeyPair::generate()?;
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key)?;

        let pair = self.cert_file(hosts, out_dir);
        write_file(&pair.cert_file, cert.pem().as_bytes(), 0o644)?;
        write_file(&pair.key_file, key.serialize_pem().as_bytes(), 0o600)?;
        Ok(pair)
    }
}

fn read_to_string(path: &Path) -> Result<String, IssueError> {
    fs::read_to_string(path).map_err(|source| IssueError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), IssueError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let to_err = |source: std::io::Error| IssueError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = options.open(path).map_err(to_err)?;
    file.write_all(contents).map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn file_names_follow_mkcert() {
        let dir = Path::new("/certs");
        let pair = cert_file_names(&hosts(&["app.local"]), dir);
        assert_eq!(pair.cert_file, dir.join("app.local.pem"));
        assert_eq!(pair.key_file, dir.join("app.local-key.pem"));

        let pair = cert_file_names(&hosts(&["*.app.local", "a", "b"]), dir);
        assert_eq!(pair.cert_file, dir.join("_wildcard.app.local+2.pem"));
    }

    #[test]
    fn creates_root_once_and_reloads_it() {
        let dir = tempfile::tempdir().unwrap();
        let ca = LocalCa::load_or_create(dir.path()).unwrap();
        assert!(ca.root_cert_path().is_file());
        assert!(dir.path().join(ROOT_KEY_FILE).is_file());

        let original = fs::read_to_string(ca.root_cert_path()).unwrap();
        let reloaded = LocalCa::load_or_create(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(reloaded.root_cert_path()).unwrap(), original);
    }

    #[test]
    fn issues_leaf_pair() {
        let ca_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let ca = LocalCa::load_or_create(ca_dir.path()).unwrap();
        let names = hosts(&["app.local"]);

        assert!(!ca.cert_exists(&names, out.path()));
        let pair = ca.issue_cert(&names, out.path()).unwrap();
        assert!(ca.cert_exists(&names, out.path()));
        assert_eq!(pair, ca.cert_file(&names, out.path()));

        let pem = fs::read_to_string(&pair.cert_file).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
        let key = fs::read_to_string(&pair.key_file).unwrap();
        assert!(key.contains("PRIVATE KEY"));
    }

    #[test]
    fn reloaded_ca_can_still_issue() {
        let ca_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        LocalCa::load_or_create(ca_dir.path()).unwrap();

        let ca = LocalCa::load_or_create(ca_dir.path()).unwrap();
        ca.issue_cert(&hosts(&["api.local"]), out.path()).unwrap();
        assert!(out.path().join("api.local.pem").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn leaf_key_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let ca_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let ca = LocalCa::load_or_create(ca_dir.path()).unwrap();
        let pair = ca.issue_cert(&hosts(&["app.local"]), out.path()).unwrap();

        let mode = fs::metadata(&pair.key_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn empty_host_set_is_rejected() {
        let ca_dir = tempfile::tempdir().unwrap();
        let ca = LocalCa::load_or_create(ca_dir.path()).unwrap();
        assert!(matches!(
            ca.issue_cert(&[], ca_dir.path()),
            Err(IssueError::NoHosts)
        ));
    }
}
