//! Resolved per-command settings.
//!
//! # Responsibilities
//! - Track where every setting came from (flag, config file, default)
//! - Merge a config document without overriding explicit flags
//! - Hold flags shared by all subcommands of one invocation (`verbose`)
//! - Normalize the listen address after merging
//!
//! # Design Decisions
//! - Precedence is always explicit flag > config file > built-in default
//! - Shared flags live in one `SharedSettings` value created before
//!   subcommand dispatch and passed `&mut` to each resolver
//! - CA and cert directories are not settings; they are exported as
//!   environment overrides for the certificate subsystem

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::certs::{CAROOT_PATH_ENV, CERT_PATH_ENV};
use crate::config::loader::{find_config_file, load_config, CommandMode, ConfigError};
use crate::config::schema::ConfigDocument;

/// Listen address used when none is configured.
pub const LISTEN_DEFAULT_ADDR: &str = "127.0.0.1";

/// Listen address selected by `--listen 0`.
pub const LISTEN_ANY_IP: &str = "0.0.0.0";

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Host the client expects the daemon on.
pub const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";

/// Origin of a resolved setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Default,
    ConfigFile,
    Explicit,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Default => write!(f, "default"),
            Source::ConfigFile => write!(f, "config"),
            Source::Explicit => write!(f, "flag"),
        }
    }
}

/// A setting value tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting<T> {
    value: T,
    source: Source,
}

impl<T> Setting<T> {
    pub fn new(value: T, source: Source) -> Self {
        Self { value, source }
    }

    /// Build from an optional command-line flag, falling back to `default`.
    pub fn from_flag(flag: Option<T>, default: T) -> Self {
        match flag {
            Some(value) => Self::new(value, Source::Explicit),
            None => Self::new(default, Source::Default),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn is_explicit(&self) -> bool {
        self.source == Source::Explicit
    }

    /// Take a config-file value unless the user supplied this setting.
    /// Returns whether the value was applied.
    pub fn merge_from_file(&mut self, value: T) -> bool {
        if self.is_explicit() {
            return false;
        }
        self.value = value;
        self.source = Source::ConfigFile;
        true
    }
}

impl<T: Copy> Setting<T> {
    pub fn get(&self) -> T {
        self.value
    }
}

/// Settings visible to every subcommand of one invocation.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    verbose: Setting<bool>,
    config: Option<PathBuf>,
    loaded_from: Option<PathBuf>,
}

impl SharedSettings {
    /// `verbose` counts as explicit only when the flag was passed.
    pub fn new(verbose_flag: bool, config: Option<PathBuf>) -> Self {
        let verbose = if verbose_flag {
            Setting::new(true, Source::Explicit)
        } else {
            Setting::new(false, Source::Default)
        };
        Self {
            verbose,
            config,
            loaded_from: None,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose.get()
    }

    pub fn verbose_setting(&self) -> &Setting<bool> {
        &self.verbose
    }

    /// Config path given with `--config`.
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// Config file that was actually merged, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    fn propagate_verbose(&mut self, enabled: bool) {
        if enabled {
            self.verbose.merge_from_file(true);
        }
    }
}

/// Directory overrides for the certificate subsystem found in a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertDirOverrides {
    pub caroot_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
}

impl CertDirOverrides {
    /// Export the overrides as `CAROOT_PATH` / `CERT_PATH`. Variables the
    /// user already set in the environment are left alone.
    pub fn publish(&self) {
        publish_env(CAROOT_PATH_ENV, self.caroot_path.as_deref());
        publish_env(CERT_PATH_ENV, self.cert_path.as_deref());
    }
}

fn publish_env(name: &str, value: Option<&Path>) {
    let Some(value) = value else { return };
    let already_set = std::env::var_os(name).is_some_and(|v| !v.is_empty());
    if !already_set {
        std::env::set_var(name, OsStr::new(value));
    }
}

/// Settings for the `daemon` command.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub listen: Setting<String>,
    pub http: Setting<u16>,
    pub https: Setting<u16>,
    /// Binding spec collected from `--bind` and positional arguments.
    pub bind: Setting<String>,
}

impl DaemonSettings {
    /// Apply the `[server]` section and the document-level `verbose`.
    pub fn merge(&mut self, shared: &mut SharedSettings, doc: &ConfigDocument) -> CertDirOverrides {
        shared.propagate_verbose(doc.server_verbose());

        let server = &doc.server;
        if !server.listen.is_empty() {
            self.listen.merge_from_file(server.listen.clone());
        }
        if server.http > 0 {
            self.http.merge_from_file(server.http);
        }
        if server.https > 0 {
            self.https.merge_from_file(server.https);
        }

        CertDirOverrides {
            caroot_path: non_empty_path(&server.caroot_path),
            cert_path: non_empty_path(&server.cert_path),
        }
    }

    pub fn normalize_listen(&mut self) {
        self.listen.value = normalize_listen_addr(&self.listen.value);
    }

    /// Emit where each setting came from.
    pub fn log_sources(&self) {
        tracing::debug!(value = %self.listen.value(), source = %self.listen.source(), "setting: listen");
        tracing::debug!(value = self.http.get(), source = %self.http.source(), "setting: http");
        tracing::debug!(value = self.https.get(), source = %self.https.source(), "setting: https");
        tracing::debug!(value = %self.bind.value(), source = %self.bind.source(), "setting: bind");
    }
}

/// Settings for the `client` command.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub host: Setting<String>,
    pub http: Setting<u16>,
    pub bind: Setting<String>,
}

impl ClientSettings {
    /// Apply the `[client]` section and the document-level `verbose`.
    ///
    /// The client never issues certificates, so the section carries no CA
    /// or cert directory overrides.
    pub fn merge(&mut self, shared: &mut SharedSettings, doc: &ConfigDocument) {
        shared.propagate_verbose(doc.client_verbose());

        let client = &doc.client;
        if !client.host.is_empty() {
            self.host.merge_from_file(client.host.clone());
        }
        if client.http > 0 {
            self.http.merge_from_file(client.http);
        }
        if !client.bind.is_empty() {
            self.bind.merge_from_file(client.bind.clone());
        }
    }

    pub fn log_sources(&self) {
        tracing::debug!(value = %self.host.value(), source = %self.host.source(), "setting: host");
        tracing::debug!(value = self.http.get(), source = %self.http.source(), "setting: http");
        tracing::debug!(value = %self.bind.value(), source = %self.bind.source(), "setting: bind");
    }
}

/// Find, load and merge the daemon's config file, then normalize.
pub fn resolve_daemon(settings: &mut DaemonSettings, shared: &mut SharedSettings) -> Result<(), ConfigError> {
    if let Some(path) = find_config_file(shared.config_path(), CommandMode::Daemon)? {
        let doc = load_config(&path)?;
        settings.merge(shared, &doc).publish();
        shared.loaded_from = Some(path);
    }
    settings.normalize_listen();
    Ok(())
}

/// Find, load and merge the client's config file.
pub fn resolve_client(settings: &mut ClientSettings, shared: &mut SharedSettings) -> Result<(), ConfigError> {
    if let Some(path) = find_config_file(shared.config_path(), CommandMode::Client)? {
        let doc = load_config(&path)?;
        settings.merge(shared, &doc);
        shared.loaded_from = Some(path);
    }
    Ok(())
}

/// Map the configured listen address to a bindable one.
pub fn normalize_listen_addr(listen: &str) -> String {
    match listen {
        "" => LISTEN_DEFAULT_ADDR.to_string(),
        "0" => LISTEN_ANY_IP.to_string(),
        other => other.to_string(),
    }
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ClientSection, ServerSection};

    fn daemon_defaults() -> DaemonSettings {
        DaemonSettings {
            listen: Setting::from_flag(None, String::new()),
            http: Setting::from_flag(None, DEFAULT_HTTP_PORT),
            https: Setting::from_flag(None, DEFAULT_HTTPS_PORT),
            bind: Setting::from_flag(None, String::new()),
        }
    }

    fn client_defaults() -> ClientSettings {
        ClientSettings {
            host: Setting::from_flag(None, DEFAULT_CLIENT_HOST.to_string()),
            http: Setting::from_flag(None, DEFAULT_HTTP_PORT),
            bind: Setting::from_flag(None, String::new()),
        }
    }

    fn server_doc(server: ServerSection) -> ConfigDocument {
        ConfigDocument {
            server,
            ..Default::default()
        }
    }

    #[test]
    fn explicit_flag_beats_config_file() {
        let mut settings = daemon_defaults();
        settings.http = Setting::from_flag(Some(8080), DEFAULT_HTTP_PORT);
        let mut shared = SharedSettings::new(false, None);

        settings.merge(
            &mut shared,
            &server_doc(ServerSection {
                http: 9090,
                https: 9443,
                ..Default::default()
            }),
        );

        assert_eq!(settings.http.get(), 8080);
        assert_eq!(settings.http.source(), Source::Explicit);
        assert_eq!(settings.https.get(), 9443);
        assert_eq!(settings.https.source(), Source::ConfigFile);
    }

    #[test]
    fn zero_and_empty_file_values_are_ignored() {
        let mut settings = daemon_defaults();
        let mut shared = SharedSettings::new(false, None);

        let overrides = settings.merge(&mut shared, &server_doc(ServerSection::default()));

        assert_eq!(settings.http.get(), DEFAULT_HTTP_PORT);
        assert_eq!(settings.http.source(), Source::Default);
        assert_eq!(settings.listen.source(), Source::Default);
        assert_eq!(overrides, CertDirOverrides::default());
        assert!(!shared.verbose());
    }

    #[test]
    fn client_section_verbose_is_visible_to_daemon() {
        let mut shared = SharedSettings::new(false, None);
        let doc = ConfigDocument {
            client: ClientSection {
                verbose: true,
                ..Default::default()
            },
            ..Default::default()
        };

        client_defaults().merge(&mut shared, &doc);

        let mut daemon = daemon_defaults();
        daemon.merge(&mut shared, &ConfigDocument::default());
        assert!(shared.verbose());
        assert_eq!(shared.verbose_setting().source(), Source::ConfigFile);
    }

    #[test]
    fn document_verbose_applies_to_daemon() {
        let mut shared = SharedSettings::new(false, None);
        let doc = ConfigDocument {
            verbose: true,
            ..Default::default()
        };
        daemon_defaults().merge(&mut shared, &doc);
        assert!(shared.verbose());
    }

    #[test]
    fn explicit_verbose_keeps_its_source() {
        let mut shared = SharedSettings::new(true, None);
        let doc = ConfigDocument {
            verbose: true,
            ..Default::default()
        };
        daemon_defaults().merge(&mut shared, &doc);
        assert!(shared.verbose());
        assert!(shared.verbose_setting().is_explicit());
    }

    #[test]
    fn server_cert_dirs_become_overrides() {
        let mut shared = SharedSettings::new(false, None);
        let overrides = daemon_defaults().merge(
            &mut shared,
            &server_doc(ServerSection {
                caroot_path: "/srv/ca".into(),
                cert_path: "/srv/certs".into(),
                ..Default::default()
            }),
        );
        assert_eq!(overrides.caroot_path, Some(PathBuf::from("/srv/ca")));
        assert_eq!(overrides.cert_path, Some(PathBuf::from("/srv/certs")));
    }

    #[test]
    fn client_merge_respects_explicit_bind() {
        let mut settings = client_defaults();
        settings.bind = Setting::from_flag(Some("a.local:3000".to_string()), String::new());
        let mut shared = SharedSettings::new(false, None);
        let doc = ConfigDocument {
            client: ClientSection {
                host: "devbox".into(),
                http: 8080,
                bind: "b.local:4000".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        settings.merge(&mut shared, &doc);

        assert_eq!(settings.bind.value(), "a.local:3000");
        assert_eq!(settings.host.value(), "devbox");
        assert_eq!(settings.http.get(), 8080);
    }

    #[test]
    fn listen_address_normalization() {
        assert_eq!(normalize_listen_addr(""), LISTEN_DEFAULT_ADDR);
        assert_eq!(normalize_listen_addr("0"), LISTEN_ANY_IP);
        assert_eq!(normalize_listen_addr("192.168.1.5"), "192.168.1.5");
    }

    #[test]
    fn listen_from_file_is_normalized() {
        let mut settings = daemon_defaults();
        let mut shared = SharedSettings::new(false, None);
        settings.merge(
            &mut shared,
            &server_doc(ServerSection {
                listen: "0".into(),
                ..Default::default()
            }),
        );
        settings.normalize_listen();
        assert_eq!(settings.listen.value(), LISTEN_ANY_IP);
        assert_eq!(settings.listen.source(), Source::ConfigFile);
    }

    #[test]
    fn resolve_fails_for_missing_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.conf");
        let mut shared = SharedSettings::new(false, Some(missing.clone()));
        let mut settings = daemon_defaults();

        let err = resolve_daemon(&mut settings, &mut shared).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(path) if path == missing));
    }

    #[test]
    fn resolve_merges_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vproxy.toml");
        std::fs::write(&path, "[client]\nhttp = 8080\nbind = \"a.local:3000\"\n").unwrap();
        let mut shared = SharedSettings::new(false, Some(path.clone()));
        let mut settings = client_defaults();

        resolve_client(&mut settings, &mut shared).unwrap();

        assert_eq!(settings.http.get(), 8080);
        assert_eq!(settings.bind.value(), "a.local:3000");
        assert_eq!(shared.loaded_from(), Some(path.as_path()));
    }
}
