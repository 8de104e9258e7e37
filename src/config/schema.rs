//! Configuration schema definitions.
//!
//! This module defines the on-disk configuration document. The file has a
//! `[server]` section read by the daemon, a `[client]` section read by the
//! client command and a top-level `verbose` switch that applies to both.
//! Every field is optional; zero and empty values mean "not set".

use serde::{Deserialize, Serialize};

/// Root of a `.vproxy.conf` / `.vproxy.toml` document.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigDocument {
    /// Enables verbose logging for every command.
    pub verbose: bool,

    /// Daemon settings.
    pub server: ServerSection,

    /// Client settings.
    pub client: ClientSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSection {
    pub verbose: bool,

    /// Address the listeners bind to (`"0"` means all interfaces).
    pub listen: String,

    /// Plain HTTP port.
    pub http: u16,

    /// TLS port.
    pub https: u16,

    /// Directory holding the root CA material.
    pub caroot_path: String,

    /// Directory where per-host certificates are written.
    pub cert_path: String,
}

/// `[client]` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ClientSection {
    pub verbose: bool,

    /// Host the daemon is reachable on.
    pub host: String,

    /// HTTP port of the daemon.
    pub http: u16,

    /// Binding spec (`"app.local:3000 api.local:4000"`).
    pub bind: String,
}

impl ConfigDocument {
    /// Whether the daemon should log verbosely according to this document.
    pub fn server_verbose(&self) -> bool {
        self.verbose || self.server.verbose
    }

    /// Whether the client should log verbosely according to this document.
    pub fn client_verbose(&self) -> bool {
        self.verbose || self.client.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let doc: ConfigDocument = toml::from_str(
            r#"
            verbose = true

            [server]
            listen = "0"
            http = 8080
            https = 8443
            caroot_path = "/tmp/ca"
            cert_path = "/tmp/certs"

            [client]
            host = "devbox"
            http = 8080
            bind = "app.local:3000"
            "#,
        )
        .unwrap();

        assert!(doc.verbose);
        assert_eq!(doc.server.listen, "0");
        assert_eq!(doc.server.http, 8080);
        assert_eq!(doc.server.https, 8443);
        assert_eq!(doc.server.caroot_path, "/tmp/ca");
        assert_eq!(doc.client.host, "devbox");
        assert_eq!(doc.client.bind, "app.local:3000");
    }

    #[test]
    fn missing_sections_default_to_unset() {
        let doc: ConfigDocument = toml::from_str("[client]\nverbose = true\n").unwrap();
        assert_eq!(doc.server, ServerSection::default());
        assert!(doc.client_verbose());
        assert!(!doc.server_verbose());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let result: Result<ConfigDocument, _> = toml::from_str("[server]\nhttp = \"eighty\"\n");
        assert!(result.is_err());
    }
}
