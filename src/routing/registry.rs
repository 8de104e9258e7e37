//! Vhost lookup.
//!
//! # Responsibilities
//! - Store one entry per hostname (target port, forwarding handler, cert)
//! - Look up the vhost for a request by its `Host`
//!
//! # Design Decisions
//! - Built once at startup, immutable afterwards (shared via Arc, no locks)
//! - O(1) host lookup via HashMap
//! - Host matching is case-insensitive and ignores the port
//! - Explicit no-match rather than a silent default vhost

use std::collections::HashMap;

use axum::http::{header, Request};

use crate::certs::CertPair;
use crate::http::forward::ForwardingHandler;

/// A single virtual host.
#[derive(Debug, Clone)]
pub struct VhostEntry {
    pub host: String,
    pub target_port: u16,
    pub handler: ForwardingHandler,
    /// Present when TLS is enabled for this vhost.
    pub cert: Option<CertPair>,
}

/// Hostname → vhost mapping.
#[derive(Debug, Default)]
pub struct VhostRegistry {
    vhosts: HashMap<String, VhostEntry>,
}

impl VhostRegistry {
    /// Build the registry. A later entry for the same host replaces an
    /// earlier one.
    pub fn new(entries: impl IntoIterator<Item = VhostEntry>) -> Self {
        let mut vhosts = HashMap::new();
        for entry in entries {
            vhosts.insert(entry.host.to_ascii_lowercase(), entry);
        }
        Self { vhosts }
    }

    /// Look up a vhost by hostname. Accepts a `host:port` authority.
    pub fn get(&self, host: &str) -> Option<&VhostEntry> {
        self.vhosts.get(&strip_port(host).to_ascii_lowercase())
    }

    /// Find the vhost a request is addressed to.
    pub fn match_request<B>(&self, req: &Request<B>) -> Option<&VhostEntry> {
        request_host(req).and_then(|host| self.get(host))
    }

    pub fn len(&self) -> usize {
        self.vhosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vhosts.is_empty()
    }

    /// Entries sorted by hostname.
    pub fn entries(&self) -> Vec<&VhostEntry> {
        let mut entries: Vec<_> = self.vhosts.values().collect();
        entries.sort_by(|a, b| a.host.cmp(&b.host));
        entries
    }
}

/// Host a request is addressed to: the `Host` header, or the URI authority
/// for HTTP/2 requests that only carry `:authority`.
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())
}

/// Drop a trailing `:port` from an authority, leaving IPv6 literals intact.
pub fn strip_port(authority: &str) -> &str {
    match authority.rsplit_once(':') {
        Some((host, port))
            if !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && (!host.contains(':') || host.ends_with(']')) =>
        {
            host
        }
        _ => authority,
    }
}
