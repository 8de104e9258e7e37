//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Vhost registry (with cert pairs)
//!     → tls.rs (load PEM pairs, index by hostname)
//!     → SniCertResolver picks the certificate per ClientHello
//!     → HTTPS listener (axum-server + rustls)
//! ```
//!
//! # Design Decisions
//! - TLS terminates at the proxy; upstreams are always plain HTTP
//! - Accept loops are owned by the HTTP layer (axum / axum-server)

pub mod tls;

pub use tls::{build_sni_resolver, SniCertResolver, TlsError};
