//! vproxy library: vhost routing, local TLS and layered configuration.

pub mod certs;
pub mod cli;
pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use http::ProxyServer;
pub use lifecycle::StartupError;
