//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, HTTP and HTTPS listeners)
//!     → request.rs (x-request-id)
//!     → [routing::registry picks the vhost by Host]
//!     → forward.rs (rewrite to backend, stream, log)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod server;

pub use forward::{ForwardingHandler, HttpClient};
pub use request::X_REQUEST_ID;
pub use server::{ListenerPlan, ListenerScheme, ProxyServer, ServerError, ServerOptions};
