//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Binding spec ("app.local:3000 api.local:4000")
//!     → binding.rs (parse into Binding[])
//!     → [lifecycle attaches forwarding handler + cert per binding]
//!     → registry.rs (freeze as immutable VhostRegistry)
//!
//! Incoming request (Host header)
//!     → registry.rs (host lookup)
//!     → matched VhostEntry or NoMatch
//! ```
//!
//! # Design Decisions
//! - Vhosts compiled at startup, immutable at runtime
//! - Deterministic: same host always maps to the same vhost
//! - Last binding for a hostname wins

pub mod binding;
pub mod registry;

pub use binding::{join_binding_args, parse_bindings, Binding, BindingError};
pub use registry::{VhostEntry, VhostRegistry};
