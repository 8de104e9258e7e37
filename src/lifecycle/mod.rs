//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolved settings → Parse bindings → Provision certs
//!         → Build registry → Build SNI resolver → Start listeners
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then certificates, then listeners
//! - No shutdown coordination: the process runs until a listener fails

pub mod startup;

pub use startup::{assemble, build_registry, run_daemon, StartupError};
