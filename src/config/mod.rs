//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command-line flags
//!     → settings.rs (Setting<T> tagged Explicit or Default)
//! config file (.vproxy.conf / .vproxy.toml, TOML)
//!     → loader.rs (discover & deserialize)
//!     → settings.rs (merge: only fills non-explicit settings)
//!     → shared scope (verbose) + env overrides (CAROOT_PATH, CERT_PATH)
//!     → normalized DaemonSettings / ClientSettings
//! ```
//!
//! # Design Decisions
//! - Explicit flag > config file > built-in default, always
//! - An explicit `--config` that does not exist is fatal
//! - No file found is not an error; the merge is simply skipped

pub mod loader;
pub mod schema;
pub mod settings;

pub use loader::{find_config_file, load_config, CommandMode, ConfigError};
pub use schema::ConfigDocument;
pub use settings::{
    normalize_listen_addr, resolve_client, resolve_daemon, ClientSettings, DaemonSettings, Setting,
    SharedSettings, Source,
};
