//! Command-line interface.
//!
//! Flags are `Option`s so that "not given" can be told apart from "given
//! with the default value"; only given flags count as explicit settings.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::settings::{DEFAULT_CLIENT_HOST, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use crate::config::{ClientSettings, DaemonSettings, Setting, SharedSettings};
use crate::routing::join_binding_args;

#[derive(Debug, Parser)]
#[command(name = "vproxy", version)]
#[command(about = "Virtual host reverse proxy with automatic local TLS for development", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default search path
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the proxy
    Daemon(DaemonArgs),
    /// Check bindings against a running daemon
    Client(ClientArgs),
    /// Print the CA root directory
    Caroot,
}

#[derive(Debug, Args)]
pub struct DaemonArgs {
    /// Bind hostnames to local ports ("app.local:7000 api.local:7001")
    #[arg(long, value_name = "SPEC")]
    pub bind: Option<String>,

    /// Port to listen for HTTP (0 to disable) [default: 80]
    #[arg(long, value_name = "PORT")]
    pub http: Option<u16>,

    /// Port to listen for TLS (HTTPS) (0 to disable) [default: 443]
    #[arg(long, value_name = "PORT")]
    pub https: Option<u16>,

    /// IP to listen on (0 for all interfaces) [default: 127.0.0.1]
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Additional host:port bindings
    #[arg(value_name = "BINDING")]
    pub bindings: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    /// Host the daemon runs on [default: 127.0.0.1]
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// HTTP port of the daemon [default: 80]
    #[arg(long, value_name = "PORT")]
    pub http: Option<u16>,

    /// Bindings to check ("app.local:7000 api.local:7001")
    #[arg(long, value_name = "SPEC")]
    pub bind: Option<String>,

    /// Additional host:port bindings
    #[arg(value_name = "BINDING")]
    pub bindings: Vec<String>,
}

impl Cli {
    /// Scope shared by whichever subcommand runs.
    pub fn shared_settings(&self) -> SharedSettings {
        SharedSettings::new(self.verbose, self.config.clone())
    }
}

impl DaemonArgs {
    pub fn settings(&self) -> DaemonSettings {
        DaemonSettings {
            listen: Setting::from_flag(self.listen.clone(), String::new()),
            http: Setting::from_flag(self.http, DEFAULT_HTTP_PORT),
            https: Setting::from_flag(self.https, DEFAULT_HTTPS_PORT),
            bind: Setting::from_flag(explicit_bindings(self.bind.as_deref(), &self.bindings), String::new()),
        }
    }
}

impl ClientArgs {
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            host: Setting::from_flag(self.host.clone(), DEFAULT_CLIENT_HOST.to_string()),
            http: Setting::from_flag(self.http, DEFAULT_HTTP_PORT),
            bind: Setting::from_flag(explicit_bindings(self.bind.as_deref(), &self.bindings), String::new()),
        }
    }
}

/// Bindings given on the command line, if any.
fn explicit_bindings(bind: Option<&str>, positional: &[String]) -> Option<String> {
    if bind.is_none() && positional.is_empty() {
        return None;
    }
    Some(join_binding_args(bind.unwrap_or_default(), positional))
}
