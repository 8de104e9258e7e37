//! vproxy: zero-config virtual host reverse proxy for local development.
//!
//! # Architecture Overview
//!
//! ```text
//!   flags + config file
//!       │
//!       ▼
//!   ┌──────────┐     ┌─────────┐     ┌──────────┐     ┌──────────┐
//!   │  config  │────▶│ routing │────▶│  certs   │────▶│   net    │
//!   │ resolver │     │bindings │     │ local CA │     │ SNI/TLS  │
//!   └──────────┘     └─────────┘     └──────────┘     └────┬─────┘
//!                                                          │
//!     Client ──Host: app.local──▶ ┌──────────┐             ▼
//!                                 │   http   │◀──── registry + TLS config
//!                                 │ server   │────▶ 127.0.0.1:<target port>
//!                                 └──────────┘
//! ```

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;

use vproxy::cli::{Cli, Command};
use vproxy::config::{resolve_client, resolve_daemon, SharedSettings};
use vproxy::observability::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "vproxy exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut shared = cli.shared_settings();

    match cli.command {
        Command::Daemon(args) => {
            let mut settings = args.settings();
            let resolved = resolve_daemon(&mut settings, &mut shared);
            start_logging(&shared);
            resolved?;
            settings.log_sources();
            vproxy::lifecycle::run_daemon(settings).await?;
        }
        Command::Client(args) => {
            let mut settings = args.settings();
            let resolved = resolve_client(&mut settings, &mut shared);
            start_logging(&shared);
            resolved?;
            settings.log_sources();
            vproxy::client::run_client(&settings).await?;
        }
        Command::Caroot => {
            start_logging(&shared);
            let root = vproxy::certs::caroot_path().ok_or("no CA root directory available")?;
            println!("{}", root.display());
        }
    }
    Ok(())
}

fn start_logging(shared: &SharedSettings) {
    init_logging(shared.verbose());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vproxy starting");
    if let Some(path) = shared.loaded_from() {
        tracing::info!(path = %path.display(), "Loaded config file");
    }
    tracing::debug!(value = shared.verbose(), source = %shared.verbose_setting().source(), "setting: verbose");
}
