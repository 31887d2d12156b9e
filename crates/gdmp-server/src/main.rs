//! GDMP relay server entry point.
//!
//! # Usage
//!
//! ```text
//! gdmp-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file [default: ~/.config/gdmp/config.toml]
//!   --port <PORT>                TCP port to listen on
//!   --bind <ADDR>                IP address to bind
//!   --threads <N>                Worker thread count
//!   --max-connections <N>        Open connection limit
//!   --poll-timeout-ms <MS>       Upper bound on one readiness wait
//! ```
//!
//! Every flag can also be set through the matching `GDMP_*` environment
//! variable.  Flags and variables take precedence over the config file, which
//! takes precedence over built-in defaults.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, apply CLI overrides
//!  └─ Server::new()           -- binds, starts worker threads
//!  └─ spawn_blocking(start)   -- multiplexer loop
//!  └─ ctrl_c → ServerHandle::shutdown()
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gdmp_server::infrastructure::storage::config::{default_config_path, load_config};
use gdmp_server::{AppConfig, Server};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-client GDMP chat relay.
#[derive(Debug, Parser)]
#[command(name = "gdmp-server", about = "Multi-client GDMP chat relay", version)]
struct Cli {
    /// Path of the TOML config file.  A missing file means "all defaults".
    #[arg(long, env = "GDMP_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long, env = "GDMP_PORT")]
    port: Option<u16>,

    /// IP address to bind, e.g. `0.0.0.0` or `127.0.0.1`.
    #[arg(long, env = "GDMP_BIND")]
    bind: Option<String>,

    /// Number of worker threads.
    #[arg(long, env = "GDMP_THREADS")]
    threads: Option<usize>,

    /// Maximum number of simultaneously open client connections.
    #[arg(long, env = "GDMP_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Upper bound on one readiness wait, in milliseconds.
    #[arg(long, env = "GDMP_POLL_TIMEOUT_MS")]
    poll_timeout_ms: Option<u64>,
}

impl Cli {
    /// Loads the config file and applies every flag that was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let path = match self.config {
            Some(path) => Some(path),
            None => default_config_path().ok(),
        };
        let mut config = match &path {
            Some(path) => load_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => AppConfig::default(),
        };

        let server = &mut config.server;
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(bind) = self.bind {
            server.bind_address = bind;
        }
        if let Some(threads) = self.threads {
            server.worker_threads = threads;
        }
        if let Some(max) = self.max_connections {
            server.max_connections = max;
        }
        if let Some(ms) = self.poll_timeout_ms {
            server.poll_timeout_ms = Some(ms);
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_app_config()?;

    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let server = Server::new(&config.server).context("starting relay")?;
    let handle = server.handle();
    info!("GDMP relay ready on {}.  Press Ctrl-C to exit.", server.local_addr());

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl-C, shutting down");
                signal_handle.shutdown();
            }
            Err(e) => error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    // ── Multiplexer ───────────────────────────────────────────────────────────
    tokio::task::spawn_blocking(move || server.start())
        .await
        .context("multiplexer thread panicked")??;

    info!("GDMP relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
