//! kvfs command-line client.
//!
//! Usage:
//!   kvfs format                       # once per namespace
//!   kvfs mkdir -p -m 750 /srv/data
//!   kvfs ls /srv
//!   kvfs --backend etcd:http://127.0.0.1:2379 stat /srv   # needs `etcd` feature
//!
//! The backend comes from `~/.config/kvfs/config.ron` (default: a SQLite file
//! under the user data dir) unless `--backend` overrides it.

mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kvfs_kernel::{BackendConfig, KvfsConfig, ensure_root};

use commands::Command;

/// Filesystem namespace shared through a key-value store.
#[derive(Parser, Debug)]
#[command(name = "kvfs")]
#[command(about = "Filesystem namespace shared through a key-value store")]
struct Args {
    /// Config file (default: ~/.config/kvfs/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend override: memory, sqlite:<path> or etcd:<endpoint>[,<endpoint>...]
    #[arg(long, global = true)]
    backend: Option<BackendConfig>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    let _otel_guard = if kvfs_telemetry::otel_enabled() {
        match kvfs_telemetry::otel_layer("kvfs") {
            Ok((otel_layer, guard)) => {
                registry.with(otel_layer).init();
                Some(guard)
            }
            Err(e) => {
                eprintln!("OTel export disabled: {e}");
                registry.init();
                None
            }
        }
    } else {
        registry.init();
        None
    };

    #[cfg(not(feature = "telemetry"))]
    {
        if kvfs_telemetry::otel_enabled() {
            eprintln!("OTel env vars set but kvfs was built without the `telemetry` feature");
        }
        registry.init();
    }

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kvfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => KvfsConfig::load(path)?,
        None => KvfsConfig::load_default()?,
    };
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let fs = config.open_filesystem().await?;
    tracing::debug!(fs = %fs.engine().backend().name(), command = ?args.command, "kvfs: running");

    // Nothing outlives the process, so format implicitly.
    if config.backend == BackendConfig::Memory {
        ensure_root(fs.backend().as_ref()).await?;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::run(&fs, &args.command, &mut out).await
}
