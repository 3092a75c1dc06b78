//! CatchDB Server
//!
//! Entry point for the CatchDB server. Parses flags, sets up logging,
//! opens the store and runs the reactor on the main thread until Ctrl+C.

use anyhow::{bail, Context};
use catchdb::config::{Config, DEFAULT_MAX_CLIENTS, DEFAULT_PORT, DEFAULT_QUERY_BUFFER_SIZE};
use catchdb::server::{Server, ShutdownHandle};
use catchdb::storage::MemStore;
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// CatchDB Server
#[derive(Parser, Debug)]
#[command(name = "catchdb-server")]
#[command(about = "Structured key-value server: flat keys, hashes, queues and sorted sets")]
#[command(version)]
struct Args {
    /// Address to listen on; repeat for several (default: all interfaces)
    #[arg(short, long, env = "CATCHDB_BIND", value_delimiter = ',')]
    bind: Vec<IpAddr>,

    /// Port to listen on
    #[arg(short, long, env = "CATCHDB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrent connections
    #[arg(long, env = "CATCHDB_MAX_CLIENTS", default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Per-connection query buffer in bytes
    #[arg(long, env = "CATCHDB_QUERY_BUFFER", default_value_t = DEFAULT_QUERY_BUFFER_SIZE)]
    query_buffer: usize,

    /// Data directory; omit to keep everything in memory
    #[arg(short, long, env = "CATCHDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Batch log write buffer in MB
    #[arg(long, env = "CATCHDB_WRITE_BUFFER_MB", default_value_t = 4)]
    write_buffer_mb: usize,

    /// fsync the batch log after every write
    #[arg(long, env = "CATCHDB_SYNC_WRITES")]
    sync_writes: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "CATCHDB_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "CATCHDB_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// PID file; the server refuses to start if it already exists
    #[arg(long, env = "CATCHDB_PID_FILE")]
    pid_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Config {
        let mut builder = Config::builder()
            .port(self.port)
            .max_clients(self.max_clients)
            .query_buffer_size(self.query_buffer)
            .write_buffer_size(self.write_buffer_mb * 1024 * 1024)
            .sync_writes(self.sync_writes)
            .log_level(self.log_level);
        for ip in self.bind {
            builder = builder.bind(ip);
        }
        if let Some(dir) = self.data_dir {
            builder = builder.data_dir(dir);
        }
        if let Some(path) = self.log_file {
            builder = builder.log_file(path);
        }
        if let Some(path) = self.pid_file {
            builder = builder.pid_file(path);
        }
        builder.build()
    }
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn create_pid_file(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("pid file {} already exists", path.display());
    }
    fs::write(path, format!("{}\n", std::process::id()))
        .with_context(|| format!("cannot write pid file {}", path.display()))?;
    info!(path = %path.display(), "wrote pid file");
    Ok(())
}

fn open_store(config: &Config) -> anyhow::Result<MemStore> {
    let store: MemStore = match &config.data_dir {
        Some(dir) => MemStore::open(dir, config.store_options())
            .with_context(|| format!("cannot open store in {}", dir.display()))?,
        None => {
            warn!("no data directory configured, data will not survive a restart");
            MemStore::new()
        }
    };
    Ok(store)
}

/// Flips the shutdown handle on Ctrl+C, from a helper thread.
fn spawn_signal_thread(shutdown: ShutdownHandle) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot build signal runtime")?;

    std::thread::Builder::new()
        .name("catchdb-signal".into())
        .spawn(move || {
            runtime.block_on(async {
                match signal::ctrl_c().await {
                    Ok(()) => info!("Shutdown signal received, stopping server..."),
                    Err(e) => error!(error = %e, "cannot listen for Ctrl+C"),
                }
            });
            shutdown.shutdown();
        })
        .context("cannot spawn signal thread")?;
    Ok(())
}

fn run(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let mut server = Server::bind(config, store).context("cannot start server")?;
    spawn_signal_thread(server.shutdown_handle())?;

    info!(
        version = catchdb::VERSION,
        addrs = ?server.local_addrs(),
        max_clients = config.max_clients,
        "CatchDB ready to accept connections"
    );
    server.run()?;

    let stats = server.stats();
    info!(
        accepted = stats.connections_accepted.load(Ordering::Relaxed),
        rejected = stats.connections_rejected.load(Ordering::Relaxed),
        commands = stats.commands(),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();
    init_logging(&config)?;

    if let Some(path) = &config.pid_file {
        create_pid_file(path)?;
    }

    let result = run(&config);

    if let Some(path) = &config.pid_file {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "cannot remove pid file");
        }
    }
    result
}
