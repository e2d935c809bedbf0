//! Chat relay server over length-prefixed TCP frames.
//!
//! Relays records between connected clients with broadcast, direct and
//! excluded delivery, and replays recent history to joining clients.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chatrelay-server
//! cargo run --bin chatrelay-server -- --host 0.0.0.0 --port 3000 --history-file chat.jsonl
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use chatrelay_server::{
    config::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_WRITE_TIMEOUT_SECS, ServerConfig},
    domain::HistoryStore,
    infrastructure::{
        ConnectionRegistry,
        history::{DEFAULT_HISTORY_CAPACITY, InMemoryHistoryStore, JsonlHistoryStore},
    },
    ui::Server,
    usecase::RoutingEngine,
};
use chatrelay_shared::{codec::DEFAULT_MAX_FRAME_LEN, logger::setup_logger, time::SystemClock};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "chatrelay-server")]
#[command(about = "TCP chat relay with direct and excluded delivery", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Append-only JSON-lines history file (history is kept in memory when omitted)
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Number of recent records replayed to joining clients
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history_capacity: usize,

    /// Largest accepted frame body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_bytes: usize,

    /// Seconds a connection may stay silent before it is closed
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    idle_timeout_secs: u64,

    /// Seconds a client may leave relayed records unread before it is dropped
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT_SECS)]
    write_timeout_secs: u64,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            history_file: args.history_file,
            history_capacity: args.history_capacity,
            max_frame_len: args.max_frame_bytes,
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            write_timeout: Duration::from_secs(args.write_timeout_secs),
            ..ServerConfig::default()
        }
    }
}

/// Open the configured history store, falling back to memory when the file
/// cannot be opened.
async fn open_history_store(config: &ServerConfig) -> Arc<dyn HistoryStore> {
    let Some(path) = &config.history_file else {
        tracing::info!("No history file configured, keeping history in memory");
        return Arc::new(InMemoryHistoryStore::new());
    };

    match JsonlHistoryStore::open(path).await {
        Ok(store) => {
            tracing::info!("Persisting history to {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(
                "Failed to open history file {}: {}; keeping history in memory",
                path.display(),
                e
            );
            Arc::new(InMemoryHistoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = ServerConfig::from(args);

    // Initialize dependencies in order:
    // 1. History store
    // 2. Connection registry
    // 3. Routing engine (warmed from history)
    // 4. Server
    let store = open_history_store(&config).await;
    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(
        RoutingEngine::new(
            registry,
            store,
            Arc::new(SystemClock),
            config.history_capacity,
        )
        .with_frame_limit(config.max_frame_len),
    );
    match engine.warm_history().await {
        Ok(loaded) => tracing::info!("Loaded {} history record(s) for replay", loaded),
        Err(e) => tracing::warn!("Failed to load history for replay: {}", e),
    }

    let server = Server::new(engine, config);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
