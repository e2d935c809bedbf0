//! Terminal chat client for the chatrelay server.
//!
//! Connects over TCP, joins with the given username and sends each typed line
//! as a message. `@user text` and `!user text` are handled by the server, as are
//! slash commands such as `/users` and `/quit`.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chatrelay-client -- --username Alice
//! cargo run --bin chatrelay-client -- -u Bob --color cyan --port 3000
//! ```

use clap::Parser;

use chatrelay_client::{ClientConfig, ClientError, run_client_session};
use chatrelay_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "chatrelay-client")]
#[command(about = "TCP chat client with direct and excluded messages", long_about = None)]
struct Args {
    /// Username shown to other users (must be unique)
    #[arg(short = 'u', long)]
    username: String,

    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Display color for your name (red, green, yellow, blue, magenta, cyan)
    #[arg(short = 'c', long)]
    color: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();
    let config = ClientConfig {
        host: args.host,
        port: args.port,
        username: args.username,
        color: args.color,
    };

    match run_client_session(&config).await {
        Ok(()) => tracing::info!("Client session ended normally"),
        Err(e @ ClientError::NameTaken(_)) => {
            tracing::error!("{}", e);
            eprintln!("{}. Choose another username.", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Client error: {}", e);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
