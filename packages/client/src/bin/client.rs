//! Terminal chat client for Kizuna.
//!
//! Signs in over HTTP, prints the contact list, then keeps the conversation,
//! delivery-status and notification sockets in sync while reading commands
//! from stdin. Channels reconnect on their own with exponential backoff.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin kizuna-client -- --mobile 111 --password secret
//! cargo run --bin kizuna-client -- -m 111 -p secret --ws-url ws://chat.example:8000
//! ```

use clap::Parser;

use kizuna_client::config::ClientConfig;
use kizuna_client::terminal::run_terminal;
use kizuna_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "kizuna-client")]
#[command(about = "Realtime chat client with reconnecting WebSocket channels", long_about = None)]
struct Args {
    /// Mobile number used to sign in
    #[arg(short = 'm', long)]
    mobile: String,

    /// Account password
    #[arg(short = 'p', long)]
    password: String,

    /// Base URL of the WebSocket endpoints
    #[arg(long, default_value = "ws://127.0.0.1:8000")]
    ws_url: String,

    /// Base URL of the HTTP API
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    http_url: String,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = ClientConfig {
        ws_base_url: args.ws_url,
        http_base_url: args.http_url,
        ..ClientConfig::default()
    };

    if let Err(e) = run_terminal(config, &args.mobile, &args.password).await {
        tracing::error!("Sign-in failed: {}", e);
        std::process::exit(1);
    }
}
