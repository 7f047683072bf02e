//! Parley terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Token from the environment, server on localhost
//! PARLEY_TOKEN=... parley
//!
//! # Explicit server, open room 12 first
//! parley --base-url https://chat.example.com --token ... --room 12
//! ```
//!
//! Plain lines are sent to the active room; `/room`, `/jump`, `/delete`,
//! `/rooms` and `/quit` are commands. Logs go to stderr.

use clap::Parser;
use parley_app::{App, DEFAULT_MAX_JUMP_ATTEMPTS, DEFAULT_PAGE_SIZE, HttpChatApi, Runtime, ViewConfig};
use parley_cli::CliDriver;
use parley_client::transport::{self, ChatConfig, DEFAULT_BASE_URL};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley terminal chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Terminal client for Parley chat rooms")]
#[command(version)]
struct Args {
    /// HTTP origin of the chat server
    #[arg(long, env = "PARLEY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Bearer token for the REST API and the broker
    #[arg(long, env = "PARLEY_TOKEN", hide_env_values = true)]
    token: String,

    /// Own user id, to tell own messages from the partner's
    #[arg(long, env = "PARLEY_USER_ID")]
    user_id: Option<u64>,

    /// Room to open instead of the most recent one
    #[arg(long)]
    room: Option<u64>,

    /// Connect to the raw WebSocket endpoint instead of SockJS
    #[arg(long)]
    no_sockjs: bool,

    /// Messages per history page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Older pages fetched per jump before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_JUMP_ATTEMPTS)]
    max_jump_attempts: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = ChatConfig::with_base_url(&args.base_url);
    config.sockjs = !args.no_sockjs;
    let (handle, task) = transport::spawn(&config)?;
    tracing::info!(base_url = %args.base_url, "parley starting");

    let api = HttpChatApi::new(&args.base_url, args.token.clone())?;
    let driver = CliDriver::new(handle.clone(), args.token);

    let mut app = App::new(ViewConfig {
        page_size: args.page_size,
        max_jump_attempts: args.max_jump_attempts,
    });
    app.set_local_user(args.user_id);
    app.set_initial_room(args.room);

    let result = Runtime::new(driver, api, app).run().await;

    handle.shutdown().await;
    if let Err(e) = task.await {
        tracing::warn!(error = %e, "client task ended abnormally");
    }

    Ok(result?)
}
