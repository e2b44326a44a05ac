//! BimbelKu CLI - log in, register and move between role-gated pages of the
//! BimbelKu tutoring platform from a terminal.

mod commands;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bimbelku_core::config::StorageBackend;
use bimbelku_core::{BimbelClient, Config, Role};

#[derive(Parser)]
#[command(name = "bimbelku", version, about = "BimbelKu tutoring platform client")]
struct Cli {
    /// Keep the session in memory only; nothing is written to disk
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Override the API base URL for this run
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and log in
    Register {
        #[arg(long, value_enum, default_value = "siswa")]
        role: RoleArg,
    },
    /// Forget the stored session
    Logout,
    /// Show who is logged in
    Status,
    /// Land on the right page for the stored session
    Start,
    /// Navigate to a route through the route guard
    Open { path: String },
    /// Fetch the current user's profile from the server
    Profile,
    /// Send an authenticated API request
    Request {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    Siswa,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::Siswa => Role::Siswa,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if cli.ephemeral {
        config.storage = StorageBackend::Memory;
    }
    info!(api_url = %config.api_url, storage = ?config.storage, "BimbelKu CLI starting");

    let persistence = config.open_persistence()?;
    let client = BimbelClient::new(config, persistence)?;

    match cli.command {
        Command::Login { email } => commands::login(&client, email).await,
        Command::Register { role } => commands::register(&client, role.into()).await,
        Command::Logout => commands::logout(&client),
        Command::Status => commands::status(&client),
        Command::Start => commands::start(&client).await,
        Command::Open { path } => commands::open(&client, &path),
        Command::Profile => commands::profile(&client).await,
        Command::Request { method, path, body } => {
            commands::request(&client, &method, &path, body.as_deref()).await
        }
    }
}
