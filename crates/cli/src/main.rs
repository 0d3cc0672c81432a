//! Patient portal CLI - log in to a portal and inspect the session.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password from PORTAL_PASSWORD or prompted)
//! portal login --email patient@example.com
//!
//! # Show the logged-in user
//! portal whoami
//!
//! # Check whether the stored session is still valid
//! portal status
//!
//! # Log out and forget the stored session
//! portal logout
//! ```
//!
//! # Environment Variables
//!
//! - `PORTAL_BASE_URL` - Portal to talk to (default `http://127.0.0.1:3000`)
//! - `PORTAL_PASSWORD` - Password for `login`, skips the prompt

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use patient_portal_cli::{FileStore, SessionContext, SessionError};

#[derive(Parser)]
#[command(name = "portal")]
#[command(author, version, about = "Patient portal session tools")]
struct Cli {
    /// Portal base URL
    #[arg(long, env = "PORTAL_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Session file (defaults to the user configuration directory)
    #[arg(long, env = "PORTAL_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Log out and forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Report whether the stored session is still valid
    Status,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = match cli.session_file {
        Some(path) => FileStore::new(path),
        None => FileStore::default_location()?,
    };
    let mut ctx = SessionContext::new(&cli.base_url, store)?;

    match cli.command {
        Commands::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt("Password: ")?,
            };
            let user = ctx.login(&email, &password).await?;
            tracing::info!("Logged in as {}", display_user(&user));
        }
        Commands::Logout => {
            ctx.logout().await?;
            tracing::info!("Logged out");
        }
        Commands::Whoami => {
            if ctx.check_auth_status().await? {
                let user = ctx.user().cloned().unwrap_or_default();
                tracing::info!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                return Err(Box::new(SessionError::Api {
                    status: 401,
                    message: "Not logged in".to_string(),
                }));
            }
        }
        Commands::Status => {
            let authenticated = ctx.check_auth_status().await?;
            tracing::info!(
                authenticated,
                session_file = %ctx.store().path().display(),
                "Session status"
            );
        }
    }
    Ok(())
}

fn prompt(label: &str) -> std::io::Result<String> {
    let mut stderr = std::io::stderr();
    stderr.write_all(label.as_bytes())?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn display_user(user: &serde_json::Value) -> String {
    ["email", "name", "id"]
        .iter()
        .find_map(|key| match user.get(*key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "unknown user".to_string())
}
