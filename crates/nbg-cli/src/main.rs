//! nbgate CLI
//!
//! Administrative front end for the nbgate hub:
//! - Configuration file management
//! - Signing key inspection and rotation
//! - Login and the admin session API
//! - Edge proxy configuration rendering and checking

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nbgate::commands;

#[derive(Parser)]
#[command(name = "nbgate")]
#[command(author, version, about = "Administration for the nbgate notebook hub gatekeeper")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Hub public URL (overrides config and stored login)
    #[arg(long, global = true, env = "NBGATE_URL")]
    url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to the hub and store the session token
    Login {
        /// Username (defaults to the current user)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Revoke the stored session
    Logout,

    /// Show the logged-in identity
    Whoami,

    /// Show hub health and status
    Status,

    /// List active sessions (admin)
    /// Alias: ls
    #[command(alias = "ls")]
    Sessions {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Terminate user sessions and their runtimes (admin)
    Kill {
        /// Username(s) whose session to terminate
        #[arg(required = true)]
        users: Vec<String>,
        /// Kill without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Manage the session signing key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Edge proxy configuration
    Edge {
        #[command(subcommand)]
        action: EdgeAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Show key path and fingerprint
    Show,
    /// Replace the key, logging out every user on next hub start
    Rotate {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum EdgeAction {
    /// Print a Caddyfile site block for the hub
    Render {
        /// Public domain (defaults to the host of public_url)
        #[arg(short, long)]
        domain: Option<String>,
        /// ACME account email
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Check a live URL for the required security headers
    Check {
        /// URL to fetch (defaults to <public_url>/hub/health)
        target: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Check the configuration the way the hub does at startup
    Validate,
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Edit config in editor
    Edit,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = cli.config.as_ref();
    let url = cli.url.as_deref();

    match cli.command {
        Commands::Login { user } => {
            commands::login_command(config, url, user.as_deref()).await?;
        }

        Commands::Logout => {
            commands::logout_command(config, url).await?;
        }

        Commands::Whoami => {
            commands::whoami_command(config, url).await?;
        }

        Commands::Status => {
            commands::status_command(config, url).await?;
        }

        Commands::Sessions { json } => {
            commands::sessions_command(config, url, json).await?;
        }

        Commands::Kill { users, force } => {
            commands::kill_command(config, url, &users, force).await?;
        }

        Commands::Key { action } => match action {
            KeyAction::Show => commands::key_show(config)?,
            KeyAction::Rotate { yes } => commands::key_rotate(config, yes)?,
        },

        Commands::Edge { action } => match action {
            EdgeAction::Render { domain, email } => {
                commands::edge_render(config, domain.as_deref(), email.as_deref())?;
            }
            EdgeAction::Check { target } => {
                commands::edge_check(config, target.as_deref().or(url)).await?;
            }
        },

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                commands::config_show(config)?;
            }
            ConfigAction::Init { force } => {
                commands::config_init(config, force)?;
            }
            ConfigAction::Validate => {
                commands::config_validate(config)?;
            }
            ConfigAction::Get { key } => {
                commands::config_get(config, &key)?;
            }
            ConfigAction::Set { key, value } => {
                commands::config_set(config, &key, &value)?;
            }
            ConfigAction::Edit => {
                commands::config_edit(config)?;
            }
            ConfigAction::Path => {
                println!("{}", commands::config_file(config).display());
            }
        },
    }

    Ok(())
}
