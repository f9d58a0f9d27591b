//! Mensago keytool
//!
//! Generates root keycards with their key files, and verifies keycard files.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use mensago_common::{Domain, RandomId, UserId};

mod commands;

use commands::{OrgOptions, UserOptions};

#[derive(Parser)]
#[command(name = "mensago-keytool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate organization keys and a signed root keycard
    Org {
        /// Organization name
        #[arg(long)]
        name: String,

        /// Organization domain
        #[arg(long)]
        domain: Domain,

        /// Administrator workspace address or ID
        #[arg(long)]
        admin: String,

        /// Abuse contact workspace address or ID
        #[arg(long)]
        abuse: Option<String>,

        /// Support contact workspace address or ID
        #[arg(long)]
        support: Option<String>,

        /// Comma-separated ISO 639 language codes
        #[arg(long)]
        language: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Generate user keys and an unsigned root keycard
    User {
        /// Domain of the user's workspace
        #[arg(long)]
        domain: Domain,

        /// Workspace ID, generated if omitted
        #[arg(long)]
        wid: Option<RandomId>,

        /// User ID
        #[arg(long)]
        uid: Option<UserId>,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Verify a keycard file
    Verify {
        /// Keycard file
        path: PathBuf,
    },
}

/// Installs a console subscriber. `RUST_LOG` overrides the level chosen by
/// the verbose flag.
fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console_layer = fmt::layer().with_target(verbose).with_filter(filter);

    Registry::default()
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Org {
            name,
            domain,
            admin,
            abuse,
            support,
            language,
            out,
        } => {
            let options = OrgOptions {
                name,
                domain,
                admin,
                abuse,
                support,
                language,
            };
            commands::generate_org(&options, &out)?;
        }
        Commands::User {
            domain,
            wid,
            uid,
            name,
            out,
        } => {
            let options = UserOptions {
                domain,
                wid,
                uid,
                name,
            };
            commands::generate_user(&options, &out)?;
        }
        Commands::Verify { path } => {
            let card = commands::verify(&path)?;
            println!(
                "{}: {} keycard with {} entries verified",
                path.display(),
                card.entry_type(),
                card.len()
            );
        }
    }
    Ok(())
}
