use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "imc")]
#[command(about = "Interactive marker client tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> robot...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Replay a recorded session through a client and print one JSON line
    /// per ingest, callback and advance.
    #[cfg(feature = "testkit")]
    Replay {
        /// Session JSON file
        #[arg(long)]
        session: String,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Override the configured target frame
        #[arg(long)]
        target: Option<String>,
    },
}

fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::ConfigHash { paths } => commands::config_hash(&paths),
        #[cfg(feature = "testkit")]
        Commands::Replay {
            session,
            config_paths,
            target,
        } => commands::replay::run(&session, &config_paths, target),
    }
}

/// Logs go to stderr so stdout stays machine readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
