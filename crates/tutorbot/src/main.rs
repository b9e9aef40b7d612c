mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use commands::records::{Format, RecordKind};

// ============================================================================
// CLI Types
// ============================================================================

/// tutorbot - classroom attendance and survey bot
#[derive(Parser, Debug)]
#[command(version = tutorbot::build_info::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the chat platform and run the bot
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "tutorbot.yaml")]
        config: String,

        /// Read JSON commands from stdin, one per line, and print their outcomes
        #[arg(long)]
        console: bool,
    },

    /// Validate the configuration file
    CheckConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "tutorbot.yaml")]
        config: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Inspect collected records
    Records {
        #[command(subcommand)]
        action: RecordsAction,

        /// Path to configuration file
        #[arg(short, long, default_value = "tutorbot.yaml", global = true)]
        config: String,
    },
}

#[derive(Subcommand, Debug)]
enum RecordsAction {
    /// List record sets of one kind
    List {
        #[arg(value_enum)]
        kind: RecordKind,
    },
    /// Print one record set
    Show {
        #[arg(value_enum)]
        kind: RecordKind,

        /// Record set name, with or without the .csv extension
        name: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, console } => commands::serve::run(&config, console).await,
        Commands::CheckConfig { config, format } => commands::check::run(&config, format).await,
        Commands::Records { action, config } => match action {
            RecordsAction::List { kind } => commands::records::list(&config, kind).await,
            RecordsAction::Show { kind, name, format } => {
                commands::records::show(&config, kind, &name, format).await
            }
        },
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
