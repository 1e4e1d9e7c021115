use anyhow::Result;
use chainwatch::cli::setup::{setup, setup_at_path};
use chainwatch::core::log::init_logging;
use clap::{CommandFactory, Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display current balances across chains
    Portfolio {
        /// Only show this case
        #[arg(long)]
        case: Option<String>,
    },
    /// Snapshot balances and evaluate alert rules
    Poll {
        /// Only poll this case
        #[arg(long)]
        case: Option<String>,
    },
    /// List or acknowledge stored alerts
    Alerts {
        #[arg(long)]
        case: String,
        /// Number of most recent alerts to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Mark a single alert as read
        #[arg(long, conflicts_with = "mark_all_read")]
        mark_read: Option<Uuid>,
        /// Mark every alert of the case as read
        #[arg(long)]
        mark_all_read: bool,
    },
}

impl From<Commands> for chainwatch::AppCommand {
    fn from(cmd: Commands) -> chainwatch::AppCommand {
        match cmd {
            Commands::Portfolio { case } => chainwatch::AppCommand::Portfolio { case },
            Commands::Poll { case } => chainwatch::AppCommand::Poll { case },
            Commands::Alerts {
                case,
                limit,
                mark_read,
                mark_all_read,
            } => chainwatch::AppCommand::Alerts {
                case,
                limit,
                mark_read,
                mark_all_read,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => setup_at_path(path),
            None => setup(),
        },
        Some(cmd) => chainwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
