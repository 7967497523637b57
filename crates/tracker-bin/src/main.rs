//! trackerd - runs the event pipeline and serves the event store to other
//! processes.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracker_config_and_utils::{init_logging, Paths, TrackerConfig};

/// Tracker command-line interface.
#[derive(Parser)]
#[command(name = "trackerd")]
#[command(about = "Event collection pipeline: store, batch and deliver analytics events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true, env = "TRACKER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for runtime files (database, socket, logs, config). Defaults to ~/.tracker
    #[arg(long, global = true, env = "TRACKER_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and the store socket until interrupted
    Run,
    /// Record one event
    Track {
        /// Event type, e.g. CUSTOM, PAGE, VISIT
        #[arg(long = "type", default_value = "CUSTOM")]
        event_type: String,
        /// Event name
        #[arg(long)]
        name: Option<String>,
        /// Attribute as key=value, repeatable
        #[arg(long = "attr", value_parser = app::parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Send with the INSTANT policy instead of batching
        #[arg(long)]
        instant: bool,
    },
    /// Send every pending event now
    Flush,
    /// Show pending events per policy and whether the daemon runs
    Status,
    /// Delete every stored event
    Clear,
    /// Move events out of a legacy database
    Migrate,
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to config.json
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = TrackerConfig::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level, &paths);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => app::run_daemon(config, paths).await?,
        Commands::Track {
            event_type,
            name,
            attributes,
            instant,
        } => {
            let event = app::build_event(&event_type, name, attributes, instant);
            app::track(config, paths, event).await?;
        }
        Commands::Flush => app::flush(config, paths).await?,
        Commands::Status => app::status(&paths).await?,
        Commands::Clear => app::clear(&paths).await?,
        Commands::Migrate => app::migrate(config, paths).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => app::show_config(&config, &paths)?,
            ConfigCommands::Init => app::init_config(&config, &paths)?,
        },
    }

    Ok(())
}
