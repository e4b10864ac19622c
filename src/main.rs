use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use procmine::config::{AnalysisConfig, LoggingConfig};
use procmine::events::RawEvent;
use procmine::{bottleneck, detect, events, failures, pipeline, report, storage, temporal};

#[derive(Parser)]
#[command(
    name = "procmine",
    about = "Reconstruct manufacturing event logs and mine them for anomalies, bottlenecks and failure causes",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (overrides PROCMINE_CONFIG and ./procmine.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Input {
    /// Event log (JSON Lines or JSON array). Reads the stored log when omitted.
    #[arg(long)]
    events: Option<PathBuf>,

    /// JSON output for machine parsing
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis pipeline
    Analyze {
        #[command(flatten)]
        input: Input,

        /// Store the report in the database
        #[arg(long)]
        save: bool,
    },

    /// Rebuild activities and cases from lifecycle events
    Reconstruct {
        #[command(flatten)]
        input: Input,
    },

    /// Flag activities with unusual durations and slow resources
    Anomalies {
        #[command(flatten)]
        input: Input,
    },

    /// Find resources with long waits between activities
    Bottlenecks {
        #[command(flatten)]
        input: Input,
    },

    /// Failure and anomaly counts by hour, day and resource
    Temporal {
        #[command(flatten)]
        input: Input,
    },

    /// Categorize failure causes
    Failures {
        #[command(flatten)]
        input: Input,
    },

    /// Append an event log file to the database
    Import {
        /// Event log (JSON Lines or JSON array)
        #[arg(long)]
        events: PathBuf,

        /// Database path (overrides [storage] db_path)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Start the query API
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,

        /// Database path (overrides [storage] db_path)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_input(input: &Input, config: &AnalysisConfig) -> Result<Vec<RawEvent>> {
    match &input.events {
        Some(path) => events::ingest::load_path(path),
        None => {
            let pool = storage::open_pool(&config.storage.db_path)?;
            storage::load_events(&pool).context("failed to read stored event log")
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}

fn with_db(mut config: AnalysisConfig, db: Option<PathBuf>) -> AnalysisConfig {
    if let Some(db) = db {
        config.storage.db_path = db;
    }
    config
}

#[derive(Serialize)]
struct AnomalyOutput {
    activities: detect::AnomalyReport,
    utilization: Vec<detect::UtilizationResult>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AnalysisConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Analyze { input, save } => {
            let log = load_input(&input, &config)?;
            let analysis = pipeline::analyze(&log, &config);
            if save {
                let pool = storage::open_pool(&config.storage.db_path)?;
                storage::save_report(&pool, &analysis)?;
            }
            emit(input.json, &analysis, report::format_analysis)?;
        }
        Commands::Reconstruct { input } => {
            let log = load_input(&input, &config)?;
            let (reconstruction, _) = pipeline::prepare(&log, &config);
            emit(input.json, &reconstruction, report::format_reconstruction)?;
        }
        Commands::Anomalies { input } => {
            let log = load_input(&input, &config)?;
            let (reconstruction, activities) = pipeline::prepare(&log, &config);
            let output = AnomalyOutput {
                activities,
                utilization: detect::utilization_by_resource(
                    &reconstruction.activities,
                    &config.utilization,
                ),
            };
            emit(input.json, &output, |o| {
                let mut text = report::format_anomalies(&o.activities);
                for u in o.utilization.iter().filter(|u| u.is_anomaly) {
                    text.push_str(&format!("  utilization: {}\n", u.reason));
                }
                text
            })?;
        }
        Commands::Bottlenecks { input } => {
            let log = load_input(&input, &config)?;
            let (reconstruction, _) = pipeline::prepare(&log, &config);
            let found = bottleneck::identify_bottlenecks(&reconstruction.activities, &config.bottleneck);
            emit(input.json, &found, report::format_bottlenecks)?;
        }
        Commands::Temporal { input } => {
            let log = load_input(&input, &config)?;
            let (reconstruction, _) = pipeline::prepare(&log, &config);
            let patterns = temporal::analyze_temporal(&reconstruction.activities);
            emit(input.json, &patterns, report::format_temporal)?;
        }
        Commands::Failures { input } => {
            let log = load_input(&input, &config)?;
            let (reconstruction, _) = pipeline::prepare(&log, &config);
            let categorized = failures::categorize_failures(&reconstruction.activities, &config.failures);
            emit(input.json, &categorized, report::format_failures)?;
        }
        Commands::Import { events: path, db } => {
            let config = with_db(config, db);
            let log = events::ingest::load_path(&path)?;
            let pool = storage::open_pool(&config.storage.db_path)?;
            let written = storage::save_events(&pool, &log)?;
            println!(
                "Imported {} events from {} into {}",
                written,
                path.display(),
                config.storage.db_path.display()
            );
        }
        Commands::Serve { bind, db } => {
            let config = with_db(config, db);
            tracing::info!(%bind, "Starting procmine API");
            procmine::serve(&bind, config).await?;
        }
    }

    Ok(())
}
