use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use inspection_risk::{
    config::{Config, ObservabilityConfig},
    ml::MLService,
    models::RestaurantRecord,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

#[derive(Parser)]
#[command(name = "inspection-risk")]
#[command(about = "Restaurant inspection score and risk prediction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train both models and save the snapshot
    Train {
        /// JSON file holding an array of restaurant records
        #[arg(short, long)]
        data: PathBuf,

        /// Snapshot destination (defaults to model.snapshot_path)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Predict next score and risk level from a saved snapshot
    Predict {
        #[arg(short, long)]
        data: PathBuf,

        /// Only predict the restaurant with this id
        #[arg(short, long)]
        id: Option<String>,

        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Risk distribution of the restaurants in a data file
    Stats {
        #[arg(short, long)]
        data: PathBuf,
    },
}

fn init_tracing(observability: &ObservabilityConfig) {
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if observability.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("inspection_risk={}", observability.log_level))
            }),
        )
        .init();
}

fn read_records(path: &Path) -> anyhow::Result<Vec<RestaurantRecord>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<RestaurantRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse restaurant records from {}", path.display()))?;
    tracing::info!("Loaded {} restaurants from {}", records.len(), path.display());
    Ok(records)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });
    init_tracing(&config.observability);

    let default_snapshot = config.model.snapshot_path.clone();
    let service = MLService::new(config.model);

    match cli.command {
        Commands::Train { data, snapshot } => {
            let records = read_records(&data)?;
            let result = service.train(&records)?;

            let path = snapshot.unwrap_or(default_snapshot);
            service.save_snapshot(&path)?;

            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Predict { data, id, snapshot } => {
            let path = snapshot.unwrap_or(default_snapshot);
            if !service.load_snapshot(&path)? {
                bail!("No model snapshot at {}, run `train` first", path.display());
            }

            let mut records = read_records(&data)?;
            if let Some(id) = id {
                records.retain(|r| r.id == id);
                if records.is_empty() {
                    bail!("Restaurant {} not found in {}", id, data.display());
                }
            }

            let output: Vec<serde_json::Value> = service
                .predict_batch(&records)
                .into_iter()
                .map(|(restaurant_id, result)| match result {
                    Ok(prediction) => json!(prediction),
                    Err(e) => json!({
                        "restaurant_id": restaurant_id,
                        "error": e.error_code(),
                        "message": e.to_string(),
                    }),
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Stats { data } => {
            let records = read_records(&data)?;
            let stats = MLService::risk_statistics(&records)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
