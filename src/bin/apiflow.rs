#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use apiflow::pipeline::{run_once, write_artifacts, RunConfig};
use apiflow::topsis::Weights;
use apiflow::{backend_from_env, JsonlCatalog, Provider};

#[derive(Parser)]
#[command(name = "apiflow", version, about = "API selection and orchestration planning")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the retrieve → rank → plan pipeline once
    Run {
        /// Natural-language user goal
        #[arg(long)]
        goal: String,

        /// Catalog category to search
        #[arg(long)]
        category: String,

        /// Path to the JSONL service catalog
        #[arg(long)]
        catalog: PathBuf,

        /// Model backend to use
        #[arg(long, value_enum, default_value_t = CliProvider::Azure)]
        provider: CliProvider,

        /// Blank all QoS criteria before ranking (no-QoS catalog runs)
        #[arg(long)]
        no_qos: bool,

        /// Safety bound on retrieval batches
        #[arg(long, default_value_t = 5)]
        max_batches: usize,

        /// TOPSIS weights as "rt,tp,av"
        #[arg(long, default_value = "0.5,0.3,0.2")]
        weights: String,

        /// Output directory for run artifacts
        #[arg(long, default_value = "results/logs")]
        out_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProvider {
    Azure,
    Mistral,
}

impl From<CliProvider> for Provider {
    fn from(p: CliProvider) -> Self {
        match p {
            CliProvider::Azure => Provider::Azure,
            CliProvider::Mistral => Provider::Mistral,
        }
    }
}

fn parse_weights(s: &str) -> Result<Weights, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid weights '{s}': {e}"))?;
    if parts.len() != 3 {
        return Err(format!("expected three weights 'rt,tp,av', got '{s}'"));
    }
    Ok(Weights {
        rt: parts[0],
        tp: parts[1],
        av: parts[2],
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            goal,
            category,
            catalog,
            provider,
            no_qos,
            max_batches,
            weights,
            out_dir,
        } => {
            let weights = parse_weights(&weights)?;

            // Configuration failures are fatal up front: no backend, no run.
            let backend = backend_from_env(provider.into())?;
            let source = JsonlCatalog::open(&catalog)?;

            let config = RunConfig {
                goal,
                category,
                with_qos: !no_qos,
                max_batches,
                weights,
            };

            let artifacts = run_once(backend.as_ref(), &source, &config).await?;
            write_artifacts(&out_dir, &artifacts)?;

            println!(
                "{}: {} candidates, {} model-ranked, {} verified; artifacts in {}",
                backend.name(),
                artifacts.candidates.len(),
                artifacts.model_ranking.len(),
                artifacts.verified_ranking.len(),
                out_dir.display()
            );
            Ok(())
        }
    }
}
