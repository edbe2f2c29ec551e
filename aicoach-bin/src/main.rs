use std::path::PathBuf;
use std::time::Duration;

use aicoach_core::{
    config::Config,
    model::{ExpectedShape, OrchestratedRequest},
    orchestrator::Orchestrator,
};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about = "aicoach orchestration smoke tool", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML); built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Object,
    Array,
}

impl From<Shape> for ExpectedShape {
    fn from(s: Shape) -> Self {
        match s {
            Shape::Object => ExpectedShape::Object,
            Shape::Array => ExpectedShape::Array,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Issue one orchestrated request and print the normalized JSON
    Ask {
        #[arg(long, default_value = "realtime")]
        kind: String,
        #[arg(long, value_enum, default_value = "object")]
        shape: Shape,
        #[arg(short, long, help = "Prompt text sent to the model")]
        prompt: String,
        /// Cache lifetime override in milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,
        #[arg(long)]
        force_refresh: bool,
    },
    /// Warm the cache from a JSON array of requests
    Precache {
        #[arg(long)]
        entries: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // default: info; override with RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    let orch = Orchestrator::from_config(&cfg)?;
    tracing::info!(providers = ?orch.providers(), "orchestrator ready");

    match cli.command {
        Commands::Ask {
            kind,
            shape,
            prompt,
            ttl_ms,
            force_refresh,
        } => {
            let mut req = OrchestratedRequest::new(prompt, kind)
                .shape(shape.into())
                .force_refresh(force_refresh);
            if let Some(ms) = ttl_ms {
                req = req.ttl(Duration::from_millis(ms));
            }
            let value = orch.get_orchestrated_response(req).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Precache { entries } => {
            let raw = std::fs::read_to_string(&entries)
                .with_context(|| format!("reading {}", entries.display()))?;
            let reqs: Vec<OrchestratedRequest> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", entries.display()))?;
            let values = orch.precache(reqs).await;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
    }

    Ok(())
}
