//! capmatch CLI
//!
//! Plans compositions and discovers operations over a JSON catalogue file:
//! - `plan`: forward-chaining search from a set of available concepts
//! - `discover`: operations producing the requested concepts, ranked

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use capmatch::{
    CatalogueDocument, Concept, DiscoveryMode, Engine, EngineConfig, LogicMatchType,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "capmatch")]
#[command(about = "Semantic capability matching and service composition", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Layer the operations reachable from the given inputs
    Plan {
        /// Catalogue file (JSON)
        #[arg(long)]
        catalogue: PathBuf,

        /// Available input concept; repeat for several
        #[arg(long = "input", required = true)]
        inputs: Vec<String>,

        /// Weakest verdict accepted between concepts
        #[arg(long, default_value = "exact")]
        threshold: LogicMatchType,

        /// Print the dependency graph in Graphviz DOT instead of layers
        #[arg(long)]
        dot: bool,
    },

    /// Rank operations producing the given concepts
    Discover {
        /// Catalogue file (JSON)
        #[arg(long)]
        catalogue: PathBuf,

        /// Wanted output concept; repeat for several
        #[arg(long = "produces", required = true)]
        produces: Vec<String>,

        /// Weakest verdict accepted between concepts
        #[arg(long, default_value = "plugin")]
        min_type: LogicMatchType,

        /// Require every wanted concept to be produced
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Plan {
            catalogue,
            inputs,
            threshold,
            dot,
        } => {
            let engine = load_engine(&catalogue, config)?;
            let plan = engine.search(&concepts(&inputs)?, threshold)?;
            if dot {
                let graph = engine.build_graph(&plan.layers, threshold)?;
                print!("{}", graph.to_dot());
                return Ok(());
            }
            for layer in plan.non_empty_layers() {
                let ids: Vec<&str> = layer.ids().into_iter().map(|id| id.as_str()).collect();
                println!("layer {}: {}", layer.index(), ids.join(", "));
            }
            println!(
                "{} operation(s) in {} pass(es); {} comparison(s)",
                plan.stats.operations_selected, plan.stats.passes, plan.stats.comparisons
            );
        }
        Commands::Discover {
            catalogue,
            produces,
            min_type,
            all,
        } => {
            let engine = load_engine(&catalogue, config)?;
            let mode = if all {
                DiscoveryMode::All
            } else {
                DiscoveryMode::Any
            };
            let found = engine.discover_producing(&concepts(&produces)?, min_type, mode)?;
            if found.is_empty() {
                println!("no matching operations");
            }
            for result in found {
                let verdict = result
                    .match_type()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:.3}  {:<8} {}",
                    result.rank_score, verdict, result.resource
                );
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_engine(path: &Path, config: EngineConfig) -> Result<Engine> {
    let document = CatalogueDocument::from_file(path)
        .with_context(|| format!("loading catalogue {}", path.display()))?;
    Ok(Engine::from_document(&document, config)?)
}

fn concepts(ids: &[String]) -> Result<BTreeSet<Concept>> {
    ids.iter()
        .map(|id| Concept::parse(id).with_context(|| format!("bad concept {id:?}")))
        .collect()
}
