//! Mosaic CLI - specification to validated atoms
//!
//! Usage:
//!   mosaic init [path]              Write the default configuration
//!   mosaic plan <spec.json>         Run the six planning passes
//!   mosaic run <spec.json>          Plan and execute a specification
//!   mosaic patterns list            List learned patterns
//!   mosaic patterns show <id>       Show one learned pattern
//!   mosaic example --kind crud      Print an example specification

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mosaic_core::MosaicConfig;
use mosaic_inference::TierTable;
use mosaic_orchestrator::{JsonFileTaskStore, Orchestrator};
use mosaic_patterns::{InMemoryPatternCache, PatternCache};
use mosaic_planning::{cli_tool_spec, crud_spec, Specification};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mosaic")]
#[command(author, version, about = "Semantic task decomposition and orchestration")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root holding `.mosaic/`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init {
        /// Project path (defaults to the current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Run the planning passes and print the plan
    Plan {
        /// Specification file (JSON)
        spec: PathBuf,

        /// Print the full plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan and execute a specification
    Run {
        /// Specification file (JSON)
        spec: PathBuf,

        /// Maximum concurrent atoms (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Inspect the learned pattern cache
    Patterns {
        #[command(subcommand)]
        action: PatternCommands,
    },

    /// Print an example specification
    Example {
        #[arg(long, value_enum, default_value = "crud")]
        kind: ExampleKind,
    },
}

#[derive(Subcommand)]
enum PatternCommands {
    /// List all patterns, newest first
    List,

    /// Show one pattern with its code
    Show {
        /// Pattern ID
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExampleKind {
    Crud,
    Cli,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Plan { spec, json } => cmd_plan(&cli.root, &spec, json).await,
        Commands::Run { spec, workers } => cmd_run(&cli.root, &spec, workers).await,
        Commands::Patterns { action } => cmd_patterns(&cli.root, action).await,
        Commands::Example { kind } => cmd_example(kind),
    }
}

fn cmd_init(path: &Path) -> Result<()> {
    info!("Initializing Mosaic in {:?}", path);
    let config_path = MosaicConfig::write_default(path).context("Failed to write config")?;

    println!("Initialized Mosaic in {:?}", path);
    println!("Created:");
    println!("  {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Run 'mosaic example > spec.json' and edit it");
    println!("  2. Run 'mosaic plan spec.json' to review the decomposition");
    println!("  3. Run 'mosaic run spec.json' to generate the atoms");
    Ok(())
}

fn load_config(root: &Path) -> Result<MosaicConfig> {
    let mut config = MosaicConfig::load_or_default(root).context("Failed to load config")?;
    if config.patterns.persist_dir.is_none() {
        config.patterns.persist_dir = Some(root.join(".mosaic/patterns"));
    }
    Ok(config)
}

async fn load_spec(path: &Path) -> Result<Specification> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read specification {:?}", path))?;
    let spec = Specification::from_json(&content).context("Failed to parse specification JSON")?;
    spec.validate().context("Invalid specification")?;
    Ok(spec)
}

async fn open_patterns(config: &MosaicConfig) -> Result<Arc<InMemoryPatternCache>> {
    let cache = InMemoryPatternCache::open(&config.patterns)
        .await
        .context("Failed to load pattern cache")?;
    Ok(Arc::new(cache))
}

async fn build_orchestrator(config: MosaicConfig, root: &Path) -> Result<Orchestrator> {
    let patterns = open_patterns(&config).await?;
    let tiers = TierTable::anthropic(&config.models);
    let store = JsonFileTaskStore::new(root.join(".mosaic/plans"));
    let orchestrator = Orchestrator::new(config, patterns, tiers)
        .context("Failed to create orchestrator")?
        .with_store(Arc::new(store));
    Ok(orchestrator)
}

async fn cmd_plan(root: &Path, spec_path: &Path, json: bool) -> Result<()> {
    let config = load_config(root)?;
    let spec = load_spec(spec_path).await?;
    let orchestrator = build_orchestrator(config, root).await?;

    let plan = orchestrator.plan(&spec).await.context("Planning failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{}", plan.summary());
    println!("Execution Levels:");
    for (index, level) in plan.levels.iter().enumerate() {
        println!("  Level {}: {}", index, level.join(", "));
    }
    if !plan.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &plan.warnings {
            println!("  ! {}", warning);
        }
    }
    Ok(())
}

async fn cmd_run(root: &Path, spec_path: &Path, workers: Option<usize>) -> Result<()> {
    let mut config = load_config(root)?;
    if let Some(workers) = workers {
        config.execution.max_workers = workers;
    }
    let spec = load_spec(spec_path).await?;
    let orchestrator = build_orchestrator(config, root).await?;

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight atoms");
            token.cancel();
        }
    });

    info!("Running specification: {}", spec.title);
    let report = orchestrator.run(&spec).await.context("Run failed")?;
    println!("{}", report);

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_patterns(root: &Path, action: PatternCommands) -> Result<()> {
    let config = load_config(root)?;
    let cache = open_patterns(&config).await?;

    match action {
        PatternCommands::List => {
            let patterns = cache.all().await;
            if patterns.is_empty() {
                println!("No learned patterns");
                return Ok(());
            }
            println!("Learned Patterns ({})", patterns.len());
            println!("==================");
            for pattern in patterns {
                println!(
                    "  {} [{}] {:.0}% consulted {} adopted {}",
                    pattern.id,
                    pattern.domain,
                    pattern.success_rate * 100.0,
                    pattern.consulted_count,
                    pattern.adopted_count
                );
                println!("    {}", pattern.signature.purpose);
            }
        }
        PatternCommands::Show { id } => {
            let pattern = cache
                .get(&id)
                .await?
                .with_context(|| format!("No pattern with id {}", id))?;
            println!("Pattern {}", pattern.id);
            println!("  Purpose:      {}", pattern.signature.purpose);
            println!("  Domain:       {}", pattern.domain);
            println!("  Fingerprint:  {}", pattern.fingerprint());
            println!("  Success rate: {:.2}", pattern.success_rate);
            println!("  Consulted:    {}", pattern.consulted_count);
            println!("  Adopted:      {}", pattern.adopted_count);
            println!("  Updated:      {}", pattern.updated_at);
            println!("\n{}", pattern.code);
        }
    }
    Ok(())
}

fn cmd_example(kind: ExampleKind) -> Result<()> {
    let spec = match kind {
        ExampleKind::Crud => crud_spec(),
        ExampleKind::Cli => cli_tool_spec(),
    };
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}
