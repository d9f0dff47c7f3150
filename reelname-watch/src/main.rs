use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use reelname_parse::{MediaDescriptor, parse_with_context};
use reelname_watch::pipeline::rename_engine::DEFAULT_COLLISION_ATTEMPTS;
use reelname_watch::{
    Orchestrator, RenameEngine, RenameStrategy, WatchConfig, logging, read_listing,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

/// Watch a directory and rename media files into a canonical form.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline until interrupted
    Watch {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: PathBuf,
        /// Watch this directory instead of the configured monitor_path
        #[arg(long)]
        root: Option<PathBuf>,
        /// Also process files already present at start-up
        #[arg(long)]
        scan_existing: bool,
    },
    /// Show what the parser makes of filenames
    Parse {
        /// Filenames to parse
        #[arg(required = true)]
        names: Vec<String>,
        /// Name of the directory the files live in, used as extra context
        #[arg(long)]
        dir: Option<String>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show where existing files would be renamed to, without moving them
    Plan {
        /// Files to plan
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Take the collision cap from this configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct ParsedName<'a> {
    input: &'a str,
    descriptor: MediaDescriptor,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn cli_level(level: Option<&str>) -> anyhow::Result<tracing::Level> {
    let level = level.unwrap_or("warn");
    level
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown log level: {level}"))
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Watch {
            config,
            root,
            scan_existing,
        } => {
            let mut config = WatchConfig::load(&config)?;
            if let Some(root) = root {
                config.monitor_path = root;
            }
            if scan_existing {
                config.scan_existing = true;
            }
            if let Some(level) = args.log_level {
                config.log_level = level;
            }
            let _log_guard = logging::init(config.level()?, config.log_file.as_deref())?;
            watch(config).await
        }
        Commands::Parse { names, dir, format } => {
            let _log_guard = logging::init(cli_level(args.log_level.as_deref())?, None)?;
            debug!("Parsing {} filenames", names.len());
            let parsed: Vec<ParsedName> = names
                .iter()
                .map(|name| ParsedName {
                    input: name,
                    descriptor: parse_with_context(name, dir.as_deref()),
                })
                .collect();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&parsed)?),
                OutputFormat::Summary => {
                    for p in parsed {
                        println!("{}: {}", p.input, summarize(&p.descriptor));
                    }
                }
            }
            Ok(())
        }
        Commands::Plan { files, config } => {
            let _log_guard = logging::init(cli_level(args.log_level.as_deref())?, None)?;
            let attempts = match config {
                Some(path) => WatchConfig::load(&path)?.max_collision_attempts,
                None => DEFAULT_COLLISION_ATTEMPTS,
            };
            plan(&files, &RenameEngine::new(attempts))
        }
    }
}

fn summarize(d: &MediaDescriptor) -> String {
    let mut parts = vec![d.kind.to_string(), format!("{:?}", d.title)];
    if let Some(year) = d.year {
        parts.push(year.to_string());
    }
    if let (Some(season), Some(episode)) = (d.season, d.episode) {
        parts.push(format!("S{season:02}E{episode:02}"));
    }
    if let Some(resolution) = &d.resolution {
        parts.push(resolution.clone());
    }
    parts.push(format!("confidence {:.2}", d.confidence));
    parts.join(" | ")
}

async fn watch(config: WatchConfig) -> anyhow::Result<()> {
    let mut pipeline = Orchestrator::new(config)?;
    let mut outcomes = UnboundedReceiverStream::new(
        pipeline
            .take_outcomes()
            .context("Outcome channel already taken")?,
    );
    pipeline.start().await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            outcome = outcomes.next() => match outcome {
                Some(outcome) => println!("{outcome}"),
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    pipeline.shutdown().await?;
    let stats = pipeline.stats().await;
    println!(
        "Renamed {} | Skipped {} | Failed {} | Re-queued {} | Inference attempts {}",
        stats.renamed, stats.skipped, stats.failed, stats.rearmed, stats.inference_attempts
    );
    Ok(())
}

fn plan(files: &[PathBuf], engine: &RenameEngine) -> anyhow::Result<()> {
    for file in files {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Not a file path: {}", file.display()))?;
        let parent = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let parent_name = parent
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));

        let descriptor = parse_with_context(&filename, parent_name.as_deref());
        let result = read_listing(parent).and_then(|listing| {
            engine.plan(&parent.join(&filename), &descriptor, &listing)
        });

        match result {
            Ok(plan) if plan.strategy == RenameStrategy::Skip => {
                println!("{}: skip ({})", file.display(), summarize(&descriptor));
            }
            Ok(plan) if plan.is_noop() => {
                println!("{}: already named", file.display());
            }
            Ok(plan) => {
                println!(
                    "{} -> {} ({:?})",
                    file.display(),
                    plan.target.display(),
                    plan.strategy
                );
            }
            Err(e) => println!("{}: {}", file.display(), e),
        }
    }
    Ok(())
}
