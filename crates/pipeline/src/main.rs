mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::{AppConfig, LogFormat, LoggingConfig};
use enrich::{BatchRunner, ResponseIntegrator, RetryPolicy, TallySnapshot};
use graphstore::{GraphRepository, Neo4jRepository};
use lookup::{ClinicalTrialsClient, QuickGoClient};
use prompting::{PipelineKind, PromptBuilder};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use workitems::WorkItemStore;

#[derive(Parser)]
#[command(name = "pipeline", about = "Enrich the drug graph with model ratings and classifications")]
struct Cli {
    /// Configuration preset, environment variables are applied on top
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    Fast,
    Careful,
}

#[derive(Clone, Copy, ValueEnum)]
enum Pipeline {
    Rating,
    GoClassification,
}

impl From<Pipeline> for PipelineKind {
    fn from(pipeline: Pipeline) -> Self {
        match pipeline {
            Pipeline::Rating => PipelineKind::Rating,
            Pipeline::GoClassification => PipelineKind::GoClassification,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Write one prompt file per drug
    Prompts {
        #[arg(long, value_enum)]
        pipeline: Pipeline,
        #[arg(long)]
        out: PathBuf,
        /// Rating run whose reasons feed the classification prompt
        #[arg(long, default_value_t = 0)]
        source_run: u32,
    },
    /// Send prompt files to the model and save the responses
    Infer {
        #[arg(long)]
        prompts: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Ensemble runs, written to `{out}_iteration_{n}`
        #[arg(long)]
        iterations: Option<u32>,
        #[arg(long, default_value_t = 0)]
        start_iteration: u32,
    },
    /// Write response directories to the graph, one run index per directory
    Integrate {
        #[arg(long, value_enum)]
        pipeline: Pipeline,
        #[arg(long = "dir", required = true)]
        dirs: Vec<PathBuf>,
        #[arg(long, default_value_t = 0)]
        start_index: u32,
    },
    /// Resolve process names to GO IDs
    MapGoTerms,
    /// Create AFFECTS edges from resolved GO IDs
    LinkProcesses,
    /// Relate processes to the Alzheimer node and repair missing links
    Pathology {
        #[arg(long)]
        include_proteins: bool,
    },
    /// Download ClinicalTrials.gov studies per drug name
    Trials {
        #[arg(long)]
        out: PathBuf,
    },
    /// Merge a JSON array of process annotations
    LoadProcesses { file: PathBuf },
    /// Print graph counts
    Stats,
}

impl Command {
    fn needs_graph(&self) -> bool {
        !matches!(self, Command::Infer { .. })
    }
}

fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = match &logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pipeline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }

    guard
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_tallies<'a>(tallies: impl IntoIterator<Item = &'a TallySnapshot>) -> Result<()> {
    for tally in tallies {
        print_json(tally)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let base = match cli.preset {
        Preset::Default => AppConfig::default(),
        Preset::Fast => AppConfig::fast_mode(),
        Preset::Careful => AppConfig::careful_mode(),
    };
    let config = AppConfig::from_env(base).context("Invalid configuration")?;
    let _guard = init_tracing(&config.logging);

    let repo: Option<Arc<dyn GraphRepository>> = if cli.command.needs_graph() {
        let neo4j = Neo4jRepository::connect(&config.graph).await?;
        neo4j.init_schema().await?;
        Some(Arc::new(neo4j))
    } else {
        None
    };

    let result = run(cli.command, &config, repo).await;
    info!("Done");
    result
}

async fn run(
    command: Command,
    config: &AppConfig,
    repo: Option<Arc<dyn GraphRepository>>,
) -> Result<()> {
    let workers = BatchRunner::new(config.concurrency.max_workers);
    let retry = config.retry_policy();
    let graph = || repo.clone().context("Graph connection required");

    match command {
        Command::Prompts {
            pipeline,
            out,
            source_run,
        } => {
            let store = WorkItemStore::open(out).await?;
            let builder = PromptBuilder::new(pipeline.into());
            let report =
                enrich::generate_prompts(&*graph()?, &builder, &store, &workers, source_run)
                    .await?;
            print_tallies([&report.tally])
        }
        Command::Infer {
            prompts,
            out,
            iterations,
            start_iteration,
        } => {
            let input = WorkItemStore::existing(prompts)?;
            let client = config.inference_client()?;
            match iterations {
                Some(iterations) => {
                    let reports = enrich::run_inference_iterations(
                        &input,
                        &out,
                        iterations,
                        start_iteration,
                        &client,
                        &workers,
                        &retry,
                    )
                    .await?;
                    print_tallies(reports.iter().map(|(_, report)| &report.tally))
                }
                None => {
                    let output = WorkItemStore::open(out).await?;
                    let report =
                        enrich::run_inference(&input, &output, &client, &workers, &retry).await?;
                    print_tallies([&report.tally])
                }
            }
        }
        Command::Integrate {
            pipeline,
            dirs,
            start_index,
        } => {
            let integrator = ResponseIntegrator::new(graph()?, pipeline.into());
            let reports =
                enrich::integrate_responses(&dirs, start_index, &integrator, &workers).await?;
            print_tallies(reports.iter().map(|report| &report.tally))
        }
        Command::MapGoTerms => {
            let runner = BatchRunner::new(config.concurrency.lookup_workers);
            let report =
                enrich::map_go_terms(&*graph()?, &QuickGoClient::default(), &runner, &retry)
                    .await?;
            print_tallies([&report.tally])
        }
        Command::LinkProcesses => {
            let report = enrich::link_processes(&*graph()?, &workers).await?;
            print_tallies([&report.tally])
        }
        Command::Pathology { include_proteins } => {
            let report = enrich::link_pathology(&*graph()?, include_proteins).await?;
            print_json(&report)
        }
        Command::Trials { out } => {
            let store = WorkItemStore::open(out).await?;
            let runner = BatchRunner::new(config.concurrency.trial_workers);
            let page_retry = RetryPolicy::new(3, 2000, 2000);
            let report = enrich::download_trials(
                &*graph()?,
                &ClinicalTrialsClient::default(),
                &store,
                &runner,
                &page_retry,
            )
            .await?;
            print_tallies([&report.tally])
        }
        Command::LoadProcesses { file } => {
            let report = enrich::load_processes(&*graph()?, &file).await?;
            print_json(&report)
        }
        Command::Stats => {
            let stats = graph()?.stats().await?;
            print_json(&stats)
        }
    }
}
