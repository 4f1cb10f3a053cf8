use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use proposal_review::db::{default_database_path, Database, SessionStore};
use proposal_review::report::{self, default_file_name};
use proposal_review::secrets::expand_home;
use proposal_review::{
    load_config, AnalysisCache, CombinedReport, Config, Navigation, Pipeline, PipelineError,
    Session, SessionId, StageId, StageRegistry, StageStatus,
};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "proposal-review")]
#[command(about = "Multi-stage LLM analysis of proposals and RFP responses", long_about = None)]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a proposal and walk through every selected stage
    Analyze {
        /// Proposal file (.txt, .md, .pdf or .docx)
        file: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Continue a stored session where it stopped
    Resume {
        /// Session id printed by `analyze`
        #[arg(long)]
        session: SessionId,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the stage table
    Stages,
    /// Validate a configuration file
    CheckConfig {
        /// Path to the JSON configuration
        path: PathBuf,
    },
    /// Export the report of a stored session
    Report {
        #[arg(long)]
        session: SessionId,
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// SQLite database holding sessions
        #[arg(long)]
        db: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List stored sessions, most recent first
    Sessions {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Optional stage to leave out (repeatable)
    #[arg(long = "skip", value_name = "STAGE")]
    skip: Vec<StageId>,
    /// Extra components to check, separated by commas or newlines
    #[arg(long)]
    extra_components: Option<String>,
    /// Historical pricing data for the price analysis
    #[arg(long, value_name = "FILE")]
    historical_data: Option<PathBuf>,
    /// SQLite database holding sessions
    #[arg(long)]
    db: Option<PathBuf>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct OutputArgs {
    /// Write the combined report as Markdown
    #[arg(long, value_name = "OUT")]
    markdown: Option<PathBuf>,
    /// Write the combined report as PDF
    #[arg(long, value_name = "OUT")]
    pdf: Option<PathBuf>,
}

/// Per-stage user input gathered from the command line.
struct StageInputs {
    extra_components: Option<String>,
    historical_data: Option<String>,
}

impl StageInputs {
    fn from_args(run: &RunArgs) -> Result<Self> {
        let historical_data = match &run.historical_data {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
            ),
            None => None,
        };
        Ok(Self {
            extra_components: run.extra_components.clone(),
            historical_data,
        })
    }

    fn for_stage(&self, stage: StageId) -> Option<&str> {
        match stage {
            StageId::ComponentAnalysis => self.extra_components.as_deref(),
            StageId::Pricing => self.historical_data.as_deref(),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    match cli.command {
        Commands::Analyze { file, run } => analyze(&file, &run).await,
        Commands::Resume { session, run } => resume(session, &run).await,
        Commands::Stages => {
            print_stages(&StageRegistry::standard());
            Ok(())
        }
        Commands::CheckConfig { path } => {
            let config = load_config(&path)?;
            println!("Configuration is valid: {}", path.display());
            println!(
                "  provider: {:?}, model: {}",
                config.llm.provider, config.llm.model
            );
            Ok(())
        }
        Commands::Report {
            session,
            config,
            db,
            output,
        } => export_stored(session, config.as_deref(), db.as_deref(), &output),
        Commands::Sessions { db, limit } => list_sessions(db.as_deref(), limit),
    }
}

fn init_logging(format: LogFormat) -> Result<()> {
    tracing_log::LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        )?,
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        )?,
    }
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(Config::default()),
    }
}

/// `--db` wins, then the configured path, then the default location.
fn database_path(flag: Option<&Path>, config: &Config) -> Option<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| {
            config
                .session
                .database_path
                .as_deref()
                .map(|p| PathBuf::from(expand_home(p)))
        })
        .or_else(default_database_path)
}

fn open_store(flag: Option<&Path>, config: &Config) -> Result<SessionStore> {
    let path = database_path(flag, config)
        .ok_or_else(|| anyhow!("No database path given and no home directory found"))?;
    let db = Database::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(SessionStore::new(db))
}

fn build_pipeline(config: &Config, store: SessionStore) -> Result<Pipeline> {
    Ok(Pipeline::from_config(config)?.with_store(store))
}

async fn analyze(file: &Path, run: &RunArgs) -> Result<()> {
    let config = load_settings(run.config.as_deref())?;
    let inputs = StageInputs::from_args(run)?;
    let pipeline = build_pipeline(&config, open_store(run.db.as_deref(), &config)?)?;

    let session = pipeline.start_session();
    install_interrupt_handler(&session)?;

    let document_id = session
        .upload_file(file)
        .await
        .with_context(|| format!("Failed to load {}", file.display()))?;
    info!(document_id = %document_id, "Proposal loaded");
    apply_skips(&session, &run.skip)?;

    println!("Session {}", session.id());
    walk(&session, pipeline.registry(), &inputs).await?;
    write_outputs(&session.combined_report(), &run.output)
}

async fn resume(id: SessionId, run: &RunArgs) -> Result<()> {
    let config = load_settings(run.config.as_deref())?;
    let inputs = StageInputs::from_args(run)?;
    let pipeline = build_pipeline(&config, open_store(run.db.as_deref(), &config)?)?;

    let session = pipeline.restore_session(id)?;
    install_interrupt_handler(&session)?;
    if session.document_summary().is_none() {
        bail!("Session {} has no document; start a new one with `analyze`", id);
    }
    apply_skips(&session, &run.skip)?;

    println!("Session {} (resumed at {})", session.id(), session.current_stage());
    walk(&session, pipeline.registry(), &inputs).await?;
    write_outputs(&session.combined_report(), &run.output)
}

fn install_interrupt_handler(session: &Arc<Session>) -> Result<()> {
    let session = Arc::clone(session);
    ctrlc::set_handler(move || match session.cancel_running() {
        Some(stage) => eprintln!("Cancelled {}", stage),
        None => std::process::exit(130),
    })?;
    Ok(())
}

fn apply_skips(session: &Session, skip: &[StageId]) -> Result<()> {
    for stage in skip {
        match session.select_optional(*stage, false) {
            Ok(()) => {}
            Err(PipelineError::NotOptional(stage)) => {
                bail!("Stage '{}' is mandatory and cannot be skipped", stage)
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Runs the current stage when needed, then advances until the pipeline
/// finishes or a stage blocks it.
async fn walk(session: &Session, registry: &StageRegistry, inputs: &StageInputs) -> Result<()> {
    loop {
        let stage = session.current_stage();
        let definition = registry
            .definition(stage)
            .ok_or_else(|| anyhow!("Unknown stage {}", stage))?;
        let wanted = !definition.optional || session.selected_optional().contains(&stage);

        if wanted && !session.stage_status(stage).is_completed() {
            println!("Running {}...", definition.label);
            let result = match session.run_stage(stage, inputs.for_stage(stage)).await {
                Ok(result) => result,
                Err(PipelineError::Cancelled { stage }) => {
                    bail!("Run of '{}' was cancelled; resume to continue", stage)
                }
                Err(e) => return Err(e.into()),
            };
            match &result.status {
                StageStatus::Completed => {
                    println!("  done ({} chars)", result.output.len())
                }
                StageStatus::Failed(reason) if definition.optional => {
                    println!("  failed: {} (optional, continuing)", reason)
                }
                StageStatus::Failed(reason) => {
                    bail!("{} failed: {}", definition.label, reason)
                }
                StageStatus::Pending => {}
            }
        }

        match session.advance() {
            Navigation::Moved(_) => continue,
            Navigation::Finished | Navigation::AtStart => return Ok(()),
            Navigation::Blocked(reason) => bail!("Pipeline stopped: {}", reason),
            Navigation::NoDocument => bail!("No document loaded"),
        }
    }
}

fn write_outputs(report: &CombinedReport, output: &OutputArgs) -> Result<()> {
    if output.markdown.is_none() && output.pdf.is_none() {
        print!("{}", report.to_markdown());
        return Ok(());
    }
    if let Some(path) = &output.markdown {
        let path = resolve_output(path, "md");
        report.write_markdown(&path)?;
        println!("Markdown report written to {}", path.display());
    }
    if let Some(path) = &output.pdf {
        let path = resolve_output(path, "pdf");
        report.write_pdf(&path)?;
        println!("PDF report written to {}", path.display());
    }
    Ok(())
}

/// A directory gets the dated default file name.
fn resolve_output(path: &Path, extension: &str) -> PathBuf {
    if path.is_dir() {
        path.join(default_file_name(extension, chrono::Utc::now()))
    } else {
        path.to_path_buf()
    }
}

fn export_stored(
    id: SessionId,
    config: Option<&Path>,
    db: Option<&Path>,
    output: &OutputArgs,
) -> Result<()> {
    let config = load_settings(config)?;
    let store = open_store(db, &config)?;
    let stored = store
        .load_session(id)?
        .ok_or_else(|| anyhow!("Session {} not found", id))?;

    let mut cache = AnalysisCache::new();
    for result in stored.results {
        cache.put(result);
    }
    let report = report::assemble(
        &StageRegistry::standard(),
        &cache,
        stored.document.as_ref(),
        &config.report.title,
    );
    write_outputs(&report, output)
}

fn list_sessions(db: Option<&Path>, limit: u64) -> Result<()> {
    let store = open_store(db, &Config::default())?;
    let sessions = store.list_sessions(limit)?;
    if sessions.is_empty() {
        println!("No stored sessions");
        return Ok(());
    }
    for listing in sessions {
        println!(
            "{}  {:<18}  {}  {}",
            listing.id,
            listing.current_stage.as_str(),
            listing.updated_at.format("%Y-%m-%d %H:%M"),
            listing.filename.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn print_stages(registry: &StageRegistry) {
    println!(
        "{:<3} {:<18} {:<28} {:<9} {:<20} CONTEXT",
        "#", "ID", "LABEL", "OPTIONAL", "REQUIRES"
    );
    for stage in registry.stages() {
        let join = |ids: &[StageId]| {
            if ids.is_empty() {
                "-".to_string()
            } else {
                ids.iter().map(StageId::as_str).collect::<Vec<_>>().join(",")
            }
        };
        println!(
            "{:<3} {:<18} {:<28} {:<9} {:<20} {}",
            stage.ordinal,
            stage.id.as_str(),
            stage.label,
            if stage.optional { "yes" } else { "no" },
            join(&stage.prerequisites),
            join(&stage.context_inputs)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proposal_review::llm::FakeGateway;
    use proposal_review::{PipelineConfig, StageDefinition};

    fn no_inputs() -> StageInputs {
        StageInputs {
            extra_components: None,
            historical_data: None,
        }
    }

    #[tokio::test]
    async fn test_walk_follows_pipeline_registry() {
        // Pricing is mandatory here, unlike the standard table.
        let registry = StageRegistry::new(vec![
            StageDefinition::new(StageId::ComponentAnalysis, 1, "Inventory"),
            StageDefinition::new(StageId::Pricing, 2, "Price Check")
                .requires(&[StageId::ComponentAnalysis]),
        ])
        .unwrap();
        let mut config = PipelineConfig::default();
        config.default_optional.clear();

        let pipeline = Pipeline::new(Arc::new(FakeGateway::default()))
            .with_registry(registry)
            .with_config(config);
        let session = pipeline.start_session();
        session.set_document("Proposal text".to_string(), "p.txt", "text/plain");

        walk(&session, pipeline.registry(), &no_inputs()).await.unwrap();

        assert!(session.stage_status(StageId::ComponentAnalysis).is_completed());
        assert!(session.stage_status(StageId::Pricing).is_completed());
    }
}
