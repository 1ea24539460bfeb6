use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use lorebase_core::bootstrap::{
    build_pipeline, build_retrieval, create_provider, resolve_config_path,
};
use lorebase_core::config::Config;
use lorebase_core::{BatchQueryRunner, QueryAgent};
use lorebase_llm::provider::StatusTx;
use lorebase_memory::VectorIndex;
use lorebase_memory::document::{
    DocumentError, IngestError, IngestMode, IngestObserver, IngestReport, InputType,
    SourceFailure, SourceState,
};
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;

/// Exit status for runs that could not start or hit a structural error.
const EXIT_FATAL: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "lorebase", version, about)]
struct Cli {
    /// Configuration file (default: `LOREBASE_CONFIG` or config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load, split and embed documents into a vector index
    Ingest(IngestArgs),
    /// Answer NDJSON questions with an agent backed by a vector index
    Query(QueryArgs),
}

#[derive(Debug, Args)]
struct IngestArgs {
    /// Index directory
    #[arg(long)]
    index: PathBuf,

    /// One of: text, markdown, pdf
    #[arg(long)]
    input_type: String,

    /// Glob pattern of sources; newline-separated paths are read from stdin when omitted
    #[arg(long)]
    input: Option<String>,

    /// Build a new index, replacing any existing one
    #[arg(long)]
    new: bool,

    /// Do not ask before replacing an existing index
    #[arg(long, short = 'y')]
    yes: bool,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Index directory
    #[arg(long)]
    index: PathBuf,

    /// Tool name the agent sees for the index
    #[arg(long)]
    name: String,

    /// What the index contains, shown to the agent
    #[arg(long)]
    description: String,

    /// NDJSON input file (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// NDJSON output file (default: stdout)
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    max_steps: Option<usize>,

    /// Passages returned per retrieval
    #[arg(long)]
    k: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_subscriber();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let (status_tx, status_rx) = tokio::sync::mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_status_to_stderr(status_rx));

    let code = match cli.command {
        Command::Ingest(args) => {
            if let Some(size) = args.chunk_size {
                config.ingest.chunk_size = size;
            }
            if let Some(overlap) = args.chunk_overlap {
                config.ingest.chunk_overlap = overlap;
            }
            config.validate()?;
            ingest(&config, args, status_tx, cancel).await?
        }
        Command::Query(args) => {
            if let Some(steps) = args.max_steps {
                config.agent.max_steps = steps;
            }
            if let Some(k) = args.k {
                config.agent.retrieval_k = k;
            }
            config.validate()?;
            query(&config, args, status_tx, cancel).await?
        }
    };

    let _ = forwarder.await;
    Ok(code)
}

async fn ingest(
    config: &Config,
    args: IngestArgs,
    status_tx: StatusTx,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    let input_type: InputType = args.input_type.parse()?;
    let mut provider = create_provider(config)?;
    provider.set_status_tx(status_tx.clone());
    let pipeline = build_pipeline(config, &provider, input_type, cancel)?;

    let (sources, unreadable) = collect_sources(args.input.as_deref()).await?;
    if sources.is_empty() && unreadable.is_empty() {
        tracing::warn!("no sources to ingest");
    }

    let mode = if args.new {
        IngestMode::Create
    } else {
        IngestMode::Append
    };
    let observer = ConsoleObserver {
        status: status_tx,
        assume_yes: args.yes,
    };

    let mut report = match pipeline.run(mode, &args.index, sources, &observer).await {
        Ok(report) => report,
        Err(IngestError::OverwriteDeclined(path)) => {
            eprintln!("Aborted: {path} was left untouched.");
            return Ok(ExitCode::from(EXIT_FATAL));
        }
        Err(e) => return Err(e).context("ingestion failed"),
    };
    report.failures.extend(unreadable);

    print_ingest_summary(&report, &args.index);
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn query(
    config: &Config,
    args: QueryArgs,
    status_tx: StatusTx,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    let mut provider = create_provider(config)?;
    provider.set_status_tx(status_tx.clone());

    let index = VectorIndex::load(&args.index).await?;
    let _ = status_tx.send(format!(
        "loaded index {} ({} entries)",
        args.index.display(),
        index.len()
    ));
    drop(status_tx);

    let tools = build_retrieval(config, &provider, index, &args.name, &args.description);
    let agent = QueryAgent::new(provider, tools)
        .with_max_steps(config.agent.max_steps)
        .with_retry(config.retry_policy())
        .with_cancel_token(cancel.clone());
    let runner = BatchQueryRunner::new(agent).with_cancel_token(cancel);

    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let summary = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            runner.run(BufReader::new(file), &mut writer).await?
        }
        None => runner.run(BufReader::new(tokio::io::stdin()), &mut writer).await?,
    };

    eprintln!(
        "Processed {} queries ({} failed){}.",
        summary.total,
        summary.failed,
        if summary.cancelled { ", cancelled" } else { "" }
    );
    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Expand the glob, or read newline-separated paths from stdin.
///
/// Entries the glob could not read are returned as failures.
async fn collect_sources(
    pattern: Option<&str>,
) -> anyhow::Result<(Vec<PathBuf>, Vec<SourceFailure>)> {
    let mut sources = Vec::new();
    let mut failures = Vec::new();

    if let Some(pattern) = pattern {
        for entry in glob::glob(pattern).with_context(|| format!("invalid glob {pattern:?}"))? {
            match entry {
                Ok(path) if path.is_dir() => {}
                Ok(path) => sources.push(path),
                Err(e) => {
                    let source = e.path().to_path_buf();
                    failures.push(SourceFailure {
                        error: DocumentError::SourceUnreadable {
                            path: source.display().to_string(),
                            error: e.into_error(),
                        },
                        source,
                        stage: SourceState::Loading,
                    });
                }
            }
        }
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if !line.is_empty() {
                sources.push(PathBuf::from(line));
            }
        }
    }

    if sources.is_empty() && failures.is_empty() {
        bail!("no input files matched");
    }
    Ok((sources, failures))
}

/// Progress on stderr and the overwrite prompt on the terminal.
struct ConsoleObserver {
    status: StatusTx,
    assume_yes: bool,
}

impl ConsoleObserver {
    fn status(&self, msg: String) {
        let _ = self.status.send(msg);
    }
}

impl IngestObserver for ConsoleObserver {
    fn confirm_overwrite(&self, index_path: &Path) -> bool {
        if self.assume_yes || !index_path.exists() {
            return true;
        }
        let prompt = format!(
            "Creating a new index will overwrite the existing one at {}. Continue?",
            index_path.display()
        );
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("cannot ask for confirmation ({e}); pass --yes to overwrite");
                false
            }
        }
    }

    fn source_started(&self, source: &Path) {
        tracing::info!(source = %source.display(), "ingesting");
    }

    fn stage(&self, source: &Path, state: SourceState) {
        tracing::debug!(source = %source.display(), %state, "stage");
    }

    fn source_done(&self, source: &Path, chunks: usize) {
        self.status(format!("{}: {chunks} chunks", source.display()));
    }

    fn source_failed(&self, failure: &SourceFailure) {
        self.status(format!(
            "{}: failed while {}: {}",
            failure.source.display(),
            failure.stage,
            failure.error
        ));
    }

    fn index_written(&self, index_path: &Path, entries: usize) {
        self.status(format!(
            "saved index {} ({entries} entries)",
            index_path.display()
        ));
    }
}

fn print_ingest_summary(report: &IngestReport, index: &Path) {
    eprintln!(
        "Ingested {} chunks from {} sources into {}{}.",
        report.chunks_indexed,
        report.sources_ok,
        index.display(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    if !report.failures.is_empty() {
        eprintln!("{} sources failed:", report.failures.len());
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.source.display(), failure.error);
        }
    }
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received interrupt, finishing current item");
        cancel.cancel();
    });
}

async fn forward_status_to_stderr(mut rx: tokio::sync::mpsc::UnboundedReceiver<String>) {
    while let Some(msg) = rx.recv().await {
        eprintln!("[status] {msg}");
    }
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
