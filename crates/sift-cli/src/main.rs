use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sift_client::{ContentCleaner, DEFAULT_BASE_URL, DEFAULT_MODELS, OpenAiGenerator};
use sift_core::credentials::parse_list;
use sift_core::{
    BatchOutcome, BatchRunner, CredentialPool, ExtractionCaller, ExtractionConfig, FileInput,
    OutputBundle, OutputMode, PromptOrchestrator, ResultAssembler, TracingBatchReporter,
};

#[derive(Parser)]
#[command(
    name = "sift",
    version,
    about = "Batch LLM extraction over folders of emails and documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract structured data from every matching file in a folder
    Extract {
        /// Folder containing the files to process
        #[arg(short, long)]
        input_folder: PathBuf,

        /// Folder where JSON documents are written (created if missing)
        #[arg(short, long)]
        output_folder: PathBuf,

        /// Text file with extraction instructions, used verbatim
        #[arg(short, long, conflicts_with = "goal", required_unless_present = "goal")]
        prompt_file: Option<PathBuf>,

        /// Short extraction goal, expanded into full instructions by the model
        #[arg(short, long)]
        goal: Option<String>,

        /// one_per_file, one_per_relevant_file, or single_file
        #[arg(long, default_value = "one_per_file")]
        output_method: OutputMode,

        /// Comma-separated file extensions to process
        #[arg(long, default_value = "eml")]
        extensions: String,

        #[command(flatten)]
        upstream: UpstreamArgs,
    },

    /// Expand a short goal into extraction instructions and print them
    Refine {
        /// Extraction goal, e.g. "grocery items and prices"
        #[arg(short, long)]
        goal: String,

        #[command(flatten)]
        upstream: UpstreamArgs,
    },
}

#[derive(Args)]
struct UpstreamArgs {
    /// Comma-separated API keys (reads from SIFT_API_KEYS if not provided)
    #[arg(long, env = "SIFT_API_KEYS", hide_env_values = true)]
    api_keys: String,

    /// Comma-separated models, in fallback order
    #[arg(long, env = "SIFT_MODELS", default_value = DEFAULT_MODELS)]
    models: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "SIFT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-call timeout in seconds
    #[arg(long, env = "SIFT_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,

    /// Maximum files processed at once
    #[arg(long, env = "SIFT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Maximum failed calls per file (transient or unparseable), across all credentials
    #[arg(long, env = "SIFT_MAX_ATTEMPTS", default_value_t = 20)]
    max_attempts: u32,
}

impl UpstreamArgs {
    fn caller(&self) -> Result<ExtractionCaller<OpenAiGenerator, ContentCleaner>> {
        let config = ExtractionConfig::default()
            .with_call_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_concurrency(self.concurrency)
            .with_max_attempts(self.max_attempts);
        config.validate()?;

        let pool = CredentialPool::from_lists(&self.api_keys, &self.models)
            .context("Invalid --api-keys / --models")?;
        // The core enforces the call timeout; the client timeout is a backstop.
        let generator = OpenAiGenerator::with_base_url(&self.base_url)?
            .with_timeout(config.call_timeout + Duration::from_secs(5))?;

        tracing::info!(
            credentials = pool.len(),
            base_url = %generator.base_url(),
            concurrency = config.max_concurrency,
            "Credential pool ready"
        );
        Ok(ExtractionCaller::new(
            generator,
            ContentCleaner::new(),
            pool,
            config,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sift=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input_folder,
            output_folder,
            prompt_file,
            goal,
            output_method,
            extensions,
            upstream,
        } => {
            let caller = upstream.caller()?;
            let cancel = cancel_on_ctrl_c();
            let instructions = match (prompt_file, goal) {
                (Some(path), _) => read_prompt(&path)?,
                (None, Some(goal)) => PromptOrchestrator::new(caller.clone())
                    .refine_with_cancel(&goal, &cancel)
                    .await
                    .context("Could not turn the goal into instructions")?,
                (None, None) => bail!("Either --prompt-file or --goal is required"),
            };
            cmd_extract(
                caller,
                &input_folder,
                &output_folder,
                &instructions,
                output_method,
                &extensions,
                &cancel,
            )
            .await?;
        }
        Commands::Refine { goal, upstream } => {
            let caller = upstream.caller()?;
            let instructions = PromptOrchestrator::new(caller).refine(&goal).await?;
            println!("{instructions}");
        }
    }

    Ok(())
}

/// Token cancelled on the first Ctrl-C. In-flight files still finish.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight files");
            token.cancel();
        }
    });
    cancel
}

fn read_prompt(path: &Path) -> Result<String> {
    let prompt = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
    if prompt.trim().is_empty() {
        bail!("Prompt file is empty: {}", path.display());
    }
    Ok(prompt)
}

async fn cmd_extract(
    caller: ExtractionCaller<OpenAiGenerator, ContentCleaner>,
    input_folder: &Path,
    output_folder: &Path,
    instructions: &str,
    output_method: OutputMode,
    extensions: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let files = read_inputs(input_folder, &parse_list(extensions))?;
    if files.is_empty() {
        tracing::warn!(
            folder = %input_folder.display(),
            %extensions,
            "No matching input files"
        );
    }

    let outcome = BatchRunner::new(caller)
        .run(files, instructions, cancel, &TracingBatchReporter)
        .await?;

    let bundle = ResultAssembler::new(output_method).assemble(&outcome.results);
    let written = write_bundle(&bundle, output_folder)?;

    print_summary(&outcome, written.len(), output_folder);
    Ok(())
}

/// Files in `folder` whose extension is in `extensions`, sorted by name.
fn read_inputs(folder: &Path, extensions: &[String]) -> Result<Vec<FileInput>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("Failed to read input folder: {}", folder.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| wanted.iter().any(|w| w.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(FileInput::new(name, content))
        })
        .collect()
}

/// Write every document as pretty JSON. Returns the written paths.
fn write_bundle(bundle: &OutputBundle, folder: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create output folder: {}", folder.display()))?;

    let mut written = Vec::with_capacity(bundle.len());
    for document in &bundle.documents {
        let path = folder.join(&document.name);
        std::fs::write(&path, document.to_pretty_bytes()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Wrote document");
        written.push(path);
    }
    Ok(written)
}

fn print_summary(outcome: &BatchOutcome, documents: usize, folder: &Path) {
    let summary = &outcome.summary;
    println!(
        "Processed {} file(s): {} relevant, {} not relevant, {} failed",
        summary.total, summary.relevant, summary.not_relevant, summary.failed
    );
    println!("Wrote {} document(s) to {}", documents, folder.display());

    if summary.failed > 0 {
        println!("\nFailed files:");
        for result in outcome.failures() {
            if let Some(error) = &result.error {
                println!("  {} [{}] {}", result.source, error.category, error.message);
            }
        }
    }
    if outcome.cancelled {
        println!("\nRun was interrupted; files not started are marked cancelled.");
    }
}
