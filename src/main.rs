// src/main.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use portfolio_extractor::fallback::{
    API_KEY_ENV, DEFAULT_ENDPOINT, DEFAULT_MAX_PROMPT_CHARS, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS,
};
use portfolio_extractor::storage::StorageManager;
use portfolio_extractor::tables::TableRegionDetector;
use portfolio_extractor::utils::{self, error::ExtractError, numbers::DEFAULT_CURRENCY, AppError};
use portfolio_extractor::{
    FallbackConfig, HttpTextGenerator, Pipeline, PipelineConfig, RawDocument, ReconcileConfig,
    TableRegion,
};
use tokio::task::JoinSet;

/// Command Line Interface for the portfolio statement extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Documents to process (.json holds {text, tables}, anything else is plain text)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory for extracted records
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Debug mode - save annotated text files marking detected table regions
    #[arg(short, long)]
    debug: bool,

    /// Ask an external text generator when structural extraction finds nothing
    #[arg(long)]
    fallback: bool,

    /// Chat completions endpoint of the text generator
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Model name sent to the text generator
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// API key for the text generator (falls back to FALLBACK_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Upper bound for a single generator call, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Characters of document text embedded in a generator prompt
    #[arg(long, default_value_t = DEFAULT_MAX_PROMPT_CHARS)]
    max_prompt_chars: usize,

    /// Currency assumed when a document never states one
    #[arg(long, default_value = DEFAULT_CURRENCY)]
    currency: String,

    /// Relative difference above which the stated total is distrusted (default: 0.5)
    #[arg(long)]
    override_relative_difference: Option<f64>,

    /// Valued securities needed before their sum may replace the stated total (default: 5)
    #[arg(long)]
    override_min_securities: Option<usize>,

    /// Share of securities that must carry a value for an override (default: 0.3)
    #[arg(long)]
    override_min_coverage: Option<f64>,

    /// Allowed distance of the allocation sum from 100, in points (default: 5)
    #[arg(long)]
    allocation_tolerance: Option<f64>,
}

impl Args {
    fn reconcile_config(&self) -> Result<ReconcileConfig, AppError> {
        let mut config = ReconcileConfig::default();
        if let Some(value) = self.override_relative_difference {
            if value < 0.0 {
                return Err(AppError::Config("--override-relative-difference must not be negative".to_string()));
            }
            config.override_relative_difference = value;
        }
        if let Some(value) = self.override_min_securities {
            config.override_min_securities = value;
        }
        if let Some(value) = self.override_min_coverage {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config("--override-min-coverage must be between 0 and 1".to_string()));
            }
            config.override_min_coverage = value;
        }
        if let Some(value) = self.allocation_tolerance {
            if value < 0.0 {
                return Err(AppError::Config("--allocation-tolerance must not be negative".to_string()));
            }
            config.allocation_tolerance = value;
        }
        Ok(config)
    }

    fn pipeline_config(&self) -> Result<PipelineConfig, AppError> {
        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok());
        Ok(PipelineConfig {
            reconcile: self.reconcile_config()?,
            fallback: FallbackConfig {
                enabled: self.fallback,
                endpoint: self.endpoint.clone(),
                model: self.model.clone(),
                api_key,
                timeout: Duration::from_secs(self.timeout_secs),
                max_prompt_chars: self.max_prompt_chars,
            },
            default_currency: self.currency.trim().to_uppercase(),
        })
    }
}

/// Reads a document: JSON input carries pre-extracted tables, anything else is text.
fn load_document(path: &Path) -> Result<RawDocument, AppError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        return Ok(RawDocument::from_text(content));
    }
    serde_json::from_str(&content).map_err(|e| {
        ExtractError::InvalidInput(format!("{}: {}", path.display(), e)).into()
    })
}

fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

async fn process_document(
    path: PathBuf,
    pipeline: Arc<Pipeline>,
    generator: Option<Arc<HttpTextGenerator>>,
    storage: Arc<StorageManager>,
    debug: bool,
) -> Result<(), AppError> {
    let stem = document_stem(&path);
    tracing::info!("Processing document: {}", path.display());
    let doc = load_document(&path)?;
    tracing::debug!("Loaded {} chars of text and {} table(s)", doc.text.len(), doc.tables.len());

    if debug {
        let regions: Vec<TableRegion> = TableRegionDetector::new(&doc.text).regions().collect();
        let debug_path = storage
            .document_dir(&stem)
            .join("debug")
            .join(format!("{}_annotated.txt", stem));
        if let Err(e) = utils::debug_text::create_debug_text(&doc.text, &regions, &debug_path) {
            tracing::warn!("Failed to create debug text: {}", e);
        }
    }

    let result = match generator.as_deref() {
        Some(generator) => pipeline.run_with_fallback(&doc, generator).await?,
        None => pipeline.run(&doc)?,
    };

    let path = storage.save_result(&stem, &result)?;
    tracing::info!("Saved result content to: {}", path.display());

    match storage.save_result_metadata(&stem, &result) {
        Ok(path) => tracing::info!("Saved result metadata to: {}", path.display()),
        Err(e) => tracing::error!("Failed to save result metadata: {}", e),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!(
        "Starting processing of {} document(s), fallback {}",
        args.inputs.len(),
        if args.fallback { "enabled" } else { "disabled" }
    );

    // 3. Build configuration and collaborators
    let config = args.pipeline_config()?;
    let generator = if config.fallback.enabled {
        Some(Arc::new(HttpTextGenerator::from_config(&config.fallback)?))
    } else {
        None
    };
    let storage = Arc::new(StorageManager::new(&args.output_dir)?);
    let pipeline = Arc::new(Pipeline::new(config));

    // 4. One task per document; documents share nothing but read-only collaborators
    let mut tasks = JoinSet::new();
    for path in args.inputs.iter().cloned() {
        tasks.spawn(process_document(
            path,
            Arc::clone(&pipeline),
            generator.clone(),
            Arc::clone(&storage),
            args.debug,
        ));
    }

    let mut success_count = 0;
    let mut failure_count = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => success_count += 1,
            Ok(Err(e)) => {
                tracing::error!("Failed to process document: {}", e);
                failure_count += 1;
            }
            Err(e) => {
                tracing::error!("Document task panicked or was cancelled: {}", e);
                failure_count += 1;
            }
        }
    }

    tracing::info!("Processing finished. Success: {}, Failures: {}", success_count, failure_count);

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!("Failed to process any of {} document(s)", failure_count)));
    }

    Ok(())
}
