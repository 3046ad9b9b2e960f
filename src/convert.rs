//! Conversion entry points.
//!
//! [`convert`] runs the whole pipeline and returns the path of the written
//! spreadsheet. [`extract_table`] stops after parsing, for callers that want
//! the grid without touching the filesystem. [`convert_to_response`] wraps
//! [`convert`] for JSON tool callers.

use crate::config::ConversionConfig;
use crate::error::Img2XlsxError;
use crate::output::ToolResponse;
use crate::pipeline::encode;
use crate::pipeline::llm::{ExtractionRequest, OpenAiCompatibleClient, VisionModel};
use crate::pipeline::parse::{self, TableGrid};
use crate::pipeline::write;
use crate::progress::Stage;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert an image of a table into an `.xlsx` spreadsheet.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `image_path` — Path of a PNG, JPEG or WEBP image
/// * `output_dir` — Directory for the spreadsheet; `None` means the current
///   working directory. Created if missing.
/// * `config` — Conversion configuration
///
/// # Returns
/// The path of the new `<YYYYMMDDHHMMSS>.xlsx` file.
///
/// # Errors
/// The first failing stage decides the error. An empty `image_path` fails
/// with [`Img2XlsxError::MissingImage`] before any file or network access.
///
/// # Example
/// ```rust,no_run
/// use edgequake_img2xlsx::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::from_env()?;
/// let path = convert("invoice.png", None, &config).await?;
/// println!("{}", path.display());
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    image_path: impl AsRef<str>,
    output_dir: Option<&Path>,
    config: &ConversionConfig,
) -> Result<PathBuf, Img2XlsxError> {
    let start = Instant::now();
    let image_path = image_path.as_ref();
    info!("Starting conversion: {}", image_path);

    let result = run(image_path, output_dir, config).await;

    match &result {
        Ok(path) => {
            info!(
                "Conversion complete: {} in {}ms",
                path.display(),
                start.elapsed().as_millis()
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_conversion_complete(path);
            }
        }
        Err(e) => {
            warn!("Conversion failed: {}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_conversion_error(&e.to_string());
            }
        }
    }
    result
}

async fn run(
    image_path: &str,
    output_dir: Option<&Path>,
    config: &ConversionConfig,
) -> Result<PathBuf, Img2XlsxError> {
    let grid = extract_grid(image_path, config).await?;

    // ── Step 4: Write spreadsheet ────────────────────────────────────────
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().map_err(|e| Img2XlsxError::WriteFailed {
            path: PathBuf::from("."),
            source: e,
        })?,
    };

    stage_start(config, Stage::Write);
    let path = tokio::task::spawn_blocking(move || {
        write::write_workbook(&grid, &dir, Local::now())
    })
    .await
    .map_err(|e| Img2XlsxError::Internal(format!("spreadsheet writer task failed: {e}")))??;
    stage_complete(config, Stage::Write);

    Ok(path)
}

/// Run encode → extract → parse and return the table without writing it.
pub async fn extract_table(
    image_path: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<TableGrid, Img2XlsxError> {
    extract_grid(image_path.as_ref(), config).await
}

async fn extract_grid(
    image_path: &str,
    config: &ConversionConfig,
) -> Result<TableGrid, Img2XlsxError> {
    if image_path.trim().is_empty() {
        return Err(Img2XlsxError::MissingImage);
    }
    let provider = resolve_provider(config)?;

    // ── Step 1: Encode image ─────────────────────────────────────────────
    stage_start(config, Stage::Encode);
    let asset = encode::encode_image(Path::new(image_path)).await?;
    let request = ExtractionRequest::new(asset.to_data_uri(), config);
    drop(asset);
    stage_complete(config, Stage::Encode);

    // ── Step 2: Ask the model ────────────────────────────────────────────
    stage_start(config, Stage::Extract);
    let llm_start = Instant::now();
    let content = provider.extract(&request).await?;
    debug!("Extraction took {}ms", llm_start.elapsed().as_millis());
    let text = content
        .filter(|t| !t.trim().is_empty())
        .ok_or(Img2XlsxError::EmptyTableContent)?;
    stage_complete(config, Stage::Extract);

    // ── Step 3: Parse table ──────────────────────────────────────────────
    stage_start(config, Stage::Parse);
    let grid = parse::parse_markdown_table(&text)?;
    info!(
        "Parsed table: {} columns, {} data rows",
        grid.column_count(),
        grid.rows.len()
    );
    stage_complete(config, Stage::Parse);

    Ok(grid)
}

/// Convert and fold the outcome into a [`ToolResponse`].
///
/// Never fails: every error becomes a `{"error", "kind"}` payload.
pub async fn convert_to_response(
    image_path: impl AsRef<str>,
    output_dir: Option<&Path>,
    config: &ConversionConfig,
) -> ToolResponse {
    ToolResponse::from(convert(image_path, output_dir, config).await)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    image_path: impl AsRef<str>,
    output_dir: Option<&Path>,
    config: &ConversionConfig,
) -> Result<PathBuf, Img2XlsxError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Img2XlsxError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(image_path, output_dir, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Use the injected model if there is one, else build an HTTP client from
/// the endpoint settings.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn VisionModel>, Img2XlsxError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    let client = OpenAiCompatibleClient::from_config(config)?;
    debug!("Using {} at {}", config.model, config.completions_url());
    Ok(Arc::new(client))
}

fn stage_start(config: &ConversionConfig, stage: Stage) {
    debug!("Stage start: {}", stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
}

fn stage_complete(config: &ConversionConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage);
    }
}
