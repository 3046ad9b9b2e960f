//! CLI binary for edgequake-img2xlsx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_img2xlsx::{
    convert_to_response, extract_table, ConversionConfig, ConversionProgressCallback,
    ProgressCallback, Stage, ToolResponse,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the current stage, plus one
/// log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    stage_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("img2xlsx");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            stage_started: Mutex::new(None),
        })
    }

    fn stage_elapsed(&self) -> String {
        let ms = self
            .stage_started
            .lock()
            .map(|mut t| t.take().map(|t| t.elapsed().as_millis()).unwrap_or(0))
            .unwrap_or(0);
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut t) = self.stage_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage) {
        self.bar.println(format!(
            "  {} {:<20} {}",
            green("✓"),
            stage.to_string(),
            dim(&self.stage_elapsed())
        ));
    }

    fn on_conversion_complete(&self, output_path: &Path) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Spreadsheet written to {}",
            green("✔"),
            bold(&output_path.display().to_string())
        );
    }

    fn on_conversion_error(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert into the current directory
  img2xlsx invoice.png

  # Write into a specific directory
  img2xlsx scan.jpg -o exports/

  # Preview the extracted table without writing a file
  img2xlsx --print screenshot.webp

  # Machine-readable result (path or {"error", "kind"})
  img2xlsx --json photo.jpg

  # Use OpenAI instead of DashScope
  img2xlsx --api-base https://api.openai.com/v1 --model gpt-4.1-mini table.png

SUPPORTED IMAGES:
  PNG, JPEG, WEBP (detected from file content, not the extension)

ENVIRONMENT VARIABLES:
  IMG2XLSX_API_KEY     API key (falls back to OPENAI_API_KEY)
  IMG2XLSX_API_BASE    OpenAI-compatible base URL (falls back to OPENAI_BASE_URL)
  IMG2XLSX_MODEL       Vision model ID
  RUST_LOG             Overrides the log filter

SETUP:
  1. Set API key:     export IMG2XLSX_API_KEY=sk-...
  2. Convert:         img2xlsx table.png
"#;

/// Convert a picture of a table into an Excel spreadsheet using a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "img2xlsx",
    version,
    about = "Convert an image of a table into an .xlsx spreadsheet using a Vision LLM",
    long_about = "Send a PNG, JPEG or WEBP image of a table to a Vision Language Model, parse \
the markdown table it returns, and save it as a timestamped .xlsx file. Works with DashScope \
(Qwen-VL), OpenAI and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path of the image containing the table.
    image: String,

    /// Directory for the spreadsheet (default: current directory).
    #[arg(short, long, env = "IMG2XLSX_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Vision model ID (default: qwen-vl-max-latest).
    #[arg(long, long_help = "Vision model ID. Overrides IMG2XLSX_MODEL.")]
    model: Option<String>,

    /// OpenAI-compatible base URL; `/chat/completions` is appended.
    #[arg(
        long,
        long_help = "OpenAI-compatible base URL. Overrides IMG2XLSX_API_BASE / OPENAI_BASE_URL;\n\
          default https://dashscope.aliyuncs.com/compatible-mode/v1."
    )]
    api_base: Option<String>,

    /// API key sent as a bearer token (overrides IMG2XLSX_API_KEY / OPENAI_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "IMG2XLSX_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "IMG2XLSX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "IMG2XLSX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries on transient LLM failures (timeouts, 429, 5xx).
    #[arg(long, env = "IMG2XLSX_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "IMG2XLSX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print the result as JSON: the spreadsheet path, or {"error", "kind"}.
    #[arg(long)]
    json: bool,

    /// Print the extracted table as markdown and do not write a spreadsheet.
    #[arg(long)]
    print: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "IMG2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2XLSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG2XLSX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers INFO-level feedback; keep library logs to errors
    // while it is on screen.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.print {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Preview mode ─────────────────────────────────────────────────────
    if cli.print {
        let grid = extract_table(&cli.image, &config)
            .await
            .context("Table extraction failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&grid).context("Failed to serialise table")?
            );
        } else {
            print!("{}", grid.to_markdown());
            if grid.is_ragged() && !cli.quiet {
                eprintln!(
                    "{}",
                    dim("note: some rows differ in width from the header; they will be padded or truncated in the spreadsheet")
                );
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let start = Instant::now();
    let response = convert_to_response(&cli.image, cli.output_dir.as_deref(), &config).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string(&response).context("Failed to serialise result")?
        );
    } else {
        match &response {
            ToolResponse::Path(path) => {
                println!("{}", path.display());
                if !cli.quiet && !show_progress {
                    eprintln!("Converted in {}ms", start.elapsed().as_millis());
                }
            }
            ToolResponse::Error { error, .. } => {
                // The spinner callback has already reported the failure.
                if !show_progress {
                    eprintln!("{} {}", red("error:"), error);
                }
            }
        }
    }

    Ok(if response.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Map CLI args to `ConversionConfig`.
///
/// Endpoint settings come from [`ConversionConfig::from_env`]; flags given on
/// the command line override them.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let base = ConversionConfig::from_env().context("Invalid IMG2XLSX_* environment")?;
    apply_cli(cli, base, system_prompt, progress)
}

fn apply_cli(
    cli: &Cli,
    base: ConversionConfig,
    system_prompt: Option<String>,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let mut builder = base
        .into_builder()
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = cli.api_base {
        builder = builder.base_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_like() -> ConversionConfig {
        ConversionConfig::builder()
            .api_key("sk-env")
            .base_url("https://api.openai.com/v1")
            .model("gpt-4.1-mini")
            .build()
            .unwrap()
    }

    #[test]
    fn environment_values_survive_without_flags() {
        let cli = Cli::try_parse_from(["img2xlsx", "t.png"]).unwrap();
        let config = apply_cli(&cli, env_like(), None, None).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4.1-mini");
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli::try_parse_from([
            "img2xlsx",
            "--api-key",
            "sk-flag",
            "--api-base",
            "http://localhost:11434/v1",
            "--model",
            "qwen2.5vl",
            "--max-retries",
            "2",
            "t.png",
        ])
        .unwrap();
        let config = apply_cli(&cli, env_like(), None, None).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-flag"));
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.model, "qwen2.5vl");
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn bad_flag_value_is_rejected() {
        let cli = Cli::try_parse_from(["img2xlsx", "--api-base", "localhost", "t.png"]).unwrap();
        assert!(apply_cli(&cli, env_like(), None, None).is_err());
    }
}
