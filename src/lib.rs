//! # edgequake-img2xlsx
//!
//! Turn a picture of a table into an Excel spreadsheet using a Vision
//! Language Model (VLM).
//!
//! Screenshots, scans and phone photos of tables are hard to read with OCR:
//! ruled lines, merged headers and skewed photos break column detection.
//! This crate sends the image to a VLM, asks for a markdown pipe table,
//! parses the reply into a grid and writes it to a timestamped `.xlsx` file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Encode  detect PNG / JPEG / WEBP, base64 data URI
//!  ├─ 2. VLM     one chat-completions call (qwen-vl-max-latest by default)
//!  ├─ 3. Parse   keep `|` rows, drop separators, header + data rows
//!  └─ 4. Write   <YYYYMMDDHHMMSS>.xlsx, bold header, Sheet1
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2xlsx::{convert, ConversionConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Key and endpoint from IMG2XLSX_API_KEY / IMG2XLSX_API_BASE
//!     let config = ConversionConfig::from_env()?;
//!     let path = convert("receipt.jpg", Some(Path::new("out")), &config).await?;
//!     println!("{}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2xlsx` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-img2xlsx = { version = "0.1", default-features = false }
//! ```
//!
//! ## Endpoints
//!
//! Any OpenAI-compatible chat-completions endpoint with vision support works.
//!
//! | Endpoint | `base_url` | Example model |
//! |----------|------------|---------------|
//! | DashScope (default) | `https://dashscope.aliyuncs.com/compatible-mode/v1` | `qwen-vl-max-latest` |
//! | OpenAI | `https://api.openai.com/v1` | `gpt-4.1-mini` |
//! | Ollama | `http://localhost:11434/v1` | `qwen2.5vl` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_sync, convert_to_response, extract_table};
pub use error::{ErrorKind, Img2XlsxError};
pub use output::ToolResponse;
pub use pipeline::encode::{ImageAsset, ImageKind};
pub use pipeline::llm::{ExtractionRequest, OpenAiCompatibleClient, VisionModel};
pub use pipeline::parse::{parse_markdown_table, TableGrid};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
