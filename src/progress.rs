//! Progress-callback trait for per-stage conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to follow a
//! conversion as it moves through the pipeline. The CLI uses this to drive an
//! `indicatif` spinner; a server could forward the same events to its client.
//!
//! # Example
//!
//! ```rust
//! use edgequake_img2xlsx::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     finished: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, stage: Stage) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} done", stage);
//!     }
//! }
//!
//! let counter = Arc::new(StageCounter { finished: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .api_key("sk-test")
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One step of the image → spreadsheet pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the image and building the data URI.
    Encode,
    /// Waiting for the vision model.
    Extract,
    /// Parsing the markdown table.
    Parse,
    /// Writing the `.xlsx` file.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Encode => "encoding image",
            Stage::Extract => "extracting table",
            Stage::Parse => "parsing table",
            Stage::Write => "writing spreadsheet",
        };
        f.write_str(label)
    }
}

/// Called by the conversion pipeline as it moves between stages.
///
/// Implementations must be `Send + Sync`; a single config (and therefore a
/// single callback) may be shared by concurrent conversions. Every method has
/// a no-op default.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once with the path of the written spreadsheet.
    fn on_conversion_complete(&self, output_path: &Path) {
        let _ = output_path;
    }

    /// Called once when the conversion fails.
    ///
    /// * `error` — human-readable error description
    fn on_conversion_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
