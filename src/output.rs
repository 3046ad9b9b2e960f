//! Tool-boundary result type.
//!
//! [`crate::convert`] returns a Rust `Result`. Agent frameworks and other
//! JSON-speaking callers want a single value instead: the path of the
//! written spreadsheet on success, or an object describing the failure.
//!
//! ```text
//! "out/20240501093000.xlsx"
//! {"error": "No valid table data found in the model output", "kind": "no_table_found"}
//! ```

use crate::error::{ErrorKind, Img2XlsxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of a conversion as handed to a tool caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResponse {
    /// Path of the written spreadsheet.
    Path(PathBuf),
    /// Structured failure payload.
    Error { error: String, kind: ErrorKind },
}

impl ToolResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResponse::Error { .. })
    }

    /// The spreadsheet path, if the conversion succeeded.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ToolResponse::Path(p) => Some(p),
            ToolResponse::Error { .. } => None,
        }
    }
}

impl From<Result<PathBuf, Img2XlsxError>> for ToolResponse {
    fn from(result: Result<PathBuf, Img2XlsxError>) -> Self {
        match result {
            Ok(path) => ToolResponse::Path(path),
            Err(e) => ToolResponse::Error {
                error: e.to_string(),
                kind: e.kind(),
            },
        }
    }
}
