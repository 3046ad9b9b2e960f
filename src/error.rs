//! Error types for the edgequake-img2xlsx library.
//!
//! Every stage of the pipeline returns `Result<_, Img2XlsxError>`, so a call
//! to [`crate::convert`] yields exactly one spreadsheet path or exactly one
//! error. Callers that speak a tool protocol (JSON in, JSON out) should use
//! [`crate::convert_to_response`], which turns any error into a structured
//! `{"error": ..., "kind": ...}` payload via [`Img2XlsxError::kind`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-img2xlsx library.
#[derive(Debug, Error)]
pub enum Img2XlsxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No image path was supplied.
    #[error("No image supplied: provide the path of an image containing a table")]
    MissingImage,

    /// The image could not be opened, read, or its header decoded.
    #[error("Cannot read image '{path}': {detail}")]
    UnreadableImage { path: PathBuf, detail: String },

    /// The file content does not match any known image signature.
    #[error("Unrecognised image format in '{path}'\nFirst bytes: {magic:02x?}")]
    UnrecognizedFormat { path: PathBuf, magic: Vec<u8> },

    /// The image format is known but not accepted by the vision model.
    #[error("Unsupported image format '{format}' in '{path}'\nSupported formats: PNG, JPEG, WEBP.")]
    UnsupportedFormat { path: PathBuf, format: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The vision-model request failed (transport, timeout, auth, bad body).
    #[error("Table extraction request failed: {reason}")]
    ExtractionRequestFailed { reason: String },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The model returned no content, or only whitespace.
    #[error("The model returned empty table content")]
    EmptyTableContent,

    /// The model output contained no markdown table rows.
    #[error("No valid table data found in the model output")]
    NoTableFound,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write the spreadsheet.
    #[error("Failed to write spreadsheet '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (runtime creation, panicked worker task).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable tag for an [`Img2XlsxError`], serialised in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingImage,
    UnreadableImage,
    UnrecognizedFormat,
    UnsupportedFormat,
    ExtractionRequestFailed,
    EmptyTableContent,
    NoTableFound,
    WriteFailed,
    InvalidConfig,
    Internal,
}

impl Img2XlsxError {
    /// The tag identifying this error in structured payloads.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Img2XlsxError::MissingImage => ErrorKind::MissingImage,
            Img2XlsxError::UnreadableImage { .. } => ErrorKind::UnreadableImage,
            Img2XlsxError::UnrecognizedFormat { .. } => ErrorKind::UnrecognizedFormat,
            Img2XlsxError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Img2XlsxError::ExtractionRequestFailed { .. } => ErrorKind::ExtractionRequestFailed,
            Img2XlsxError::EmptyTableContent => ErrorKind::EmptyTableContent,
            Img2XlsxError::NoTableFound => ErrorKind::NoTableFound,
            Img2XlsxError::WriteFailed { .. } => ErrorKind::WriteFailed,
            Img2XlsxError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Img2XlsxError::Internal(_) => ErrorKind::Internal,
        }
    }
}
