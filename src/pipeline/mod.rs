//! Pipeline stages for image-to-spreadsheet conversion.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! encode ──▶ llm ──▶ parse ──▶ write
//! (base64)   (VLM)   (grid)    (xlsx)
//! ```
//!
//! 1. [`encode`] — read the image, detect PNG/JPEG/WEBP from its magic
//!    bytes, wrap it in a data URI
//! 2. [`llm`]    — one vision-model call; the only stage with network I/O
//! 3. [`parse`]  — pull the pipe-table rows out of the reply
//! 4. [`write`]  — serialise the grid to a timestamped `.xlsx`; runs in
//!    `spawn_blocking` because it touches the filesystem synchronously

pub mod encode;
pub mod llm;
pub mod parse;
pub mod write;
