//! Prompts for VLM-based table extraction.
//!
//! Every prompt lives here so the table-parsing rules in
//! [`crate::pipeline::parse`] and the instructions the model receives can be
//! read side by side. Callers can override both via
//! [`crate::config::ConversionConfig::system_prompt`] and
//! [`crate::config::ConversionConfig::user_prompt`].

/// Default system prompt: transcribe the image into a single markdown table.
///
/// The parser only keeps lines that start with `|`, so the prompt insists on
/// a bare pipe table with no introduction or commentary around it.
pub const TABLE_EXTRACTION_PROMPT: &str = r#"You extract information from images into tables. First design a table structure that fits the information in the image, then fill in the table with the data shown.

Requirements:
- Keep the data structure complete: every row and column visible in the image must appear in the table.
- Fill in the data exactly and correctly as it appears in the image.

Output format (a GFM pipe table, nothing else):
| Column 1 | Column 2 | Column 3 |
| --- | --- | --- |
| Data 1 | Data 2 | Data 3 |

Return ONLY the table.

Correct output:
| Column 1 | Column 2 | Column 3 |
| --- | --- | --- |
| Data 1 | Data 2 | Data 3 |

Wrong output (do not introduce the table):
Here is the table I extracted:
| Column 1 | Column 2 | Column 3 |
| --- | --- | --- |
| Data 1 | Data 2 | Data 3 |"#;

/// Short text cue sent alongside the image in the user message.
///
/// Vision APIs require a user turn to respond to; the image carries the
/// actual content.
pub const DEFAULT_USER_PROMPT: &str = "Transcribe the table shown in this image.";
