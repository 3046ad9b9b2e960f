//! Table parsing: model reply text → [`TableGrid`].
//!
//! Models are asked for a bare GFM pipe table, but replies still arrive with
//! a sentence of introduction, a code fence or a trailing remark. Rather than
//! trying to clean those up, the parser keeps only lines that begin with `|`
//! and ignores everything else.
//!
//! ## Rules
//!
//! 1. Whitespace-only text → [`Img2XlsxError::EmptyTableContent`]
//! 2. Keep lines whose first non-blank character is `|`
//! 3. Strip one leading and one trailing `|`, split on `|`, trim each cell
//! 4. Drop separator rows (`| --- | :---: |`)
//! 5. First row is the header, the rest are data rows
//! 6. Nothing left → [`Img2XlsxError::NoTableFound`]
//!
//! Rows are returned exactly as written; width mismatches are resolved by
//! the writer, not here.

use crate::error::Img2XlsxError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A parsed table: one header row plus zero or more data rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableGrid {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableGrid {
    /// Number of columns, taken from the header.
    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    /// True when any data row differs in width from the header.
    pub fn is_ragged(&self) -> bool {
        self.rows.iter().any(|r| r.len() != self.header.len())
    }

    /// Render the grid back to a normalised GFM pipe table.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        push_row(&mut out, &self.header);
        let divider: Vec<String> = self.header.iter().map(|_| "---".to_string()).collect();
        push_row(&mut out, &divider);
        for row in &self.rows {
            push_row(&mut out, row);
        }
        out
    }
}

fn push_row(out: &mut String, cells: &[String]) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(cell);
        out.push_str(" |");
    }
    out.push('\n');
}

// A separator cell is dashes (with optional alignment colons) or nothing.
static RE_DIVIDER_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?::?-[-\s]*:?)?$").unwrap());

fn is_separator(cells: &[String]) -> bool {
    cells.iter().all(|c| RE_DIVIDER_CELL.is_match(c))
}

fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').map(|c| c.trim().to_string()).collect()
}

/// Collect every pipe row in free-form model output into one grid.
///
/// Rows are not grouped by table: if the reply holds two tables, the second
/// table's header becomes a data row of the first.
///
/// # Example
/// ```rust
/// use edgequake_img2xlsx::parse_markdown_table;
///
/// let grid = parse_markdown_table("| Name | Age |\n|---|---|\n| Alice | 30 |").unwrap();
/// assert_eq!(grid.header, vec!["Name", "Age"]);
/// assert_eq!(grid.rows, vec![vec!["Alice", "30"]]);
/// ```
pub fn parse_markdown_table(text: &str) -> Result<TableGrid, Img2XlsxError> {
    if text.trim().is_empty() {
        return Err(Img2XlsxError::EmptyTableContent);
    }

    let mut rows = text
        .lines()
        .filter(|line| line.trim_start().starts_with('|'))
        .map(split_row)
        .filter(|cells| !is_separator(cells));

    let header = rows.next().ok_or(Img2XlsxError::NoTableFound)?;
    Ok(TableGrid {
        header,
        rows: rows.collect(),
    })
}
