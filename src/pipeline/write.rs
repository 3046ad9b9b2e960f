//! Spreadsheet output: [`TableGrid`] → `<YYYYMMDDHHMMSS>.xlsx`.
//!
//! The workbook has a single worksheet (`Sheet1`): the header in row 1 in
//! bold, data rows below, no index column. Every cell is written as text,
//! exactly as the model transcribed it.
//!
//! File names carry the local wall-clock time at second granularity. Two
//! writes into the same directory within one second would collide, so the
//! name is reserved with `create_new` and falls back to `<ts>-1.xlsx`,
//! `<ts>-2.xlsx`, ... when taken.

use crate::error::Img2XlsxError;
use crate::pipeline::parse::TableGrid;
use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Give up on suffixing after this many taken names.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// `<YYYYMMDDHHMMSS>.xlsx` for the given instant.
pub fn output_file_name(timestamp: DateTime<Local>) -> String {
    format!("{}.xlsx", timestamp.format("%Y%m%d%H%M%S"))
}

/// Write `grid` to a new spreadsheet in `output_dir` and return its path.
///
/// The directory (and its parents) is created if missing. Data rows shorter
/// than the header are padded with blank cells; cells past the header width
/// are dropped.
pub fn write_workbook(
    grid: &TableGrid,
    output_dir: &Path,
    timestamp: DateTime<Local>,
) -> Result<PathBuf, Img2XlsxError> {
    let base_name = output_file_name(timestamp);

    fs::create_dir_all(output_dir).map_err(|e| Img2XlsxError::WriteFailed {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    // Serialise first so a failure leaves nothing behind on disk.
    let buffer = render_workbook(grid).map_err(|e| Img2XlsxError::WriteFailed {
        path: output_dir.join(&base_name),
        source: io::Error::other(e.to_string()),
    })?;

    let (path, mut file) = reserve_path(output_dir, timestamp)?;
    if let Err(e) = file.write_all(&buffer).and_then(|_| file.sync_all()) {
        let _ = fs::remove_file(&path);
        return Err(Img2XlsxError::WriteFailed { path, source: e });
    }

    debug!(
        "Wrote {} rows × {} columns ({} bytes) to {}",
        grid.rows.len() + 1,
        grid.column_count(),
        buffer.len(),
        path.display()
    );
    Ok(path)
}

/// Build the workbook in memory.
fn render_workbook(grid: &TableGrid) -> Result<Vec<u8>, XlsxError> {
    let width = grid.column_count();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, name) in grid.header.iter().enumerate() {
        sheet.write_string_with_format(0, column(col)?, name.as_str(), &bold)?;
    }

    for (idx, row) in grid.rows.iter().enumerate() {
        if row.len() != width {
            warn!(
                "Row {} has {} cells, header has {}; {}",
                idx + 1,
                row.len(),
                width,
                if row.len() < width {
                    "padding with blanks"
                } else {
                    "dropping extra cells"
                }
            );
        }
        let sheet_row = u32::try_from(idx + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, value) in row.iter().take(width).enumerate() {
            sheet.write_string(sheet_row, column(col)?, value.as_str())?;
        }
    }

    workbook.save_to_buffer()
}

fn column(col: usize) -> Result<u16, XlsxError> {
    u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)
}

/// Create the output file exclusively, suffixing the name while it is taken.
fn reserve_path(
    output_dir: &Path,
    timestamp: DateTime<Local>,
) -> Result<(PathBuf, File), Img2XlsxError> {
    let stem = timestamp.format("%Y%m%d%H%M%S").to_string();

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.xlsx")
        } else {
            format!("{stem}-{attempt}.xlsx")
        };
        let path = output_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                if attempt > 0 {
                    debug!("{stem}.xlsx exists, using {}", path.display());
                }
                return Ok((path, file));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Img2XlsxError::WriteFailed { path, source: e }),
        }
    }

    Err(Img2XlsxError::WriteFailed {
        path: output_dir.join(format!("{stem}.xlsx")),
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{MAX_NAME_ATTEMPTS} candidate file names already taken"),
        ),
    })
}
