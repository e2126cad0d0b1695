//! Exporter: write a [`ReportTable`] to an `.xlsx` or `.csv` spreadsheet.
//!
//! Both formats carry exactly four columns in fixed order (section, source
//! type, item, data), one header row and one row per [`ExtractedRow`].
//! The workbook variant adds presentation formatting: bold shaded header,
//! frozen header row, fixed column widths and wrapped item/data cells.
//!
//! Writes are atomic: the file is written beside the destination under a
//! hidden temp name and renamed over it, so an existing spreadsheet is
//! replaced whole and a failed export leaves nothing behind.

use crate::config::OutputFormat;
use crate::error::Esg2SheetError;
use crate::model::{ExtractedRow, ReportTable};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header labels, in column order.
pub const HEADERS: [&str; 4] = ["Section", "Source Type", "Item", "Data"];

/// Worksheet name in the workbook.
pub const SHEET_NAME: &str = "ESG Report";

/// Column widths A–D in character units.
const COLUMN_WIDTHS: [f64; 4] = [15.0, 12.0, 40.0, 30.0];

/// Write `table` to `path`, replacing any existing file.
///
/// Parent directories are created as needed.
///
/// # Errors
/// [`Esg2SheetError::Export`] when the directory cannot be created or the
/// file cannot be written.
pub fn write_table(
    table: &ReportTable,
    path: &Path,
    format: OutputFormat,
) -> Result<(), Esg2SheetError> {
    let export_err = |reason: String| Esg2SheetError::Export {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| export_err(e.to_string()))?;
    }

    let tmp_path = temp_path_for(path);
    let written = match format {
        OutputFormat::Xlsx => write_xlsx(table, &tmp_path).map_err(|e| e.to_string()),
        OutputFormat::Csv => write_csv(table, &tmp_path).map_err(|e| e.to_string()),
    };
    if let Err(reason) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(export_err(reason));
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        export_err(e.to_string())
    })?;

    info!(
        "Wrote {} rows to {} ({:?})",
        table.len(),
        path.display(),
        format
    );
    Ok(())
}

/// `dir/.name.tmp` for `dir/name`.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

fn cells(row: &ExtractedRow) -> [&str; 4] {
    [
        row.section.label(),
        row.source_type.label(),
        &row.item,
        &row.data,
    ]
}

fn write_xlsx(table: &ReportTable, path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9E1F2))
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let label_format = Format::new().set_align(FormatAlign::Top);
    let wrap_format = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    for (col, (label, width)) in HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, *label, &header_format)?;
        worksheet.set_column_width(col, width)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    for (i, row) in table.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, value) in cells(row).into_iter().enumerate() {
            let format = if col < 2 { &label_format } else { &wrap_format };
            worksheet.write_string_with_format(r, col as u16, value, format)?;
        }
    }

    workbook.save(path)?;
    debug!("Saved workbook {}", path.display());
    Ok(())
}

fn write_csv(table: &ReportTable, path: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADERS)?;
    for row in &table.rows {
        writer.write_record(cells(row))?;
    }
    writer.flush()?;
    Ok(())
}
