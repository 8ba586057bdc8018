use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::dates::serial_to_datetime;
use crate::error::ImportError;
use crate::types::{CellValue, SheetRow};

pub const REPORT_SHEET: &str = "Report Info";
pub const MARKET_SHEET: &str = "market";

/// Rows of the two sheets a batch workbook must carry. Only the first
/// "Report Info" row is used.
#[derive(Debug, Clone)]
pub struct ExtractedSheets {
    pub report_rows: Vec<SheetRow>,
    pub asset_rows: Vec<SheetRow>,
}

/// Load the workbook and extract "Report Info" and "market" as header-keyed rows.
/// Reads from local filesystem only.
pub fn extract_sheets(path: &Path) -> Result<ExtractedSheets, ImportError> {
    if !path.exists() {
        return Err(ImportError::Workbook(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ImportError::Workbook(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_vec();
    for required in [REPORT_SHEET, MARKET_SHEET] {
        if !sheet_names.iter().any(|s| s == required) {
            return Err(ImportError::MissingSheet {
                sheet: required.to_string(),
            });
        }
    }

    let mut read = |name: &str| -> Result<Vec<SheetRow>, ImportError> {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| ImportError::Workbook(format!("Sheet '{}': {}", name, e)))?;
        let rows = range_to_rows(&range);
        if rows.is_empty() {
            return Err(ImportError::EmptySheet {
                sheet: name.to_string(),
            });
        }
        log::debug!("[excel] sheet '{}': {} data row(s)", name, rows.len());
        Ok(rows)
    };

    let report_rows = read(REPORT_SHEET)?;
    let asset_rows = read(MARKET_SHEET)?;
    Ok(ExtractedSheets {
        report_rows,
        asset_rows,
    })
}

/// First row is the header row; every following non-blank row becomes a [`SheetRow`].
fn range_to_rows(range: &Range<Data>) -> Vec<SheetRow> {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => unique_headers(
            header_row
                .iter()
                .map(|c| c.as_string().unwrap_or_default())
                .collect(),
        ),
        None => return Vec::new(),
    };

    rows.map(|row| {
        let cells = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), row.get(i).map(to_cell_value).unwrap_or_default()))
            .collect();
        SheetRow::new(cells)
    })
    .filter(|row| !row.is_blank())
    .collect()
}

/// Repeated headers get `_1`, `_2`, ... suffixes and blank ones become `__EMPTY`,
/// the naming spreadsheet-to-JSON exports use for repeated column groups.
pub(crate) fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for header in raw {
        let base = if header.trim().is_empty() {
            "__EMPTY".to_string()
        } else {
            header
        };
        let mut n = next_suffix.get(&base).copied().unwrap_or(0);
        let mut candidate = if n == 0 {
            base.clone()
        } else {
            format!("{}_{}", base, n)
        };
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", base, n);
        }
        next_suffix.insert(base, n + 1);
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// ISO date cells (`.ods`, xlsx `t="d"`): full timestamp or bare date.
fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => serial_to_datetime(dt.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn repeated_headers_get_numeric_suffixes() {
        let out = unique_headers(strings(&[
            "asset_name",
            "valuerId",
            "valuerName",
            "percentage",
            "valuerId",
            "valuerName",
            "percentage",
            "valuerId",
        ]));
        assert_eq!(
            out,
            strings(&[
                "asset_name",
                "valuerId",
                "valuerName",
                "percentage",
                "valuerId_1",
                "valuerName_1",
                "percentage_1",
                "valuerId_2",
            ])
        );
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        let out = unique_headers(strings(&["a", "a_1", "a"]));
        assert_eq!(out, strings(&["a", "a_1", "a_2"]));
    }

    #[test]
    fn blank_headers_are_named() {
        let out = unique_headers(strings(&["", "title", " "]));
        assert_eq!(out, strings(&["__EMPTY", "title", "__EMPTY_1"]));
    }

    #[test]
    fn converts_cells() {
        assert_eq!(to_cell_value(&Data::Int(4)), CellValue::Number(4.0));
        assert_eq!(to_cell_value(&Data::String("x".into())), CellValue::Text("x".into()));
        assert_eq!(to_cell_value(&Data::Empty), CellValue::Empty);
    }

    #[test]
    fn iso_date_cells_stay_dates() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let midnight = day.and_hms_opt(0, 0, 0).unwrap();

        let cell = to_cell_value(&Data::DateTimeIso("2024-03-05T00:00:00".into()));
        assert_eq!(cell, CellValue::Date(midnight));
        assert_eq!(crate::dates::coerce_date(&cell), Some(day));

        assert_eq!(
            to_cell_value(&Data::DateTimeIso("2024-03-05".into())),
            CellValue::Date(midnight)
        );
        assert_eq!(
            to_cell_value(&Data::DateTimeIso("2024-03-05T14:30:15.250".into())),
            CellValue::Date(day.and_hms_milli_opt(14, 30, 15, 250).unwrap())
        );
        assert_eq!(
            to_cell_value(&Data::DateTimeIso("not a date".into())),
            CellValue::Text("not a date".into())
        );
        assert_eq!(
            to_cell_value(&Data::DurationIso("PT1H".into())),
            CellValue::Text("PT1H".into())
        );
    }
}
