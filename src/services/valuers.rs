//! Valuer column detection and per-row percentage reconciliation.
//!
//! A market sheet carries one or more `valuerId` / `valuerName` / `percentage`
//! column groups. Repeated groups are told apart by numeric suffixes
//! (`valuerId_1`, `valuerName_1`, ...).

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ImportError;
use crate::text::convert_arabic_digits;
use crate::types::{CellValue, SheetRow, ValuerContribution};

pub const VALUER_ID_BASE: &str = "valuerId";
pub const VALUER_NAME_BASE: &str = "valuerName";
pub const PERCENTAGE_BASE: &str = "percentage";

const SUM_TOLERANCE: f64 = 0.001;

/// Header groups for the valuer columns, each sorted lexicographically.
///
/// Slot `i` pairs `ids[i]`, `names[i]` and `percentages[i]` by position, not by
/// suffix. Sparse or inconsistent suffixes across the three groups can pair the
/// wrong cells; see DESIGN.md.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValuerColumns {
    pub ids: Vec<String>,
    pub names: Vec<String>,
    pub percentages: Vec<String>,
}

impl ValuerColumns {
    pub fn slot_count(&self) -> usize {
        self.ids
            .len()
            .max(self.names.len())
            .max(self.percentages.len())
    }
}

fn suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?)(?:_\d+)?$").expect("suffix regex"))
}

/// Header text before an optional `_<digits>` suffix.
fn header_prefix(header: &str) -> &str {
    suffix_re()
        .captures(header.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(header)
}

/// Find the valuer column groups from the headers of the first market row.
/// Fails if any of the three groups is absent.
pub fn detect_valuer_columns(first_row: &SheetRow) -> Result<ValuerColumns, ImportError> {
    let mut cols = ValuerColumns::default();
    for header in first_row.headers() {
        let prefix = header_prefix(header);
        if prefix.eq_ignore_ascii_case(VALUER_ID_BASE) {
            cols.ids.push(header.to_string());
        } else if prefix.eq_ignore_ascii_case(VALUER_NAME_BASE) {
            cols.names.push(header.to_string());
        } else if prefix.eq_ignore_ascii_case(PERCENTAGE_BASE) {
            cols.percentages.push(header.to_string());
        }
    }
    cols.ids.sort();
    cols.names.sort();
    cols.percentages.sort();

    let missing: Vec<&'static str> = [
        (VALUER_ID_BASE, cols.ids.is_empty()),
        (VALUER_NAME_BASE, cols.names.is_empty()),
        (PERCENTAGE_BASE, cols.percentages.is_empty()),
    ]
    .into_iter()
    .filter(|(_, absent)| *absent)
    .map(|(base, _)| base)
    .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingValuerColumns { missing });
    }
    Ok(cols)
}

/// Parse a percentage cell into a 0..100 style figure.
///
/// Accepts Arabic-Indic digits, `%` / `٪` signs and a decimal comma. Fractions
/// in `[0, 1]` are scaled to percent. `None` for blank or non-numeric text.
pub fn parse_percentage(raw: &CellValue) -> Option<f64> {
    let text = convert_arabic_digits(&raw.as_text());
    let cleaned = text
        .trim()
        .replace(['%', '٪'], "")
        .replace(',', ".");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok().filter(|v: &f64| v.is_finite())?;
    if (0.0..=1.0).contains(&value) {
        Some(value * 100.0)
    } else {
        Some(value)
    }
}

fn cell<'a>(row: &'a SheetRow, header: Option<&String>) -> &'a CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    match header {
        Some(h) => row.get(h),
        None => &EMPTY,
    }
}

/// Contributions present in `row`. Fully empty slots and slots with a blank or
/// garbled percentage are dropped.
pub fn build_valuers(row: &SheetRow, cols: &ValuerColumns) -> Vec<ValuerContribution> {
    let mut valuers = Vec::new();
    for i in 0..cols.slot_count() {
        let id = cell(row, cols.ids.get(i));
        let name = cell(row, cols.names.get(i));
        let pct = cell(row, cols.percentages.get(i));
        if id.is_empty() && name.is_empty() && pct.is_empty() {
            continue;
        }
        let Some(percentage) = parse_percentage(pct) else {
            log::debug!("[valuers] slot {} skipped: unusable percentage {:?}", i, pct);
            continue;
        };
        valuers.push(ValuerContribution {
            valuer_id: id.as_text().trim().to_string(),
            valuer_name: name.as_text().trim().to_string(),
            percentage,
        });
    }
    valuers
}

/// Build the valuer list for one asset row and check that it totals 100%.
///
/// `row_index` is the 1-based position of the row among the market data rows.
pub fn reconcile_valuers(
    row: &SheetRow,
    cols: &ValuerColumns,
    asset_name: &str,
    row_index: usize,
) -> Result<Vec<ValuerContribution>, ImportError> {
    let valuers = build_valuers(row, cols);
    if valuers.is_empty() {
        return Err(ImportError::NoValuers {
            asset_name: asset_name.to_string(),
            row_index,
        });
    }
    let total: f64 = valuers.iter().map(|v| v.percentage).sum();
    let total = (total * 100.0).round() / 100.0;
    if (total - 100.0).abs() > SUM_TOLERANCE {
        return Err(ImportError::PercentageMismatch {
            asset_name: asset_name.to_string(),
            row_index,
            total,
        });
    }
    Ok(valuers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(cells: &[(&str, CellValue)]) -> SheetRow {
        SheetRow::new(
            cells
                .iter()
                .map(|(h, v)| (h.to_string(), v.clone()))
                .collect(),
        )
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn two_valuer_row(p1: CellValue, p2: CellValue) -> SheetRow {
        row(&[
            ("asset_name", text("Villa 1")),
            ("valuerId", CellValue::Number(1001.0)),
            ("valuerName", text("Sara")),
            ("percentage", p1),
            ("valuerId_1", text("1002")),
            ("valuerName_1", text("Omar")),
            ("percentage_1", p2),
        ])
    }

    #[test]
    fn detects_suffixed_groups_case_insensitively() {
        let r = row(&[
            ("asset_name", text("")),
            ("VALUERID_1", text("")),
            ("valuerId", text("")),
            ("valuername", text("")),
            ("valuerName_1", text("")),
            ("Percentage", text("")),
            ("percentage_1", text("")),
            ("percentage_total", text("")),
        ]);
        let cols = detect_valuer_columns(&r).unwrap();
        assert_eq!(cols.ids, vec!["VALUERID_1", "valuerId"]);
        assert_eq!(cols.names, vec!["valuerName_1", "valuername"]);
        assert_eq!(cols.percentages, vec!["Percentage", "percentage_1"]);
        assert_eq!(cols.slot_count(), 2);
    }

    #[test]
    fn missing_group_fails_detection() {
        let r = row(&[("valuerId", text("")), ("percentage", text(""))]);
        match detect_valuer_columns(&r) {
            Err(ImportError::MissingValuerColumns { missing }) => {
                assert_eq!(missing, vec![VALUER_NAME_BASE])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn fraction_and_percent_forms_agree() {
        assert_eq!(parse_percentage(&CellValue::Number(0.25)), Some(25.0));
        assert_eq!(parse_percentage(&CellValue::Number(25.0)), Some(25.0));
        assert_eq!(parse_percentage(&text("25%")), Some(25.0));
        assert_eq!(parse_percentage(&text("0,25")), Some(25.0));
        assert_eq!(parse_percentage(&CellValue::Number(1.0)), Some(100.0));
    }

    #[test]
    fn arabic_digits_match_ascii() {
        assert_eq!(parse_percentage(&text("٥٠")), parse_percentage(&text("50")));
        assert_eq!(parse_percentage(&text("٥٠٪")), Some(50.0));
    }

    #[test]
    fn garbled_percentages_are_none() {
        for raw in ["", "  ", "%", "half", "NaN", "inf"] {
            assert_eq!(parse_percentage(&text(raw)), None, "{raw:?}");
        }
        assert_eq!(parse_percentage(&CellValue::Empty), None);
    }

    #[test]
    fn builds_contributions_in_slot_order() {
        let r = two_valuer_row(CellValue::Number(0.6), text("40"));
        let cols = detect_valuer_columns(&r).unwrap();
        let valuers = reconcile_valuers(&r, &cols, "Villa 1", 1).unwrap();
        assert_eq!(
            valuers,
            vec![
                ValuerContribution {
                    valuer_id: "1001".into(),
                    valuer_name: "Sara".into(),
                    percentage: 60.0,
                },
                ValuerContribution {
                    valuer_id: "1002".into(),
                    valuer_name: "Omar".into(),
                    percentage: 40.0,
                },
            ]
        );
    }

    #[test]
    fn empty_and_unparseable_slots_are_skipped() {
        let r = row(&[
            ("valuerId", text("1")),
            ("valuerName", text("Sara")),
            ("percentage", text("100")),
            ("valuerId_1", text("")),
            ("valuerName_1", text("")),
            ("percentage_1", text("")),
            ("valuerId_2", text("3")),
            ("valuerName_2", text("Late")),
            ("percentage_2", text("n/a")),
        ]);
        let cols = detect_valuer_columns(&r).unwrap();
        let valuers = reconcile_valuers(&r, &cols, "Shop", 2).unwrap();
        assert_eq!(valuers.len(), 1);
        assert_eq!(valuers[0].valuer_name, "Sara");
    }

    #[test]
    fn no_usable_slot_is_an_error() {
        let r = two_valuer_row(text(""), text("-"));
        let cols = detect_valuer_columns(&r).unwrap();
        match reconcile_valuers(&r, &cols, "Villa 1", 7) {
            Err(ImportError::NoValuers { asset_name, row_index }) => {
                assert_eq!(asset_name, "Villa 1");
                assert_eq!(row_index, 7);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn total_of_99_is_rejected() {
        let r = two_valuer_row(text("59"), text("40"));
        let cols = detect_valuer_columns(&r).unwrap();
        match reconcile_valuers(&r, &cols, "Villa 1", 3) {
            Err(ImportError::PercentageMismatch { total, row_index, .. }) => {
                assert_eq!(total, 99.0);
                assert_eq!(row_index, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn float_noise_within_tolerance_passes() {
        let r = row(&[
            ("valuerId", text("1")),
            ("valuerName", text("A")),
            ("percentage", CellValue::Number(1.0 / 3.0)),
            ("valuerId_1", text("2")),
            ("valuerName_1", text("B")),
            ("percentage_1", CellValue::Number(1.0 / 3.0)),
            ("valuerId_2", text("3")),
            ("valuerName_2", text("C")),
            ("percentage_2", CellValue::Number(1.0 / 3.0)),
        ]);
        let cols = detect_valuer_columns(&r).unwrap();
        let valuers = reconcile_valuers(&r, &cols, "Flat", 1).unwrap();
        let sum: f64 = valuers.iter().map(|v| v.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.001);
    }
}
