use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::text::header_key;

/// Raw scalar read from a worksheet cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Text form of the cell; whole numbers print without a fraction ("1234", not "1234.0").
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Date(dt) => dt.format("%Y-%m-%d").to_string(),
        }
    }

    /// Numeric value of the cell, if it has one. Text is parsed after trimming.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Empty => serde_json::Value::String(String::new()),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Date(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One data row of a sheet: every sheet header, in column order, with its cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    cells: Vec<(String, CellValue)>,
    /// `header_key` of each header, same order as `cells`.
    keys: Vec<String>,
}

impl SheetRow {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        let keys = cells.iter().map(|(h, _)| header_key(h)).collect();
        Self { cells, keys }
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }

    /// Cell under the exact header. Missing headers read as empty.
    pub fn get(&self, header: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v)
            .unwrap_or(&EMPTY)
    }

    /// First non-empty cell whose header matches one of `names` tolerantly
    /// (case, surrounding whitespace and inner spaces vs underscores are ignored).
    pub fn field(&self, names: &[&str]) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        for name in names {
            let wanted = header_key(name);
            let hit = self
                .keys
                .iter()
                .zip(&self.cells)
                .find(|(key, (_, v))| **key == wanted && !v.is_empty());
            if let Some((_, (_, v))) = hit {
                return v;
            }
        }
        &EMPTY
    }

    /// Trimmed text of [`SheetRow::field`].
    pub fn text(&self, names: &[&str]) -> String {
        self.field(names).as_text().trim().to_string()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| match v {
            CellValue::Text(s) => s.trim().is_empty(),
            other => other.is_empty(),
        })
    }

    /// Row as a JSON object keyed by header, kept on each record for traceability.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .cells
            .iter()
            .map(|(h, v)| (h.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuerContribution {
    pub valuer_id: String,
    pub valuer_name: String,
    pub percentage: f64,
}

/// Uploaded document as staged by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentFile {
    /// Filename as sent by the client (possibly mis-decoded).
    pub original_name: String,
    pub staged_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: String,
    pub phone: String,
    #[serde(default)]
    pub company: Option<String>,
}

/// One valuation line item ready for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: String,
    pub number_of_macros: u32,
    pub user_id: String,
    pub user_phone: String,
    pub company: Option<String>,

    pub title: String,
    pub client_name: String,
    pub purpose_id: String,
    pub value_premise_id: String,
    pub report_type: String,
    pub valued_at: NaiveDate,
    pub submitted_at: NaiveDate,
    pub inspection_date: NaiveDate,
    pub assumptions: String,
    pub special_assumptions: String,
    pub owner_name: String,
    pub telephone: String,
    pub email: String,

    pub region: String,
    pub city: String,
    pub final_value: f64,
    pub asset_id: String,
    pub asset_name: String,
    pub asset_usage: String,
    /// Full market row as uploaded.
    pub asset: serde_json::Value,

    pub valuers: Vec<ValuerContribution>,
    pub pdf_path: String,
}

/// A record as returned by the store after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub created_at: String,
    #[serde(flatten)]
    pub record: BatchRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: String,
    pub user_id: String,
    pub record_count: u64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub batch_id: String,
    pub created: Vec<StoredRecord>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> SheetRow {
        SheetRow::new(vec![
            ("id".into(), CellValue::Number(7.0)),
            ("Valued At\n".into(), CellValue::Text("05-03-2024".into())),
            ("region".into(), CellValue::Empty),
            ("Region".into(), CellValue::Text(" Riyadh ".into())),
            ("value".into(), CellValue::Text(" 1500.5 ".into())),
        ])
    }

    #[test]
    fn whole_numbers_print_as_integers() {
        assert_eq!(CellValue::Number(1234.0).as_text(), "1234");
        assert_eq!(CellValue::Number(0.25).as_text(), "0.25");
    }

    #[test]
    fn exact_lookup_defaults_to_empty() {
        let r = row();
        assert_eq!(r.get("id"), &CellValue::Number(7.0));
        assert_eq!(r.get("missing"), &CellValue::Empty);
    }

    #[test]
    fn tolerant_lookup_skips_empty_duplicates() {
        let r = row();
        assert_eq!(r.text(&["valued_at"]), "05-03-2024");
        assert_eq!(r.text(&["region"]), "Riyadh");
        assert_eq!(r.text(&["nope", "id"]), "7");
        assert_eq!(r.field(&["value"]).as_number(), Some(1500.5));
    }

    #[test]
    fn header_keys_are_folded_once_at_construction() {
        let r = row();
        assert_eq!(r.keys, vec!["id", "valued_at", "region", "region", "value"]);
        assert_eq!(r.headers().nth(1), Some("Valued At\n"));
    }

    #[test]
    fn blank_rows_are_detected() {
        let blank = SheetRow::new(vec![
            ("a".into(), CellValue::Empty),
            ("b".into(), CellValue::Text("  ".into())),
        ]);
        assert!(blank.is_blank());
        assert!(!row().is_blank());
    }
}
