use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the persistence layer, passed through to the caller unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Could not open Excel file: {0}")]
    Workbook(String),

    #[error("Excel must contain a sheet named '{sheet}'")]
    MissingSheet { sheet: String },

    #[error("Sheet '{sheet}' has no data rows")]
    EmptySheet { sheet: String },

    #[error("Report Info is missing a valid '{field}' date")]
    MissingReportDate { field: &'static str },

    #[error("Market sheet is missing valuer headers {missing:?}. If there are multiple valuers, use valuerId_1, valuerId_2, etc.")]
    MissingValuerColumns { missing: Vec<&'static str> },

    #[error("Asset \"{asset_name}\" (row {row_index}) has no valuers. At least one valuer is required.")]
    NoValuers { asset_name: String, row_index: usize },

    #[error("Asset \"{asset_name}\" (row {row_index}) has total valuers percentage = {total}%. It must be exactly 100%.")]
    PercentageMismatch {
        asset_name: String,
        row_index: usize,
        total: f64,
    },

    #[error("Placeholder document missing at {}", .path.display())]
    FallbackDocumentMissing { path: PathBuf },

    #[error("No valid asset rows found to create reports.")]
    NoValidAssets,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Caller-facing shape of an [`ImportError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
}

impl ImportError {
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Workbook(_) => "WorkbookError",
            ImportError::MissingSheet { .. } => "MissingSheetError",
            ImportError::EmptySheet { .. } => "EmptySheetError",
            ImportError::MissingReportDate { .. } => "MissingReportDateError",
            ImportError::MissingValuerColumns { .. } => "MissingValuerColumnsError",
            ImportError::NoValuers { .. } => "NoValuersError",
            ImportError::PercentageMismatch { .. } => "PercentageMismatchError",
            ImportError::FallbackDocumentMissing { .. } => "FallbackDocumentMissingError",
            ImportError::NoValidAssets => "NoValidAssetsError",
            ImportError::Store(_) => "StoreError",
        }
    }

    pub fn asset_name(&self) -> Option<&str> {
        match self {
            ImportError::NoValuers { asset_name, .. }
            | ImportError::PercentageMismatch { asset_name, .. } => Some(asset_name),
            _ => None,
        }
    }

    pub fn row_index(&self) -> Option<usize> {
        match self {
            ImportError::NoValuers { row_index, .. }
            | ImportError::PercentageMismatch { row_index, .. } => Some(*row_index),
            _ => None,
        }
    }

    pub fn to_failure(&self) -> ImportFailure {
        ImportFailure {
            kind: self.kind(),
            message: self.to_string(),
            asset_name: self.asset_name().map(String::from),
            row_index: self.row_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_failure_carries_row_context() {
        let err = ImportError::PercentageMismatch {
            asset_name: "Villa 3".into(),
            row_index: 4,
            total: 99.0,
        };
        let failure = err.to_failure();
        assert_eq!(failure.kind, "PercentageMismatchError");
        assert_eq!(failure.asset_name.as_deref(), Some("Villa 3"));
        assert_eq!(failure.row_index, Some(4));
        assert!(failure.message.contains("99%"), "{}", failure.message);
    }

    #[test]
    fn batch_level_failures_have_no_row() {
        let failure = ImportError::MissingSheet { sheet: "market".into() }.to_failure();
        assert_eq!(failure.kind, "MissingSheetError");
        assert_eq!(failure.asset_name, None);
        assert_eq!(failure.row_index, None);
        let json = serde_json::to_value(&failure).unwrap();
        assert!(json.get("rowIndex").is_none());
    }

    #[test]
    fn missing_columns_are_listed() {
        let err = ImportError::MissingValuerColumns {
            missing: vec!["valuerName", "percentage"],
        };
        assert!(err.to_string().contains(r#"["valuerName", "percentage"]"#));
    }
}
