use std::path::PathBuf;

pub const DEFAULT_BATCH_PREFIX: &str = "ELR";
pub const DEFAULT_FALLBACK_DOCUMENT: &str = "uploads/static/dummy_placeholder.pdf";

/// Settings for one importer instance.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Placeholder document used when no attachment matches an asset.
    /// Relative paths resolve against the working directory.
    pub fallback_document: PathBuf,
    /// Batch ids look like `<prefix>-<millis>`.
    pub batch_prefix: String,
    pub db_path: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            fallback_document: PathBuf::from(DEFAULT_FALLBACK_DOCUMENT),
            batch_prefix: DEFAULT_BATCH_PREFIX.to_string(),
            db_path: default_db_path(),
        }
    }
}

/// `<data dir>/batch-importer/batch_importer.db`, or the working directory if
/// the platform has no data dir.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("batch-importer"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("batch_importer.db")
}


impl ImportConfig {
    /// Defaults overridden by `BATCH_FALLBACK_DOCUMENT`, `BATCH_ID_PREFIX` and
    /// `BATCH_DB_PATH`. A `.env` file in the working directory is loaded first.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns; blank values are ignored.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty_var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();
        if let Some(v) = non_empty_var("BATCH_FALLBACK_DOCUMENT") {
            config.fallback_document = PathBuf::from(v);
        }
        if let Some(v) = non_empty_var("BATCH_ID_PREFIX") {
            config.batch_prefix = v;
        }
        if let Some(v) = non_empty_var("BATCH_DB_PATH") {
            config.db_path = PathBuf::from(v);
        }
        config
    }
}
