//! Matching uploaded documents to asset rows by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ImportError;
use crate::text::{normalize_key, repair_misdecoded_text};
use crate::types::AttachmentFile;

/// Normalized attachment name (encoding repaired, extension stripped) -> staged path.
#[derive(Debug, Clone, Default)]
pub struct AttachmentIndex {
    by_key: HashMap<String, String>,
}

/// Lookup key for an uploaded filename: "Ø¯ Ù Øµ 1220.pdf" -> "د م ص 1220".
pub fn attachment_key(original_name: &str) -> String {
    let fixed = repair_misdecoded_text(original_name);
    let stem = Path::new(&fixed)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(fixed.as_str());
    normalize_key(stem)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

impl AttachmentIndex {
    /// Index every attachment; a later file with the same key replaces an earlier one.
    pub fn build(files: &[AttachmentFile]) -> Self {
        let mut by_key = HashMap::new();
        for file in files {
            let key = attachment_key(&file.original_name);
            log::debug!(
                "[attachments] raw name {:?} -> key {:?}",
                file.original_name,
                key
            );
            if key.is_empty() {
                continue;
            }
            let staged = absolute(Path::new(&file.staged_path));
            by_key.insert(key, staged.to_string_lossy().into_owned());
        }
        log::info!(
            "[attachments] {} file(s) received, {} distinct key(s)",
            files.len(),
            by_key.len()
        );
        Self { by_key }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Staged path for an already-normalized asset name, if one was uploaded.
    pub fn lookup(&self, asset_key: &str) -> Option<&str> {
        self.by_key.get(asset_key).map(String::as_str)
    }

    /// Document for the asset, or the fallback document when nothing matched.
    /// Fails only if the fallback itself is missing.
    pub fn resolve(&self, asset_key: &str, fallback: &Path) -> Result<String, ImportError> {
        if let Some(path) = self.lookup(asset_key) {
            return Ok(path.to_string());
        }
        log::warn!(
            "[attachments] no document for asset {:?}, using placeholder",
            asset_key
        );
        fallback_document(fallback)
    }
}

/// Absolute path of the placeholder document; it must exist.
pub fn fallback_document(fallback: &Path) -> Result<String, ImportError> {
    let path = absolute(fallback);
    if !path.is_file() {
        return Err(ImportError::FallbackDocumentMissing { path });
    }
    Ok(path.to_string_lossy().into_owned())
}
