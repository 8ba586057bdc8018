//! Persistence seam for batch records.

use std::sync::Mutex;

use crate::error::StoreError;
use crate::types::{BatchRecord, BatchSummary, StoredRecord};

/// Durable store for assembled batch records.
///
/// `insert_batch` must be all-or-nothing: either every record is stored and
/// returned, or none is.
pub trait ReportStore {
    fn insert_batch(&self, records: &[BatchRecord]) -> Result<Vec<StoredRecord>, StoreError>;

    /// Batches created by `user_id`, newest first.
    fn list_batches(&self, user_id: &str) -> Result<Vec<BatchSummary>, StoreError>;

    /// Records of one batch in insertion order.
    fn batch_records(&self, batch_id: &str) -> Result<Vec<StoredRecord>, StoreError>;
}

/// In-process store, for embedding without a database and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportStore for MemoryStore {
    fn insert_batch(&self, records: &[BatchRecord]) -> Result<Vec<StoredRecord>, StoreError> {
        let mut guard = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let created_at = chrono::Utc::now().to_rfc3339();
        let first_id = guard.len() as i64 + 1;
        let created: Vec<StoredRecord> = records
            .iter()
            .enumerate()
            .map(|(i, record)| StoredRecord {
                id: first_id + i as i64,
                created_at: created_at.clone(),
                record: record.clone(),
            })
            .collect();
        guard.extend(created.iter().cloned());
        Ok(created)
    }

    fn list_batches(&self, user_id: &str) -> Result<Vec<BatchSummary>, StoreError> {
        let guard = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let mut out: Vec<BatchSummary> = Vec::new();
        for stored in guard.iter().filter(|s| s.record.user_id == user_id) {
            match out.iter_mut().find(|b| b.batch_id == stored.record.batch_id) {
                Some(summary) => summary.record_count += 1,
                None => out.push(BatchSummary {
                    batch_id: stored.record.batch_id.clone(),
                    user_id: stored.record.user_id.clone(),
                    record_count: 1,
                    created_at: stored.created_at.clone(),
                }),
            }
        }
        out.reverse();
        Ok(out)
    }

    fn batch_records(&self, batch_id: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let guard = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard
            .iter()
            .filter(|s| s.record.batch_id == batch_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValuerContribution;
    use chrono::NaiveDate;

    fn record(batch_id: &str, user_id: &str) -> BatchRecord {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        BatchRecord {
            batch_id: batch_id.into(),
            number_of_macros: 1,
            user_id: user_id.into(),
            user_phone: String::new(),
            company: None,
            title: String::new(),
            client_name: String::new(),
            purpose_id: String::new(),
            value_premise_id: String::new(),
            report_type: String::new(),
            valued_at: day,
            submitted_at: day,
            inspection_date: day,
            assumptions: String::new(),
            special_assumptions: String::new(),
            owner_name: String::new(),
            telephone: String::new(),
            email: String::new(),
            region: String::new(),
            city: String::new(),
            final_value: 0.0,
            asset_id: "1".into(),
            asset_name: "A".into(),
            asset_usage: String::new(),
            asset: serde_json::Value::Null,
            valuers: vec![ValuerContribution {
                valuer_id: "1".into(),
                valuer_name: "Sara".into(),
                percentage: 100.0,
            }],
            pdf_path: String::new(),
        }
    }

    #[test]
    fn ids_continue_across_batches() {
        let store = MemoryStore::new();
        let first = store.insert_batch(&[record("B-1", "u1"), record("B-1", "u1")]).unwrap();
        let second = store.insert_batch(&[record("B-2", "u1")]).unwrap();
        assert_eq!(first.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second[0].id, 3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.batch_records("B-1").unwrap(), first);
    }

    #[test]
    fn lists_batches_newest_first() {
        let store = MemoryStore::new();
        store.insert_batch(&[record("B-1", "u1"), record("B-1", "u1")]).unwrap();
        store.insert_batch(&[record("B-2", "u2")]).unwrap();
        store.insert_batch(&[record("B-3", "u1")]).unwrap();
        let listed: Vec<(String, u64)> = store
            .list_batches("u1")
            .unwrap()
            .into_iter()
            .map(|b| (b.batch_id, b.record_count))
            .collect();
        assert_eq!(listed, vec![("B-3".to_string(), 1), ("B-1".to_string(), 2)]);
    }
}
