use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::store::ReportStore;
use crate::types::{BatchRecord, BatchSummary, StoredRecord, ValuerContribution};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Throwaway database, used by tests and dry runs.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
            CREATE TABLE IF NOT EXISTS batch_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                number_of_macros INTEGER NOT NULL DEFAULT 1,
                user_id TEXT NOT NULL,
                user_phone TEXT NOT NULL,
                company TEXT,
                title TEXT NOT NULL,
                client_name TEXT NOT NULL,
                purpose_id TEXT NOT NULL,
                value_premise_id TEXT NOT NULL,
                report_type TEXT NOT NULL,
                valued_at TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                inspection_date TEXT NOT NULL,
                assumptions TEXT NOT NULL,
                special_assumptions TEXT NOT NULL,
                owner_name TEXT NOT NULL,
                telephone TEXT NOT NULL,
                email TEXT NOT NULL,
                region TEXT NOT NULL,
                city TEXT NOT NULL,
                final_value REAL NOT NULL,
                asset_id TEXT NOT NULL,
                asset_name TEXT NOT NULL,
                asset_usage TEXT NOT NULL,
                asset_json TEXT NOT NULL,
                valuers_json TEXT NOT NULL,
                pdf_path TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_batch_records_batch ON batch_records(batch_id);
            CREATE INDEX IF NOT EXISTS idx_batch_records_user ON batch_records(user_id);
            ",
        )?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }
}

const SELECT_RECORD: &str = "SELECT id, created_at, batch_id, number_of_macros, user_id, user_phone, company,
        title, client_name, purpose_id, value_premise_id, report_type,
        valued_at, submitted_at, inspection_date,
        assumptions, special_assumptions, owner_name, telephone, email,
        region, city, final_value, asset_id, asset_name, asset_usage,
        asset_json, valuers_json, pdf_path
     FROM batch_records";

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn stored_from_row(row: &Row) -> rusqlite::Result<StoredRecord> {
    let valuers: Vec<ValuerContribution> = json_column(row, 27)?;
    Ok(StoredRecord {
        id: row.get(0)?,
        created_at: row.get(1)?,
        record: BatchRecord {
            batch_id: row.get(2)?,
            number_of_macros: row.get::<_, i64>(3)? as u32,
            user_id: row.get(4)?,
            user_phone: row.get(5)?,
            company: row.get(6)?,
            title: row.get(7)?,
            client_name: row.get(8)?,
            purpose_id: row.get(9)?,
            value_premise_id: row.get(10)?,
            report_type: row.get(11)?,
            valued_at: date_column(row, 12)?,
            submitted_at: date_column(row, 13)?,
            inspection_date: date_column(row, 14)?,
            assumptions: row.get(15)?,
            special_assumptions: row.get(16)?,
            owner_name: row.get(17)?,
            telephone: row.get(18)?,
            email: row.get(19)?,
            region: row.get(20)?,
            city: row.get(21)?,
            final_value: row.get(22)?,
            asset_id: row.get(23)?,
            asset_name: row.get(24)?,
            asset_usage: row.get(25)?,
            asset: json_column(row, 26)?,
            valuers,
            pdf_path: row.get(28)?,
        },
    })
}

impl ReportStore for Db {
    /// All records go in under one transaction; any failure rolls the whole batch back.
    fn insert_batch(&self, records: &[BatchRecord]) -> Result<Vec<StoredRecord>, StoreError> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let mut created = Vec::with_capacity(records.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO batch_records
                 (created_at, batch_id, number_of_macros, user_id, user_phone, company,
                  title, client_name, purpose_id, value_premise_id, report_type,
                  valued_at, submitted_at, inspection_date,
                  assumptions, special_assumptions, owner_name, telephone, email,
                  region, city, final_value, asset_id, asset_name, asset_usage,
                  asset_json, valuers_json, pdf_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
            )?;
            for record in records {
                let asset_json = serde_json::to_string(&record.asset)?;
                let valuers_json = serde_json::to_string(&record.valuers)?;
                stmt.execute(params![
                    created_at,
                    record.batch_id,
                    record.number_of_macros as i64,
                    record.user_id,
                    record.user_phone,
                    record.company,
                    record.title,
                    record.client_name,
                    record.purpose_id,
                    record.value_premise_id,
                    record.report_type,
                    record.valued_at.format(DATE_FORMAT).to_string(),
                    record.submitted_at.format(DATE_FORMAT).to_string(),
                    record.inspection_date.format(DATE_FORMAT).to_string(),
                    record.assumptions,
                    record.special_assumptions,
                    record.owner_name,
                    record.telephone,
                    record.email,
                    record.region,
                    record.city,
                    record.final_value,
                    record.asset_id,
                    record.asset_name,
                    record.asset_usage,
                    asset_json,
                    valuers_json,
                    record.pdf_path,
                ])?;
                created.push(StoredRecord {
                    id: tx.last_insert_rowid(),
                    created_at: created_at.clone(),
                    record: record.clone(),
                });
            }
        }
        tx.commit()?;
        log::info!("[db] inserted {} record(s)", created.len());
        Ok(created)
    }

    fn list_batches(&self, user_id: &str) -> Result<Vec<BatchSummary>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT batch_id, user_id, COUNT(*), MIN(created_at), MIN(id) AS first_id
             FROM batch_records WHERE user_id = ?1
             GROUP BY batch_id, user_id
             ORDER BY first_id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(BatchSummary {
                batch_id: row.get(0)?,
                user_id: row.get(1)?,
                record_count: row.get::<_, i64>(2)? as u64,
                created_at: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn batch_records(&self, batch_id: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(&format!("{} WHERE batch_id = ?1 ORDER BY id", SELECT_RECORD))?;
        let rows = stmt
            .query_map(params![batch_id], stored_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
