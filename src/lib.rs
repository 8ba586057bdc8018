//! Valuation batch importer: turns a "Report Info" + "market" workbook and its
//! uploaded documents into validated batch records, stored all-or-nothing.

pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod excel;
pub mod services;
pub mod store;
pub mod text;
pub mod types;

pub use config::ImportConfig;
pub use db::Db;
pub use error::{ImportError, ImportFailure, StoreError};
pub use services::batch::{assemble_batch, next_batch_id, BatchImporter};
pub use store::{MemoryStore, ReportStore};
pub use types::{
    AttachmentFile, BatchOutcome, BatchRecord, BatchSummary, CallerIdentity, StoredRecord,
    ValuerContribution,
};
