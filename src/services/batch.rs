//! Batch assembly: one record per market row, validated as a whole and
//! written to the store in a single call.

use chrono::NaiveDate;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config::ImportConfig;
use crate::dates::coerce_date;
use crate::error::ImportError;
use crate::excel::{extract_sheets, ExtractedSheets, MARKET_SHEET, REPORT_SHEET};
use crate::services::attachments::AttachmentIndex;
use crate::services::valuers::{detect_valuer_columns, reconcile_valuers};
use crate::store::ReportStore;
use crate::text::normalize_key;
use crate::types::{AttachmentFile, BatchOutcome, BatchRecord, CallerIdentity, SheetRow};

/// Report-level fields from the first "Report Info" row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportInfo {
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
    /// Used when an asset row has no final value of its own.
    pub final_value: Option<f64>,
    pub asset_usage: String,
}

fn required_date(row: &SheetRow, field: &'static str) -> Result<NaiveDate, ImportError> {
    coerce_date(row.field(&[field])).ok_or(ImportError::MissingReportDate { field })
}

impl ReportInfo {
    pub fn from_row(row: &SheetRow) -> Result<Self, ImportError> {
        Ok(Self {
            title: row.text(&["title"]),
            client_name: row.text(&["client_name"]),
            purpose_id: row.text(&["purpose_id"]),
            value_premise_id: row.text(&["value_premise_id"]),
            report_type: row.text(&["report_type"]),
            valued_at: required_date(row, "valued_at")?,
            submitted_at: required_date(row, "submitted_at")?,
            inspection_date: required_date(row, "inspection_date")?,
            assumptions: row.text(&["assumptions"]),
            special_assumptions: row.text(&["special_assumptions"]),
            owner_name: row.text(&["owner_name"]),
            telephone: row.text(&["telephone"]),
            email: row.text(&["email"]),
            region: row.text(&["region"]),
            city: row.text(&["city"]),
            final_value: row.field(&["final_value", "value"]).as_number(),
            asset_usage: row.text(&["asset_usage_id", "asset_usage"]),
        })
    }
}

static LAST_BATCH_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `<prefix>-<millis>`; the millisecond part never repeats or goes backwards
/// within the process, even for batches started in the same millisecond.
pub fn next_batch_id(prefix: &str) -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_BATCH_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_BATCH_MILLIS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return format!("{}-{}", prefix, next),
            Err(actual) => last = actual,
        }
    }
}

fn or_fallback(own: String, fallback: &str) -> String {
    if own.is_empty() {
        fallback.to_string()
    } else {
        own
    }
}

/// Records built from one workbook, not yet persisted.
#[derive(Debug, Clone)]
pub struct AssembledBatch {
    pub batch_id: String,
    pub records: Vec<BatchRecord>,
}

/// Validate every row and build the batch. Any row-level failure aborts the
/// whole batch; nothing here touches the store.
pub fn assemble_batch(
    sheets: &ExtractedSheets,
    attachments: &[AttachmentFile],
    caller: &CallerIdentity,
    config: &ImportConfig,
) -> Result<AssembledBatch, ImportError> {
    let report_row = sheets.report_rows.first().ok_or_else(|| ImportError::EmptySheet {
        sheet: REPORT_SHEET.to_string(),
    })?;
    let report = ReportInfo::from_row(report_row)?;
    let first_asset = sheets.asset_rows.first().ok_or_else(|| ImportError::EmptySheet {
        sheet: MARKET_SHEET.to_string(),
    })?;
    let columns = detect_valuer_columns(first_asset)?;
    let index = AttachmentIndex::build(attachments);
    let batch_id = next_batch_id(&config.batch_prefix);

    let mut records = Vec::new();
    for (i, row) in sheets.asset_rows.iter().enumerate() {
        let row_index = i + 1;
        let asset_name = normalize_key(&row.field(&["asset_name"]).as_text());
        if asset_name.is_empty() {
            log::debug!("[batch] row {} skipped: no asset_name", row_index);
            continue;
        }
        let asset_id = or_fallback(row.text(&["id"]), &row_index.to_string());
        let client_name = format!("{} ({}) {}", report.client_name, asset_id, asset_name);

        let valuers = reconcile_valuers(row, &columns, &asset_name, row_index)?;
        let pdf_path = index.resolve(&asset_name, &config.fallback_document)?;

        let final_value = row
            .field(&["final_value"])
            .as_number()
            .or(report.final_value)
            .unwrap_or(0.0);

        records.push(BatchRecord {
            batch_id: batch_id.clone(),
            number_of_macros: 1,
            user_id: caller.user_id.clone(),
            user_phone: caller.phone.clone(),
            company: caller.company.clone(),

            title: report.title.clone(),
            client_name,
            purpose_id: report.purpose_id.clone(),
            value_premise_id: report.value_premise_id.clone(),
            report_type: report.report_type.clone(),
            valued_at: report.valued_at,
            submitted_at: report.submitted_at,
            inspection_date: report.inspection_date,
            assumptions: report.assumptions.clone(),
            special_assumptions: report.special_assumptions.clone(),
            owner_name: report.owner_name.clone(),
            telephone: report.telephone.clone(),
            email: report.email.clone(),

            region: or_fallback(row.text(&["region"]), &report.region),
            city: or_fallback(row.text(&["city"]), &report.city),
            final_value,
            asset_id,
            asset_name,
            asset_usage: or_fallback(
                row.text(&["asset_usage_id", "asset_usage"]),
                &report.asset_usage,
            ),
            asset: row.to_json(),

            valuers,
            pdf_path,
        });
    }

    if records.is_empty() {
        return Err(ImportError::NoValidAssets);
    }
    Ok(AssembledBatch { batch_id, records })
}

/// Pipeline entry point: workbook + attachments + caller in, persisted batch out.
pub struct BatchImporter<'a> {
    config: &'a ImportConfig,
    store: &'a dyn ReportStore,
}

impl<'a> BatchImporter<'a> {
    pub fn new(config: &'a ImportConfig, store: &'a dyn ReportStore) -> Self {
        Self { config, store }
    }

    pub fn ingest(
        &self,
        workbook_path: &Path,
        attachments: &[AttachmentFile],
        caller: &CallerIdentity,
    ) -> Result<BatchOutcome, ImportError> {
        let sheets = extract_sheets(workbook_path)?;
        let batch = assemble_batch(&sheets, attachments, caller, self.config)?;
        let created = self.store.insert_batch(&batch.records)?;
        log::info!(
            "[batch] import success: batch_id={} inserted={}",
            batch.batch_id,
            created.len()
        );
        Ok(BatchOutcome {
            batch_id: batch.batch_id,
            count: created.len(),
            created,
        })
    }
}
