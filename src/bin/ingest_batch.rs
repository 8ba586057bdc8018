//! Import a valuation batch workbook from the command line.
//!
//! Usage: ingest_batch <workbook.xlsx> --attachments-dir <dir> --user-id <id> --phone <phone>
//!        ingest_batch --list-batches --user-id <id>
//!        ingest_batch --show-batch <batch_id>

use anyhow::{bail, Context, Result};
use batch_importer_lib::{
    AttachmentFile, BatchImporter, CallerIdentity, Db, ImportConfig, MemoryStore, ReportStore,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ingest_batch", about = "Import a Report Info + market workbook as one batch")]
struct Args {
    /// Workbook with "Report Info" and "market" sheets
    workbook: Option<PathBuf>,

    /// Directory whose files are offered as attachments (repeatable)
    #[arg(long = "attachments-dir")]
    attachments_dirs: Vec<PathBuf>,

    /// Single attachment file (repeatable)
    #[arg(long = "attachment")]
    attachments: Vec<PathBuf>,

    #[arg(long, env = "BATCH_USER_ID")]
    user_id: Option<String>,

    #[arg(long, env = "BATCH_USER_PHONE", default_value = "")]
    phone: String,

    #[arg(long)]
    company: Option<String>,

    /// SQLite database (defaults to BATCH_DB_PATH or the app data dir)
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long)]
    fallback_document: Option<PathBuf>,

    /// Batch id prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Validate and assemble without writing to the database
    #[arg(long)]
    dry_run: bool,

    /// List batches for --user-id
    #[arg(long, conflicts_with = "workbook")]
    list_batches: bool,

    /// Print the records of one batch
    #[arg(long, conflicts_with = "workbook")]
    show_batch: Option<String>,
}

fn collect_attachments(args: &Args) -> Result<Vec<AttachmentFile>> {
    let mut paths: Vec<PathBuf> = args.attachments.clone();
    for dir in &args.attachments_dirs {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading attachments dir {}", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        paths.extend(entries);
    }
    Ok(paths
        .into_iter()
        .map(|p| AttachmentFile {
            original_name: p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            staged_path: p.to_string_lossy().into_owned(),
        })
        .collect())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_ingest(args: &Args, workbook: &Path, config: &ImportConfig) -> Result<ExitCode> {
    let Some(user_id) = args.user_id.clone() else {
        bail!("--user-id is required to import a batch");
    };
    let caller = CallerIdentity {
        user_id,
        phone: args.phone.clone(),
        company: args.company.clone(),
    };
    let attachments = collect_attachments(args)?;

    let memory;
    let db;
    let store: &dyn ReportStore = if args.dry_run {
        memory = MemoryStore::new();
        &memory
    } else {
        db = Db::new(&config.db_path).context("opening database")?;
        &db
    };

    match BatchImporter::new(config, store).ingest(workbook, &attachments, &caller) {
        Ok(outcome) => {
            print_json(&outcome)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            log::error!("[batch] import failed: {}", err);
            print_json(&err.to_failure())?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();
    let mut config = ImportConfig::from_env();
    if let Some(db) = &args.db {
        config.db_path = db.clone();
    }
    if let Some(fallback) = &args.fallback_document {
        config.fallback_document = fallback.clone();
    }
    if let Some(prefix) = &args.prefix {
        config.batch_prefix = prefix.clone();
    }

    if args.list_batches {
        let Some(user_id) = &args.user_id else {
            bail!("--list-batches needs --user-id");
        };
        let db = Db::new(&config.db_path).context("opening database")?;
        print_json(&db.list_batches(user_id)?)?;
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(batch_id) = &args.show_batch {
        let db = Db::new(&config.db_path).context("opening database")?;
        print_json(&db.batch_records(batch_id)?)?;
        return Ok(ExitCode::SUCCESS);
    }

    match &args.workbook {
        Some(workbook) => run_ingest(&args, workbook, &config),
        None => bail!("a workbook path is required (or use --list-batches / --show-batch)"),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
