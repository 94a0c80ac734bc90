//! Command-line front end.
//!
//! `docflow check` runs the validation gate only and prints one verdict per file as JSON.
//! `docflow upload` admits the files, uploads them through [`HttpTransport`], and prints the
//! final item records, summary, and counters as JSON. Progress is logged to stderr.

use crate::config::Config;
use crate::file::SourceFile;
use crate::item::{DocumentType, UploadItemRecord};
use crate::manager::UploadManager;
use crate::metrics::MetricsSnapshot;
use crate::orchestrator::{NewUpload, UploadSummary};
use crate::transport::HttpTransport;
use crate::validation::ValidationVerdict;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Top-level arguments.
#[derive(Debug, Parser)]
#[command(
    name = "docflow",
    version,
    about = "Validate and upload documents with a bounded upload queue"
)]
pub struct Cli {
    /// Action to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate files without uploading them.
    Check {
        /// Files or directories to inspect.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Validate files and upload the accepted ones.
    Upload {
        /// Classification attached to every file.
        #[arg(long, default_value = "other", value_parser = parse_document_type)]
        document_type: DocumentType,
        /// Override MAX_CONCURRENT_UPLOADS.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Upload one file at a time.
        #[arg(long)]
        sequential: bool,
        /// Files or directories to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// JSON document printed by `docflow upload`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    /// Files refused by the validation gate.
    pub rejected: Vec<ValidationVerdict>,
    /// Final state of every admitted item.
    pub items: Vec<UploadItemRecord>,
    /// Aggregate counts.
    pub summary: UploadSummary,
    /// Activity counters.
    pub metrics: MetricsSnapshot,
}

/// Run the parsed command. Returns `false` when any file was rejected or failed to upload.
pub async fn run(cli: Cli, config: &Config) -> Result<bool> {
    match cli.command {
        Command::Check { paths } => check(&paths, config),
        Command::Upload {
            document_type,
            concurrency,
            sequential,
            paths,
        } => {
            let mut config = config.clone();
            if let Some(concurrency) = concurrency {
                config.max_concurrent_uploads = concurrency;
            }
            config.sequential_uploads |= sequential;
            upload(&paths, document_type, &config).await
        }
    }
}

fn check(paths: &[PathBuf], config: &Config) -> Result<bool> {
    let files = load_files(paths)?;
    let verdicts = check_files(&files, config);
    let all_valid = verdicts.iter().all(|verdict| verdict.valid);
    println!(
        "{}",
        serde_json::to_string_pretty(&verdicts).context("failed to encode verdicts")?
    );
    Ok(all_valid)
}

fn check_files(files: &[SourceFile], config: &Config) -> Vec<ValidationVerdict> {
    config.validator().validate_batch(files, &[])
}

async fn upload(paths: &[PathBuf], document_type: DocumentType, config: &Config) -> Result<bool> {
    let files = load_files(paths)?;
    let transport = HttpTransport::from_config(config).context("failed to build HTTP transport")?;
    let manager = UploadManager::from_config(config, Arc::new(transport))
        .auto_start(true)
        .spawn();

    let uploads = files
        .into_iter()
        .map(|file| NewUpload::new(file).with_document_type(document_type))
        .collect();
    let admissions = manager.submit(uploads).await?;
    let rejected: Vec<ValidationVerdict> = admissions
        .into_iter()
        .filter(|admission| !admission.is_admitted())
        .map(|admission| admission.verdict)
        .collect();
    for verdict in &rejected {
        tracing::warn!(file_name = %verdict.file_name, reason = %verdict.summary(), "Skipped file");
    }

    let progress = tokio::spawn(log_progress(manager.subscribe()));
    manager.wait_idle().await?;
    progress.abort();

    let summary = manager.summary().await?;
    let report = UploadReport {
        rejected,
        items: manager.items().iter().map(|item| item.to_record()).collect(),
        summary,
        metrics: manager.metrics(),
    };
    manager.shutdown().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode upload report")?
    );
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        rejected = report.rejected.len(),
        "Upload run finished"
    );
    Ok(report.rejected.is_empty() && summary.failed == 0)
}

async fn log_progress(mut view: tokio::sync::watch::Receiver<Vec<crate::item::UploadItem>>) {
    let mut last_percent = -1.0_f64;
    while view.changed().await.is_ok() {
        let summary = UploadSummary::from_items(&view.borrow_and_update());
        let percent = summary.percent_complete().floor();
        if percent > last_percent {
            last_percent = percent;
            tracing::info!(
                percent,
                uploading = summary.uploading,
                completed = summary.completed,
                failed = summary.failed,
                "Upload progress"
            );
        }
    }
}

/// Expand `paths` into files, walking directories in name order.
pub fn collect_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry =
                    entry.with_context(|| format!("failed to walk {}", path.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("{} does not exist or is not a regular file", path.display());
        }
    }
    Ok(files)
}

fn load_files(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    collect_paths(paths)?
        .iter()
        .map(|path| open(path))
        .collect()
}

fn open(path: &Path) -> Result<SourceFile> {
    SourceFile::from_path(path).with_context(|| format!("failed to open {}", path.display()))
}

fn parse_document_type(value: &str) -> Result<DocumentType, String> {
    value.parse().map_err(|()| {
        format!(
            "unknown document type '{value}' (expected invoice, receipt, contract, statement, tax_return, report, or other)"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn directories_expand_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.pdf"), b"%PDF-1.4").unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("nested").join("c.csv"), b"x,y").unwrap();

        let files = collect_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.pdf", "c.csv"]);
    }

    #[test]
    fn missing_paths_are_reported() {
        let error = collect_paths(&[PathBuf::from("/definitely/not/here.pdf")]).unwrap_err();
        assert!(error.to_string().contains("does not exist"));
    }

    #[test]
    fn check_applies_the_configured_quota() {
        let mut body = b"%PDF-1.7\n".to_vec();
        body.resize(4096, b' ');
        let files = vec![SourceFile::from_bytes("scan.pdf", "application/pdf", 0, body)];

        let unlimited = check_files(&files, &Config::default());
        assert!(unlimited[0].valid);

        let config = Config {
            quota_max_bytes: Some(10_000),
            quota_used_bytes: 8_000,
            ..Config::default()
        };
        let verdicts = check_files(&files, &config);
        assert!(!verdicts[0].valid);
        assert!(
            verdicts[0]
                .errors
                .iter()
                .any(|error| matches!(error, crate::validation::ValidationError::QuotaExceeded { .. }))
        );
    }

    #[test]
    fn document_type_flag_parses_tags() {
        assert_eq!(parse_document_type("tax-return"), Ok(DocumentType::TaxReturn));
        assert!(parse_document_type("memo").is_err());
    }

    #[test]
    fn upload_subcommand_parses_flags() {
        let cli = Cli::try_parse_from([
            "docflow",
            "upload",
            "--document-type",
            "invoice",
            "--concurrency",
            "2",
            "a.pdf",
        ])
        .unwrap();
        match cli.command {
            Command::Upload {
                document_type,
                concurrency,
                sequential,
                paths,
            } => {
                assert_eq!(document_type, DocumentType::Invoice);
                assert_eq!(concurrency, Some(2));
                assert!(!sequential);
                assert_eq!(paths, vec![PathBuf::from("a.pdf")]);
            }
            Command::Check { .. } => panic!("expected upload"),
        }
    }
}
