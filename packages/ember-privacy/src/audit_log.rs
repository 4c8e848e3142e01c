//! Append-only audit persistence: a JSONL trail with one finding-bearing
//! entry per line, plus a standalone JSON report file per batch run. Entries
//! are never rewritten; concurrent processes each append whole lines.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{AuditFinding, AuditReport, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
	pub run_id: Uuid,
	#[serde(with = "time::serde::rfc3339")]
	pub recorded_at: OffsetDateTime,
	pub finding: AuditFinding,
}

pub struct AuditLog {
	log_path: PathBuf,
	report_dir: PathBuf,
}

impl AuditLog {
	pub fn new(cfg: &ember_config::Privacy) -> Self {
		Self { log_path: cfg.audit_log_path.clone(), report_dir: cfg.audit_report_dir.clone() }
	}

	pub fn log_path(&self) -> &Path {
		&self.log_path
	}

	pub async fn append(&self, run_id: Uuid, finding: &AuditFinding) -> Result<()> {
		let entry = LogEntry {
			run_id,
			recorded_at: OffsetDateTime::now_utc(),
			finding: finding.clone(),
		};
		let mut line = serde_json::to_string(&entry)?;

		line.push('\n');

		if let Some(parent) = self.log_path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.log_path)
			.await?;

		file.write_all(line.as_bytes()).await?;
		file.flush().await?;

		Ok(())
	}

	pub async fn write_report(&self, report: &AuditReport) -> Result<PathBuf> {
		tokio::fs::create_dir_all(&self.report_dir).await?;

		let path = self.report_dir.join(format!("audit-{}.json", report.run_id));
		let raw = serde_json::to_vec_pretty(report)?;

		tokio::fs::write(&path, raw).await?;

		Ok(path)
	}
}
