//! Pre-storage privacy audit. Re-applies the structural and fingerprint
//! checks but classifies each hit by severity and recommended action rather
//! than a binary decision, and never logs a leaked value in full.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AuditLog, PatternSanitizer, patterns};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
	Info,
	Low,
	Medium,
	High,
	Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
	Allow,
	Warn,
	Quarantine,
	Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFinding {
	pub pattern_id: String,
	pub severity: Severity,
	pub action: Action,
	pub finding: String,
	pub leaked_value_preview: String,
	pub location: String,
	pub recommendation: String,
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
	pub run_id: Uuid,
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	pub patterns_scanned: usize,
	pub findings: Vec<AuditFinding>,
	pub severity_counts: BTreeMap<String, usize>,
	pub action_counts: BTreeMap<String, usize>,
}

impl AuditReport {
	pub fn summary(&self) -> String {
		let mut lines = vec![format!(
			"audit run {}: {} patterns scanned, {} findings",
			self.run_id,
			self.patterns_scanned,
			self.findings.len(),
		)];

		for (severity, count) in &self.severity_counts {
			lines.push(format!("  {severity}: {count}"));
		}

		lines.join("\n")
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
	Allow,
	Quarantine,
	Reject,
}

#[derive(Debug, Serialize)]
pub struct PatternValidation {
	pub is_safe: bool,
	pub findings: Vec<AuditFinding>,
	pub recommendation: Recommendation,
}

pub struct PrivacyAuditor {
	sanitizer: PatternSanitizer,
	log: AuditLog,
}

impl PrivacyAuditor {
	pub fn new(cfg: &ember_config::Privacy) -> Self {
		Self { sanitizer: PatternSanitizer::new(cfg), log: AuditLog::new(cfg) }
	}

	pub fn sanitizer_mut(&mut self) -> &mut PatternSanitizer {
		&mut self.sanitizer
	}

	/// Scan one candidate pattern. Structural matches and fingerprint hits
	/// each yield a classified finding; a scan failure yields a single
	/// fail-closed critical finding instead of silence.
	pub fn audit_before_storage(&self, pattern: &str) -> Vec<AuditFinding> {
		let now = OffsetDateTime::now_utc();
		let mut findings = Vec::new();

		match patterns::find_all(pattern, self.sanitizer.email_allowlist()) {
			Ok(matches) =>
				for hit in matches {
					let (severity, action) = classify(hit.detector);

					findings.push(AuditFinding {
						pattern_id: hit.detector.to_string(),
						severity,
						action,
						finding: format!("{} detected in pattern", hit.detector),
						leaked_value_preview: preview(&hit.value),
						location: format!("offset {}", hit.start),
						recommendation: recommendation_text(action),
						timestamp: now,
					});
				},
			Err(err) => {
				tracing::error!(error = %err, "Pattern scan failed; recording critical finding.");
				findings.push(AuditFinding {
					pattern_id: "scan_failure".to_string(),
					severity: Severity::Critical,
					action: Action::Quarantine,
					finding: format!("pattern scan failed: {err}"),
					leaked_value_preview: "[REDACTED]".to_string(),
					location: "n/a".to_string(),
					recommendation: recommendation_text(Action::Quarantine),
					timestamp: now,
				});
			},
		}

		for fingerprint in self.sanitizer.fingerprints() {
			for (offset, _) in pattern.match_indices(fingerprint.as_str()) {
				let (severity, action) = classify("fingerprint");

				findings.push(AuditFinding {
					pattern_id: "fingerprint".to_string(),
					severity,
					action,
					finding: "project fingerprint identifier detected in pattern".to_string(),
					leaked_value_preview: preview(fingerprint),
					location: format!("offset {offset}"),
					recommendation: recommendation_text(action),
					timestamp: now,
				});
			}
		}

		findings
	}

	/// Batch audit over a corpus. Appends every finding to the JSONL audit
	/// log and writes a standalone report file named by the run id; audit
	/// persistence failures are logged and swallowed, never surfaced.
	pub async fn audit_public_rag_patterns(&self, patterns: &[String]) -> AuditReport {
		let run_id = Uuid::now_v7();
		let started_at = OffsetDateTime::now_utc();
		let mut findings = Vec::new();

		for pattern in patterns {
			findings.extend(self.audit_before_storage(pattern));
		}

		let mut severity_counts = BTreeMap::new();
		let mut action_counts = BTreeMap::new();

		for finding in &findings {
			*severity_counts.entry(format!("{:?}", finding.severity)).or_insert(0) += 1;
			*action_counts.entry(format!("{:?}", finding.action)).or_insert(0) += 1;
		}

		let report = AuditReport {
			run_id,
			started_at,
			patterns_scanned: patterns.len(),
			findings,
			severity_counts,
			action_counts,
		};

		for finding in &report.findings {
			if let Err(err) = self.log.append(run_id, finding).await {
				tracing::error!(error = %err, "Failed to append audit log entry.");
			}
		}
		if let Err(err) = self.log.write_report(&report).await {
			tracing::error!(error = %err, "Failed to write audit report.");
		}

		tracing::info!(
			run_id = %run_id,
			patterns = report.patterns_scanned,
			findings = report.findings.len(),
			"Completed batch privacy audit.",
		);

		report
	}

	/// Sanitizer decision and audit findings folded into one recommendation.
	pub fn validate_pattern(&self, pattern: &str) -> PatternValidation {
		let sanitization = self.sanitizer.sanitize(pattern);

		self.validate_sanitized(&sanitization, pattern)
	}

	/// Compose an already-computed sanitizer verdict with the structural
	/// audit, so callers holding a [`SanitizationResult`] do not pay for a
	/// second sanitization pass over the same text.
	pub fn validate_sanitized(
		&self,
		sanitization: &crate::SanitizationResult,
		pattern: &str,
	) -> PatternValidation {
		let findings = self.audit_before_storage(pattern);
		let recommendation = if sanitization.decision.is_rejection()
			|| findings.iter().any(|finding| finding.action == Action::Delete)
		{
			Recommendation::Reject
		} else if findings.iter().any(|finding| finding.action == Action::Quarantine) {
			Recommendation::Quarantine
		} else {
			Recommendation::Allow
		};

		PatternValidation { is_safe: recommendation == Recommendation::Allow, findings, recommendation }
	}

	pub fn sanitize(&self, text: &str) -> crate::SanitizationResult {
		self.sanitizer.sanitize(text)
	}
}

fn classify(pattern_id: &str) -> (Severity, Action) {
	match pattern_id {
		"service_account" | "connection_string" => (Severity::Critical, Action::Delete),
		"project_id" | "fingerprint" | "aws_arn" => (Severity::High, Action::Quarantine),
		"platform_url" | "private_hostname" | "ipv4" | "email" => (Severity::Medium, Action::Warn),
		"service_name" | "home_path" | "absolute_path" => (Severity::Low, Action::Warn),
		_ => (Severity::Info, Action::Allow),
	}
}

fn recommendation_text(action: Action) -> String {
	match action {
		Action::Allow => "safe to share as is".to_string(),
		Action::Warn => "review before sharing".to_string(),
		Action::Quarantine => "hold back from the shared store until cleared".to_string(),
		Action::Delete => "remove from the shared store immediately".to_string(),
	}
}

/// Never echo a leaked value in full: first four and last four characters
/// with an ellipsis, or a fixed marker for short values.
pub fn preview(value: &str) -> String {
	let chars: Vec<char> = value.chars().collect();

	if chars.len() <= 8 {
		return "[REDACTED]".to_string();
	}

	let head: String = chars[..4].iter().collect();
	let tail: String = chars[chars.len() - 4..].iter().collect();

	format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg(dir: &std::path::Path) -> ember_config::Privacy {
		ember_config::Privacy {
			allowlist_email_domains: vec!["example.com".to_string()],
			fingerprints: vec!["my-app-prod".to_string()],
			audit_log_path: dir.join("audit.jsonl"),
			audit_report_dir: dir.join("reports"),
		}
	}

	#[test]
	fn preview_keeps_first_and_last_four() {
		assert_eq!(preview("my-app-123456-ab"), "my-a...6-ab");
	}

	#[test]
	fn short_values_are_fully_redacted() {
		assert_eq!(preview("12345678"), "[REDACTED]");
	}

	#[test]
	fn project_id_yields_high_quarantine_finding() {
		let dir = tempfile::tempdir().unwrap();
		let auditor = PrivacyAuditor::new(&cfg(dir.path()));
		let findings = auditor.audit_before_storage("my-app-123456-ab");

		assert_eq!(findings.len(), 1);
		assert_eq!(findings[0].severity, Severity::High);
		assert_eq!(findings[0].action, Action::Quarantine);
		assert_eq!(findings[0].leaked_value_preview, "my-a...6-ab");
	}

	#[test]
	fn service_account_is_critical() {
		let dir = tempfile::tempdir().unwrap();
		let auditor = PrivacyAuditor::new(&cfg(dir.path()));
		let findings =
			auditor.audit_before_storage("uses bot@my-app-123456.iam.gserviceaccount.com");

		assert_eq!(findings.len(), 1);
		assert_eq!(findings[0].severity, Severity::Critical);
		assert_eq!(findings[0].action, Action::Delete);
	}

	#[test]
	fn validate_pattern_rejects_on_delete_findings() {
		let dir = tempfile::tempdir().unwrap();
		let auditor = PrivacyAuditor::new(&cfg(dir.path()));
		let validation =
			auditor.validate_pattern("uses bot@my-app-123456.iam.gserviceaccount.com");

		assert!(!validation.is_safe);
		assert_eq!(validation.recommendation, Recommendation::Reject);
	}

	#[test]
	fn precomputed_sanitization_validates_like_a_fresh_scan() {
		let dir = tempfile::tempdir().unwrap();
		let auditor = PrivacyAuditor::new(&cfg(dir.path()));
		let pattern = "uses bot@my-app-123456.iam.gserviceaccount.com";
		let sanitization = auditor.sanitize(pattern);
		let composed = auditor.validate_sanitized(&sanitization, pattern);
		let fresh = auditor.validate_pattern(pattern);

		assert_eq!(composed.recommendation, fresh.recommendation);
		assert_eq!(composed.is_safe, fresh.is_safe);
		assert_eq!(composed.findings.len(), fresh.findings.len());
	}

	#[test]
	fn validate_pattern_allows_clean_text() {
		let dir = tempfile::tempdir().unwrap();
		let auditor = PrivacyAuditor::new(&cfg(dir.path()));
		let validation = auditor.validate_pattern("notes on binary search invariants");

		assert!(validation.is_safe);
		assert_eq!(validation.recommendation, Recommendation::Allow);
	}

	#[tokio::test]
	async fn batch_audit_writes_log_and_report() {
		let dir = tempfile::tempdir().unwrap();
		let config = cfg(dir.path());
		let auditor = PrivacyAuditor::new(&config);
		let report = auditor
			.audit_public_rag_patterns(&["my-app-123456-ab lives at 10.0.0.1".to_string()])
			.await;

		assert_eq!(report.patterns_scanned, 1);
		assert_eq!(report.findings.len(), 2);

		let log = std::fs::read_to_string(&config.audit_log_path).unwrap();

		assert_eq!(log.lines().count(), 2);

		let report_path =
			config.audit_report_dir.join(format!("audit-{}.json", report.run_id));

		assert!(report_path.exists());
	}
}
