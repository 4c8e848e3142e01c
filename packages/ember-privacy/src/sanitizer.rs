//! Three-level sanitization pipeline, strictly ordered and short-circuiting.
//! Level 1 rejects on keyword families, level 2 redacts structural matches
//! and project fingerprints, level 3 applies best-effort code transforms.
//! The decision and confidence derive from the total redaction count.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
	Result,
	keywords::{self, KeywordFamily},
	patterns::{self, Redaction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
	AllowAsIs,
	AllowAfterSanitization,
	RejectUnsanitizable,
	RejectBusinessLogic,
	RejectCredentials,
}

impl Decision {
	pub fn is_rejection(&self) -> bool {
		matches!(
			self,
			Self::RejectUnsanitizable | Self::RejectBusinessLogic | Self::RejectCredentials,
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizationLevel {
	None,
	Light,
	Moderate,
	Heavy,
	Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizationResult {
	pub decision: Decision,
	pub level: SanitizationLevel,
	/// 0-100; how sure the pipeline is about its decision.
	pub confidence: u8,
	pub original_text: String,
	pub sanitized_text: Option<String>,
	pub redactions: Vec<Redaction>,
	pub warnings: Vec<String>,
}

pub struct PatternSanitizer {
	email_allowlist: Vec<String>,
	fingerprints: Vec<String>,
}

impl PatternSanitizer {
	pub fn new(cfg: &ember_config::Privacy) -> Self {
		Self {
			email_allowlist: cfg.allowlist_email_domains.clone(),
			fingerprints: cfg.fingerprints.clone(),
		}
	}

	/// Merge in identifiers supplied by a fingerprint detector at runtime.
	pub fn add_fingerprints(&mut self, extra: impl IntoIterator<Item = String>) {
		for fingerprint in extra {
			if !self.fingerprints.contains(&fingerprint) {
				self.fingerprints.push(fingerprint);
			}
		}
	}

	pub fn fingerprints(&self) -> &[String] {
		&self.fingerprints
	}

	pub fn email_allowlist(&self) -> &[String] {
		&self.email_allowlist
	}

	/// Never errors: an unexpected scanning failure fails closed as
	/// `REJECT_UNSANITIZABLE` rather than letting text through unscanned.
	pub fn sanitize(&self, text: &str) -> SanitizationResult {
		match self.sanitize_inner(text) {
			Ok(result) => result,
			Err(err) => {
				tracing::error!(error = %err, "Sanitization failed; rejecting input.");

				SanitizationResult {
					decision: Decision::RejectUnsanitizable,
					level: SanitizationLevel::Reject,
					confidence: 90,
					original_text: text.to_string(),
					sanitized_text: None,
					redactions: Vec::new(),
					warnings: vec![format!("sanitization failed: {err}")],
				}
			},
		}
	}

	fn sanitize_inner(&self, text: &str) -> Result<SanitizationResult> {
		let mut warnings = Vec::new();

		// Level 1: keyword families. Credentials take precedence over
		// business logic; the other two families only warn.
		let hits = keywords::scan(text);

		if let Some(hit) = keywords::first_hit_in(&hits, KeywordFamily::Credentials) {
			return Ok(rejection(Decision::RejectCredentials, text, hit.keyword));
		}
		if let Some(hit) = keywords::first_hit_in(&hits, KeywordFamily::BusinessLogic) {
			return Ok(rejection(Decision::RejectBusinessLogic, text, hit.keyword));
		}

		for hit in &hits {
			if matches!(hit.family, KeywordFamily::Infrastructure | KeywordFamily::Personal) {
				warnings.push(format!("sensitive keyword present: {}", hit.keyword));
			}
		}

		// Level 2: structural detectors, then project fingerprints.
		let (sanitized, mut redactions) = patterns::redact(text, &self.email_allowlist)?;
		let (sanitized, fingerprint_redactions) =
			patterns::redact_fingerprints(&sanitized, &self.fingerprints);

		redactions.extend(fingerprint_redactions);

		// Level 3: best-effort code transforms; failures only warn.
		let sanitized = apply_code_transforms(sanitized, &mut redactions, &mut warnings);

		let total = redactions.len();
		let (decision, level, confidence) = classify(total);

		if level == SanitizationLevel::Heavy {
			warnings.push(format!("heavy sanitization: {total} redactions applied"));
		}

		let sanitized_text =
			if decision == Decision::RejectUnsanitizable { None } else { Some(sanitized) };

		Ok(SanitizationResult {
			decision,
			level,
			confidence,
			original_text: text.to_string(),
			sanitized_text,
			redactions,
			warnings,
		})
	}
}

fn rejection(decision: Decision, text: &str, keyword: &str) -> SanitizationResult {
	SanitizationResult {
		decision,
		level: SanitizationLevel::Reject,
		confidence: 95,
		original_text: text.to_string(),
		sanitized_text: None,
		redactions: Vec::new(),
		warnings: vec![format!("blocking keyword present: {keyword}")],
	}
}

fn classify(total: usize) -> (Decision, SanitizationLevel, u8) {
	match total {
		0 => (Decision::AllowAsIs, SanitizationLevel::None, 100),
		1..=3 => (Decision::AllowAfterSanitization, SanitizationLevel::Light, 95),
		4..=10 => (Decision::AllowAfterSanitization, SanitizationLevel::Moderate, 85),
		11..=20 => (Decision::AllowAfterSanitization, SanitizationLevel::Heavy, 75),
		_ => (Decision::RejectUnsanitizable, SanitizationLevel::Reject, 90),
	}
}

static RE_GENERIC_URL: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r#"\bhttps?://[^\s"')>\]]+"#).ok());
static RE_TABLE_NAME: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?i)\b(from|join|into|update)\s+([A-Za-z_][A-Za-z0-9_]*)").ok());

const GENERIC_ENDPOINT: &str = "https://api.example.com/v1/resource";
const GENERIC_TABLE: &str = "generic_table";

/// Structural code substitutions that keep algorithmic shape. Hosts already
/// pointing at example.com and identifiers already generic are left alone so
/// the pass stays idempotent.
fn apply_code_transforms(
	text: String,
	redactions: &mut Vec<Redaction>,
	warnings: &mut Vec<String>,
) -> String {
	let text = match RE_GENERIC_URL.as_ref() {
		Some(regex) => {
			let mut rebuilt = String::with_capacity(text.len());
			let mut cursor = 0;

			for hit in regex.find_iter(&text) {
				let host = url_host(hit.as_str());

				if host == "example.com" || host.ends_with(".example.com") {
					continue;
				}

				rebuilt.push_str(&text[cursor..hit.start()]);
				rebuilt.push_str(GENERIC_ENDPOINT);
				cursor = hit.end();
				redactions.push(Redaction {
					kind: "api_endpoint".to_string(),
					original: hit.as_str().to_string(),
					redacted: GENERIC_ENDPOINT.to_string(),
					reason: "project-specific API endpoint".to_string(),
				});
			}

			if cursor > 0 {
				rebuilt.push_str(&text[cursor..]);
				rebuilt
			} else {
				text
			}
		},
		None => {
			warnings.push("endpoint transform unavailable".to_string());

			text
		},
	};

	match RE_TABLE_NAME.as_ref() {
		Some(regex) => {
			let mut rebuilt = String::with_capacity(text.len());
			let mut cursor = 0;

			for captures in regex.captures_iter(&text) {
				let ident = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

				if ident.eq_ignore_ascii_case(GENERIC_TABLE) {
					continue;
				}

				let span = captures.get(2).map(|m| (m.start(), m.end())).unwrap_or_default();

				rebuilt.push_str(&text[cursor..span.0]);
				rebuilt.push_str(GENERIC_TABLE);
				cursor = span.1;
				redactions.push(Redaction {
					kind: "table_name".to_string(),
					original: ident.to_string(),
					redacted: GENERIC_TABLE.to_string(),
					reason: "project-specific table name".to_string(),
				});
			}

			if cursor > 0 {
				rebuilt.push_str(&text[cursor..]);
				rebuilt
			} else {
				text
			}
		},
		None => {
			warnings.push("table-name transform unavailable".to_string());

			text
		},
	}
}

fn url_host(url: &str) -> &str {
	let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
	let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);

	host.split_once(':').map(|(host, _)| host).unwrap_or(host)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sanitizer() -> PatternSanitizer {
		PatternSanitizer {
			email_allowlist: vec!["example.com".to_string()],
			fingerprints: vec!["my-app-prod".to_string()],
		}
	}

	fn ips(n: usize) -> String {
		(0..n).map(|i| format!("10.{}.{}.7", i / 200, i % 200)).collect::<Vec<_>>().join(" ")
	}

	#[test]
	fn password_short_circuits_to_reject_credentials() {
		let result = sanitizer().sanitize("the PASSWORD for staging is here");

		assert_eq!(result.decision, Decision::RejectCredentials);
		assert_eq!(result.confidence, 95);
		assert!(result.sanitized_text.is_none());
	}

	#[test]
	fn business_logic_rejects_when_no_credential_hit() {
		let result = sanitizer().sanitize("this document is CONFIDENTIAL");

		assert_eq!(result.decision, Decision::RejectBusinessLogic);
		assert!(result.sanitized_text.is_none());
	}

	#[test]
	fn clean_text_is_allowed_as_is() {
		let result = sanitizer().sanitize("a quick note about sorting algorithms");

		assert_eq!(result.decision, Decision::AllowAsIs);
		assert_eq!(result.level, SanitizationLevel::None);
		assert_eq!(result.confidence, 100);
		assert_eq!(result.sanitized_text.as_deref(), Some("a quick note about sorting algorithms"));
	}

	#[test]
	fn redaction_count_boundaries() {
		let cases = [
			(3, Decision::AllowAfterSanitization, SanitizationLevel::Light, 95),
			(4, Decision::AllowAfterSanitization, SanitizationLevel::Moderate, 85),
			(10, Decision::AllowAfterSanitization, SanitizationLevel::Moderate, 85),
			(11, Decision::AllowAfterSanitization, SanitizationLevel::Heavy, 75),
			(20, Decision::AllowAfterSanitization, SanitizationLevel::Heavy, 75),
			(21, Decision::RejectUnsanitizable, SanitizationLevel::Reject, 90),
		];

		for (count, decision, level, confidence) in cases {
			let result = sanitizer().sanitize(&ips(count));

			assert_eq!(result.redactions.len(), count, "count for {count}");
			assert_eq!(result.decision, decision, "decision for {count}");
			assert_eq!(result.level, level, "level for {count}");
			assert_eq!(result.confidence, confidence, "confidence for {count}");
		}
	}

	#[test]
	fn heavy_level_carries_a_warning() {
		let result = sanitizer().sanitize(&ips(12));

		assert!(result.warnings.iter().any(|w| w.contains("heavy sanitization")));
	}

	#[test]
	fn sanitize_is_idempotent_for_allowed_text() {
		let first = sanitizer().sanitize("host db.internal at 10.1.2.3, owner bob@corpmail.io");
		let sanitized = first.sanitized_text.unwrap();
		let second = sanitizer().sanitize(&sanitized);

		assert!(second.redactions.is_empty());
		assert_eq!(second.sanitized_text.as_deref(), Some(sanitized.as_str()));
	}

	#[test]
	fn fingerprint_never_survives_sanitization() {
		let result = sanitizer().sanitize("rollout of my-app-prod finished");

		assert!(!result.sanitized_text.unwrap().contains("my-app-prod"));
	}

	#[test]
	fn generic_endpoint_transform_spares_example_hosts() {
		let result = sanitizer().sanitize("GET https://api.example.com/v1/resource returns 200");

		assert_eq!(result.decision, Decision::AllowAsIs);
	}

	#[test]
	fn endpoint_transform_output_is_stable_on_resanitize() {
		let first = sanitizer().sanitize("call https://api.acme.io/users next");
		let sanitized = first.sanitized_text.unwrap();
		let second = sanitizer().sanitize(&sanitized);

		assert_eq!(second.decision, Decision::AllowAsIs);
		assert!(second.redactions.is_empty());
		assert_eq!(second.sanitized_text.as_deref(), Some(sanitized.as_str()));
	}

	#[test]
	fn table_names_become_generic() {
		let result = sanitizer().sanitize("SELECT id FROM customer_invoices WHERE total > 10");
		let sanitized = result.sanitized_text.unwrap();

		assert!(sanitized.contains("FROM generic_table"));
		assert!(result.redactions.iter().any(|r| r.kind == "table_name"));
	}

	#[test]
	fn infrastructure_keywords_warn_without_rejecting() {
		let result = sanitizer().sanitize("the kubeconfig is rotated monthly");

		assert!(!result.decision.is_rejection());
		assert!(result.warnings.iter().any(|w| w.contains("kubeconfig")));
	}
}
