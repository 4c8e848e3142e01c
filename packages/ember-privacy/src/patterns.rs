//! Level-2 structural detectors. An ordered table of compiled regexes, most
//! specific first, each with a canonical type-specific placeholder. Ordering
//! matters: a service-account email must be claimed as one service-account
//! match, not chewed into a project id plus an email.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub struct Detector {
	pub id: &'static str,
	pub regex: &'static LazyLock<Option<Regex>>,
	pub placeholder: &'static str,
	pub reason: &'static str,
}

macro_rules! detector_regex {
	($name:ident, $pattern:expr) => {
		static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($pattern).ok());
	};
}

detector_regex!(
	RE_SERVICE_ACCOUNT,
	r"\b[a-z0-9][a-z0-9-]*@[a-z0-9][a-z0-9-]*\.iam\.gserviceaccount\.com\b"
);
detector_regex!(
	RE_CONNECTION_STRING,
	r#"\b(?:postgres(?:ql)?|mysql|mariadb|mongodb(?:\+srv)?|redis|amqps?)://[^\s"']+"#
);
detector_regex!(
	RE_PLATFORM_URL,
	r#"\bhttps?://[a-z0-9.-]+\.(?:run\.app|cloudfunctions\.net|appspot\.com|herokuapp\.com|vercel\.app)[^\s"']*"#
);
detector_regex!(RE_AWS_ARN, r#"\barn:aws:[a-z0-9-]+:[a-z0-9-]*:\d*:[^\s"',]+"#);
detector_regex!(
	RE_PROJECT_ID,
	r"\b[a-z][a-z0-9]*(?:-[a-z0-9]+)*-\d{4,}(?:-[a-z0-9]{1,12})?\b"
);
detector_regex!(
	RE_PRIVATE_HOSTNAME,
	r"\b[a-z][a-z0-9-]*(?:\.[a-z0-9-]+)*\.(?:internal|local|corp|lan)\b"
);
detector_regex!(
	RE_IPV4,
	r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b"
);
detector_regex!(RE_EMAIL, r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b");
detector_regex!(RE_SERVICE_NAME, r"\b(?:db|database|svc|service)[-_][a-z][a-z0-9_-]{2,}\b");
detector_regex!(
	RE_HOME_PATH,
	r"(?:/home/|/Users/|C:\\Users\\)[A-Za-z0-9._-]+(?:[/\\][\w.-]+)*"
);
detector_regex!(RE_ABSOLUTE_PATH, r"(?:[A-Za-z]:\\(?:[\w.-]+\\)+[\w.-]+|/(?:[\w.-]+/){2,}[\w.-]+)");

pub static DETECTORS: &[Detector] = &[
	Detector {
		id: "service_account",
		regex: &RE_SERVICE_ACCOUNT,
		placeholder: "[SERVICE_ACCOUNT]",
		reason: "service-account identity",
	},
	Detector {
		id: "connection_string",
		regex: &RE_CONNECTION_STRING,
		placeholder: "[CONNECTION_STRING]",
		reason: "database connection string",
	},
	Detector {
		id: "platform_url",
		regex: &RE_PLATFORM_URL,
		placeholder: "[SERVICE_URL]",
		reason: "deployment-platform URL",
	},
	Detector {
		id: "aws_arn",
		regex: &RE_AWS_ARN,
		placeholder: "[ARN]",
		reason: "cloud resource name",
	},
	Detector {
		id: "project_id",
		regex: &RE_PROJECT_ID,
		placeholder: "[PROJECT_ID]",
		reason: "cloud project identifier",
	},
	Detector {
		id: "private_hostname",
		regex: &RE_PRIVATE_HOSTNAME,
		placeholder: "[HOSTNAME]",
		reason: "private network hostname",
	},
	Detector {
		id: "ipv4",
		regex: &RE_IPV4,
		placeholder: "[IP_ADDRESS]",
		reason: "IP address",
	},
	Detector {
		id: "email",
		regex: &RE_EMAIL,
		placeholder: "[EMAIL]",
		reason: "email address",
	},
	Detector {
		id: "service_name",
		regex: &RE_SERVICE_NAME,
		placeholder: "[SERVICE_NAME]",
		reason: "internal service or database name",
	},
	Detector {
		id: "home_path",
		regex: &RE_HOME_PATH,
		placeholder: "[HOME_PATH]",
		reason: "home-directory path",
	},
	Detector {
		id: "absolute_path",
		regex: &RE_ABSOLUTE_PATH,
		placeholder: "[PATH]",
		reason: "absolute filesystem path",
	},
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redaction {
	pub kind: String,
	pub original: String,
	pub redacted: String,
	pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PatternMatch {
	pub detector: &'static str,
	pub value: String,
	pub start: usize,
}

/// True for email matches whose domain is on the allow-list of example
/// domains; those are documentation addresses, not leaks.
fn email_allowlisted(value: &str, allowlist: &[String]) -> bool {
	let Some(domain) = value.rsplit('@').next() else {
		return false;
	};

	allowlist.iter().any(|allowed| domain.eq_ignore_ascii_case(allowed))
}

/// True when a unix-style path match is really the path portion of a URL:
/// its leading slash follows `:` or another `/` (as in `https://host/a/b`).
/// Those spans belong to the URL handling, not the path detector.
fn path_in_url_context(text: &str, start: usize) -> bool {
	if !text[start..].starts_with('/') {
		return false;
	}

	matches!(text.as_bytes()[..start].last(), Some(&b':') | Some(&b'/'))
}

/// Non-overlapping matches across all detectors on the original text, in
/// detector-table order. A span claimed by an earlier detector is skipped by
/// later ones.
pub fn find_all(text: &str, email_allowlist: &[String]) -> Result<Vec<PatternMatch>> {
	let mut claimed: Vec<(usize, usize)> = Vec::new();
	let mut matches = Vec::new();

	for detector in DETECTORS {
		let regex =
			detector.regex.as_ref().ok_or(Error::BrokenDetector(detector.id))?;

		for hit in regex.find_iter(text) {
			if claimed.iter().any(|(start, end)| hit.start() < *end && hit.end() > *start) {
				continue;
			}
			if detector.id == "email" && email_allowlisted(hit.as_str(), email_allowlist) {
				continue;
			}
			if detector.id == "absolute_path" && path_in_url_context(text, hit.start()) {
				continue;
			}

			claimed.push((hit.start(), hit.end()));
			matches.push(PatternMatch {
				detector: detector.id,
				value: hit.as_str().to_string(),
				start: hit.start(),
			});
		}
	}

	Ok(matches)
}

/// Run every detector over the text in order, replacing each match with its
/// placeholder. One redaction entry per replaced occurrence.
pub fn redact(text: &str, email_allowlist: &[String]) -> Result<(String, Vec<Redaction>)> {
	let mut current = text.to_string();
	let mut redactions = Vec::new();

	for detector in DETECTORS {
		let regex =
			detector.regex.as_ref().ok_or(Error::BrokenDetector(detector.id))?;
		let mut rebuilt = String::with_capacity(current.len());
		let mut cursor = 0;

		for hit in regex.find_iter(&current) {
			if detector.id == "email" && email_allowlisted(hit.as_str(), email_allowlist) {
				continue;
			}
			if detector.id == "absolute_path" && path_in_url_context(&current, hit.start()) {
				continue;
			}

			rebuilt.push_str(&current[cursor..hit.start()]);
			rebuilt.push_str(detector.placeholder);
			cursor = hit.end();
			redactions.push(Redaction {
				kind: detector.id.to_string(),
				original: hit.as_str().to_string(),
				redacted: detector.placeholder.to_string(),
				reason: detector.reason.to_string(),
			});
		}

		if cursor > 0 {
			rebuilt.push_str(&current[cursor..]);
			current = rebuilt;
		}
	}

	Ok((current, redactions))
}

/// Replace every occurrence of each known project fingerprint (exact string,
/// longest first) with a type-inferred placeholder.
pub fn redact_fingerprints(text: &str, fingerprints: &[String]) -> (String, Vec<Redaction>) {
	let mut ordered: Vec<&String> = fingerprints.iter().filter(|f| !f.is_empty()).collect();

	ordered.sort_by_key(|f| std::cmp::Reverse(f.len()));

	let mut current = text.to_string();
	let mut redactions = Vec::new();

	for fingerprint in ordered {
		let occurrences = current.matches(fingerprint.as_str()).count();

		if occurrences == 0 {
			continue;
		}

		let placeholder = fingerprint_placeholder(fingerprint);

		current = current.replace(fingerprint.as_str(), placeholder);

		for _ in 0..occurrences {
			redactions.push(Redaction {
				kind: "fingerprint".to_string(),
				original: fingerprint.clone(),
				redacted: placeholder.to_string(),
				reason: "project fingerprint identifier".to_string(),
			});
		}
	}

	(current, redactions)
}

fn fingerprint_placeholder(fingerprint: &str) -> &'static str {
	if fingerprint.contains("://") {
		"[PROJECT_URL]"
	} else if fingerprint.contains('@') {
		"[PROJECT_EMAIL]"
	} else if fingerprint
		.chars()
		.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
	{
		"[PROJECT_ID]"
	} else {
		"[PROJECT_IDENTIFIER]"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn allowlist() -> Vec<String> {
		vec!["example.com".to_string(), "example.org".to_string()]
	}

	#[test]
	fn project_id_shape_is_replaced() {
		let (text, redactions) = redact("deployed to my-app-123456-ab today", &allowlist()).unwrap();

		assert_eq!(text, "deployed to [PROJECT_ID] today");
		assert_eq!(redactions.len(), 1);
		assert_eq!(redactions[0].kind, "project_id");
	}

	#[test]
	fn service_account_wins_over_email_and_project_id() {
		let input = "grant deploy-bot@my-app-123456.iam.gserviceaccount.com access";
		let (text, redactions) = redact(input, &allowlist()).unwrap();

		assert_eq!(text, "grant [SERVICE_ACCOUNT] access");
		assert_eq!(redactions.len(), 1);
		assert_eq!(redactions[0].kind, "service_account");
	}

	#[test]
	fn allowlisted_emails_survive() {
		let input = "write to docs@example.com or ops@corpmail.io";
		let (text, redactions) = redact(input, &allowlist()).unwrap();

		assert_eq!(text, "write to docs@example.com or [EMAIL]");
		assert_eq!(redactions.len(), 1);
	}

	#[test]
	fn each_ipv4_occurrence_counts_once() {
		let (_, redactions) = redact("10.0.0.1 10.0.0.2 10.0.0.3", &allowlist()).unwrap();

		assert_eq!(redactions.len(), 3);
		assert!(redactions.iter().all(|r| r.kind == "ipv4"));
	}

	#[test]
	fn home_path_claims_the_whole_path() {
		let (text, _) = redact("see /home/alice/projects/app/config.toml", &allowlist()).unwrap();

		assert_eq!(text, "see [HOME_PATH]");
	}

	#[test]
	fn plain_filesystem_paths_are_still_redacted() {
		let (text, redactions) = redact("data lives in /var/lib/app/data.db", &allowlist()).unwrap();

		assert_eq!(text, "data lives in [PATH]");
		assert_eq!(redactions[0].kind, "absolute_path");
	}

	#[test]
	fn url_path_segments_are_not_claimed_as_filesystem_paths() {
		let input = "fetch https://api.acme.io/v1/resource/items now";
		let (text, redactions) = redact(input, &allowlist()).unwrap();

		assert_eq!(text, input);
		assert!(redactions.is_empty());
	}

	#[test]
	fn placeholders_do_not_rematch() {
		let (first, _) = redact(
			"postgres://svc:pw@db.internal:5432/app reached from 10.1.2.3",
			&allowlist(),
		)
		.unwrap();
		let (second, redactions) = redact(&first, &allowlist()).unwrap();

		assert_eq!(first, second);
		assert!(redactions.is_empty());
	}

	#[test]
	fn fingerprints_are_replaced_by_inferred_type() {
		let fingerprints =
			vec!["my-app-prod".to_string(), "https://my-app.live".to_string()];
		let (text, redactions) =
			redact_fingerprints("my-app-prod serves https://my-app.live", &fingerprints);

		assert_eq!(text, "[PROJECT_ID] serves [PROJECT_URL]");
		assert_eq!(redactions.len(), 2);
	}

	#[test]
	fn find_all_skips_spans_claimed_by_earlier_detectors() {
		let matches =
			find_all("deploy-bot@my-app-123456.iam.gserviceaccount.com", &allowlist()).unwrap();

		assert_eq!(matches.len(), 1);
		assert_eq!(matches[0].detector, "service_account");
	}
}
