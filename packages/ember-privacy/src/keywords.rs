//! Level-1 keyword scan. Case-insensitive substring matching against four
//! keyword families. Credentials and business-logic hits terminate the
//! pipeline; infrastructure and personal hits only add warnings.

pub const CREDENTIAL_KEYWORDS: &[&str] = &[
	"password",
	"passwd",
	"api_key",
	"apikey",
	"api key",
	"secret_key",
	"private_key",
	"access_token",
	"refresh_token",
	"client_secret",
	"credential",
	"bearer token",
];

pub const BUSINESS_LOGIC_KEYWORDS: &[&str] = &[
	"proprietary",
	"confidential",
	"internal only",
	"do not distribute",
	"revenue model",
	"pricing strategy",
];

pub const INFRASTRUCTURE_KEYWORDS: &[&str] =
	&["kubeconfig", "terraform state", "prod cluster", "bastion host", "vpn endpoint"];

pub const PERSONAL_KEYWORDS: &[&str] =
	&["social security", "date of birth", "passport number", "medical record"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordFamily {
	Credentials,
	BusinessLogic,
	Infrastructure,
	Personal,
}

#[derive(Debug, Clone)]
pub struct KeywordHit {
	pub family: KeywordFamily,
	pub keyword: &'static str,
}

/// All keyword hits in family order: credentials first, so callers can apply
/// the rejection precedence by taking the first hit of each blocking family.
pub fn scan(text: &str) -> Vec<KeywordHit> {
	let lowered = text.to_lowercase();
	let mut hits = Vec::new();
	let families = [
		(KeywordFamily::Credentials, CREDENTIAL_KEYWORDS),
		(KeywordFamily::BusinessLogic, BUSINESS_LOGIC_KEYWORDS),
		(KeywordFamily::Infrastructure, INFRASTRUCTURE_KEYWORDS),
		(KeywordFamily::Personal, PERSONAL_KEYWORDS),
	];

	for (family, keywords) in families {
		for keyword in keywords {
			if lowered.contains(keyword) {
				hits.push(KeywordHit { family, keyword });
			}
		}
	}

	hits
}

pub fn first_hit_in(hits: &[KeywordHit], family: KeywordFamily) -> Option<&KeywordHit> {
	hits.iter().find(|hit| hit.family == family)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn password_is_detected_in_any_case() {
		let hits = scan("the PaSsWoRd is hunter2");

		assert_eq!(first_hit_in(&hits, KeywordFamily::Credentials).unwrap().keyword, "password");
	}

	#[test]
	fn clean_text_has_no_hits() {
		assert!(scan("a perfectly ordinary sentence").is_empty());
	}

	#[test]
	fn infrastructure_hits_do_not_imply_credentials() {
		let hits = scan("the kubeconfig lives on the bastion host");

		assert!(first_hit_in(&hits, KeywordFamily::Credentials).is_none());
		assert_eq!(
			hits.iter().filter(|hit| hit.family == KeywordFamily::Infrastructure).count(),
			2,
		);
	}
}
