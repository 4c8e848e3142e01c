mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Backends, Cache, CloudVector, Config, EmbeddingProviderConfig, Local, Postgres, Privacy,
	Providers, Qdrant, Ranking, RerankWeights, Resilience, Search, Service, Storage,
};

use std::{fs, path::Path};

pub const BACKEND_NAMES: [&str; 4] = ["graph", "qdrant", "cloud", "local"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.image_embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.image_embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.backends.preference.is_empty() {
		return Err(Error::Validation {
			message: "backends.preference must be non-empty.".to_string(),
		});
	}
	for name in &cfg.backends.preference {
		if !BACKEND_NAMES.contains(&name.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"backends.preference contains unknown backend {name:?}; expected one of graph, qdrant, cloud, local."
				),
			});
		}
	}
	if !(0.0..=1.0).contains(&cfg.search.alpha) || !cfg.search.alpha.is_finite() {
		return Err(Error::Validation {
			message: "search.alpha must be a finite number in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.search.oversample_factor < 2 {
		return Err(Error::Validation {
			message: "search.oversample_factor must be at least 2.".to_string(),
		});
	}
	let weights = [
		("recency", cfg.ranking.weights.recency),
		("relevance", cfg.ranking.weights.relevance),
		("context_match", cfg.ranking.weights.context_match),
		("agent_expertise", cfg.ranking.weights.agent_expertise),
		("cross_modal_boost", cfg.ranking.weights.cross_modal_boost),
	];
	for (label, weight) in weights {
		if !weight.is_finite() || weight < 0.0 {
			return Err(Error::Validation {
				message: format!("ranking.weights.{label} must be a non-negative finite number."),
			});
		}
	}
	if cfg.ranking.weights.total() <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.weights must have a positive total.".to_string(),
		});
	}
	if cfg.ranking.half_life_days <= 0.0 || !cfg.ranking.half_life_days.is_finite() {
		return Err(Error::Validation {
			message: "ranking.half_life_days must be a positive finite number.".to_string(),
		});
	}
	if cfg.ranking.tie_epsilon <= 0.0 || !cfg.ranking.tie_epsilon.is_finite() {
		return Err(Error::Validation {
			message: "ranking.tie_epsilon must be a positive finite number.".to_string(),
		});
	}
	if cfg.cache.ttl_secs == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.sweep_interval_secs == 0 {
		return Err(Error::Validation {
			message: "cache.sweep_interval_secs must be greater than zero.".to_string(),
		});
	}
	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("image_embedding", &cfg.providers.image_embedding.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	if cfg.privacy.audit_log_path.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "privacy.audit_log_path must be non-empty.".to_string(),
		});
	}
	if cfg.privacy.audit_report_dir.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "privacy.audit_report_dir must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.backends.preference.retain(|name| !name.trim().is_empty());
	cfg.privacy.fingerprints.retain(|fp| !fp.trim().is_empty());
	for domain in &mut cfg.privacy.allowlist_email_domains {
		*domain = domain.trim().to_ascii_lowercase();
	}
}
