use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub backends: Backends,
	pub providers: Providers,
	pub search: Search,
	pub ranking: Ranking,
	pub cache: Cache,
	pub privacy: Privacy,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
	pub cloud: CloudVector,
	#[serde(default)]
	pub local: Local,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

/// Secondary cloud vector store, reached over a REST API.
#[derive(Clone, Debug, Deserialize)]
pub struct CloudVector {
	pub api_base: String,
	pub api_key: String,
	pub namespace: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Local fallback mirror. The snapshot path is optional; without it the
/// mirror is purely in-memory.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Local {
	pub snapshot_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Backends {
	/// Persistence preference order; names from: graph, qdrant, cloud, local.
	pub preference: Vec<String>,
	#[serde(default)]
	pub resilience: Resilience,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Resilience {
	pub max_retries: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	pub breaker_failure_threshold: u32,
	pub breaker_cooldown_ms: u64,
}
impl Default for Resilience {
	fn default() -> Self {
		Self {
			max_retries: 2,
			base_delay_ms: 100,
			max_delay_ms: 2_000,
			breaker_failure_threshold: 5,
			breaker_cooldown_ms: 30_000,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub image_embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Search {
	/// Hybrid blend: score = alpha * semantic + (1 - alpha) * keyword.
	pub alpha: f32,
	/// Candidates requested before reranking: top_k * oversample_factor.
	pub oversample_factor: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Ranking {
	pub weights: RerankWeights,
	pub half_life_days: f32,
	#[serde(default = "default_epsilon")]
	pub tie_epsilon: f32,
}

/// Non-negative criteria weights; they need not sum to one, the composite is
/// normalized by their total.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RerankWeights {
	pub recency: f32,
	pub relevance: f32,
	pub context_match: f32,
	pub agent_expertise: f32,
	pub cross_modal_boost: f32,
}

impl RerankWeights {
	pub fn total(&self) -> f32 {
		self.recency
			+ self.relevance
			+ self.context_match
			+ self.agent_expertise
			+ self.cross_modal_boost
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub ttl_secs: u64,
	pub sweep_interval_secs: u64,
	pub sweep_enabled: bool,
}
impl Default for Cache {
	fn default() -> Self {
		Self { ttl_secs: 300, sweep_interval_secs: 60, sweep_enabled: true }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Privacy {
	#[serde(default = "default_allowlist_domains")]
	pub allowlist_email_domains: Vec<String>,
	/// Project fingerprint identifiers seeded from config; the fingerprint
	/// detector collaborator may supply more at runtime.
	#[serde(default)]
	pub fingerprints: Vec<String>,
	pub audit_log_path: PathBuf,
	pub audit_report_dir: PathBuf,
}

fn default_epsilon() -> f32 {
	1e-6
}

fn default_allowlist_domains() -> Vec<String> {
	vec!["example.com".to_string(), "example.org".to_string(), "example.net".to_string()]
}
