//! Composition root for the memory core. One [`MemoryService`] owns the
//! backend chain, the local mirror, the embedding providers, the privacy
//! gate, and the query cache; everything else takes it by reference.

pub mod cache;
pub mod context;
pub mod providers;
pub mod query;
pub mod rerank;
pub mod store;

mod error;

pub use cache::{QueryCache, cache_key};
pub use context::RagContext;
pub use error::{Error, Result};
pub use providers::{EmbeddingProvider, ImageEmbeddingProvider, Providers};
pub use query::QueryResponse;
pub use store::{Destination, ProductionStatus, StoreRequest};

use std::{
	collections::HashMap,
	future::Future,
	pin::Pin,
	sync::{Arc, RwLock, atomic::AtomicBool},
};

use ember_backends::{
	BackendAdapter, chain::BackendChain, graph::GraphBackend, local::LocalBackend,
	qdrant::QdrantBackend, resilience::ResilientBackend,
};
use ember_config::Config;
use ember_privacy::PrivacyAuditor;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentStats {
	pub successes: u32,
	pub total: u32,
}

impl AgentStats {
	pub fn rate(&self) -> f32 {
		if self.total == 0 { 0.0 } else { self.successes as f32 / self.total as f32 }
	}
}

pub struct MemoryService {
	cfg: Config,
	chain: BackendChain,
	mirror: Arc<LocalBackend>,
	providers: Providers,
	auditor: PrivacyAuditor,
	cache: QueryCache,
	agent_stats: RwLock<HashMap<String, AgentStats>>,
	backend_health: RwLock<HashMap<&'static str, bool>>,
	degraded: AtomicBool,
}

impl MemoryService {
	/// Connect every configured backend and assemble the service. Backends
	/// are wired in the configured preference order, each behind the retry
	/// and circuit-breaker wrapper; the local mirror always terminates the
	/// chain so a write can never be fully lost.
	pub async fn connect(cfg: Config) -> Result<Self> {
		let mirror = Arc::new(LocalBackend::new(&cfg.storage.local)?);
		let mut backends: Vec<Arc<dyn BackendAdapter>> = Vec::new();

		for name in &cfg.backends.preference {
			let backend: Arc<dyn BackendAdapter> = match name.as_str() {
				"graph" => {
					let graph = GraphBackend::connect(
						&cfg.storage.postgres,
						cfg.providers.embedding.dimensions,
					)
					.await?;

					graph.ensure_schema().await?;

					Arc::new(ResilientBackend::new(Arc::new(graph), &cfg.backends.resilience))
				},
				"qdrant" => {
					let qdrant = QdrantBackend::new(&cfg.storage.qdrant)?;

					qdrant.ensure_collection().await?;

					Arc::new(ResilientBackend::new(Arc::new(qdrant), &cfg.backends.resilience))
				},
				"cloud" => Arc::new(ResilientBackend::new(
					Arc::new(ember_backends::cloud::CloudBackend::new(&cfg.storage.cloud)?),
					&cfg.backends.resilience,
				)),
				"local" => mirror.clone(),
				other =>
					return Err(Error::InvalidRequest(format!("unknown backend {other}"))),
			};

			backends.push(backend);
		}

		let providers = Providers::from_config(&cfg);

		Self::with_parts(cfg, backends, mirror, providers)
	}

	/// Assemble from pre-built parts. Tests use this with in-memory backends
	/// and a deterministic embedder.
	pub fn with_parts(
		cfg: Config,
		backends: Vec<Arc<dyn BackendAdapter>>,
		mirror: Arc<LocalBackend>,
		providers: Providers,
	) -> Result<Self> {
		let chain = BackendChain::new(backends)?;
		let auditor = PrivacyAuditor::new(&cfg.privacy);
		let cache = QueryCache::new(&cfg.cache);

		Ok(Self {
			cfg,
			chain,
			mirror,
			providers,
			auditor,
			cache,
			agent_stats: RwLock::new(HashMap::new()),
			backend_health: RwLock::new(HashMap::new()),
			degraded: AtomicBool::new(false),
		})
	}

	pub fn config(&self) -> &Config {
		&self.cfg
	}

	pub fn auditor(&self) -> &PrivacyAuditor {
		&self.auditor
	}

	pub fn auditor_mut(&mut self) -> &mut PrivacyAuditor {
		&mut self.auditor
	}

	pub fn cache(&self) -> &QueryCache {
		&self.cache
	}

	pub fn mirror(&self) -> &LocalBackend {
		&self.mirror
	}

	/// Rerank feedback: whether a document produced by this agent ended up
	/// useful. Feeds the agent-expertise criterion.
	pub fn record_agent_feedback(&self, agent_id: &str, success: bool) {
		if let Ok(mut stats) = self.agent_stats.write() {
			let entry = stats.entry(agent_id.to_string()).or_default();

			entry.total += 1;

			if success {
				entry.successes += 1;
			}
		}
	}

	pub(crate) fn expertise_snapshot(&self) -> HashMap<String, f32> {
		self.agent_stats
			.read()
			.map(|stats| {
				stats.iter().map(|(agent, stat)| (agent.clone(), stat.rate())).collect()
			})
			.unwrap_or_default()
	}
}
