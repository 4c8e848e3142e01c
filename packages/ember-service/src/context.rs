//! Assembled retrieval contexts with read-through caching. A context bundles
//! the documents retrieved for one (agent, file, content) triple; identical
//! triples within the TTL are served from the cache without a backend call.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use ember_domain::{MemoryDocument, QueryFilters, QueryType, RagQuery};

use crate::{MemoryService, Result, cache::cache_key};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagContext {
	pub agent_id: String,
	pub file_path: String,
	pub documents: Vec<MemoryDocument>,
	pub search_method: String,
	#[serde(with = "time::serde::rfc3339")]
	pub assembled_at: OffsetDateTime,
}

impl MemoryService {
	pub async fn retrieve_context(
		&self,
		agent_id: &str,
		file_path: &str,
		content: &str,
		top_k: u32,
	) -> Result<RagContext> {
		let key = cache_key(agent_id, file_path, content);

		if let Some(context) = self.cache.get(&key) {
			tracing::debug!(agent_id, file_path, "Serving retrieval context from cache.");

			return Ok(context);
		}

		let query = RagQuery {
			query_text: content.chars().take(1_000).collect(),
			query_type: QueryType::Hybrid,
			agent_id: Some(agent_id.to_string()),
			top_k,
			rerank: true,
			filters: QueryFilters::default(),
		};
		let response = self.query(&query).await?;
		let context = RagContext {
			agent_id: agent_id.to_string(),
			file_path: file_path.to_string(),
			documents: response.documents.into_iter().map(|hit| hit.document).collect(),
			search_method: response.search_method,
			assembled_at: OffsetDateTime::now_utc(),
		};

		self.cache.insert(key, context.clone());

		Ok(context)
	}

	/// Drop every cached context, e.g. after backend reconfiguration.
	pub fn invalidate_contexts(&self) {
		self.cache.clear();
	}
}
