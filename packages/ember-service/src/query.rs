//! Hybrid retrieval. The semantic leg goes through the backend chain, the
//! keyword leg scores the local mirror; hybrid blends the two. Backend and
//! embedding failures degrade the query instead of failing it.

use std::{collections::HashMap, time::Instant};

use serde::Serialize;
use uuid::Uuid;

use ember_backends::{BackendAdapter, ScoredDocument, SearchSpec};
use ember_domain::{QueryType, RagQuery, scoring::keyword_overlap};

use crate::{Error, MemoryService, Result, rerank};

#[derive(Debug, Serialize)]
pub struct QueryResponse {
	pub documents: Vec<ScoredDocument>,
	pub processing_time_ms: u64,
	pub search_method: String,
	pub total_matches: usize,
}

impl MemoryService {
	pub async fn query(&self, query: &RagQuery) -> Result<QueryResponse> {
		if query.top_k == 0 {
			return Err(Error::InvalidRequest("top_k must be at least 1".to_string()));
		}

		let started = Instant::now();
		let oversample = query.top_k.saturating_mul(self.cfg.search.oversample_factor.max(2));
		let (mut candidates, search_method) = match query.query_type {
			QueryType::Text => (self.keyword_candidates(query, oversample)?, "keyword".to_string()),
			QueryType::Semantic => self.semantic_with_fallback(query, oversample).await?,
			QueryType::Hybrid => self.hybrid_candidates(query, oversample).await?,
		};
		let total_matches = candidates.len();
		let documents = if query.rerank {
			let expertise = self.expertise_snapshot();
			let inputs = rerank::RerankInputs {
				weights: self.cfg.ranking.weights,
				half_life_days: self.cfg.ranking.half_life_days,
				tie_epsilon: self.cfg.ranking.tie_epsilon,
				agent_expertise: &expertise,
				now: time::OffsetDateTime::now_utc(),
			};

			rerank::rerank(candidates, query, &inputs)
		} else {
			candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
			candidates.truncate(query.top_k as usize);
			candidates
		};

		Ok(QueryResponse {
			documents,
			processing_time_ms: started.elapsed().as_millis() as u64,
			search_method,
			total_matches,
		})
	}

	/// Semantic candidates via the chain, falling back silently to the local
	/// mirror, and to keyword scoring when embedding itself fails.
	async fn semantic_with_fallback(
		&self,
		query: &RagQuery,
		oversample: u32,
	) -> Result<(Vec<ScoredDocument>, String)> {
		let vector = match self.embed_query(query).await {
			Ok(vector) => vector,
			Err(err) => {
				tracing::warn!(error = %err, "Embedding failed; using keyword-only scoring.");

				return Ok((self.keyword_candidates(query, oversample)?, "keyword_fallback".to_string()));
			},
		};
		let spec = SearchSpec {
			vector,
			limit: oversample,
			filters: query.filters.clone(),
		};

		match self.chain.search(&spec).await {
			Ok((backend, hits)) => Ok((hits, format!("semantic_{backend}"))),
			Err(err) => {
				tracing::warn!(error = %err, "Backend search failed; serving from the mirror.");

				let hits = self.mirror.search(&spec).await?;

				Ok((hits, "semantic_local_fallback".to_string()))
			},
		}
	}

	fn keyword_candidates(&self, query: &RagQuery, oversample: u32) -> Result<Vec<ScoredDocument>> {
		let mut scored: Vec<ScoredDocument> = self
			.mirror
			.documents_matching(&query.filters)?
			.into_iter()
			.filter_map(|doc| {
				let score = keyword_overlap(&query.query_text, &doc.content);

				(score > 0.0).then_some(ScoredDocument { document: doc, score })
			})
			.collect();

		scored.sort_by(|a, b| b.score.total_cmp(&a.score));
		scored.truncate(oversample as usize);

		Ok(scored)
	}

	async fn hybrid_candidates(
		&self,
		query: &RagQuery,
		oversample: u32,
	) -> Result<(Vec<ScoredDocument>, String)> {
		let alpha = self.cfg.search.alpha;
		let (semantic, semantic_method) = self.semantic_with_fallback(query, oversample).await?;

		// Embedding failure already degraded the semantic leg to keyword
		// scoring; blending it with itself would double-count.
		if semantic_method == "keyword_fallback" {
			return Ok((semantic, semantic_method));
		}

		let keyword = self.keyword_candidates(query, oversample)?;
		// Per-document semantic and keyword scores, blended below.
		let mut merged: HashMap<Uuid, (ScoredDocument, f32, f32)> = HashMap::new();

		for hit in semantic {
			let score = hit.score;

			merged.insert(hit.document.id, (hit, score, 0.0));
		}
		for hit in keyword {
			match merged.get_mut(&hit.document.id) {
				Some((_, _, kw)) => *kw = hit.score,
				None => {
					let score = hit.score;

					merged.insert(hit.document.id, (hit, 0.0, score));
				},
			}
		}

		let mut blended: Vec<ScoredDocument> = merged
			.into_values()
			.map(|(mut hit, semantic_score, keyword_score)| {
				hit.score = alpha * semantic_score + (1.0 - alpha) * keyword_score;

				hit
			})
			.collect();

		blended.sort_by(|a, b| b.score.total_cmp(&a.score));
		blended.truncate(oversample as usize);

		Ok((blended, format!("hybrid[{semantic_method}]")))
	}

	async fn embed_query(&self, query: &RagQuery) -> Result<Vec<f32>> {
		let texts = [query.query_text.clone()];
		let mut vectors = self.providers.text.embed(&texts).await?;

		if vectors.is_empty() {
			return Err(Error::Embedding(ember_providers::Error::InvalidResponse {
				message: "Embedding response contained no vectors.".to_string(),
			}));
		}

		Ok(vectors.swap_remove(0))
	}
}
