//! Multi-criteria reranking over the oversampled candidate set. Five scores
//! per candidate, combined by weighted sum and normalized to [0,1]; near-equal
//! composites are ordered oldest-first so reruns are deterministic.

use std::collections::HashMap;

use time::OffsetDateTime;

use ember_backends::ScoredDocument;
use ember_config::RerankWeights;
use ember_domain::RagQuery;

const SECONDS_PER_DAY: f32 = 86_400.0;

pub struct RerankInputs<'a> {
	pub weights: RerankWeights,
	pub half_life_days: f32,
	pub tie_epsilon: f32,
	/// Historical success rate per producing agent, 0 when unknown.
	pub agent_expertise: &'a HashMap<String, f32>,
	pub now: OffsetDateTime,
}

pub fn rerank(
	mut candidates: Vec<ScoredDocument>,
	query: &RagQuery,
	inputs: &RerankInputs<'_>,
) -> Vec<ScoredDocument> {
	let expected_modality = query.expected_modality();
	let query_tags = query.filters.tags.clone().unwrap_or_default();
	let total_weight = inputs.weights.total();
	let mut scored: Vec<(f32, ScoredDocument)> = candidates
		.drain(..)
		.map(|mut candidate| {
			let doc = &candidate.document;
			let age_days = (inputs.now - doc.metadata.created_at).whole_seconds().max(0) as f32
				/ SECONDS_PER_DAY;
			let recency = (-age_days / inputs.half_life_days).exp();
			let relevance = candidate.score.clamp(0.0, 1.0);
			let context_match = if query_tags.is_empty() {
				0.0
			} else {
				let overlap =
					query_tags.iter().filter(|tag| doc.metadata.tags.contains(*tag)).count();

				overlap as f32 / query_tags.len() as f32
			};
			let expertise = inputs
				.agent_expertise
				.get(&doc.metadata.owner_agent_id)
				.copied()
				.unwrap_or(0.0);
			let cross_modal = if doc.content_type == expected_modality { 1.0 } else { 0.0 };
			let weighted = inputs.weights.recency * recency
				+ inputs.weights.relevance * relevance
				+ inputs.weights.context_match * context_match
				+ inputs.weights.agent_expertise * expertise
				+ inputs.weights.cross_modal_boost * cross_modal;
			let composite =
				if total_weight > 0.0 { (weighted / total_weight).clamp(0.0, 1.0) } else { 0.0 };

			candidate.document.metadata.relevance_score = Some(composite);

			(composite, candidate)
		})
		.collect();

	// Epsilon "equality" is not transitive, so it cannot live inside the
	// sort comparator: order strictly by composite first, then reorder each
	// run of near-equal neighbors oldest-first.
	scored.sort_by(|(score_a, _), (score_b, _)| score_b.total_cmp(score_a));

	let mut start = 0;

	while start < scored.len() {
		let mut end = start + 1;

		while end < scored.len()
			&& (scored[end - 1].0 - scored[end].0).abs() <= inputs.tie_epsilon
		{
			end += 1;
		}

		scored[start..end].sort_by_key(|(_, candidate)| candidate.document.metadata.created_at);

		start = end;
	}

	scored
		.into_iter()
		.take(query.top_k as usize)
		.map(|(composite, mut candidate)| {
			candidate.score = composite;

			candidate
		})
		.collect()
}
