use serde::Serialize;

use ember_domain::{MemoryDocument, QueryFilters};

/// A semantic search against one backend. Filters are pre-filters applied by
/// the backend before scoring.
#[derive(Debug, Clone)]
pub struct SearchSpec {
	pub vector: Vec<f32>,
	pub limit: u32,
	pub filters: QueryFilters,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
	pub document: MemoryDocument,
	/// Cosine similarity against the query vector.
	pub score: f32,
}
