//! Local fallback store. An in-memory map of documents that also serves as
//! the mirror for every successful store, so keyword search and degraded-mode
//! reads never depend on a remote backend. An optional JSON snapshot makes
//! the mirror survive restarts.

use std::{collections::HashMap, path::PathBuf, sync::RwLock};

use uuid::Uuid;

use ember_domain::{MemoryDocument, QueryFilters, scoring::cosine_similarity};

use crate::{BackendAdapter, BoxFuture, Error, Result, ScoredDocument, SearchSpec};

pub struct LocalBackend {
	docs: RwLock<HashMap<Uuid, MemoryDocument>>,
	snapshot_path: Option<PathBuf>,
}

impl LocalBackend {
	pub fn new(cfg: &ember_config::Local) -> Result<Self> {
		let docs = match &cfg.snapshot_path {
			Some(path) if path.exists() => {
				let raw = std::fs::read_to_string(path)?;
				let docs: Vec<MemoryDocument> = serde_json::from_str(&raw)?;

				docs.into_iter().map(|doc| (doc.id, doc)).collect()
			},
			_ => HashMap::new(),
		};

		Ok(Self { docs: RwLock::new(docs), snapshot_path: cfg.snapshot_path.clone() })
	}

	pub fn in_memory() -> Self {
		Self { docs: RwLock::new(HashMap::new()), snapshot_path: None }
	}

	pub fn insert(&self, doc: MemoryDocument) -> Result<()> {
		{
			let mut docs = self.docs.write().map_err(|_| Error::Poisoned)?;

			docs.insert(doc.id, doc);
		}

		self.persist()
	}

	pub fn get(&self, id: Uuid) -> Result<Option<MemoryDocument>> {
		let docs = self.docs.read().map_err(|_| Error::Poisoned)?;

		Ok(docs.get(&id).cloned())
	}

	pub fn len(&self) -> Result<usize> {
		let docs = self.docs.read().map_err(|_| Error::Poisoned)?;

		Ok(docs.len())
	}

	pub fn is_empty(&self) -> Result<bool> {
		Ok(self.len()? == 0)
	}

	/// Every mirrored document that passes the pre-filters. The keyword leg
	/// of hybrid search scores these.
	pub fn documents_matching(&self, filters: &QueryFilters) -> Result<Vec<MemoryDocument>> {
		let docs = self.docs.read().map_err(|_| Error::Poisoned)?;

		Ok(docs.values().filter(|doc| filters.matches(doc)).cloned().collect())
	}

	fn persist(&self) -> Result<()> {
		let Some(path) = &self.snapshot_path else {
			return Ok(());
		};
		let docs = self.docs.read().map_err(|_| Error::Poisoned)?;
		let all: Vec<&MemoryDocument> = docs.values().collect();
		let raw = serde_json::to_string(&all)?;

		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}

		std::fs::write(path, raw)?;

		Ok(())
	}

	fn search_sync(&self, spec: &SearchSpec) -> Result<Vec<ScoredDocument>> {
		let mut scored: Vec<ScoredDocument> = self
			.documents_matching(&spec.filters)?
			.into_iter()
			.filter(|doc| !doc.embedding.is_empty())
			.map(|doc| {
				let score = cosine_similarity(&spec.vector, &doc.embedding);

				ScoredDocument { document: doc, score }
			})
			.collect();

		scored.sort_by(|a, b| b.score.total_cmp(&a.score));
		scored.truncate(spec.limit as usize);

		Ok(scored)
	}
}

impl BackendAdapter for LocalBackend {
	fn name(&self) -> &'static str {
		"local"
	}

	fn store<'a>(&'a self, doc: &'a MemoryDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.insert(doc.clone()) })
	}

	fn search<'a>(&'a self, spec: &'a SearchSpec) -> BoxFuture<'a, Result<Vec<ScoredDocument>>> {
		Box::pin(async move { self.search_sync(spec) })
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use serde_json::Map;
	use time::OffsetDateTime;

	use ember_domain::{ContentType, DocumentMetadata};

	use super::*;

	fn doc(content: &str, embedding: Vec<f32>) -> MemoryDocument {
		MemoryDocument {
			id: Uuid::now_v7(),
			content: content.to_string(),
			content_type: ContentType::Text,
			embedding,
			metadata: DocumentMetadata {
				owner_agent_id: "agent".to_string(),
				created_at: OffsetDateTime::UNIX_EPOCH,
				tags: BTreeSet::new(),
				language: None,
				relevance_score: None,
				extra: Map::new(),
			},
		}
	}

	#[test]
	fn mirror_search_orders_by_cosine() {
		let backend = LocalBackend::in_memory();
		let near = doc("near", vec![1.0, 0.0]);
		let far = doc("far", vec![0.0, 1.0]);
		let near_id = near.id;

		backend.insert(near).unwrap();
		backend.insert(far).unwrap();

		let spec = SearchSpec {
			vector: vec![1.0, 0.1],
			limit: 1,
			filters: QueryFilters::default(),
		};
		let hits = backend.search_sync(&spec).unwrap();

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].document.id, near_id);
	}

	#[test]
	fn snapshot_round_trips_across_instances() {
		let dir = tempfile::tempdir().unwrap();
		let cfg = ember_config::Local { snapshot_path: Some(dir.path().join("mirror.json")) };
		let backend = LocalBackend::new(&cfg).unwrap();
		let item = doc("persisted", vec![1.0]);
		let id = item.id;

		backend.insert(item).unwrap();

		let reloaded = LocalBackend::new(&cfg).unwrap();

		assert_eq!(reloaded.get(id).unwrap().unwrap().content, "persisted");
	}

	#[test]
	fn documents_without_embeddings_are_skipped_in_vector_search() {
		let backend = LocalBackend::in_memory();

		backend.insert(doc("no vector", Vec::new())).unwrap();

		let spec =
			SearchSpec { vector: vec![1.0], limit: 10, filters: QueryFilters::default() };

		assert!(backend.search_sync(&spec).unwrap().is_empty());
	}
}
