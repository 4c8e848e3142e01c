use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::document::{ContentType, MemoryDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
	Text,
	Semantic,
	Hybrid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
	#[serde(with = "time::serde::rfc3339")]
	pub from: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub until: OffsetDateTime,
}

impl TimeRange {
	pub fn contains(&self, ts: OffsetDateTime) -> bool {
		ts >= self.from && ts <= self.until
	}
}

/// Pre-filters, applied before any scoring. The tag filter matches a document
/// that carries ANY of the listed tags, not all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
	#[serde(default)]
	pub time_range: Option<TimeRange>,
	#[serde(default)]
	pub tags: Option<Vec<String>>,
	#[serde(default)]
	pub content_types: Option<Vec<ContentType>>,
	#[serde(default)]
	pub file_types: Option<Vec<String>>,
}

impl QueryFilters {
	pub fn matches(&self, doc: &MemoryDocument) -> bool {
		if let Some(range) = &self.time_range
			&& !range.contains(doc.metadata.created_at)
		{
			return false;
		}
		if let Some(tags) = &self.tags
			&& !tags.is_empty()
			&& !doc.has_any_tag(tags)
		{
			return false;
		}
		if let Some(types) = &self.content_types
			&& !types.is_empty()
			&& !types.contains(&doc.content_type)
		{
			return false;
		}
		if let Some(file_types) = &self.file_types
			&& !file_types.is_empty()
		{
			let language = doc.metadata.language.as_deref().unwrap_or("");
			if !file_types.iter().any(|ft| ft == language) {
				return false;
			}
		}
		true
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQuery {
	pub query_text: String,
	pub query_type: QueryType,
	#[serde(default)]
	pub agent_id: Option<String>,
	pub top_k: u32,
	#[serde(default)]
	pub rerank: bool,
	#[serde(default)]
	pub filters: QueryFilters,
}

impl RagQuery {
	/// The modality the caller expects back, used by the cross-modal boost.
	/// Taken from the content-type pre-filter when present.
	pub fn expected_modality(&self) -> ContentType {
		self.filters
			.content_types
			.as_ref()
			.and_then(|types| types.first().copied())
			.unwrap_or(ContentType::Text)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use serde_json::Map;
	use uuid::Uuid;

	use super::*;
	use crate::document::DocumentMetadata;

	fn doc(created_at: OffsetDateTime, tags: &[&str], ty: ContentType) -> MemoryDocument {
		MemoryDocument {
			id: Uuid::nil(),
			content: String::new(),
			content_type: ty,
			embedding: Vec::new(),
			metadata: DocumentMetadata {
				owner_agent_id: "agent".to_string(),
				created_at,
				tags: tags.iter().map(|tag| tag.to_string()).collect::<BTreeSet<_>>(),
				language: Some("rs".to_string()),
				relevance_score: None,
				extra: Map::new(),
			},
		}
	}

	#[test]
	fn tag_filter_matches_any_not_all() {
		let item = doc(OffsetDateTime::UNIX_EPOCH, &["ts"], ContentType::Code);
		let filters = QueryFilters {
			tags: Some(vec!["ts".to_string(), "unrelated".to_string()]),
			..Default::default()
		};
		assert!(filters.matches(&item));
	}

	#[test]
	fn time_range_excludes_outside_documents() {
		let item = doc(OffsetDateTime::UNIX_EPOCH, &[], ContentType::Text);
		let filters = QueryFilters {
			time_range: Some(TimeRange {
				from: OffsetDateTime::UNIX_EPOCH + time::Duration::days(1),
				until: OffsetDateTime::UNIX_EPOCH + time::Duration::days(2),
			}),
			..Default::default()
		};
		assert!(!filters.matches(&item));
	}

	#[test]
	fn content_type_filter_applies() {
		let item = doc(OffsetDateTime::UNIX_EPOCH, &[], ContentType::Image);
		let filters = QueryFilters {
			content_types: Some(vec![ContentType::Text, ContentType::Code]),
			..Default::default()
		};
		assert!(!filters.matches(&item));
	}

	#[test]
	fn expected_modality_defaults_to_text() {
		let query = RagQuery {
			query_text: "q".to_string(),
			query_type: QueryType::Semantic,
			agent_id: None,
			top_k: 5,
			rerank: false,
			filters: QueryFilters::default(),
		};
		assert_eq!(query.expected_modality(), ContentType::Text);
	}
}
