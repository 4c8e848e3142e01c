use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
	Text,
	Code,
	Image,
	Diagram,
	Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
	pub owner_agent_id: String,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(default)]
	pub tags: BTreeSet<String>,
	#[serde(default)]
	pub language: Option<String>,
	/// Updated by rerank feedback; the only mutable field of a stored document.
	#[serde(default)]
	pub relevance_score: Option<f32>,
	#[serde(default, flatten)]
	pub extra: Map<String, Value>,
}

/// A stored memory item. Content is immutable once persisted; the document is
/// owned by the backend it landed in, with the local mirror acting as a cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDocument {
	pub id: Uuid,
	pub content: String,
	pub content_type: ContentType,
	pub embedding: Vec<f32>,
	pub metadata: DocumentMetadata,
}

impl MemoryDocument {
	pub fn has_any_tag(&self, tags: &[String]) -> bool {
		tags.iter().any(|tag| self.metadata.tags.contains(tag))
	}
}

impl ContentType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Text => "text",
			Self::Code => "code",
			Self::Image => "image",
			Self::Diagram => "diagram",
			Self::Mixed => "mixed",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"text" => Some(Self::Text),
			"code" => Some(Self::Code),
			"image" => Some(Self::Image),
			"diagram" => Some(Self::Diagram),
			"mixed" => Some(Self::Mixed),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn doc_with_tags(tags: &[&str]) -> MemoryDocument {
		MemoryDocument {
			id: Uuid::nil(),
			content: "x".to_string(),
			content_type: ContentType::Text,
			embedding: Vec::new(),
			metadata: DocumentMetadata {
				owner_agent_id: "agent".to_string(),
				created_at: OffsetDateTime::UNIX_EPOCH,
				tags: tags.iter().map(|tag| tag.to_string()).collect(),
				language: None,
				relevance_score: None,
				extra: Map::new(),
			},
		}
	}

	#[test]
	fn any_tag_matches_on_intersection() {
		let doc = doc_with_tags(&["ts", "pattern"]);
		assert!(doc.has_any_tag(&["pattern".to_string(), "go".to_string()]));
		assert!(!doc.has_any_tag(&["go".to_string()]));
	}

	#[test]
	fn content_type_round_trips_labels() {
		for ty in [
			ContentType::Text,
			ContentType::Code,
			ContentType::Image,
			ContentType::Diagram,
			ContentType::Mixed,
		] {
			assert_eq!(ContentType::parse(ty.as_str()), Some(ty));
		}
		assert_eq!(ContentType::parse("video"), None);
	}
}
