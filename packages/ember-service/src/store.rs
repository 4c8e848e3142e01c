//! Document intake. Content bound for the shared store passes the privacy
//! gate first; persistence walks the backend chain and always lands in the
//! local mirror, so a store call succeeds even with every backend down.

use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Map;
use time::OffsetDateTime;
use uuid::Uuid;

use ember_domain::{ContentType, DocumentMetadata, MemoryDocument};
use ember_privacy::Recommendation;

use crate::{Error, MemoryService, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
	/// The caller's own store; no privacy gate.
	#[default]
	Private,
	/// Shared across agents; sanitized and audited before storage.
	Shared,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreRequest {
	pub content: String,
	pub content_type: ContentType,
	pub owner_agent_id: String,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub language: Option<String>,
	#[serde(default)]
	pub extra: Map<String, serde_json::Value>,
	#[serde(default)]
	pub destination: Destination,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
	pub name: &'static str,
	/// None until the backend has been exercised at least once.
	pub live: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionStatus {
	/// True when the last store reached only the local mirror.
	pub degraded: bool,
	pub backends: Vec<BackendStatus>,
	pub mirror_size: usize,
}

impl MemoryService {
	/// Store a document and return its id. Every-backend failure is not
	/// fatal: the mirror write still happens and the call returns normally;
	/// `production_status` exposes the degradation.
	pub async fn store(&self, req: StoreRequest) -> Result<Uuid> {
		if req.content.is_empty() {
			return Err(Error::InvalidRequest("content must not be empty".to_string()));
		}

		let content = match req.destination {
			Destination::Private => req.content.clone(),
			Destination::Shared => self.gate_for_shared(&req.content)?,
		};
		let embedding = self.embed_content(req.content_type, &content).await?;
		let id = Uuid::now_v7();
		let doc = MemoryDocument {
			id,
			content,
			content_type: req.content_type,
			embedding,
			metadata: DocumentMetadata {
				owner_agent_id: req.owner_agent_id,
				created_at: OffsetDateTime::now_utc(),
				tags: req.tags.into_iter().collect(),
				language: req.language,
				relevance_score: None,
				extra: req.extra,
			},
		};

		match self.chain.store(&doc).await {
			Ok(backend) => {
				self.mark_store_outcome(Some(backend));
			},
			Err(err) => {
				tracing::warn!(
					id = %id,
					error = %err,
					"Every backend rejected the write; keeping the mirror copy only.",
				);
				self.mark_store_outcome(None);
			},
		}

		// The mirror write happens regardless of which backend took the
		// document, so fallback search always sees it.
		self.mirror.insert(doc)?;

		Ok(id)
	}

	/// Sanitizer + auditor gate. Fails closed: a rejection from either side
	/// blocks the store; otherwise the sanitized text replaces the original.
	fn gate_for_shared(&self, content: &str) -> Result<String> {
		let sanitization = self.auditor.sanitize(content);

		if sanitization.decision.is_rejection() {
			return Err(Error::SanitizationRejected { decision: sanitization.decision });
		}

		let validation = self.auditor.validate_sanitized(&sanitization, content);

		if validation.recommendation == Recommendation::Reject {
			return Err(Error::SanitizationRejected { decision: sanitization.decision });
		}

		sanitization
			.sanitized_text
			.ok_or(Error::SanitizationRejected { decision: sanitization.decision })
	}

	pub(crate) async fn embed_content(
		&self,
		content_type: ContentType,
		content: &str,
	) -> Result<Vec<f32>> {
		match content_type {
			ContentType::Image => Ok(self.providers.image.embed_image(content).await?),
			_ => {
				let texts = [content.to_string()];
				let mut vectors = self.providers.text.embed(&texts).await?;

				if vectors.is_empty() {
					return Err(Error::Embedding(ember_providers::Error::InvalidResponse {
						message: "Embedding response contained no vectors.".to_string(),
					}));
				}

				Ok(vectors.swap_remove(0))
			},
		}
	}

	fn mark_store_outcome(&self, succeeded: Option<&'static str>) {
		let names = self.chain.names();

		if let Ok(mut health) = self.backend_health.write() {
			match succeeded {
				Some(backend) => {
					for name in &names {
						if *name == backend {
							health.insert(name, true);

							break;
						}

						// Everything tried before the winner failed.
						health.insert(name, false);
					}
				},
				None =>
					for name in names.iter() {
						health.insert(name, false);
					},
			}
		}

		let degraded = match succeeded {
			Some("local") | None => true,
			Some(_) => false,
		};

		self.degraded.store(degraded, Ordering::Relaxed);
	}

	pub fn production_status(&self) -> ProductionStatus {
		let health = self.backend_health.read().ok();
		let backends = self
			.chain
			.names()
			.into_iter()
			.map(|name| BackendStatus {
				name,
				live: health.as_ref().and_then(|map| map.get(name).copied()),
			})
			.collect();

		ProductionStatus {
			degraded: self.degraded.load(Ordering::Relaxed),
			backends,
			mirror_size: self.mirror.len().unwrap_or(0),
		}
	}
}
