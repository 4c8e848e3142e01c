//! Cloud vector store backend, reached over a namespaced REST API. Documents
//! are upserted as id + vector + metadata records and queried by nearest
//! vector with a server-side metadata filter.

use std::time::Duration;

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use ember_domain::{ContentType, DocumentMetadata, MemoryDocument, QueryFilters};

use crate::{BackendAdapter, BoxFuture, Error, Result, ScoredDocument, SearchSpec};

pub struct CloudBackend {
	client: Client,
	api_base: String,
	namespace: String,
}

impl CloudBackend {
	pub fn new(cfg: &ember_config::CloudVector) -> Result<Self> {
		let mut headers = HeaderMap::new();

		headers.insert(
			AUTHORIZATION,
			format!("Bearer {}", cfg.api_key)
				.parse()
				.map_err(|_| Error::InvalidArgument("invalid cloud API key".to_string()))?,
		);
		for (key, value) in &cfg.default_headers {
			let Some(raw) = value.as_str() else {
				return Err(Error::InvalidArgument(
					"default header values must be strings".to_string(),
				));
			};

			headers.insert(
				HeaderName::from_bytes(key.as_bytes())
					.map_err(|_| Error::InvalidArgument(format!("invalid header name {key}")))?,
				raw.parse()
					.map_err(|_| Error::InvalidArgument(format!("invalid header value for {key}")))?,
			);
		}

		let client = Client::builder()
			.default_headers(headers)
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.build()?;

		Ok(Self {
			client,
			api_base: cfg.api_base.trim_end_matches('/').to_string(),
			namespace: cfg.namespace.clone(),
		})
	}

	async fn store_inner(&self, doc: &MemoryDocument) -> Result<()> {
		let record = UpsertRequest {
			namespace: &self.namespace,
			vectors: vec![VectorRecord {
				id: doc.id.to_string(),
				values: doc.embedding.clone(),
				metadata: document_metadata_json(doc)?,
			}],
		};
		let response = self
			.client
			.post(format!("{}/vectors/upsert", self.api_base))
			.json(&record)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(Error::InvalidResponse(format!(
				"cloud upsert returned {}",
				response.status(),
			)));
		}

		Ok(())
	}

	async fn search_inner(&self, spec: &SearchSpec) -> Result<Vec<ScoredDocument>> {
		let request = QueryRequest {
			namespace: &self.namespace,
			vector: &spec.vector,
			top_k: spec.limit,
			filter: filters_json(&spec.filters),
			include_metadata: true,
		};
		let response = self
			.client
			.post(format!("{}/vectors/query", self.api_base))
			.json(&request)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(Error::InvalidResponse(format!(
				"cloud query returned {}",
				response.status(),
			)));
		}

		let body = response.json::<QueryResponse>().await?;
		let mut out = Vec::with_capacity(body.matches.len());

		for record in body.matches {
			match match_to_scored(record) {
				Ok(scored) => out.push(scored),
				Err(err) => {
					tracing::warn!(error = %err, "Skipping malformed cloud match.");
				},
			}
		}

		Ok(out)
	}
}

impl BackendAdapter for CloudBackend {
	fn name(&self) -> &'static str {
		"cloud"
	}

	fn store<'a>(&'a self, doc: &'a MemoryDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.store_inner(doc))
	}

	fn search<'a>(&'a self, spec: &'a SearchSpec) -> BoxFuture<'a, Result<Vec<ScoredDocument>>> {
		Box::pin(self.search_inner(spec))
	}
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
	namespace: &'a str,
	vectors: Vec<VectorRecord>,
}
#[derive(Serialize)]
struct VectorRecord {
	id: String,
	values: Vec<f32>,
	metadata: Map<String, Value>,
}
#[derive(Serialize)]
struct QueryRequest<'a> {
	namespace: &'a str,
	vector: &'a [f32],
	top_k: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	filter: Option<Value>,
	include_metadata: bool,
}
#[derive(Deserialize)]
struct QueryResponse {
	#[serde(default)]
	matches: Vec<MatchRecord>,
}
#[derive(Deserialize)]
struct MatchRecord {
	id: String,
	score: f32,
	#[serde(default)]
	metadata: Map<String, Value>,
}

fn document_metadata_json(doc: &MemoryDocument) -> Result<Map<String, Value>> {
	let created_at = doc
		.metadata
		.created_at
		.format(&Rfc3339)
		.map_err(|_| Error::InvalidArgument("failed to format timestamp".to_string()))?;
	let mut metadata = Map::new();

	metadata.insert("content".to_string(), Value::String(doc.content.clone()));
	metadata.insert(
		"content_type".to_string(),
		Value::String(doc.content_type.as_str().to_string()),
	);
	metadata.insert(
		"owner_agent_id".to_string(),
		Value::String(doc.metadata.owner_agent_id.clone()),
	);
	metadata.insert("created_at".to_string(), Value::String(created_at));
	metadata.insert(
		"tags".to_string(),
		Value::Array(doc.metadata.tags.iter().cloned().map(Value::String).collect()),
	);
	if let Some(language) = &doc.metadata.language {
		metadata.insert("language".to_string(), Value::String(language.clone()));
	}
	if let Some(score) = doc.metadata.relevance_score {
		metadata.insert("relevance_score".to_string(), json!(score));
	}
	if !doc.metadata.extra.is_empty() {
		metadata.insert("extra".to_string(), Value::Object(doc.metadata.extra.clone()));
	}

	Ok(metadata)
}

fn filters_json(filters: &QueryFilters) -> Option<Value> {
	let mut clauses = Map::new();

	if let Some(tags) = &filters.tags
		&& !tags.is_empty()
	{
		clauses.insert("tags".to_string(), json!({ "$in": tags }));
	}
	if let Some(types) = &filters.content_types
		&& !types.is_empty()
	{
		let labels: Vec<&str> = types.iter().map(|ty| ty.as_str()).collect();

		clauses.insert("content_type".to_string(), json!({ "$in": labels }));
	}
	if let Some(file_types) = &filters.file_types
		&& !file_types.is_empty()
	{
		clauses.insert("language".to_string(), json!({ "$in": file_types }));
	}
	if let Some(range) = &filters.time_range {
		let from = range.from.format(&Rfc3339).ok()?;
		let until = range.until.format(&Rfc3339).ok()?;

		clauses.insert("created_at".to_string(), json!({ "$gte": from, "$lte": until }));
	}

	if clauses.is_empty() { None } else { Some(Value::Object(clauses)) }
}

fn match_to_scored(record: MatchRecord) -> Result<ScoredDocument> {
	let id = Uuid::parse_str(&record.id)
		.map_err(|_| Error::InvalidResponse(format!("match id {} is not a UUID", record.id)))?;
	let meta_str = |key: &str| {
		record.metadata.get(key).and_then(Value::as_str).map(str::to_string)
	};
	let content = meta_str("content")
		.ok_or_else(|| Error::InvalidResponse("match metadata is missing content".to_string()))?;
	let content_type = meta_str("content_type")
		.and_then(|raw| ContentType::parse(&raw))
		.ok_or_else(|| Error::InvalidResponse("match metadata has no content type".to_string()))?;
	let created_at = meta_str("created_at")
		.and_then(|raw| OffsetDateTime::parse(&raw, &Rfc3339).ok())
		.ok_or_else(|| Error::InvalidResponse("match metadata has no created_at".to_string()))?;
	let tags = record
		.metadata
		.get("tags")
		.and_then(Value::as_array)
		.map(|values| {
			values.iter().filter_map(Value::as_str).map(str::to_string).collect()
		})
		.unwrap_or_default();
	let extra = match record.metadata.get("extra") {
		Some(Value::Object(map)) => map.clone(),
		_ => Map::new(),
	};

	Ok(ScoredDocument {
		document: MemoryDocument {
			id,
			content,
			content_type,
			embedding: Vec::new(),
			metadata: DocumentMetadata {
				owner_agent_id: meta_str("owner_agent_id").unwrap_or_default(),
				created_at,
				tags,
				language: meta_str("language"),
				relevance_score: record
					.metadata
					.get("relevance_score")
					.and_then(Value::as_f64)
					.map(|score| score as f32),
				extra,
			},
		},
		score: record.score,
	})
}
