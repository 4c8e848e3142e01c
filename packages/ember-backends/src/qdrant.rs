//! Vector-database backend over Qdrant. One dense vector per document with a
//! payload carrying enough metadata to rebuild the document on the way out.

use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, DatetimeRange, Distance, Filter, PointStruct, Query,
		QueryPointsBuilder, ScoredPoint, Timestamp, UpsertPointsBuilder, Value as QdrantValue,
		VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use ember_domain::{ContentType, DocumentMetadata, MemoryDocument, QueryFilters};

use crate::{BackendAdapter, BoxFuture, Error, Result, ScoredDocument, SearchSpec};

pub struct QdrantBackend {
	pub client: Qdrant,
	pub collection: String,
	vector_dim: u32,
}

impl QdrantBackend {
	pub fn new(cfg: &ember_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(&self.collection).await? {
			return Ok(());
		}

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
					VectorParamsBuilder::new(self.vector_dim as u64, Distance::Cosine),
				),
			)
			.await?;

		Ok(())
	}

	async fn store_inner(&self, doc: &MemoryDocument) -> Result<()> {
		if doc.embedding.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"embedding dimension {} does not match qdrant vector dimension {}",
				doc.embedding.len(),
				self.vector_dim,
			)));
		}

		let mut payload = Payload::new();

		payload.insert("content", doc.content.clone());
		payload.insert("content_type", doc.content_type.as_str());
		payload.insert("owner_agent_id", doc.metadata.owner_agent_id.clone());
		payload.insert(
			"language",
			doc.metadata.language.clone().map(Value::String).unwrap_or(Value::Null),
		);
		payload.insert(
			"relevance_score",
			doc.metadata.relevance_score.map(|s| Value::from(s as f64)).unwrap_or(Value::Null),
		);
		payload.insert(
			"tags",
			Value::Array(
				doc.metadata.tags.iter().cloned().map(Value::String).collect::<Vec<_>>(),
			),
		);
		payload.insert("created_at", Value::String(format_timestamp(doc.metadata.created_at)?));
		payload.insert("extra", Value::Object(doc.metadata.extra.clone()));

		let point = PointStruct::new(doc.id.to_string(), doc.embedding.clone(), payload);

		self.client
			.upsert_points(
				UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true),
			)
			.await?;

		Ok(())
	}

	async fn search_inner(&self, spec: &SearchSpec) -> Result<Vec<ScoredDocument>> {
		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(spec.vector.clone()))
			.limit(spec.limit as u64)
			.with_payload(true);

		if let Some(filter) = build_filter(&spec.filters) {
			search = search.filter(filter);
		}

		let response = self.client.query(search).await?;
		let mut out = Vec::with_capacity(response.result.len());

		for point in response.result {
			match point_to_scored(&point) {
				Ok(scored) => out.push(scored),
				Err(err) => {
					tracing::warn!(error = %err, "Skipping malformed Qdrant point.");
				},
			}
		}

		Ok(out)
	}
}

impl BackendAdapter for QdrantBackend {
	fn name(&self) -> &'static str {
		"qdrant"
	}

	fn store<'a>(&'a self, doc: &'a MemoryDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.store_inner(doc))
	}

	fn search<'a>(&'a self, spec: &'a SearchSpec) -> BoxFuture<'a, Result<Vec<ScoredDocument>>> {
		Box::pin(self.search_inner(spec))
	}
}

fn build_filter(filters: &QueryFilters) -> Option<Filter> {
	let mut must = Vec::new();

	if let Some(range) = &filters.time_range {
		let gte = Timestamp {
			seconds: range.from.unix_timestamp(),
			nanos: range.from.nanosecond() as i32,
		};
		let lte = Timestamp {
			seconds: range.until.unix_timestamp(),
			nanos: range.until.nanosecond() as i32,
		};

		must.push(Condition::datetime_range(
			"created_at",
			DatetimeRange { lt: None, gt: None, gte: Some(gte), lte: Some(lte) },
		));
	}
	if let Some(tags) = &filters.tags
		&& !tags.is_empty()
	{
		must.push(Condition::matches("tags", tags.clone()));
	}
	if let Some(types) = &filters.content_types
		&& !types.is_empty()
	{
		let labels: Vec<String> = types.iter().map(|ty| ty.as_str().to_string()).collect();
		must.push(Condition::matches("content_type", labels));
	}
	if let Some(file_types) = &filters.file_types
		&& !file_types.is_empty()
	{
		must.push(Condition::matches("language", file_types.clone()));
	}

	if must.is_empty() { None } else { Some(Filter::must(must)) }
}

fn point_to_scored(point: &ScoredPoint) -> Result<ScoredDocument> {
	let id = point
		.id
		.as_ref()
		.and_then(point_id_to_uuid)
		.ok_or_else(|| Error::InvalidResponse("point is missing a UUID id".to_string()))?;
	let content = payload_str(&point.payload, "content")
		.ok_or_else(|| Error::InvalidResponse("point payload is missing content".to_string()))?;
	let content_type = payload_str(&point.payload, "content_type")
		.and_then(|raw| ContentType::parse(&raw))
		.ok_or_else(|| Error::InvalidResponse("point payload has no content type".to_string()))?;
	let created_at = payload_str(&point.payload, "created_at")
		.and_then(|raw| OffsetDateTime::parse(&raw, &Rfc3339).ok())
		.ok_or_else(|| Error::InvalidResponse("point payload has no created_at".to_string()))?;
	let owner_agent_id = payload_str(&point.payload, "owner_agent_id").unwrap_or_default();
	let tags = match point.payload.get("tags").and_then(|value| value.kind.as_ref()) {
		Some(Kind::ListValue(list)) => list
			.values
			.iter()
			.filter_map(|value| match &value.kind {
				Some(Kind::StringValue(tag)) => Some(tag.clone()),
				_ => None,
			})
			.collect(),
		_ => Default::default(),
	};
	let extra = match point.payload.get("extra").cloned().map(QdrantValue::into_json) {
		Some(Value::Object(map)) => map,
		_ => serde_json::Map::new(),
	};

	Ok(ScoredDocument {
		document: MemoryDocument {
			id,
			content,
			content_type,
			// Qdrant owns the vector; callers that need it re-embed or read
			// from the mirror.
			embedding: Vec::new(),
			metadata: DocumentMetadata {
				owner_agent_id,
				created_at,
				tags,
				language: payload_str(&point.payload, "language"),
				relevance_score: payload_f32(&point.payload, "relevance_score"),
				extra,
			},
		},
		score: point.score,
	})
}

fn point_id_to_uuid(point_id: &qdrant_client::qdrant::PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_str(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
	match payload.get(key).and_then(|value| value.kind.as_ref()) {
		Some(Kind::StringValue(text)) => Some(text.clone()),
		_ => None,
	}
}

fn payload_f32(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<f32> {
	match payload.get(key).and_then(|value| value.kind.as_ref()) {
		Some(Kind::DoubleValue(value)) => Some(*value as f32),
		Some(Kind::IntegerValue(value)) => Some(*value as f32),
		_ => None,
	}
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
	ts.format(&Rfc3339)
		.map_err(|_| Error::InvalidArgument("failed to format timestamp".to_string()))
}
