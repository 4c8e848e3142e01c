//! Knowledge-graph backend over Postgres with pgvector. Documents become
//! nodes; tags become edges to tag nodes, which keeps the any-tag pre-filter
//! a plain join.

use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use time::OffsetDateTime;
use uuid::Uuid;

use ember_domain::{ContentType, DocumentMetadata, MemoryDocument};

use crate::{BackendAdapter, BoxFuture, Error, Result, ScoredDocument, SearchSpec};

const SCHEMA_SQL: &str = "\
CREATE EXTENSION IF NOT EXISTS vector;
CREATE TABLE IF NOT EXISTS memory_nodes (
	node_id uuid PRIMARY KEY,
	content text NOT NULL,
	content_type text NOT NULL,
	owner_agent_id text NOT NULL,
	language text,
	relevance_score real,
	extra jsonb NOT NULL DEFAULT '{}'::jsonb,
	vec vector(<VECTOR_DIM>) NOT NULL,
	created_at timestamptz NOT NULL
);
CREATE TABLE IF NOT EXISTS memory_node_tags (
	node_id uuid NOT NULL REFERENCES memory_nodes (node_id),
	tag text NOT NULL,
	PRIMARY KEY (node_id, tag)
);
CREATE INDEX IF NOT EXISTS idx_memory_node_tags_tag ON memory_node_tags (tag)";

pub struct GraphBackend {
	pub pool: PgPool,
	vector_dim: u32,
}

impl GraphBackend {
	pub async fn connect(cfg: &ember_config::Postgres, vector_dim: u32) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool, vector_dim })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = SCHEMA_SQL.replace("<VECTOR_DIM>", &self.vector_dim.to_string());
		let lock_id: i64 = 3_180_223;
		// Advisory locks are per connection; a single transaction scopes the
		// lock to one connection and releases it on commit.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	async fn store_inner(&self, doc: &MemoryDocument) -> Result<()> {
		if doc.embedding.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"embedding dimension {} does not match graph vector dimension {}",
				doc.embedding.len(),
				self.vector_dim,
			)));
		}

		let mut tx = self.pool.begin().await?;

		sqlx::query(
			"\
INSERT INTO memory_nodes (
	node_id,
	content,
	content_type,
	owner_agent_id,
	language,
	relevance_score,
	extra,
	vec,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8::text::vector,$9)
ON CONFLICT (node_id) DO UPDATE
SET relevance_score = EXCLUDED.relevance_score",
		)
		.bind(doc.id)
		.bind(doc.content.as_str())
		.bind(doc.content_type.as_str())
		.bind(doc.metadata.owner_agent_id.as_str())
		.bind(doc.metadata.language.as_deref())
		.bind(doc.metadata.relevance_score)
		.bind(serde_json::Value::Object(doc.metadata.extra.clone()))
		.bind(vector_to_pg(&doc.embedding))
		.bind(doc.metadata.created_at)
		.execute(&mut *tx)
		.await?;

		for tag in &doc.metadata.tags {
			sqlx::query(
				"INSERT INTO memory_node_tags (node_id, tag) VALUES ($1, $2) ON CONFLICT DO NOTHING",
			)
			.bind(doc.id)
			.bind(tag.as_str())
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;

		Ok(())
	}

	async fn search_inner(&self, spec: &SearchSpec) -> Result<Vec<ScoredDocument>> {
		let mut builder = sqlx::QueryBuilder::new(
			"\
SELECT
	n.node_id,
	n.content,
	n.content_type,
	n.owner_agent_id,
	n.language,
	n.relevance_score,
	n.extra,
	n.vec::text AS vec_text,
	n.created_at,
	COALESCE((SELECT array_agg(t.tag) FROM memory_node_tags t WHERE t.node_id = n.node_id), '{}') AS tags,
	(1 - (n.vec <=> ",
		);
		builder.push_bind(vector_to_pg(&spec.vector));
		builder.push("::text::vector))::real AS similarity FROM memory_nodes n WHERE TRUE");

		if let Some(range) = &spec.filters.time_range {
			builder.push(" AND n.created_at >= ").push_bind(range.from);
			builder.push(" AND n.created_at <= ").push_bind(range.until);
		}
		if let Some(types) = &spec.filters.content_types
			&& !types.is_empty()
		{
			let labels: Vec<String> =
				types.iter().map(|ty| ty.as_str().to_string()).collect();
			builder.push(" AND n.content_type = ANY(").push_bind(labels).push(")");
		}
		if let Some(file_types) = &spec.filters.file_types
			&& !file_types.is_empty()
		{
			builder.push(" AND n.language = ANY(").push_bind(file_types.clone()).push(")");
		}
		if let Some(tags) = &spec.filters.tags
			&& !tags.is_empty()
		{
			builder
				.push(
					" AND EXISTS (SELECT 1 FROM memory_node_tags t WHERE t.node_id = n.node_id AND t.tag = ANY(",
				)
				.push_bind(tags.clone())
				.push("))");
		}

		builder.push(" ORDER BY similarity DESC LIMIT ").push_bind(spec.limit as i64);

		let rows = builder.build().fetch_all(&self.pool).await?;
		let mut out = Vec::with_capacity(rows.len());
		for row in rows {
			out.push(row_to_scored(&row)?);
		}

		Ok(out)
	}
}

impl BackendAdapter for GraphBackend {
	fn name(&self) -> &'static str {
		"graph"
	}

	fn store<'a>(&'a self, doc: &'a MemoryDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.store_inner(doc))
	}

	fn search<'a>(&'a self, spec: &'a SearchSpec) -> BoxFuture<'a, Result<Vec<ScoredDocument>>> {
		Box::pin(self.search_inner(spec))
	}
}

fn row_to_scored(row: &PgRow) -> Result<ScoredDocument> {
	let node_id: Uuid = row.try_get("node_id")?;
	let content: String = row.try_get("content")?;
	let content_type: String = row.try_get("content_type")?;
	let owner_agent_id: String = row.try_get("owner_agent_id")?;
	let language: Option<String> = row.try_get("language")?;
	let relevance_score: Option<f32> = row.try_get("relevance_score")?;
	let extra: serde_json::Value = row.try_get("extra")?;
	let vec_text: String = row.try_get("vec_text")?;
	let created_at: OffsetDateTime = row.try_get("created_at")?;
	let tags: Vec<String> = row.try_get("tags")?;
	let similarity: f32 = row.try_get("similarity")?;

	let content_type = ContentType::parse(&content_type).ok_or_else(|| {
		Error::InvalidResponse(format!("unknown content type {content_type:?} in graph node"))
	})?;
	let extra = match extra {
		serde_json::Value::Object(map) => map,
		_ => serde_json::Map::new(),
	};

	Ok(ScoredDocument {
		document: MemoryDocument {
			id: node_id,
			content,
			content_type,
			embedding: parse_pg_vector(&vec_text)?,
			metadata: DocumentMetadata {
				owner_agent_id,
				created_at,
				tags: tags.into_iter().collect(),
				language,
				relevance_score,
				extra,
			},
		},
		score: similarity,
	})
}

pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);
	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets = trimmed
		.strip_prefix('[')
		.and_then(|s| s.strip_suffix(']'))
		.ok_or_else(|| Error::InvalidResponse("vector text is not bracketed".to_string()))?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut vec = Vec::new();

	for part in without_brackets.split(',') {
		let value: f32 = part.trim().parse().map_err(|_| {
			Error::InvalidResponse("vector text contains a non-numeric value".to_string())
		})?;
		vec.push(value);
	}

	Ok(vec)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pg_vector_round_trips() {
		let vec = vec![0.25, -1.5, 3.0];
		assert_eq!(parse_pg_vector(&vector_to_pg(&vec)).unwrap(), vec);
	}

	#[test]
	fn parse_rejects_unbracketed_text() {
		assert!(parse_pg_vector("1,2,3").is_err());
	}

	#[test]
	fn parse_handles_empty_vector() {
		assert_eq!(parse_pg_vector("[]").unwrap(), Vec::<f32>::new());
	}
}
