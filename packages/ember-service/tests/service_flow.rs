//! End-to-end flows over in-memory backends and the deterministic embedder.

use std::sync::Arc;

use ember_backends::{BackendAdapter, local::LocalBackend};
use ember_domain::{ContentType, QueryFilters, QueryType, RagQuery};
use ember_service::{Destination, Error, MemoryService, Providers, StoreRequest};
use ember_testkit::{
	BagOfWordsEmbedder, FailingBackend, FailingEmbedder, RecordingBackend,
	bag_of_words_providers, test_config,
};

fn service_with(
	backends: Vec<Arc<dyn BackendAdapter>>,
	providers: Providers,
	dir: &tempfile::TempDir,
) -> MemoryService {
	let cfg = test_config(dir.path());
	let mirror = Arc::new(LocalBackend::in_memory());
	let mut chain = backends;

	chain.push(mirror.clone());

	MemoryService::with_parts(cfg, chain, mirror, providers).expect("service assembly failed")
}

fn request(content: &str, tags: &[&str]) -> StoreRequest {
	StoreRequest {
		content: content.to_string(),
		content_type: ContentType::Code,
		owner_agent_id: "agent-1".to_string(),
		tags: tags.iter().map(|t| t.to_string()).collect(),
		language: Some("ts".to_string()),
		extra: serde_json::Map::new(),
		destination: Destination::Private,
	}
}

fn query(text: &str, query_type: QueryType, top_k: u32) -> RagQuery {
	RagQuery {
		query_text: text.to_string(),
		query_type,
		agent_id: None,
		top_k,
		rerank: false,
		filters: QueryFilters::default(),
	}
}

#[tokio::test]
async fn stored_content_queried_verbatim_is_self_similar() {
	let dir = tempfile::tempdir().unwrap();
	let service = service_with(Vec::new(), bag_of_words_providers(), &dir);
	let content = "binary search over sorted spans";
	let id = service.store(request(content, &[])).await.unwrap();
	let response = service.query(&query(content, QueryType::Semantic, 3)).await.unwrap();

	assert!(!response.documents.is_empty());
	assert_eq!(response.documents[0].document.id, id);
	assert!(response.documents[0].score >= 0.99);
}

#[tokio::test]
async fn hybrid_query_finds_the_stored_function() {
	let dir = tempfile::tempdir().unwrap();
	let service = service_with(Vec::new(), bag_of_words_providers(), &dir);
	let id = service.store(request("function foo(){}", &["ts", "pattern"])).await.unwrap();
	let response = service.query(&query("foo function", QueryType::Hybrid, 1)).await.unwrap();

	assert_eq!(response.documents.len(), 1);
	assert_eq!(response.documents[0].document.id, id);
	assert!(response.documents[0].score > 0.0);
}

#[tokio::test]
async fn store_succeeds_in_degraded_mode_when_every_backend_fails() {
	let dir = tempfile::tempdir().unwrap();
	let cfg = test_config(dir.path());
	let mirror = Arc::new(LocalBackend::in_memory());
	let backends: Vec<Arc<dyn BackendAdapter>> =
		vec![Arc::new(FailingBackend::new("graph")), Arc::new(FailingBackend::new("qdrant"))];
	let service =
		MemoryService::with_parts(cfg, backends, mirror, bag_of_words_providers()).unwrap();
	let id = service.store(request("resilient content", &[])).await.unwrap();
	let status = service.production_status();

	assert!(status.degraded);
	assert_eq!(status.mirror_size, 1);
	assert!(service.mirror().get(id).unwrap().is_some());
	assert!(status.backends.iter().all(|b| b.live == Some(false)));
}

#[tokio::test]
async fn backend_search_failure_falls_back_to_the_mirror_silently() {
	let dir = tempfile::tempdir().unwrap();
	let service = service_with(
		vec![Arc::new(FailingBackend::new("qdrant"))],
		bag_of_words_providers(),
		&dir,
	);

	// The chain still reaches the mirror tail, so search keeps working even
	// with the preferred backend down.
	service.store(request("fallback visible content", &[])).await.unwrap();

	let response =
		service.query(&query("fallback visible content", QueryType::Semantic, 2)).await.unwrap();

	assert_eq!(response.documents.len(), 1);
}

#[tokio::test]
async fn embedding_failure_degrades_to_keyword_scoring() {
	let dir = tempfile::tempdir().unwrap();
	let cfg = test_config(dir.path());
	let mirror = Arc::new(LocalBackend::in_memory());
	let service = MemoryService::with_parts(
		cfg,
		vec![mirror.clone()],
		mirror,
		Providers { text: Box::new(FailingEmbedder), image: Box::new(FailingEmbedder) },
	)
	.unwrap();

	// Seed the mirror directly; storing would also hit the failing embedder.
	let embed = BagOfWordsEmbedder::new();
	let doc = ember_domain::MemoryDocument {
		id: uuid::Uuid::now_v7(),
		content: "keyword reachable note".to_string(),
		content_type: ContentType::Text,
		embedding: embed.vector_for("keyword reachable note"),
		metadata: ember_domain::DocumentMetadata {
			owner_agent_id: "agent-1".to_string(),
			created_at: time::OffsetDateTime::now_utc(),
			tags: Default::default(),
			language: None,
			relevance_score: None,
			extra: serde_json::Map::new(),
		},
	};

	service.mirror().insert(doc).unwrap();

	let response =
		service.query(&query("keyword reachable", QueryType::Semantic, 2)).await.unwrap();

	assert_eq!(response.search_method, "keyword_fallback");
	assert_eq!(response.documents.len(), 1);
}

#[tokio::test]
async fn identical_context_requests_hit_the_cache_not_the_backend() {
	let dir = tempfile::tempdir().unwrap();
	let cfg = test_config(dir.path());
	let mirror = Arc::new(LocalBackend::in_memory());
	let recording = Arc::new(RecordingBackend::new(mirror.clone()));
	let service = MemoryService::with_parts(
		cfg,
		vec![recording.clone()],
		mirror,
		bag_of_words_providers(),
	)
	.unwrap();

	service.store(request("shared context snippet", &[])).await.unwrap();

	let searches_after_store = recording.search_count();
	let first = service
		.retrieve_context("agent-1", "src/lib.ts", "shared context snippet", 3)
		.await
		.unwrap();
	let after_first = recording.search_count();
	let second = service
		.retrieve_context("agent-1", "src/lib.ts", "shared context snippet", 3)
		.await
		.unwrap();

	assert!(after_first > searches_after_store);
	assert_eq!(recording.search_count(), after_first, "cache hit must not re-query");
	assert_eq!(
		serde_json::to_string(&first).unwrap(),
		serde_json::to_string(&second).unwrap(),
	);
}

#[tokio::test]
async fn expired_context_entry_triggers_a_fresh_backend_query() {
	let dir = tempfile::tempdir().unwrap();
	let mut cfg = test_config(dir.path());

	cfg.cache.ttl_secs = 1;

	let mirror = Arc::new(LocalBackend::in_memory());
	let recording = Arc::new(RecordingBackend::new(mirror.clone()));
	let service = MemoryService::with_parts(
		cfg,
		vec![recording.clone()],
		mirror,
		bag_of_words_providers(),
	)
	.unwrap();

	service.store(request("ttl bounded snippet", &[])).await.unwrap();
	service.retrieve_context("agent-1", "src/lib.ts", "ttl bounded snippet", 3).await.unwrap();

	let after_first = recording.search_count();

	tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
	service.retrieve_context("agent-1", "src/lib.ts", "ttl bounded snippet", 3).await.unwrap();

	assert!(recording.search_count() > after_first, "expired entry must re-query the backend");
}

#[tokio::test]
async fn shared_destination_passes_the_privacy_gate() {
	let dir = tempfile::tempdir().unwrap();
	let service = service_with(Vec::new(), bag_of_words_providers(), &dir);
	let mut req = request("reach the box at 10.0.0.8 for details", &[]);

	req.destination = Destination::Shared;

	let id = service.store(req).await.unwrap();
	let stored = service.mirror().get(id).unwrap().unwrap();

	assert!(!stored.content.contains("10.0.0.8"));
	assert!(stored.content.contains("[IP_ADDRESS]"));
}

#[tokio::test]
async fn credential_bearing_content_is_rejected_for_shared_storage() {
	let dir = tempfile::tempdir().unwrap();
	let service = service_with(Vec::new(), bag_of_words_providers(), &dir);
	let mut req = request("the password is swordfish", &[]);

	req.destination = Destination::Shared;

	let err = service.store(req).await.unwrap_err();

	assert!(matches!(err, Error::SanitizationRejected { .. }));
}

#[tokio::test]
async fn huge_top_k_saturates_instead_of_overflowing() {
	let dir = tempfile::tempdir().unwrap();
	let service = service_with(Vec::new(), bag_of_words_providers(), &dir);

	service.store(request("boundless request", &[])).await.unwrap();

	let response =
		service.query(&query("boundless request", QueryType::Hybrid, u32::MAX)).await.unwrap();

	assert_eq!(response.documents.len(), 1);
}

#[tokio::test]
async fn rerank_discards_oversample_down_to_top_k() {
	let dir = tempfile::tempdir().unwrap();
	let service = service_with(Vec::new(), bag_of_words_providers(), &dir);

	for i in 0..8 {
		service.store(request(&format!("note number {i} about caching"), &[])).await.unwrap();
	}

	let mut q = query("note about caching", QueryType::Hybrid, 2);

	q.rerank = true;

	let response = service.query(&q).await.unwrap();

	assert_eq!(response.documents.len(), 2);
	assert!(response.total_matches > 2);
}
