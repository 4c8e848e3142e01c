//! TTL cache for assembled retrieval contexts. Keys are a cheap polynomial
//! rolling hash, base-36 encoded; collisions only cost a wrong-context miss
//! on re-validation, never correctness, since cached values are re-computable.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use crate::context::RagContext;

struct CacheEntry {
	value: RagContext,
	stored_at: Instant,
}

struct Shared {
	entries: Mutex<HashMap<String, CacheEntry>>,
	ttl: Duration,
}

impl Shared {
	fn sweep(&self) {
		let Ok(mut entries) = self.entries.lock() else {
			return;
		};
		let before = entries.len();

		entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);

		let removed = before - entries.len();

		if removed > 0 {
			tracing::debug!(removed, "Swept expired cache entries.");
		}
	}
}

pub struct QueryCache {
	shared: Arc<Shared>,
	sweeper: Option<tokio::task::JoinHandle<()>>,
}

impl QueryCache {
	/// The periodic sweep only spawns when enabled; tests run with it off so
	/// no timer outlives the test body.
	pub fn new(cfg: &ember_config::Cache) -> Self {
		let shared = Arc::new(Shared {
			entries: Mutex::new(HashMap::new()),
			ttl: Duration::from_secs(cfg.ttl_secs),
		});
		let sweeper = if cfg.sweep_enabled {
			let shared = shared.clone();
			let interval = Duration::from_secs(cfg.sweep_interval_secs.max(1));

			Some(tokio::spawn(async move {
				let mut ticker = tokio::time::interval(interval);

				loop {
					ticker.tick().await;
					shared.sweep();
				}
			}))
		} else {
			None
		};

		Self { shared, sweeper }
	}

	/// Stale entries are treated as a miss and evicted at read time, so
	/// correctness never depends on the background sweep.
	pub fn get(&self, key: &str) -> Option<RagContext> {
		let mut entries = self.shared.entries.lock().ok()?;

		match entries.get(key) {
			Some(entry) if entry.stored_at.elapsed() < self.shared.ttl =>
				Some(entry.value.clone()),
			Some(_) => {
				entries.remove(key);

				None
			},
			None => None,
		}
	}

	pub fn insert(&self, key: String, value: RagContext) {
		if let Ok(mut entries) = self.shared.entries.lock() {
			entries.insert(key, CacheEntry { value, stored_at: Instant::now() });
		}
	}

	/// Full invalidation, e.g. on backend reconfiguration.
	pub fn clear(&self) {
		if let Ok(mut entries) = self.shared.entries.lock() {
			entries.clear();
		}
	}

	pub fn len(&self) -> usize {
		self.shared.entries.lock().map(|entries| entries.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Drop for QueryCache {
	fn drop(&mut self) {
		if let Some(sweeper) = self.sweeper.take() {
			sweeper.abort();
		}
	}
}

const HASH_BASE: u64 = 31;

/// Stable non-cryptographic key over agent, file path, and the first 1,000
/// characters of content.
pub fn cache_key(agent_id: &str, file_path: &str, content: &str) -> String {
	let prefix: String = content.chars().take(1_000).collect();
	let mut hash: u64 = 0;

	for part in [agent_id, file_path, &prefix] {
		for byte in part.bytes() {
			hash = hash.wrapping_mul(HASH_BASE).wrapping_add(byte as u64);
		}

		// Field separator so ("ab","c") and ("a","bc") differ.
		hash = hash.wrapping_mul(HASH_BASE).wrapping_add(0x1f);
	}

	to_base36(hash)
}

fn to_base36(mut value: u64) -> String {
	const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

	if value == 0 {
		return "0".to_string();
	}

	let mut out = Vec::new();

	while value > 0 {
		out.push(DIGITS[(value % 36) as usize]);
		value /= 36;
	}

	out.reverse();

	String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use super::*;

	fn context() -> RagContext {
		RagContext {
			agent_id: "agent".to_string(),
			file_path: "src/lib.rs".to_string(),
			documents: Vec::new(),
			search_method: "hybrid".to_string(),
			assembled_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	fn cache_config(ttl_secs: u64) -> ember_config::Cache {
		ember_config::Cache { ttl_secs, sweep_interval_secs: 60, sweep_enabled: false }
	}

	#[test]
	fn identical_inputs_hash_identically() {
		assert_eq!(cache_key("a", "f.rs", "content"), cache_key("a", "f.rs", "content"));
		assert_ne!(cache_key("a", "f.rs", "content"), cache_key("b", "f.rs", "content"));
	}

	#[test]
	fn field_boundaries_affect_the_key() {
		assert_ne!(cache_key("ab", "c", ""), cache_key("a", "bc", ""));
	}

	#[test]
	fn keys_are_base36() {
		let key = cache_key("agent", "path", "content");

		assert!(key.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
	}

	#[test]
	fn content_beyond_first_thousand_chars_is_ignored() {
		let base = "x".repeat(1_000);
		let a = format!("{base}AAAA");
		let b = format!("{base}BBBB");

		assert_eq!(cache_key("a", "f", &a), cache_key("a", "f", &b));
	}

	#[tokio::test]
	async fn hit_within_ttl_and_miss_after_expiry() {
		let cache = QueryCache::new(&cache_config(1));

		cache.insert("k".to_string(), context());
		assert!(cache.get("k").is_some());

		tokio::time::sleep(Duration::from_millis(1_100)).await;

		assert!(cache.get("k").is_none());
		// Evicted at read time, not merely hidden.
		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn clear_empties_the_cache() {
		let cache = QueryCache::new(&cache_config(300));

		cache.insert("k".to_string(), context());
		cache.clear();

		assert!(cache.get("k").is_none());
	}
}
