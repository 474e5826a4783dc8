use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use uuid::Uuid;

/// A cached response payload together with the entity names it was computed
/// from. A write to any tagged entity invalidates the entry; entries with no
/// tags (graph query results) expire by TTL only.
#[derive(Clone)]
struct CachedEntry {
	value: Value,
	tags: Arc<HashSet<String>>,
}

/// Process-wide TTL cache for reads, listings, searches, and query results.
pub struct ResponseCache {
	inner: Cache<String, CachedEntry>,
}

impl ResponseCache {
	pub fn new(ttl_secs: u64, capacity: u64) -> Self {
		let inner = Cache::builder()
			.max_capacity(capacity)
			.time_to_live(Duration::from_secs(ttl_secs.max(1)))
			.support_invalidation_closures()
			.build();
		Self { inner }
	}

	pub fn doc_key(entity: &str, id: i64) -> String {
		format!("{entity}:{id}")
	}

	pub fn list_key(entity: &str, page: usize, per_page: usize, sort: &str) -> String {
		format!("{entity}:list:{page}:{per_page}:{sort}")
	}

	pub fn search_key(
		entity: &str,
		query: &str,
		field: &str,
		page: usize,
		per_page: usize,
		sort: &str,
	) -> String {
		format!("{entity}:search:{query}:{field}:{page}:{per_page}:{sort}")
	}

	pub fn query_key(id: &Uuid) -> String {
		format!("query:{id}")
	}

	pub async fn get(&self, key: &str) -> Option<Value> {
		self.inner.get(key).await.map(|entry| entry.value)
	}

	/// Insert a payload tagged with the entities it depends on.
	pub async fn insert(
		&self,
		key: String,
		value: Value,
		tags: impl IntoIterator<Item = String>,
	) {
		let entry = CachedEntry {
			value,
			tags: Arc::new(tags.into_iter().collect()),
		};
		self.inner.insert(key, entry).await;
	}

	/// Insert a payload that only ever expires by TTL (snapshot-in-time
	/// query results).
	pub async fn insert_untagged(&self, key: String, value: Value) {
		self.insert(key, value, std::iter::empty::<String>()).await;
	}

	/// Drop every entry tagged with the mutated entity.
	pub fn invalidate_entity(&self, entity: &str) {
		let entity = entity.to_string();
		if let Err(e) = self
			.inner
			.invalidate_entries_if(move |_key, entry| entry.tags.contains(&entity))
		{
			tracing::warn!(error = %e, "cache invalidation failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn insert_and_get_roundtrip() {
		let cache = ResponseCache::new(300, 1024);
		cache
			.insert(
				ResponseCache::doc_key("person", 1),
				json!({"id": 1}),
				vec!["person".to_string()],
			)
			.await;
		assert_eq!(cache.get("person:1").await, Some(json!({"id": 1})));
		assert_eq!(cache.get("person:2").await, None);
	}

	#[tokio::test]
	async fn invalidation_is_tag_scoped() {
		let cache = ResponseCache::new(300, 1024);
		cache
			.insert(
				ResponseCache::doc_key("person", 1),
				json!({"id": 1}),
				vec!["person".to_string()],
			)
			.await;
		cache
			.insert(
				ResponseCache::doc_key("company", 9),
				json!({"id": 9}),
				vec!["company".to_string()],
			)
			.await;
		// A listing that expanded REFs can depend on several entities.
		cache
			.insert(
				ResponseCache::list_key("person", 1, 10, "id:asc"),
				json!([]),
				vec!["person".to_string(), "company".to_string()],
			)
			.await;

		cache.invalidate_entity("person");

		assert_eq!(cache.get("person:1").await, None);
		assert_eq!(cache.get("person:list:1:10:id:asc").await, None);
		assert_eq!(cache.get("company:9").await, Some(json!({"id": 9})));
	}

	#[tokio::test]
	async fn untagged_entries_survive_entity_writes() {
		let cache = ResponseCache::new(300, 1024);
		let id = Uuid::new_v4();
		cache
			.insert_untagged(ResponseCache::query_key(&id), json!([{"p": "person:1"}]))
			.await;

		cache.invalidate_entity("person");
		assert!(cache.get(&ResponseCache::query_key(&id)).await.is_some());
	}

	#[tokio::test]
	async fn entries_expire_by_ttl() {
		let cache = ResponseCache::new(1, 1024);
		cache
			.insert(
				ResponseCache::doc_key("person", 1),
				json!({"id": 1}),
				vec!["person".to_string()],
			)
			.await;
		assert!(cache.get("person:1").await.is_some());
		tokio::time::sleep(Duration::from_millis(1100)).await;
		assert_eq!(cache.get("person:1").await, None);
	}
}
