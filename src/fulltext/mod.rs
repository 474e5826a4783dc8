use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

use crate::store::{EntityStore, node_ref};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Lowercased `\w+` tokens of a text.
pub fn tokenize(text: &str) -> Vec<String> {
	WORD.find_iter(&text.to_lowercase())
		.map(|m| m.as_str().to_string())
		.collect()
}

/// Contract of the full-text index. Implementations are keyed by document
/// reference (`"<entity>:<id>"`) and are updated on every document write and
/// delete; tests can substitute a mock implementation.
#[async_trait]
pub trait SearchIndex: Send + Sync + 'static {
	async fn index_document(&self, entity: &str, id: i64, doc: &Value);
	async fn remove_document(&self, entity: &str, id: i64);
	/// Document references ranked by the number of matched query tokens.
	async fn search(&self, query: &str, limit: usize) -> Vec<String>;
}

/// In-memory inverted token index: token -> set of document references.
pub struct TokenIndex {
	postings: RwLock<HashMap<String, HashSet<String>>>,
}

impl TokenIndex {
	pub fn new() -> Self {
		Self {
			postings: RwLock::new(HashMap::new()),
		}
	}
}

/// Index every document currently in the store, e.g. at startup.
pub async fn rebuild(
	index: &dyn SearchIndex,
	store: &EntityStore,
) -> Result<(), crate::error::ApiError> {
	let mut indexed = 0usize;
	for entity in store.entities().await? {
		for doc in store.list(&entity).await? {
			if let Some(id) = doc.get("id").and_then(Value::as_i64) {
				index.index_document(&entity, id, &doc).await;
				indexed += 1;
			}
		}
	}
	tracing::info!(documents = indexed, "fulltext index rebuilt from store");
	Ok(())
}

impl Default for TokenIndex {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl SearchIndex for TokenIndex {
	async fn index_document(&self, entity: &str, id: i64, doc: &Value) {
		let doc_ref = node_ref(entity, id);
		let serialized = doc.to_string();
		let tokens: HashSet<String> = tokenize(&serialized).into_iter().collect();

		let mut postings = self.postings.write();
		// Drop stale postings from a previous version of the document.
		for refs in postings.values_mut() {
			refs.remove(&doc_ref);
		}
		for token in tokens {
			postings.entry(token).or_default().insert(doc_ref.clone());
		}
	}

	async fn remove_document(&self, entity: &str, id: i64) {
		let doc_ref = node_ref(entity, id);
		let mut postings = self.postings.write();
		postings.retain(|_, refs| {
			refs.remove(&doc_ref);
			!refs.is_empty()
		});
	}

	async fn search(&self, query: &str, limit: usize) -> Vec<String> {
		let mut scores: HashMap<String, usize> = HashMap::new();
		let postings = self.postings.read();
		for token in tokenize(query) {
			if let Some(refs) = postings.get(&token) {
				for doc_ref in refs {
					*scores.entry(doc_ref.clone()).or_default() += 1;
				}
			}
		}
		drop(postings);

		let mut ranked: Vec<(String, usize)> = scores.into_iter().collect();
		// Highest match count first; ties resolve by document reference so
		// results are stable.
		ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		ranked.into_iter().take(limit).map(|(r, _)| r).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn tokenizer_lowercases_and_splits() {
		assert_eq!(
			tokenize("Hello, World_2!"),
			vec!["hello".to_string(), "world_2".to_string()]
		);
	}

	#[tokio::test]
	async fn search_ranks_by_matched_tokens() {
		let index = TokenIndex::new();
		index
			.index_document("post", 1, &json!({"id": 1, "title": "rust graph server"}))
			.await;
		index
			.index_document("post", 2, &json!({"id": 2, "title": "graph theory"}))
			.await;

		let results = index.search("rust graph", 10).await;
		assert_eq!(results[0], "post:1");
		assert_eq!(results.len(), 2);

		let results = index.search("nothing matches", 10).await;
		assert!(results.is_empty());
	}

	#[tokio::test]
	async fn reindex_drops_stale_tokens() {
		let index = TokenIndex::new();
		index
			.index_document("post", 1, &json!({"id": 1, "title": "ancient"}))
			.await;
		index
			.index_document("post", 1, &json!({"id": 1, "title": "modern"}))
			.await;

		assert!(index.search("ancient", 10).await.is_empty());
		assert_eq!(index.search("modern", 10).await, vec!["post:1"]);
	}

	#[tokio::test]
	async fn remove_document_clears_postings() {
		let index = TokenIndex::new();
		index
			.index_document("post", 1, &json!({"id": 1, "title": "ephemeral"}))
			.await;
		index.remove_document("post", 1).await;
		assert!(index.search("ephemeral", 10).await.is_empty());
	}

	#[tokio::test]
	async fn search_respects_limit() {
		let index = TokenIndex::new();
		for id in 1..=5 {
			index
				.index_document("post", id, &json!({"id": id, "body": "common"}))
				.await;
		}
		assert_eq!(index.search("common", 3).await.len(), 3);
	}
}
