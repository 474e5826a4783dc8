use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::fulltext::SearchIndex;
use crate::graph::GraphOverlay;
use crate::graph::sessions::SessionManager;
use crate::schema::SchemaRegistry;
use crate::store::EntityStore;

/// Application state passed to handlers via Axum's `State` extractor.
///
/// All shared resources live here rather than in process-wide globals: the
/// store, the schema registry, the graph overlay behind its single
/// read/write lock, the TTL cache, the query session table, and the
/// full-text index.
#[derive(Clone)]
pub struct AppState {
	pub settings: Arc<Settings>,
	pub store: Arc<EntityStore>,
	pub registry: Arc<SchemaRegistry>,
	pub graph: Arc<RwLock<GraphOverlay>>,
	pub cache: Arc<ResponseCache>,
	pub sessions: Arc<SessionManager>,
	pub fulltext: Arc<dyn SearchIndex>,
}

impl AppState {
	/// Assemble state from loaded settings, with an empty overlay and cache.
	pub fn new(settings: Settings) -> Self {
		let store = EntityStore::new(&settings.data_dir, &settings.schema_name);
		let registry = SchemaRegistry::load(&settings.schema_dir, &settings.schema_name);
		let graph = GraphOverlay::new(
			settings.rserv_graph,
			&settings.adjacency_list_file,
			&settings.adjacency_index_file,
		);
		let cache = ResponseCache::new(settings.cache_ttl, 1024);

		Self {
			settings: Arc::new(settings),
			store: Arc::new(store),
			registry: Arc::new(registry),
			graph: Arc::new(RwLock::new(graph)),
			cache: Arc::new(cache),
			sessions: Arc::new(SessionManager::new()),
			fulltext: Arc::new(crate::fulltext::TokenIndex::new()),
		}
	}
}
