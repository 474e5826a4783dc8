pub mod logging;

pub use logging::init_logging;

use crate::config::Settings;

/// Log the effective configuration once at startup.
pub fn startup_banner(settings: &Settings) {
	tracing::info!(
		host = %settings.host,
		port = settings.port,
		schema = %settings.schema_name,
		data_dir = %settings.data_dir,
		"rserv starting"
	);
	tracing::info!(
		mode = %settings.rserv_graph,
		query_ttl = settings.graph_query_ttl,
		cycle_detection = %settings.graph_cycle_detection,
		"graph configuration"
	);
	tracing::info!(
		cache_ttl = settings.cache_ttl,
		fulltext = settings.fulltext_enabled,
		cascading_delete = settings.cascading_delete,
		patch_null = %settings.patch_null,
		ref_embed_depth = settings.ref_embed_depth,
		max_query_depth = settings.max_query_depth,
		"feature configuration"
	);
}
