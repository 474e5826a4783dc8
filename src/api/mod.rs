pub mod entities;
pub mod graph;
pub mod params;

use axum::Router;
use axum::http::Uri;
use axum::routing::{get, post};
use serde_json::{Value, json};

use crate::state::AppState;

/// All `/api/v1` routes. Static segments win over captures, so the entity
/// CRUD catch-alls sit harmlessly beneath `/search` and `/graph/...`.
pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/search", post(entities::fulltext_search))
		.route("/graph/query", post(graph::submit_query))
		.route("/graph/query/{query_id}", get(graph::query_status))
		.route("/graph/query/{query_id}/result", get(graph::query_result))
		.route("/graph/nodes/search", post(graph::search_nodes))
		.route(
			"/graph/nodes/neighborhoodAggregate",
			post(graph::neighborhood_aggregate),
		)
		.route("/graph/nodes/{node_id}", get(graph::node_properties))
		.route("/graph/nodes/{node_id}/degree", get(graph::node_degree))
		.route(
			"/graph/nodes/{node_id}/relationships",
			get(graph::relationship_types),
		)
		.route("/graph/shortestPath", post(graph::shortest_path))
		.route("/graph/pathExists", post(graph::path_exists))
		.route("/graph/commonNeighbors", post(graph::common_neighbors))
		.route("/graph/statistics", get(graph::statistics))
		.route("/graph/subgraph", post(graph::subgraph))
		.route("/graph/{node_ref}/in", get(graph::incoming_edges))
		.route("/graph/{node_ref}/out", get(graph::outgoing_edges))
		.route("/{entity}", post(entities::create))
		.route("/{entity}/list", get(entities::list))
		.route("/{entity}/search", get(entities::search))
		.route("/{entity}/save/{id}", post(entities::save_at))
		.route(
			"/{entity}/{id}",
			get(entities::fetch)
				.put(entities::replace)
				.patch(entities::patch)
				.delete(entities::delete),
		)
}

/// Post-write bookkeeping: fulltext reindex, graph overlay update and dump
/// persistence, cache invalidation. A successful write returns to the client
/// only after all of these have run; overlay persistence failures are logged
/// but never fail the write.
pub(crate) async fn after_write(state: &AppState, entity: &str, id: i64, doc: &Value) {
	if state.settings.fulltext_enabled {
		state.fulltext.index_document(entity, id, doc).await;
	}
	if state.settings.graph_enabled() {
		let mut overlay = state.graph.write().await;
		overlay.apply_write(entity, id, doc);
		if let Err(e) = overlay.persist().await {
			tracing::warn!(entity, id, error = %e, "graph overlay persistence failed");
		}
	}
	state.cache.invalidate_entity(entity);
}

/// Post-delete bookkeeping for a (possibly cascaded) set of node refs.
pub(crate) async fn after_delete(state: &AppState, deleted: &[String]) {
	let targets: Vec<(String, i64)> = deleted
		.iter()
		.filter_map(|node| {
			let (entity, id) = node.split_once(':')?;
			Some((entity.to_string(), id.parse::<i64>().ok()?))
		})
		.collect();

	if state.settings.fulltext_enabled {
		for (entity, id) in &targets {
			state.fulltext.remove_document(entity, *id).await;
		}
	}
	if state.settings.graph_enabled() {
		let mut overlay = state.graph.write().await;
		for (entity, id) in &targets {
			overlay.remove_document(entity, *id);
		}
		if let Err(e) = overlay.persist().await {
			tracing::warn!(error = %e, "graph overlay persistence failed");
		}
	}

	let mut invalidated = std::collections::HashSet::new();
	for (entity, _) in &targets {
		if invalidated.insert(entity.clone()) {
			state.cache.invalidate_entity(entity);
		}
	}
}

/// `{"resource_type", "data", "_links": {"self", ...}}`
pub(crate) fn resource_response(
	resource_type: &str,
	data: Value,
	uri: &Uri,
	links: &[(&str, String)],
) -> Value {
	let mut link_map = json!({ "self": { "href": uri.to_string() } });
	for (name, href) in links {
		link_map[*name] = json!({ "href": href });
	}
	json!({
		"resource_type": resource_type,
		"data": data,
		"_links": link_map,
	})
}

/// `{"resource_type": "<kind>_collection", "items", "_links": {...}}`
pub(crate) fn collection_response(
	resource_type: &str,
	items: Vec<Value>,
	uri: &Uri,
	links: &[(&str, String)],
) -> Value {
	let mut link_map = json!({ "self": { "href": uri.to_string() } });
	for (name, href) in links {
		link_map[*name] = json!({ "href": href });
	}
	json!({
		"resource_type": format!("{resource_type}_collection"),
		"items": items,
		"_links": link_map,
	})
}

/// Parse a `"<entity>:<id>"` node reference back into its parts.
pub(crate) fn split_node_ref(node: &str) -> Option<(String, i64)> {
	let (entity, id) = node.split_once(':')?;
	Some((entity.to_string(), id.parse().ok()?))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn envelopes_carry_self_and_extra_links() {
		let uri: Uri = "/api/v1/graph/statistics".parse().unwrap();
		let body = resource_response(
			"graph_statistics",
			json!({"node_count": 0}),
			&uri,
			&[("query", "/api/v1/graph/query".to_string())],
		);
		assert_eq!(body["resource_type"], "graph_statistics");
		assert_eq!(body["_links"]["self"]["href"], "/api/v1/graph/statistics");
		assert_eq!(body["_links"]["query"]["href"], "/api/v1/graph/query");

		let coll = collection_response("nodes", vec![json!(1)], &uri, &[]);
		assert_eq!(coll["resource_type"], "nodes_collection");
		assert_eq!(coll["items"].as_array().unwrap().len(), 1);
	}

	#[test]
	fn node_ref_split() {
		assert_eq!(split_node_ref("person:1"), Some(("person".to_string(), 1)));
		assert_eq!(split_node_ref("person"), None);
		assert_eq!(split_node_ref("person:x"), None);
	}
}
