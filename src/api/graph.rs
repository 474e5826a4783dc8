use std::collections::HashMap;

use axum::Json;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::{collection_response, resource_response};
use crate::cache::ResponseCache;
use crate::error::ApiError;
use crate::graph::ops::{self, Direction};
use crate::graph::query::executor::{ExecConfig, execute};
use crate::graph::query::parser;
use crate::graph::sessions::QueryStatus;
use crate::state::AppState;

fn body_object(body: Value) -> Result<serde_json::Map<String, Value>, ApiError> {
	body.as_object()
		.cloned()
		.ok_or_else(|| ApiError::invalid("No input data provided"))
}

fn result_link(id: &Uuid) -> String {
	format!("/api/v1/graph/query/{id}/result")
}

fn status_link(id: &Uuid) -> String {
	format!("/api/v1/graph/query/{id}")
}

fn node_link(node_id: &str) -> String {
	format!("/api/v1/graph/nodes/{node_id}")
}

/// POST `/graph/query` — record a pending session, schedule execution, and
/// return 202 immediately.
pub async fn submit_query(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
	if !state.settings.graph_enabled() {
		return Err(ApiError::invalid("Graph querying is not enabled"));
	}
	let body = body_object(body)?;
	let query = body
		.get("query")
		.and_then(Value::as_str)
		.filter(|q| !q.is_empty())
		.ok_or_else(|| ApiError::invalid("Query string is required"))?
		.to_string();
	let max_depth = body
		.get("max_depth")
		.and_then(Value::as_u64)
		.map(|d| d as usize)
		.unwrap_or(state.settings.max_query_depth);

	let id = state.sessions.create(&query);
	spawn_execution(state.clone(), id, query, max_depth);

	let data = json!({ "query_id": id, "status": QueryStatus::Pending });
	Ok((
		StatusCode::ACCEPTED,
		Json(resource_response(
			"query",
			data,
			&uri,
			&[("result", result_link(&id))],
		)),
	))
}

/// Execute a session's query on a background task against a shared-lock
/// snapshot of the overlay. Completion caches the result payload under
/// `query:<uuid>` so it outlives session cleanup until the TTL expires.
fn spawn_execution(state: AppState, id: Uuid, query: String, max_depth: usize) {
	let cfg = ExecConfig {
		max_depth,
		cycle_policy: state.settings.graph_cycle_detection,
	};
	tokio::spawn(async move {
		let outcome = {
			let overlay = state.graph.read().await;
			parser::parse(&query).and_then(|plan| execute(&plan, &overlay, &cfg))
		};
		match outcome {
			Ok(execution) => {
				let rows: Vec<Value> = execution.rows.into_iter().map(Value::Object).collect();
				state
					.sessions
					.complete(&id, Value::Array(rows), execution.nodes_traversed);
				if let Some(session) = state.sessions.get(&id) {
					let payload = json!({
						"result": session.result,
						"stats": session.stats,
					});
					state
						.cache
						.insert_untagged(ResponseCache::query_key(&id), payload)
						.await;
				}
			}
			Err(e) => {
				tracing::warn!(query_id = %id, error = %e, "graph query failed");
				state.sessions.fail(&id, e.to_string(), 0);
			}
		}
	});
}

/// GET `/graph/query/{query_id}` — session status.
pub async fn query_status(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(query_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
	let id = query_id
		.parse::<Uuid>()
		.map_err(|_| ApiError::not_found("Query not found"))?;
	let session = state
		.sessions
		.get(&id)
		.ok_or_else(|| ApiError::not_found("Query not found"))?;

	let data = json!({ "query_id": session.id, "status": session.status });
	Ok(Json(resource_response(
		"query_status",
		data,
		&uri,
		&[("result", result_link(&id))],
	)))
}

/// GET `/graph/query/{query_id}/result` — the result of a completed query.
/// Falls back to the result cache when the session has already been cleaned
/// up.
pub async fn query_result(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(query_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
	let id = query_id
		.parse::<Uuid>()
		.map_err(|_| ApiError::not_found("Query not found"))?;

	let data = match state.sessions.get(&id) {
		Some(session) if session.status == QueryStatus::Completed => json!({
			"result": session.result,
			"stats": session.stats,
		}),
		Some(_) => {
			return Err(ApiError::PreconditionFailed(
				"Query has not completed yet".to_string(),
			));
		}
		None => state
			.cache
			.get(&ResponseCache::query_key(&id))
			.await
			.ok_or_else(|| ApiError::not_found("Query not found"))?,
	};

	Ok(Json(resource_response(
		"query_result",
		data,
		&uri,
		&[("query", status_link(&id))],
	)))
}

/// GET `/graph/nodes/{node_id}` — node properties.
pub async fn node_properties(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
	let overlay = state.graph.read().await;
	let entry = overlay
		.node(&node_id)
		.ok_or_else(|| ApiError::not_found("Node not found"))?;

	let links = [
		(
			"relationships",
			format!("{}/relationships", node_link(&node_id)),
		),
		("subgraph", "/api/v1/graph/subgraph".to_string()),
		(
			"neighborhood",
			"/api/v1/graph/nodes/neighborhoodAggregate".to_string(),
		),
	];
	Ok(Json(resource_response(
		"node",
		entry.properties.clone(),
		&uri,
		&links,
	)))
}

/// POST `/graph/nodes/search` — property-equality node search.
pub async fn search_nodes(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let criteria = body_object(body)?;
	let overlay = state.graph.read().await;
	let items: Vec<Value> = ops::search_nodes(&overlay, &criteria)
		.into_iter()
		.map(|(id, props)| json!({ "id": id, "properties": props }))
		.collect();
	Ok(Json(collection_response("nodes", items, &uri, &[])))
}

/// POST `/graph/shortestPath` — bounded shortest path between two nodes.
pub async fn shortest_path(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let body = body_object(body)?;
	let (start, end) = endpoint_pair(&body, "start_node_id", "end_node_id")
		.ok_or_else(|| ApiError::invalid("Start and end node IDs are required"))?;
	let max_depth = body
		.get("max_depth")
		.and_then(Value::as_u64)
		.map(|d| d as usize)
		.unwrap_or(state.settings.max_query_depth);

	let overlay = state.graph.read().await;
	let path = ops::shortest_path(&overlay, &start, &end, max_depth)
		.ok_or_else(|| ApiError::not_found("No path found"))?;

	let data = json!({ "nodes": path, "length": path.len() - 1 });
	let links = [
		("start_node", node_link(&start)),
		("end_node", node_link(&end)),
	];
	Ok(Json(resource_response("shortest_path", data, &uri, &links)))
}

/// POST `/graph/pathExists` — bounded reachability.
pub async fn path_exists(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let body = body_object(body)?;
	let (start, end) = endpoint_pair(&body, "start_node_id", "end_node_id")
		.ok_or_else(|| ApiError::invalid("Start and end node IDs are required"))?;
	let max_depth = body
		.get("max_depth")
		.and_then(Value::as_u64)
		.map(|d| d as usize)
		.unwrap_or(state.settings.max_query_depth);

	let overlay = state.graph.read().await;
	let exists = ops::path_exists(&overlay, &start, &end, max_depth);

	let data = json!({
		"start_node_id": start,
		"end_node_id": end,
		"path_exists": exists,
		"max_depth": max_depth,
	});
	let links = [
		("start_node", node_link(&start)),
		("end_node", node_link(&end)),
		("shortest_path", "/api/v1/graph/shortestPath".to_string()),
	];
	Ok(Json(resource_response("path_existence", data, &uri, &links)))
}

/// POST `/graph/commonNeighbors` — intersection of two adjacency sets.
pub async fn common_neighbors(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let body = body_object(body)?;
	let (a, b) = endpoint_pair(&body, "node_id1", "node_id2")
		.ok_or_else(|| ApiError::invalid("Both node IDs are required"))?;

	let overlay = state.graph.read().await;
	let items: Vec<Value> = ops::common_neighbors(&overlay, &a, &b)
		.into_iter()
		.map(Value::String)
		.collect();

	let links = [("node1", node_link(&a)), ("node2", node_link(&b))];
	Ok(Json(collection_response(
		"common_neighbors",
		items,
		&uri,
		&links,
	)))
}

/// GET `/graph/nodes/{node_id}/degree?direction=in|out|all`.
pub async fn node_degree(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
	Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
	let direction = query.get("direction").map(String::as_str);
	let overlay = state.graph.read().await;
	let degree = ops::degree(&overlay, &node_id, Direction::parse(direction));

	let data = json!({
		"node_id": node_id,
		"degree": degree,
		"direction": direction.unwrap_or("all"),
	});
	let links = [
		("node", node_link(&node_id)),
		(
			"relationships",
			format!("{}/relationships", node_link(&node_id)),
		),
	];
	Ok(Json(resource_response("node_degree", data, &uri, &links)))
}

/// GET `/graph/nodes/{node_id}/relationships?direction=in|out|all`.
pub async fn relationship_types(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(node_id): Path<String>,
	Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
	let direction = query.get("direction").map(String::as_str);
	let overlay = state.graph.read().await;
	let items: Vec<Value> = ops::relationship_types(&overlay, &node_id, Direction::parse(direction))
		.into_iter()
		.map(Value::String)
		.collect();

	let links = [
		("node", node_link(&node_id)),
		("incoming", format!("/api/v1/graph/{node_id}/in")),
		("outgoing", format!("/api/v1/graph/{node_id}/out")),
	];
	Ok(Json(collection_response(
		"relationship_types",
		items,
		&uri,
		&links,
	)))
}

/// POST `/graph/nodes/neighborhoodAggregate` — count/sum/avg over the k-hop
/// neighbourhood of a node.
pub async fn neighborhood_aggregate(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let body = body_object(body)?;
	let node_id = body
		.get("node_id")
		.and_then(Value::as_str)
		.ok_or_else(|| ApiError::invalid("Node ID is required"))?
		.to_string();
	let depth = body
		.get("depth")
		.and_then(Value::as_u64)
		.map(|d| d as usize)
		.unwrap_or(1);
	let property = body
		.get("property")
		.and_then(Value::as_str)
		.unwrap_or("id")
		.to_string();
	let aggregation = body
		.get("aggregation")
		.and_then(Value::as_str)
		.unwrap_or("count")
		.to_string();

	let overlay = state.graph.read().await;
	let result = ops::neighborhood_aggregate(&overlay, &node_id, depth, &property, &aggregation)
		.ok_or_else(|| ApiError::invalid("Invalid aggregation function"))?;

	let data = json!({
		"node_id": node_id,
		"depth": depth,
		"property": property,
		"aggregation": aggregation,
		"result": result,
	});
	let links = [
		("node", node_link(&node_id)),
		("subgraph", "/api/v1/graph/subgraph".to_string()),
	];
	Ok(Json(resource_response(
		"neighborhood_aggregate",
		data,
		&uri,
		&links,
	)))
}

/// GET `/graph/statistics` — node count, edge count, average out-degree.
pub async fn statistics(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
) -> Result<Json<Value>, ApiError> {
	let overlay = state.graph.read().await;
	let stats = ops::statistics(&overlay);
	let links = [
		("nodes", "/api/v1/graph/nodes/search".to_string()),
		("query", "/api/v1/graph/query".to_string()),
	];
	Ok(Json(resource_response(
		"graph_statistics",
		stats,
		&uri,
		&links,
	)))
}

/// GET `/graph/{node_ref}/in` — edges pointing at a node.
pub async fn incoming_edges(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(node_ref): Path<String>,
) -> Result<Json<Value>, ApiError> {
	let overlay = state.graph.read().await;
	let items = ops::incoming_edges(&overlay, &node_ref);
	let links = [
		("node", node_link(&node_ref)),
		("outgoing", format!("/api/v1/graph/{node_ref}/out")),
	];
	Ok(Json(collection_response(
		"incoming_edges",
		items,
		&uri,
		&links,
	)))
}

/// GET `/graph/{node_ref}/out` — edges leaving a node.
pub async fn outgoing_edges(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Path(node_ref): Path<String>,
) -> Result<Json<Value>, ApiError> {
	let overlay = state.graph.read().await;
	let items = ops::outgoing_edges(&overlay, &node_ref);
	let links = [
		("node", node_link(&node_ref)),
		("incoming", format!("/api/v1/graph/{node_ref}/in")),
	];
	Ok(Json(collection_response(
		"outgoing_edges",
		items,
		&uri,
		&links,
	)))
}

/// POST `/graph/subgraph` — k-hop induced subgraph around a node.
pub async fn subgraph(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let body = body_object(body)?;
	let node_id = body
		.get("node_id")
		.and_then(Value::as_str)
		.ok_or_else(|| ApiError::invalid("Node ID is required"))?
		.to_string();
	let depth = body
		.get("depth")
		.and_then(Value::as_u64)
		.map(|d| d as usize)
		.unwrap_or(1);

	let overlay = state.graph.read().await;
	let data = ops::subgraph(&overlay, &node_id, depth);
	let links = [("center_node", node_link(&node_id))];
	Ok(Json(resource_response("subgraph", data, &uri, &links)))
}

fn endpoint_pair(
	body: &serde_json::Map<String, Value>,
	first: &str,
	second: &str,
) -> Option<(String, String)> {
	let a = body.get(first).and_then(Value::as_str)?;
	let b = body.get(second).and_then(Value::as_str)?;
	if a.is_empty() || b.is_empty() {
		return None;
	}
	Some((a.to_string(), b.to_string()))
}
