use axum::http::StatusCode;
use serde_json::json;

mod common;

#[cfg(feature = "integration-tests")]
mod integration_tests {
	use super::*;
	use super::common::{app_with, request, settings_for, wait_for_query};

	async fn seed_employment(app: &axum::Router) {
		request(
			app,
			"POST",
			"/api/v1/company/save/9",
			Some(json!({"name": "Initech"})),
		)
		.await;
		request(
			app,
			"POST",
			"/api/v1/person/save/1",
			Some(json!({"name": "A", "employer": {"type": "REF", "entity": "company", "id": 9}})),
		)
		.await;
		request(
			app,
			"POST",
			"/api/v1/person/save/2",
			Some(json!({"name": "B", "employer": {"type": "REF", "entity": "company", "id": 9}})),
		)
		.await;
	}

	#[tokio::test]
	async fn overlay_mirrors_document_mutations() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));
		seed_employment(&app).await;

		let (status, body) = request(&app, "GET", "/api/v1/graph/person:1/out", None).await;
		assert_eq!(status, StatusCode::OK);
		let items = body["items"].as_array().unwrap();
		assert_eq!(items.len(), 1);
		assert_eq!(items[0]["relationship"]["type"], "employer");
		assert_eq!(items[0]["target"]["id"], "company:9");

		// Rewriting the document with no REF drops the edge.
		request(&app, "PUT", "/api/v1/person/1", Some(json!({"name": "A"}))).await;
		let (_, body) = request(&app, "GET", "/api/v1/graph/person:1/out", None).await;
		assert!(body["items"].as_array().unwrap().is_empty());

		// Deleting a document removes its node entirely.
		request(&app, "DELETE", "/api/v1/person/2", None).await;
		let (status, _) = request(&app, "GET", "/api/v1/graph/nodes/person:2", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (_, body) = request(&app, "GET", "/api/v1/graph/company:9/in", None).await;
		assert!(body["items"].as_array().unwrap().is_empty());
	}

	#[tokio::test]
	async fn overlay_dumps_are_written_in_indexed_mode() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));
		seed_employment(&app).await;

		let adjacency =
			std::fs::read_to_string(dir.path().join("graph.data")).expect("adjacency dump");
		assert!(adjacency.lines().any(|l| l.starts_with("person:1:")));
		let index: serde_json::Value =
			serde_json::from_slice(&std::fs::read(dir.path().join("graph.index")).unwrap())
				.unwrap();
		assert!(index["person"].as_array().unwrap().contains(&json!("person:1")));
		assert!(
			index["relationship:employer"]
				.as_array()
				.unwrap()
				.contains(&json!("person:1"))
		);
	}

	#[tokio::test]
	async fn sulpher_query_end_to_end() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));
		seed_employment(&app).await;

		let (status, body) = request(
			&app,
			"POST",
			"/api/v1/graph/query",
			Some(json!({
				"query": "MATCH (p:person)-[:employer]->(c:company) WHERE c.id = 9 RETURN p.name"
			})),
		)
		.await;
		assert_eq!(status, StatusCode::ACCEPTED);
		let query_id = body["data"]["query_id"].as_str().unwrap().to_string();
		assert_eq!(body["data"]["status"], "pending");
		assert!(body["_links"]["result"]["href"].as_str().unwrap().contains(&query_id));

		let final_status = wait_for_query(&app, &query_id).await;
		assert_eq!(final_status["data"]["status"], "completed");

		let (status, body) = request(
			&app,
			"GET",
			&format!("/api/v1/graph/query/{query_id}/result"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		let rows = body["data"]["result"].as_array().unwrap();
		let mut names: Vec<&str> = rows.iter().map(|r| r["p.name"].as_str().unwrap()).collect();
		names.sort();
		assert_eq!(names, vec!["A", "B"]);
		assert!(body["data"]["stats"]["nodes_traversed"].as_u64().unwrap() > 0);
	}

	#[tokio::test]
	async fn unknown_query_ids_are_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));

		// Unknown ids are 404 for both status and result.
		let missing = uuid::Uuid::new_v4();
		let (status, _) = request(
			&app,
			"GET",
			&format!("/api/v1/graph/query/{missing}"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, _) = request(&app, "GET", "/api/v1/graph/query/not-a-uuid", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn failed_query_carries_its_error_as_result() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));

		let (status, body) = request(
			&app,
			"POST",
			"/api/v1/graph/query",
			Some(json!({"query": "this is not sulpher"})),
		)
		.await;
		assert_eq!(status, StatusCode::ACCEPTED);
		let query_id = body["data"]["query_id"].as_str().unwrap().to_string();

		let final_status = wait_for_query(&app, &query_id).await;
		assert_eq!(final_status["data"]["status"], "failed");

		let (status, _) = request(
			&app,
			"GET",
			&format!("/api/v1/graph/query/{query_id}/result"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn dfs_cycle_policies_end_to_end() {
		// error policy: the query fails with a cycle error
		let dir = tempfile::tempdir().unwrap();
		let mut settings = settings_for(dir.path());
		settings.graph_cycle_detection = rserv::config::CyclePolicy::Error;
		let app = app_with(settings);
		request(
			&app,
			"POST",
			"/api/v1/a/save/1",
			Some(json!({"peer": {"type": "REF", "entity": "b", "id": 1}})),
		)
		.await;
		request(
			&app,
			"POST",
			"/api/v1/b/save/1",
			Some(json!({"peer": {"type": "REF", "entity": "a", "id": 1}})),
		)
		.await;

		let query = json!({"query": "DFS MATCH (x)-[]->(y)-[]->(z) RETURN z"});
		let (_, body) = request(&app, "POST", "/api/v1/graph/query", Some(query.clone())).await;
		let query_id = body["data"]["query_id"].as_str().unwrap().to_string();
		let final_status = wait_for_query(&app, &query_id).await;
		assert_eq!(final_status["data"]["status"], "failed");

		// warn policy: the traversal finishes without re-entering
		let dir2 = tempfile::tempdir().unwrap();
		let mut settings = settings_for(dir2.path());
		settings.graph_cycle_detection = rserv::config::CyclePolicy::Warn;
		let app = app_with(settings);
		request(
			&app,
			"POST",
			"/api/v1/a/save/1",
			Some(json!({"peer": {"type": "REF", "entity": "b", "id": 1}})),
		)
		.await;
		request(
			&app,
			"POST",
			"/api/v1/b/save/1",
			Some(json!({"peer": {"type": "REF", "entity": "a", "id": 1}})),
		)
		.await;

		let (_, body) = request(&app, "POST", "/api/v1/graph/query", Some(query)).await;
		let query_id = body["data"]["query_id"].as_str().unwrap().to_string();
		let final_status = wait_for_query(&app, &query_id).await;
		assert_eq!(final_status["data"]["status"], "completed");

		let (_, body) = request(
			&app,
			"GET",
			&format!("/api/v1/graph/query/{query_id}/result"),
			None,
		)
		.await;
		assert!(body["data"]["result"].as_array().unwrap().is_empty());
	}

	#[tokio::test]
	async fn query_submission_requires_graph_mode() {
		let dir = tempfile::tempdir().unwrap();
		let mut settings = settings_for(dir.path());
		settings.rserv_graph = rserv::config::GraphMode::Disabled;
		let app = app_with(settings);

		let (status, _) = request(
			&app,
			"POST",
			"/api/v1/graph/query",
			Some(json!({"query": "MATCH (n) RETURN n"})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn node_lookup_search_and_statistics() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));
		seed_employment(&app).await;

		let (status, body) = request(&app, "GET", "/api/v1/graph/nodes/person:1", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["resource_type"], "node");
		assert_eq!(body["data"]["name"], "A");

		let (status, body) = request(
			&app,
			"POST",
			"/api/v1/graph/nodes/search",
			Some(json!({"name": "B"})),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		let items = body["items"].as_array().unwrap();
		assert_eq!(items.len(), 1);
		assert_eq!(items[0]["id"], "person:2");

		let (_, body) = request(&app, "GET", "/api/v1/graph/statistics", None).await;
		assert_eq!(body["data"]["node_count"], 3);
		// Two forward edges plus their two reverse companions.
		assert_eq!(body["data"]["edge_count"], 4);
	}

	#[tokio::test]
	async fn path_and_neighborhood_operations() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));
		seed_employment(&app).await;

		let (status, body) = request(
			&app,
			"POST",
			"/api/v1/graph/shortestPath",
			Some(json!({"start_node_id": "person:1", "end_node_id": "person:2"})),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(
			body["data"]["nodes"],
			json!(["person:1", "company:9", "person:2"])
		);
		assert_eq!(body["data"]["length"], 2);

		let (status, _) = request(
			&app,
			"POST",
			"/api/v1/graph/shortestPath",
			Some(json!({"start_node_id": "person:1", "end_node_id": "ghost:1"})),
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		let (_, body) = request(
			&app,
			"POST",
			"/api/v1/graph/pathExists",
			Some(json!({"start_node_id": "person:1", "end_node_id": "person:2", "max_depth": 1})),
		)
		.await;
		assert_eq!(body["data"]["path_exists"], false);

		let (_, body) = request(
			&app,
			"POST",
			"/api/v1/graph/commonNeighbors",
			Some(json!({"node_id1": "person:1", "node_id2": "person:2"})),
		)
		.await;
		assert_eq!(body["items"], json!(["company:9"]));

		let (_, body) = request(
			&app,
			"GET",
			"/api/v1/graph/nodes/company:9/degree?direction=in",
			None,
		)
		.await;
		assert_eq!(body["data"]["degree"], 2);

		let (_, body) = request(
			&app,
			"GET",
			"/api/v1/graph/nodes/person:1/relationships?direction=out",
			None,
		)
		.await;
		assert_eq!(body["items"], json!(["employer"]));

		let (_, body) = request(
			&app,
			"POST",
			"/api/v1/graph/nodes/neighborhoodAggregate",
			Some(json!({"node_id": "company:9", "depth": 1, "property": "id", "aggregation": "count"})),
		)
		.await;
		assert_eq!(body["data"]["result"], 2);

		let (status, _) = request(
			&app,
			"POST",
			"/api/v1/graph/nodes/neighborhoodAggregate",
			Some(json!({"node_id": "company:9", "aggregation": "median"})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);

		let (_, body) = request(
			&app,
			"POST",
			"/api/v1/graph/subgraph",
			Some(json!({"node_id": "company:9", "depth": 1})),
		)
		.await;
		assert_eq!(body["data"]["nodes"].as_array().unwrap().len(), 3);
	}
}
