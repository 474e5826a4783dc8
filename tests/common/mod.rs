//! Common test utilities: temp-dir backed settings, app state, and a small
//! request helper that drives the assembled router in-process.
use std::path::Path;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use rserv::config::Settings;
use rserv::state::AppState;
use serde_json::Value;
use tower::ServiceExt;

/// Settings rooted in a temporary directory so tests never touch the cwd.
pub fn settings_for(dir: &Path) -> Settings {
	let mut settings = Settings::default();
	settings.data_dir = dir.join("data").to_string_lossy().to_string();
	settings.schema_dir = dir.join("schema").to_string_lossy().to_string();
	settings.adjacency_list_file = dir.join("graph.data").to_string_lossy().to_string();
	settings.adjacency_index_file = dir.join("graph.index").to_string_lossy().to_string();
	settings
}

/// Write a schema file for one entity before the registry is loaded.
#[allow(dead_code)]
pub fn write_schema(dir: &Path, schema_name: &str, entity: &str, schema: &Value) {
	let schema_dir = dir.join("schema").join(schema_name);
	std::fs::create_dir_all(&schema_dir).unwrap();
	std::fs::write(
		schema_dir.join(format!("{entity}.json")),
		serde_json::to_vec(schema).unwrap(),
	)
	.unwrap();
}

/// Build the full application router over the given settings.
pub fn app_with(settings: Settings) -> Router {
	rserv::app(AppState::new(settings))
}

/// Issue one request and return `(status, parsed JSON body)`. Non-JSON
/// bodies come back as `Value::Null`.
pub async fn request(
	app: &Router,
	method: &str,
	path: &str,
	body: Option<Value>,
) -> (StatusCode, Value) {
	let builder = Request::builder()
		.method(method)
		.uri(path)
		.header(header::CONTENT_TYPE, "application/json");
	let request = match body {
		Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
		None => builder.body(Body::empty()).unwrap(),
	};

	let response = app.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
	(status, value)
}

/// Poll a query session until it leaves `pending`, returning the final
/// status payload.
#[allow(dead_code)]
pub async fn wait_for_query(app: &Router, query_id: &str) -> Value {
	for _ in 0..100 {
		let (status, body) = request(
			app,
			"GET",
			&format!("/api/v1/graph/query/{query_id}"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK, "status poll failed: {body}");
		if body["data"]["status"] != "pending" {
			return body;
		}
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	}
	panic!("query {query_id} never finished");
}
