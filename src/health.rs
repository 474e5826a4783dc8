use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

/// Graph health endpoint: reports the overlay mode and its current size.
/// Always 200; a disabled overlay is healthy, just empty.
pub async fn graph_health(State(state): State<crate::state::AppState>) -> impl IntoResponse {
	let overlay = state.graph.read().await;
	(
		StatusCode::OK,
		Json(json!({
			"status": "OK",
			"graph_mode": state.settings.rserv_graph.to_string(),
			"nodes": overlay.node_count(),
			"edges": overlay.edge_count(),
		})),
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{GraphMode, Settings};
	use crate::state::AppState;

	fn test_state(dir: &std::path::Path) -> AppState {
		let mut settings = Settings::default();
		settings.data_dir = dir.join("data").to_string_lossy().to_string();
		settings.schema_dir = dir.join("schema").to_string_lossy().to_string();
		settings.adjacency_list_file = dir.join("graph.data").to_string_lossy().to_string();
		settings.adjacency_index_file = dir.join("graph.index").to_string_lossy().to_string();
		settings.rserv_graph = GraphMode::Indexed;
		AppState::new(settings)
	}

	#[tokio::test]
	async fn graph_health_reports_overlay_size() {
		let dir = tempfile::tempdir().unwrap();
		let state = test_state(dir.path());
		{
			let mut overlay = state.graph.write().await;
			overlay.apply_write("person", 1, &serde_json::json!({"id": 1}));
		}

		let response = graph_health(State(state)).await.into_response();
		assert_eq!(response.status(), StatusCode::OK);

		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(body["status"], "OK");
		assert_eq!(body["graph_mode"], "indexed");
		assert_eq!(body["nodes"], 1);
	}
}
