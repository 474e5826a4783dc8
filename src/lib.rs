pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fulltext;
pub mod graph;
pub mod health;
pub mod observability;
pub mod schema;
pub mod state;
pub mod store;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;

use crate::graph::sessions::SessionManager;

/// Assemble the full application router around shared state.
pub fn app(state: state::AppState) -> Router {
	Router::new()
		.nest("/api/v1", api::routes())
		.route("/health", get(|| async { "OK" }))
		.route("/health/graph", get(health::graph_health))
		// Defense-in-depth: trace requests, normalize paths, contain panics,
		// and bound request body sizes.
		.layer(TraceLayer::new_for_http())
		.layer(NormalizePathLayer::trim_trailing_slash())
		.layer(CatchPanicLayer::new())
		.layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)) // 10MiB
		.layer(axum::middleware::from_fn(error::capture_request_uri))
		.with_state(state)
}

/// Start the HTTP server with the given settings.
///
/// This function intentionally logs errors rather than returning them so
/// the simple `main` runner can call it without changing its signature.
pub async fn run(settings: config::Settings) {
	observability::startup_banner(&settings);

	let state = state::AppState::new(settings);

	// The overlay and the fulltext index are derived data; rebuild both from
	// the store so a stale or missing dump never survives a restart.
	if state.settings.graph_enabled() {
		let mut overlay = state.graph.write().await;
		if let Err(e) = overlay.rebuild(&state.store).await {
			tracing::error!(error = %e, "failed to rebuild graph overlay");
		}
		if let Err(e) = overlay.persist().await {
			tracing::warn!(error = %e, "failed to persist graph overlay dumps");
		}
	}
	if state.settings.fulltext_enabled {
		if let Err(e) = fulltext::rebuild(state.fulltext.as_ref(), &state.store).await {
			tracing::error!(error = %e, "failed to rebuild fulltext index");
		}
	}

	SessionManager::spawn_cleanup(state.sessions.clone(), state.settings.graph_query_ttl);

	let bind_addr: SocketAddr =
		match format!("{}:{}", state.settings.host, state.settings.port).parse() {
			Ok(a) => a,
			Err(e) => {
				tracing::error!(error = %e, "invalid listen address");
				return;
			}
		};

	let app = app(state);

	let listener = match tokio::net::TcpListener::bind(bind_addr).await {
		Ok(l) => l,
		Err(e) => {
			tracing::error!(addr = %bind_addr, error = %e, "failed to bind");
			return;
		}
	};

	tracing::info!(addr = %bind_addr, "rserv listening");
	if let Err(e) = axum::serve(listener, app).await {
		tracing::error!(error = %e, "server error");
	}
}
