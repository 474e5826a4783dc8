use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

tokio::task_local! {
	/// Request URI captured by [`capture_request_uri`] so error envelopes can
	/// carry a `_links.self` entry without threading the URI through every
	/// fallible call.
	static REQUEST_URI: String;
}

/// Middleware that scopes the request URI for the duration of the handler.
pub async fn capture_request_uri(
	req: axum::extract::Request,
	next: axum::middleware::Next,
) -> Response {
	let uri = req.uri().to_string();
	REQUEST_URI.scope(uri, next.run(req)).await
}

/// The single error kind set used across the HTTP surface.
///
/// Validation and lookup errors are surfaced verbatim to the client;
/// unexpected failures are logged and reduced to a generic 500.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("{0}")]
	InvalidArgument(String),
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	Conflict(String),
	#[error("{0}")]
	PreconditionFailed(String),
	#[error("Validation failed")]
	Validation(Vec<String>),
	#[error("An unexpected error occurred")]
	Internal(#[from] anyhow::Error),
}

impl ApiError {
	pub fn invalid(msg: impl Into<String>) -> Self {
		ApiError::InvalidArgument(msg.into())
	}

	pub fn not_found(msg: impl Into<String>) -> Self {
		ApiError::NotFound(msg.into())
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			ApiError::InvalidArgument(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
			ApiError::NotFound(_) => StatusCode::NOT_FOUND,
			ApiError::Conflict(_) => StatusCode::CONFLICT,
			// Surfaced as 400: the resource exists but is not ready yet.
			ApiError::PreconditionFailed(_) => StatusCode::BAD_REQUEST,
			ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn details(&self) -> Option<Value> {
		match self {
			ApiError::Validation(errors) => Some(json!(errors)),
			_ => None,
		}
	}
}

impl From<std::io::Error> for ApiError {
	fn from(err: std::io::Error) -> Self {
		ApiError::Internal(err.into())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		if let ApiError::Internal(inner) = &self {
			tracing::error!(error = %inner, "request failed");
		}

		let mut error = json!({
			"message": self.to_string(),
			"status_code": status.as_u16(),
		});
		if let Some(details) = self.details() {
			error["details"] = details;
		}

		let mut body = json!({ "error": error });
		if let Ok(uri) = REQUEST_URI.try_with(|u| u.clone()) {
			body["_links"] = json!({ "self": { "href": uri } });
		}

		(status, Json(body)).into_response()
	}
}
