use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Map, Value, json};

use crate::api::{after_delete, after_write, params, split_node_ref};
use crate::cache::ResponseCache;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::resolve::expand_refs;
use crate::store::{EntityStore, merge_patch, node_ref};

/// Reject empty or non-object request bodies.
fn require_object(body: Value) -> Result<Map<String, Value>, ApiError> {
	match body {
		Value::Object(map) if !map.is_empty() => Ok(map),
		_ => Err(ApiError::invalid("No input data provided")),
	}
}

async fn validated(state: &AppState, entity: &str, doc: &Value) -> Result<(), ApiError> {
	let (ok, errors) = state.registry.validate(&state.store, entity, doc).await;
	if ok {
		Ok(())
	} else {
		Err(ApiError::Validation(errors))
	}
}

/// POST `/{entity}` — create with a server-assigned id.
pub async fn create(
	State(state): State<AppState>,
	Path(entity): Path<String>,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
	EntityStore::validate_entity_name(&entity)?;
	let doc = Value::Object(require_object(body)?);

	// Validate before allocating so a rejected document does not burn an id
	// and successful creations keep a gap-free sequence.
	validated(&state, &entity, &doc).await?;

	let id = state.store.allocate_id(&entity).await?;
	let mut doc = doc;
	doc["id"] = json!(id);
	state.store.write_document(&entity, id, &doc).await?;
	after_write(&state, &entity, id, &doc).await;

	tracing::info!(entity, id, "resource created");
	Ok((
		StatusCode::CREATED,
		Json(json!({
			"message": format!("New resource of entity {entity} created successfully with id {id}"),
			"id": id,
		})),
	))
}

/// GET `/{entity}/{id}` — fetch, optionally expanding REF fields via
/// `?lookup=f1,f2&embed_depth=d`.
pub async fn fetch(
	State(state): State<AppState>,
	Path((entity, id)): Path<(String, i64)>,
	Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
	let cache_key = ResponseCache::doc_key(&entity, id);
	let lookup = query.get("lookup");

	if lookup.is_none() {
		if let Some(hit) = state.cache.get(&cache_key).await {
			tracing::debug!(entity, id, "served from cache");
			return Ok(Json(hit));
		}
	}

	let doc = state.store.get(&entity, id).await?;

	if let Some(lookup) = lookup {
		let fields: Vec<String> = lookup
			.split(',')
			.map(|f| f.trim().to_string())
			.filter(|f| !f.is_empty())
			.collect();
		let depth = query
			.get("embed_depth")
			.and_then(|v| v.parse::<usize>().ok())
			.unwrap_or(state.settings.ref_embed_depth);
		// Expanded reads are computed per request; only the plain document
		// is cached, so embed_depth variants cannot shadow each other.
		let expanded = expand_refs(&state.store, doc, &fields, 0, depth).await;
		return Ok(Json(expanded));
	}

	state
		.cache
		.insert(cache_key, doc.clone(), [entity.clone()])
		.await;
	Ok(Json(doc))
}

/// PUT `/{entity}/{id}` — full replace of an existing document.
pub async fn replace(
	State(state): State<AppState>,
	Path((entity, id)): Path<(String, i64)>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	if !state.store.exists(&entity, id).await? {
		return Err(ApiError::not_found(format!(
			"Resource of entity {entity} with id {id} not found"
		)));
	}
	let mut doc = Value::Object(require_object(body)?);
	doc["id"] = json!(id);
	validated(&state, &entity, &doc).await?;

	state.store.write_document(&entity, id, &doc).await?;
	after_write(&state, &entity, id, &doc).await;

	tracing::info!(entity, id, "resource replaced");
	Ok(Json(json!({
		"message": format!("Resource of entity {entity} with id {id} updated successfully"),
	})))
}

/// PATCH `/{entity}/{id}` — merge under the configured null policy.
pub async fn patch(
	State(state): State<AppState>,
	Path((entity, id)): Path<(String, i64)>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let existing = state.store.get(&entity, id).await?;
	let patch_map = require_object(body)?;

	let (merged, updated_fields) =
		merge_patch(&existing, &patch_map, state.settings.patch_null);
	validated(&state, &entity, &merged).await?;

	state.store.write_document(&entity, id, &merged).await?;
	after_write(&state, &entity, id, &merged).await;

	tracing::info!(entity, id, "resource patched");
	Ok(Json(json!({
		"message": format!("{entity} with id {id} patched successfully"),
		"updated_fields": updated_fields,
	})))
}

/// DELETE `/{entity}/{id}` — delete, cascading through REFs when enabled.
pub async fn delete(
	State(state): State<AppState>,
	Path((entity, id)): Path<(String, i64)>,
) -> Result<Json<Value>, ApiError> {
	if !state.store.exists(&entity, id).await? {
		return Err(ApiError::not_found(format!(
			"Resource of entity {entity} with id {id} not found"
		)));
	}

	let deleted = if state.settings.cascading_delete {
		state.store.cascade_delete(&entity, id).await?
	} else {
		state.store.delete_one(&entity, id).await?;
		vec![node_ref(&entity, id)]
	};
	after_delete(&state, &deleted).await;

	tracing::info!(entity, id, cascaded = deleted.len(), "resource deleted");
	Ok(Json(json!({
		"message": format!("{entity} with id {id} deleted successfully"),
		"cascaded_deletes": deleted,
	})))
}

/// POST `/{entity}/save/{id}` — create at a client-specified id.
pub async fn save_at(
	State(state): State<AppState>,
	Path((entity, id)): Path<(String, i64)>,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
	if state.store.exists(&entity, id).await? {
		return Err(ApiError::Conflict(format!(
			"Resource of entity {entity} with id {id} already exists"
		)));
	}
	let mut doc = Value::Object(require_object(body)?);
	doc["id"] = json!(id);
	validated(&state, &entity, &doc).await?;

	state.store.write_document(&entity, id, &doc).await?;
	after_write(&state, &entity, id, &doc).await;

	tracing::info!(entity, id, "resource saved at explicit id");
	Ok((
		StatusCode::CREATED,
		Json(json!({
			"message": format!("Resource of entity {entity} saved successfully with id {id}"),
			"id": id,
		})),
	))
}

/// GET `/{entity}/list` — paged, sorted listing.
pub async fn list(
	State(state): State<AppState>,
	Path(entity): Path<String>,
	Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
	EntityStore::validate_entity_name(&entity)?;
	let page = params::pagination(&query, state.settings.default_page_size);
	let sort = params::sort_spec(&query);
	let sort_text = params::sort_key_text(&sort);

	let cache_key = ResponseCache::list_key(&entity, page.page, page.per_page, &sort_text);
	if let Some(hit) = state.cache.get(&cache_key).await {
		return Ok(Json(hit));
	}

	let mut docs = state.store.list(&entity).await?;
	params::sort_documents(&mut docs, &sort);
	let payload = params::paginate(docs, page);

	state
		.cache
		.insert(cache_key, payload.clone(), [entity.clone()])
		.await;
	Ok(Json(payload))
}

/// Searchable rendering of a field value: strings as-is, everything else as
/// its JSON text.
fn value_text(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

/// GET `/{entity}/search?q=...&field=...` — case-insensitive substring
/// search over one field, or over every field when none is named.
pub async fn search(
	State(state): State<AppState>,
	Path(entity): Path<String>,
	Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
	EntityStore::validate_entity_name(&entity)?;
	let needle = query
		.get("q")
		.filter(|q| !q.is_empty())
		.ok_or_else(|| ApiError::invalid("Query parameter 'q' is required"))?
		.to_lowercase();
	let field = query.get("field").cloned().unwrap_or_default();

	let page = params::pagination(&query, state.settings.default_page_size);
	let sort = params::sort_spec(&query);
	let sort_text = params::sort_key_text(&sort);

	let cache_key = ResponseCache::search_key(
		&entity,
		&needle,
		&field,
		page.page,
		page.per_page,
		&sort_text,
	);
	if let Some(hit) = state.cache.get(&cache_key).await {
		return Ok(Json(hit));
	}

	let mut docs: Vec<Value> = state
		.store
		.list(&entity)
		.await?
		.into_iter()
		.filter(|doc| {
			if field.is_empty() {
				doc.as_object().is_some_and(|obj| {
					obj.values()
						.any(|v| value_text(v).to_lowercase().contains(&needle))
				})
			} else {
				doc.get(&field)
					.is_some_and(|v| value_text(v).to_lowercase().contains(&needle))
			}
		})
		.collect();
	params::sort_documents(&mut docs, &sort);
	let payload = params::paginate(docs, page);

	state
		.cache
		.insert(cache_key, payload.clone(), [entity.clone()])
		.await;
	Ok(Json(payload))
}

/// POST `/search` — ranked full-text search across all entities.
pub async fn fulltext_search(
	State(state): State<AppState>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	if !state.settings.fulltext_enabled {
		return Err(ApiError::invalid("Full-text search is not enabled"));
	}
	let body = require_object(body)?;
	let query = body
		.get("query")
		.and_then(Value::as_str)
		.filter(|q| !q.is_empty())
		.ok_or_else(|| ApiError::invalid("Query is required"))?;
	let limit = body
		.get("limit")
		.and_then(Value::as_u64)
		.unwrap_or(10) as usize;

	let mut results = Vec::new();
	for doc_ref in state.fulltext.search(query, limit).await {
		let Some((entity, id)) = split_node_ref(&doc_ref) else {
			continue;
		};
		// The index may briefly trail the store; skip anything unreadable.
		if let Ok(doc) = state.store.get(&entity, id).await {
			results.push(doc);
		}
	}

	Ok(Json(json!({ "results": results })))
}
