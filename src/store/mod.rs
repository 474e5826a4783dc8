pub mod ids;
pub mod resolve;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::PatchNull;
use crate::error::ApiError;

/// Entity names become path components, so the allowed alphabet is strict.
static ENTITY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// A reference value `{ "type": "REF", "entity": ..., "id": ... }` pointing
/// at another document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
	pub entity: String,
	pub id: i64,
}

impl DocRef {
	/// Parse a JSON value as a REF, if it is one.
	pub fn from_value(value: &Value) -> Option<DocRef> {
		let obj = value.as_object()?;
		if obj.get("type").and_then(Value::as_str) != Some("REF") {
			return None;
		}
		let entity = obj.get("entity")?.as_str()?.to_string();
		let id = obj.get("id")?.as_i64()?;
		Some(DocRef { entity, id })
	}

	/// The graph node identifier for the referenced document.
	pub fn node_ref(&self) -> String {
		node_ref(&self.entity, self.id)
	}
}

/// The string `"<entity>:<id>"` identifying a document (and its graph node).
pub fn node_ref(entity: &str, id: i64) -> String {
	format!("{entity}:{id}")
}

/// Iterate the REF-valued fields of a document as `(field, ref)` pairs.
pub fn ref_fields(doc: &Value) -> Vec<(String, DocRef)> {
	let Some(obj) = doc.as_object() else {
		return Vec::new();
	};
	obj.iter()
		.filter_map(|(k, v)| DocRef::from_value(v).map(|r| (k.clone(), r)))
		.collect()
}

/// Apply a PATCH body to a stored document.
///
/// The merge starts from the stored document and overlays the patch; the
/// `id` field is never changed. Under [`PatchNull::Delete`] a `null` value
/// removes the key, otherwise nulls are stored verbatim. Returns the merged
/// document together with the list of patched field names.
pub fn merge_patch(
	existing: &Value,
	patch: &Map<String, Value>,
	null_policy: PatchNull,
) -> (Value, Vec<String>) {
	let mut merged = existing
		.as_object()
		.cloned()
		.unwrap_or_default();
	let mut updated = Vec::with_capacity(patch.len());

	for (key, value) in patch {
		if key == "id" {
			continue;
		}
		updated.push(key.clone());
		if value.is_null() && null_policy == PatchNull::Delete {
			merged.remove(key);
		} else {
			merged.insert(key.clone(), value.clone());
		}
	}

	(Value::Object(merged), updated)
}

/// File-backed document store for one active schema.
///
/// Documents live at `<data_dir>/<schema>/<entity>/<id>.json` and are the
/// sole source of truth; the graph overlay and the fulltext index are
/// derived from them.
pub struct EntityStore {
	root: PathBuf,
}

impl EntityStore {
	pub fn new(data_dir: impl AsRef<Path>, schema_name: &str) -> Self {
		Self {
			root: data_dir.as_ref().join(schema_name),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Reject entity names that could escape the store directory.
	pub fn validate_entity_name(entity: &str) -> Result<(), ApiError> {
		if ENTITY_NAME.is_match(entity) {
			Ok(())
		} else {
			Err(ApiError::invalid("Invalid entity name"))
		}
	}

	pub fn validate_id(id: i64) -> Result<(), ApiError> {
		if id > 0 {
			Ok(())
		} else {
			Err(ApiError::invalid("Invalid ID"))
		}
	}

	fn entity_dir(&self, entity: &str) -> Result<PathBuf, ApiError> {
		Self::validate_entity_name(entity)?;
		let dir = self.root.join(entity);
		std::fs::create_dir_all(&dir)?;
		Ok(dir)
	}

	pub fn document_path(&self, entity: &str, id: i64) -> Result<PathBuf, ApiError> {
		Self::validate_id(id)?;
		Ok(self.entity_dir(entity)?.join(format!("{id}.json")))
	}

	/// Allocate the next ID for an entity via the locked counter file.
	pub async fn allocate_id(&self, entity: &str) -> Result<i64, ApiError> {
		let dir = self.entity_dir(entity)?;
		let id = tokio::task::spawn_blocking(move || ids::allocate(&dir))
			.await
			.map_err(|e| ApiError::Internal(e.into()))??;
		Ok(id)
	}

	pub async fn exists(&self, entity: &str, id: i64) -> Result<bool, ApiError> {
		let path = self.document_path(entity, id)?;
		Ok(tokio::fs::try_exists(&path).await?)
	}

	/// Whole-file JSON replacement. The caller is responsible for having
	/// validated the document first.
	pub async fn write_document(&self, entity: &str, id: i64, doc: &Value) -> Result<(), ApiError> {
		let path = self.document_path(entity, id)?;
		let bytes = serde_json::to_vec(doc).map_err(|e| ApiError::Internal(e.into()))?;
		tokio::fs::write(&path, bytes).await?;
		Ok(())
	}

	pub async fn get(&self, entity: &str, id: i64) -> Result<Value, ApiError> {
		let path = self.document_path(entity, id)?;
		let bytes = match tokio::fs::read(&path).await {
			Ok(b) => b,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ApiError::not_found(format!(
					"Resource of entity {entity} with id {id} not found"
				)));
			}
			Err(e) => return Err(e.into()),
		};
		serde_json::from_slice(&bytes).map_err(|e| ApiError::Internal(e.into()))
	}

	/// Remove a single document file without cascading.
	pub async fn delete_one(&self, entity: &str, id: i64) -> Result<(), ApiError> {
		let path = self.document_path(entity, id)?;
		match tokio::fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::not_found(
				format!("Resource of entity {entity} with id {id} not found"),
			)),
			Err(e) => Err(e.into()),
		}
	}

	/// All documents of one entity, in unspecified order.
	pub async fn list(&self, entity: &str) -> Result<Vec<Value>, ApiError> {
		let dir = self.entity_dir(entity)?;
		let mut docs = Vec::new();
		let mut entries = tokio::fs::read_dir(&dir).await?;
		while let Some(entry) = entries.next_entry().await? {
			let name = entry.file_name();
			let name = name.to_string_lossy();
			if !name.ends_with(".json") {
				continue;
			}
			match tokio::fs::read(entry.path()).await {
				Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
					Ok(doc) => docs.push(doc),
					Err(e) => {
						tracing::warn!(entity, file = %name, error = %e, "skipping unparsable document");
					}
				},
				Err(e) => {
					tracing::warn!(entity, file = %name, error = %e, "skipping unreadable document");
				}
			}
		}
		Ok(docs)
	}

	/// All entity directories currently present under the store root.
	pub async fn entities(&self) -> Result<Vec<String>, ApiError> {
		let mut names = Vec::new();
		let mut entries = match tokio::fs::read_dir(&self.root).await {
			Ok(e) => e,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
			Err(e) => return Err(e.into()),
		};
		while let Some(entry) = entries.next_entry().await? {
			if entry.file_type().await?.is_dir() {
				if let Ok(name) = entry.file_name().into_string() {
					names.push(name);
				}
			}
		}
		names.sort();
		Ok(names)
	}

	/// Transitively delete every document reachable from `(entity, id)` via
	/// stored REF fields.
	///
	/// A worklist is seeded with the initial target. For each popped target
	/// the file is removed and every other entity's documents are scanned for
	/// REF fields that point at it; each match is enqueued. The deleted set
	/// bounds total work so cyclic references terminate. Returns the deleted
	/// node identifiers in deletion order.
	pub async fn cascade_delete(&self, entity: &str, id: i64) -> Result<Vec<String>, ApiError> {
		let mut deleted: Vec<String> = Vec::new();
		let mut seen: HashSet<(String, i64)> = HashSet::new();
		let mut worklist: Vec<(String, i64)> = vec![(entity.to_string(), id)];
		seen.insert((entity.to_string(), id));

		while let Some((current_entity, current_id)) = worklist.pop() {
			let path = self.document_path(&current_entity, current_id)?;
			match tokio::fs::remove_file(&path).await {
				Ok(()) => deleted.push(node_ref(&current_entity, current_id)),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
				Err(e) => return Err(e.into()),
			}

			// Scan every entity for dangling references to the removed target.
			for other_entity in self.entities().await? {
				for doc in self.list(&other_entity).await? {
					let points_here = ref_fields(&doc).into_iter().any(|(_, r)| {
						r.entity == current_entity && r.id == current_id
					});
					if !points_here {
						continue;
					}
					let Some(dep_id) = doc.get("id").and_then(Value::as_i64) else {
						continue;
					};
					if seen.insert((other_entity.clone(), dep_id)) {
						worklist.push((other_entity.clone(), dep_id));
					}
				}
			}
		}

		Ok(deleted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn store() -> (tempfile::TempDir, EntityStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = EntityStore::new(dir.path(), "default");
		(dir, store)
	}

	#[test]
	fn entity_names_are_path_safe() {
		assert!(EntityStore::validate_entity_name("person_2").is_ok());
		assert!(EntityStore::validate_entity_name("../etc").is_err());
		assert!(EntityStore::validate_entity_name("a/b").is_err());
		assert!(EntityStore::validate_entity_name("a\\b").is_err());
		assert!(EntityStore::validate_entity_name("").is_err());
	}

	#[test]
	fn ref_detection() {
		let r = DocRef::from_value(&json!({"type": "REF", "entity": "post", "id": 7})).unwrap();
		assert_eq!(r.entity, "post");
		assert_eq!(r.id, 7);
		assert_eq!(r.node_ref(), "post:7");

		assert!(DocRef::from_value(&json!({"type": "ref", "entity": "post", "id": 7})).is_none());
		assert!(DocRef::from_value(&json!({"entity": "post", "id": 7})).is_none());
		assert!(DocRef::from_value(&json!(42)).is_none());
	}

	#[test]
	fn merge_patch_null_policies() {
		let existing = json!({"id": 1, "name": "A", "nick": "ay"});
		let patch = json!({"nick": null}).as_object().cloned().unwrap();

		let (merged, updated) = merge_patch(&existing, &patch, PatchNull::Delete);
		assert!(merged.get("nick").is_none());
		assert_eq!(updated, vec!["nick"]);

		let (merged, _) = merge_patch(&existing, &patch, PatchNull::Store);
		assert_eq!(merged["nick"], Value::Null);
	}

	#[test]
	fn merge_patch_never_changes_id() {
		let existing = json!({"id": 1, "name": "A"});
		let patch = json!({"id": 99, "name": "B"}).as_object().cloned().unwrap();
		let (merged, updated) = merge_patch(&existing, &patch, PatchNull::Store);
		assert_eq!(merged["id"], 1);
		assert_eq!(merged["name"], "B");
		assert_eq!(updated, vec!["name"]);
	}

	#[tokio::test]
	async fn write_get_roundtrip_and_missing_read() {
		let (_dir, store) = store();
		let doc = json!({"id": 1, "name": "A"});
		store.write_document("person", 1, &doc).await.unwrap();
		assert_eq!(store.get("person", 1).await.unwrap(), doc);

		match store.get("person", 2).await {
			Err(ApiError::NotFound(_)) => {}
			other => panic!("expected not found, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn ids_are_sequential_per_entity() {
		let (_dir, store) = store();
		assert_eq!(store.allocate_id("person").await.unwrap(), 1);
		assert_eq!(store.allocate_id("person").await.unwrap(), 2);
		assert_eq!(store.allocate_id("company").await.unwrap(), 1);
	}

	#[tokio::test]
	async fn list_skips_counter_sidecar() {
		let (_dir, store) = store();
		store.allocate_id("person").await.unwrap();
		store
			.write_document("person", 1, &json!({"id": 1}))
			.await
			.unwrap();
		let docs = store.list("person").await.unwrap();
		assert_eq!(docs.len(), 1);
	}

	#[tokio::test]
	async fn cascade_delete_follows_refs() {
		let (_dir, store) = store();
		store
			.write_document("post", 7, &json!({"id": 7, "title": "t"}))
			.await
			.unwrap();
		store
			.write_document(
				"comment",
				3,
				&json!({"id": 3, "post": {"type": "REF", "entity": "post", "id": 7}}),
			)
			.await
			.unwrap();
		store
			.write_document("comment", 4, &json!({"id": 4, "body": "unrelated"}))
			.await
			.unwrap();

		let deleted = store.cascade_delete("post", 7).await.unwrap();
		assert_eq!(deleted, vec!["post:7", "comment:3"]);
		assert!(!store.exists("post", 7).await.unwrap());
		assert!(!store.exists("comment", 3).await.unwrap());
		assert!(store.exists("comment", 4).await.unwrap());
	}

	#[tokio::test]
	async fn cascade_delete_terminates_on_reference_cycles() {
		let (_dir, store) = store();
		store
			.write_document(
				"a",
				1,
				&json!({"id": 1, "peer": {"type": "REF", "entity": "b", "id": 1}}),
			)
			.await
			.unwrap();
		store
			.write_document(
				"b",
				1,
				&json!({"id": 1, "peer": {"type": "REF", "entity": "a", "id": 1}}),
			)
			.await
			.unwrap();

		let mut deleted = store.cascade_delete("a", 1).await.unwrap();
		deleted.sort();
		assert_eq!(deleted, vec!["a:1", "b:1"]);
	}
}
