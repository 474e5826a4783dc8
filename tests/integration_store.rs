use serde_json::json;

mod common;

#[cfg(feature = "integration-tests")]
mod integration_tests {
	use super::*;
	use super::common::{app_with, request, settings_for, write_schema};
	use rserv::store::EntityStore;

	#[tokio::test]
	async fn concurrent_creates_produce_unique_sequential_ids() {
		let dir = tempfile::tempdir().unwrap();
		let store = std::sync::Arc::new(EntityStore::new(dir.path().join("data"), "default"));

		let mut handles = Vec::new();
		for _ in 0..8 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				let mut ids = Vec::new();
				for _ in 0..10 {
					let id = store.allocate_id("person").await.unwrap();
					store
						.write_document("person", id, &json!({"id": id}))
						.await
						.unwrap();
					ids.push(id);
				}
				ids
			}));
		}

		let mut all = Vec::new();
		for handle in handles {
			all.extend(handle.await.unwrap());
		}
		all.sort_unstable();
		let expected: Vec<i64> = (1..=80).collect();
		assert_eq!(all, expected);
	}

	#[tokio::test]
	async fn stored_documents_carry_their_path_id() {
		let dir = tempfile::tempdir().unwrap();
		let app = app_with(settings_for(dir.path()));

		for name in ["a", "b", "c"] {
			request(&app, "POST", "/api/v1/person", Some(json!({"name": name}))).await;
		}

		let store = EntityStore::new(dir.path().join("data"), "default");
		for doc in store.list("person").await.unwrap() {
			let id = doc["id"].as_i64().unwrap();
			let on_disk = store.get("person", id).await.unwrap();
			assert_eq!(on_disk, doc);
		}
	}

	#[tokio::test]
	async fn cascade_leaves_no_dangling_refs_behind() {
		let dir = tempfile::tempdir().unwrap();
		let mut settings = settings_for(dir.path());
		settings.cascading_delete = true;
		let app = app_with(settings);

		// chain: reply -> comment -> post, plus an unrelated note
		request(&app, "POST", "/api/v1/post/save/1", Some(json!({"title": "t"}))).await;
		request(
			&app,
			"POST",
			"/api/v1/comment/save/1",
			Some(json!({"post": {"type": "REF", "entity": "post", "id": 1}})),
		)
		.await;
		request(
			&app,
			"POST",
			"/api/v1/reply/save/1",
			Some(json!({"comment": {"type": "REF", "entity": "comment", "id": 1}})),
		)
		.await;
		request(&app, "POST", "/api/v1/note/save/1", Some(json!({"body": "keep me"}))).await;

		let (_, body) = request(&app, "DELETE", "/api/v1/post/1", None).await;
		let deleted: Vec<String> = body["cascaded_deletes"]
			.as_array()
			.unwrap()
			.iter()
			.map(|v| v.as_str().unwrap().to_string())
			.collect();
		assert!(deleted.contains(&"post:1".to_string()));
		assert!(deleted.contains(&"comment:1".to_string()));
		assert!(deleted.contains(&"reply:1".to_string()));
		assert!(!deleted.contains(&"note:1".to_string()));

		// No surviving document still references a deleted one.
		let store = EntityStore::new(dir.path().join("data"), "default");
		for entity in store.entities().await.unwrap() {
			for doc in store.list(&entity).await.unwrap() {
				for (_, r) in rserv::store::ref_fields(&doc) {
					assert!(
						!deleted.contains(&r.node_ref()),
						"{entity} document still references {}",
						r.node_ref()
					);
				}
			}
		}
	}

	#[tokio::test]
	async fn schema_directory_drives_validation_per_entity() {
		let dir = tempfile::tempdir().unwrap();
		write_schema(
			dir.path(),
			"default",
			"person",
			&json!({"age": {"type": "integer", "min": 0, "max": 150}}),
		);
		let app = app_with(settings_for(dir.path()));

		let (status, _) = request(&app, "POST", "/api/v1/person", Some(json!({"age": 200})))
			.await;
		assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);

		// Entities without a schema file accept anything.
		let (status, _) = request(&app, "POST", "/api/v1/gizmo", Some(json!({"age": 200})))
			.await;
		assert_eq!(status, axum::http::StatusCode::CREATED);
	}
}
