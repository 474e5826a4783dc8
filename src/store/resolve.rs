use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::store::{DocRef, EntityStore};

/// Expand REF fields of a loaded document in place, up to `max_depth`.
///
/// Only the named fields are considered. A REF whose target exists is
/// replaced with the target document (itself expanded one level deeper for
/// the same field set); a REF whose target is missing is left in place.
/// Cycles are bounded by the depth limit alone; no visited set is kept, so
/// a self-referencing chain simply stops expanding at `max_depth`.
pub fn expand_refs<'a>(
	store: &'a EntityStore,
	mut doc: Value,
	fields: &'a [String],
	depth: usize,
	max_depth: usize,
) -> Pin<Box<dyn Future<Output = Value> + Send + 'a>> {
	Box::pin(async move {
		if depth >= max_depth || !doc.is_object() {
			return doc;
		}

		for field in fields {
			let Some(DocRef { entity, id }) = doc.get(field).and_then(DocRef::from_value)
			else {
				continue;
			};
			match store.get(&entity, id).await {
				Ok(target) => {
					let expanded =
						expand_refs(store, target, fields, depth + 1, max_depth).await;
					doc[field.as_str()] = expanded;
				}
				// Dangling REF: keep the reference value as stored.
				Err(_) => continue,
			}
		}

		doc
	})
}
