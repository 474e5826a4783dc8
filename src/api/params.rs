use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Value, json};

/// Pagination parameters: `page` (floor 1) and `per_page` (floor 1,
/// ceiling 100, default from configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
	pub page: usize,
	pub per_page: usize,
}

pub fn pagination(query: &HashMap<String, String>, default_page_size: usize) -> PageParams {
	let page = query
		.get("page")
		.and_then(|v| v.parse::<usize>().ok())
		.unwrap_or(1)
		.max(1);
	let per_page = query
		.get("per_page")
		.and_then(|v| v.parse::<usize>().ok())
		.unwrap_or(default_page_size)
		.clamp(1, 100);
	PageParams { page, per_page }
}

/// Sort specification `field:asc|desc[,field:asc|desc]`, default `id:asc`.
/// The boolean is `true` for ascending.
pub fn sort_spec(query: &HashMap<String, String>) -> Vec<(String, bool)> {
	let raw = query.get("sort").map(String::as_str).unwrap_or("id:asc");
	raw.split(',')
		.filter(|part| !part.trim().is_empty())
		.map(|part| {
			let (field, order) = part.split_once(':').unwrap_or((part, "asc"));
			(field.trim().to_string(), order.trim() != "desc")
		})
		.collect()
}

/// Canonical text of a sort spec, used in cache keys.
pub fn sort_key_text(spec: &[(String, bool)]) -> String {
	spec.iter()
		.map(|(field, asc)| format!("{field}:{}", if *asc { "asc" } else { "desc" }))
		.collect::<Vec<_>>()
		.join(",")
}

/// Type-aware comparison: numbers compare numerically, strings
/// case-insensitively, anything else by its JSON rendering. Missing values
/// sort first.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
	match (a, b) {
		(None, None) => Ordering::Equal,
		(None, Some(_)) => Ordering::Less,
		(Some(_), None) => Ordering::Greater,
		(Some(a), Some(b)) => {
			if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
				return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
			}
			if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
				return x.to_lowercase().cmp(&y.to_lowercase());
			}
			a.to_string().cmp(&b.to_string())
		}
	}
}

pub fn sort_documents(docs: &mut [Value], spec: &[(String, bool)]) {
	docs.sort_by(|a, b| {
		for (field, asc) in spec {
			let ordering = compare_values(a.get(field), b.get(field));
			if ordering != Ordering::Equal {
				return if *asc { ordering } else { ordering.reverse() };
			}
		}
		Ordering::Equal
	});
}

/// Slice a sorted result set into the standard page envelope.
pub fn paginate(docs: Vec<Value>, params: PageParams) -> Value {
	let total = docs.len();
	let total_pages = ((total + params.per_page - 1) / params.per_page).max(1);
	let start = (params.page - 1) * params.per_page;
	let items: Vec<Value> = docs
		.into_iter()
		.skip(start)
		.take(params.per_page)
		.collect();
	json!({
		"items": items,
		"total": total,
		"page": params.page,
		"per_page": params.per_page,
		"total_pages": total_pages,
	})
}
