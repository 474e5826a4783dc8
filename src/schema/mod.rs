use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::store::EntityStore;

/// Recognised field types for schema rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
	String,
	Integer,
	Float,
	Boolean,
	/// ISO-8601 datetime string.
	Datetime,
	/// `YYYY-MM-DD` date string.
	Date,
	/// Any JSON object or array.
	Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignKey {
	pub entity: String,
	pub field: String,
}

/// Rule record as written in a schema file. Unknown options make the whole
/// schema malformed; the structural pre-pass drops it with a warning.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
	#[serde(rename = "type")]
	field_type: FieldType,
	#[serde(default = "default_required")]
	required: bool,
	max_length: Option<u64>,
	min: Option<f64>,
	max: Option<f64>,
	regex: Option<String>,
	#[serde(default)]
	unique: bool,
	foreign_key: Option<ForeignKey>,
}

fn default_required() -> bool {
	true
}

/// A validated, ready-to-apply field rule.
#[derive(Debug)]
pub struct FieldRule {
	pub field_type: FieldType,
	pub required: bool,
	pub max_length: Option<u64>,
	pub min: Option<f64>,
	pub max: Option<f64>,
	pub regex: Option<Regex>,
	pub regex_source: Option<String>,
	pub unique: bool,
	pub foreign_key: Option<ForeignKey>,
}

impl FieldRule {
	fn from_raw(raw: RawRule) -> Result<Self, String> {
		if let Some(len) = raw.max_length {
			if len == 0 {
				return Err("max_length must be a positive integer".to_string());
			}
		}
		let regex = match &raw.regex {
			// Anchor at the start, like the original matcher semantics.
			Some(pattern) => Some(
				Regex::new(&format!("^(?:{pattern})"))
					.map_err(|e| format!("invalid regex: {e}"))?,
			),
			None => None,
		};
		Ok(FieldRule {
			field_type: raw.field_type,
			required: raw.required,
			max_length: raw.max_length,
			min: raw.min,
			max: raw.max,
			regex,
			regex_source: raw.regex,
			unique: raw.unique,
			foreign_key: raw.foreign_key,
		})
	}
}

pub type Schema = IndexMap<String, FieldRule>;

/// Per-entity field rules for the active schema, loaded once at startup.
///
/// Schemas live at `<schema_dir>/<schema_name>/<entity>.json`. Files that
/// fail the structural pre-pass are dropped with a warning and their
/// entities run unvalidated, as does any entity with no schema file at all.
pub struct SchemaRegistry {
	schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
	pub fn empty() -> Self {
		Self {
			schemas: HashMap::new(),
		}
	}

	pub fn load(schema_dir: impl AsRef<Path>, schema_name: &str) -> Self {
		let dir = schema_dir.as_ref().join(schema_name);
		let mut schemas = HashMap::new();

		let entries = match std::fs::read_dir(&dir) {
			Ok(e) => e,
			Err(_) => {
				tracing::info!(schema = schema_name, "no schema directory; validation disabled");
				return Self { schemas };
			}
		};

		for entry in entries.flatten() {
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			let Some(entity) = path.file_stem().and_then(|s| s.to_str()) else {
				continue;
			};
			match Self::load_one(&path) {
				Ok(schema) => {
					schemas.insert(entity.to_string(), schema);
				}
				Err(e) => {
					tracing::warn!(
						entity,
						file = %path.display(),
						error = %e,
						"dropping malformed schema; entity will run unvalidated"
					);
				}
			}
		}

		tracing::info!(schema = schema_name, entities = schemas.len(), "schemas loaded");
		Self { schemas }
	}

	fn load_one(path: &Path) -> Result<Schema, String> {
		let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
		let raw: IndexMap<String, RawRule> =
			serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
		let mut schema = Schema::new();
		for (field, rule) in raw {
			let rule = FieldRule::from_raw(rule).map_err(|e| format!("field {field}: {e}"))?;
			schema.insert(field, rule);
		}
		Ok(schema)
	}

	pub fn schema_for(&self, entity: &str) -> Option<&Schema> {
		self.schemas.get(entity)
	}

	/// Validate a document against the entity's schema, accumulating every
	/// error rather than stopping at the first.
	///
	/// Uniqueness scans exclude the document carrying the same `id` as the
	/// one under validation, so updates do not collide with themselves.
	pub async fn validate(
		&self,
		store: &EntityStore,
		entity: &str,
		doc: &Value,
	) -> (bool, Vec<String>) {
		let Some(schema) = self.schemas.get(entity) else {
			return (true, Vec::new());
		};

		let mut errors = Vec::new();
		let empty = serde_json::Map::new();
		let fields = doc.as_object().unwrap_or(&empty);
		let own_id = fields.get("id").and_then(Value::as_i64);

		for (field, rule) in schema {
			let Some(value) = fields.get(field) else {
				if rule.required {
					errors.push(format!("Missing required field: {field}"));
				}
				continue;
			};

			check_type(field, rule, value, &mut errors);

			if let Some(fk) = &rule.foreign_key {
				let file_name = match value {
					Value::Number(n) => Some(n.to_string()),
					Value::String(s) => Some(s.clone()),
					_ => None,
				};
				let exists = match file_name {
					Some(name) => {
						let path = store.root().join(&fk.entity).join(format!("{name}.json"));
						tokio::fs::try_exists(&path).await.unwrap_or(false)
					}
					None => false,
				};
				if !exists {
					errors.push(format!(
						"Foreign key constraint failed: {} with {}={} does not exist",
						fk.entity, fk.field, value
					));
				}
			}

			if rule.unique {
				let siblings = store.list(entity).await.unwrap_or_default();
				let duplicate = siblings.iter().any(|other| {
					let other_id = other.get("id").and_then(Value::as_i64);
					if own_id.is_some() && other_id == own_id {
						return false;
					}
					other.get(field.as_str()) == Some(value)
				});
				if duplicate {
					errors.push(format!("Field {field} must be unique"));
				}
			}
		}

		(errors.is_empty(), errors)
	}
}

fn check_type(field: &str, rule: &FieldRule, value: &Value, errors: &mut Vec<String>) {
	match rule.field_type {
		FieldType::String => match value.as_str() {
			Some(s) => {
				if let Some(max) = rule.max_length {
					if s.chars().count() as u64 > max {
						errors.push(format!("Field {field} exceeds maximum length of {max}"));
					}
				}
				if let Some(re) = &rule.regex {
					if !re.is_match(s) {
						errors.push(format!(
							"Field {field} does not match the required pattern: {}",
							rule.regex_source.as_deref().unwrap_or_default()
						));
					}
				}
			}
			None => errors.push(format!("Field {field} must be a string")),
		},
		FieldType::Integer => match value.as_i64() {
			Some(n) => check_bounds(field, rule, n as f64, errors),
			None => errors.push(format!("Field {field} must be an integer")),
		},
		FieldType::Float => match value.as_f64() {
			Some(n) => check_bounds(field, rule, n, errors),
			None => errors.push(format!("Field {field} must be a number")),
		},
		FieldType::Boolean => {
			if !value.is_boolean() {
				errors.push(format!("Field {field} must be a boolean"));
			}
		}
		FieldType::Datetime => {
			let ok = value.as_str().is_some_and(is_iso_datetime);
			if !ok {
				errors.push(format!(
					"Field {field} must be a valid ISO format datetime string"
				));
			}
		}
		FieldType::Date => {
			let ok = value
				.as_str()
				.is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
			if !ok {
				errors.push(format!(
					"Field {field} must be a valid date string in YYYY-MM-DD format"
				));
			}
		}
		FieldType::Json => {
			if !value.is_object() && !value.is_array() {
				errors.push(format!("Field {field} must be a valid JSON object or array"));
			}
		}
	}
}

fn check_bounds(field: &str, rule: &FieldRule, value: f64, errors: &mut Vec<String>) {
	if let Some(min) = rule.min {
		if value < min {
			errors.push(format!(
				"Field {field} must be greater than or equal to {min}"
			));
		}
	}
	if let Some(max) = rule.max {
		if value > max {
			errors.push(format!("Field {field} must be less than or equal to {max}"));
		}
	}
}

/// Accept RFC 3339 as well as timezone-less ISO-8601 timestamps.
fn is_iso_datetime(s: &str) -> bool {
	DateTime::parse_from_rfc3339(s).is_ok()
		|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
		|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
}
