use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::Deserialize;

/// How `null` values in a PATCH body are applied to the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchNull {
	/// Store the `null` verbatim.
	Store,
	/// Remove the key from the document.
	Delete,
}

/// Operating mode of the graph overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphMode {
	Disabled,
	/// In-memory adjacency only; nothing is written to disk.
	Memory,
	/// In-memory adjacency plus the inverted index and both dump files.
	Indexed,
}

/// What a DFS traversal does when it would re-enter a node on the current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
	/// Abort the query with a cycle error.
	Error,
	/// Log a warning and continue without re-entering.
	Warn,
	Ignore,
	Disable,
}

macro_rules! impl_from_str {
	($ty:ident { $($text:literal => $variant:ident),+ $(,)? }) => {
		impl FromStr for $ty {
			type Err = String;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s.to_ascii_lowercase().as_str() {
					$($text => Ok($ty::$variant),)+
					other => Err(format!("invalid {} value: {other}", stringify!($ty))),
				}
			}
		}

		impl fmt::Display for $ty {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				match self {
					$($ty::$variant => write!(f, $text),)+
				}
			}
		}
	};
}

impl_from_str!(PatchNull { "store" => Store, "delete" => Delete });
impl_from_str!(GraphMode { "disabled" => Disabled, "memory" => Memory, "indexed" => Indexed });
impl_from_str!(CyclePolicy {
	"error" => Error,
	"warn" => Warn,
	"ignore" => Ignore,
	"disable" => Disable,
});

/// Runtime configuration for rserv.
///
/// Values are loaded from (in order): `config` file (optional), environment
/// variables prefixed with `RSERV_` (e.g. `RSERV_PORT`), and finally CLI
/// flags applied by the binary's overlay. Later sources win.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Settings {
	pub host: String,
	pub port: u16,
	/// Root directory for entity document files.
	pub data_dir: String,
	/// Root directory for schema definition files.
	pub schema_dir: String,
	/// Active schema directory under `schema_dir`.
	pub schema_name: String,
	pub patch_null: PatchNull,
	pub cascading_delete: bool,
	pub rserv_graph: GraphMode,
	pub adjacency_list_file: String,
	pub adjacency_index_file: String,
	pub graph_cycle_detection: CyclePolicy,
	/// Read/listing/search cache TTL in seconds.
	pub cache_ttl: u64,
	/// Retention of finished graph query sessions in seconds.
	pub graph_query_ttl: u64,
	pub default_page_size: usize,
	pub max_query_depth: usize,
	pub ref_embed_depth: usize,
	pub fulltext_enabled: bool,
	pub log_level: Option<String>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			host: "0.0.0.0".to_string(),
			port: 9090,
			data_dir: "data".to_string(),
			schema_dir: "schema".to_string(),
			schema_name: "default".to_string(),
			patch_null: PatchNull::Store,
			cascading_delete: false,
			rserv_graph: GraphMode::Indexed,
			adjacency_list_file: "graph.data".to_string(),
			adjacency_index_file: "graph.index".to_string(),
			graph_cycle_detection: CyclePolicy::Warn,
			cache_ttl: 300,
			graph_query_ttl: 86_400,
			default_page_size: 10,
			max_query_depth: 10,
			ref_embed_depth: 3,
			fulltext_enabled: false,
			log_level: Some("info".to_string()),
		}
	}
}

impl Settings {
	/// The overlay is maintained in any mode other than `disabled`.
	pub fn graph_enabled(&self) -> bool {
		self.rserv_graph != GraphMode::Disabled
	}

	/// Dump files are only written in `indexed` mode.
	pub fn graph_indexed(&self) -> bool {
		self.rserv_graph == GraphMode::Indexed
	}
}

/// Partial settings used to overlay environment/file values on top of defaults.
#[derive(Debug, Default, Deserialize)]
struct PartialSettings {
	host: Option<String>,
	port: Option<u16>,
	data_dir: Option<String>,
	schema_dir: Option<String>,
	schema_name: Option<String>,
	patch_null: Option<PatchNull>,
	cascading_delete: Option<bool>,
	rserv_graph: Option<GraphMode>,
	adjacency_list_file: Option<String>,
	adjacency_index_file: Option<String>,
	graph_cycle_detection: Option<CyclePolicy>,
	cache_ttl: Option<u64>,
	graph_query_ttl: Option<u64>,
	default_page_size: Option<usize>,
	max_query_depth: Option<usize>,
	ref_embed_depth: Option<usize>,
	fulltext_enabled: Option<bool>,
	log_level: Option<String>,
}

impl PartialSettings {
	fn overlay(self, s: &mut Settings) {
		macro_rules! take {
			($($field:ident),+ $(,)?) => {
				$(if let Some(v) = self.$field {
					s.$field = v;
				})+
			};
		}
		take!(
			host,
			port,
			data_dir,
			schema_dir,
			schema_name,
			patch_null,
			cascading_delete,
			rserv_graph,
			adjacency_list_file,
			adjacency_index_file,
			graph_cycle_detection,
			cache_ttl,
			graph_query_ttl,
			default_page_size,
			max_query_depth,
			ref_embed_depth,
			fulltext_enabled,
		);
		if self.log_level.is_some() {
			s.log_level = self.log_level;
		}
	}
}

/// Read and parse an `RSERV_`-prefixed environment variable directly.
///
/// Some environments (CI, test harnesses) set env vars in ways the `config`
/// crate doesn't map as expected; read them directly so explicit overrides
/// always take effect.
fn env_override<T: FromStr>(name: &str) -> Option<T> {
	std::env::var(format!("RSERV_{name}"))
		.ok()
		.filter(|v| !v.is_empty())
		.and_then(|v| v.parse::<T>().ok())
}

/// Load settings from config file (optional) and environment variables.
pub fn load() -> Result<Settings> {
	let builder = config::Config::builder()
		.add_source(config::File::with_name("config").required(false))
		// Use a double-underscore separator so single-underscore env names like
		// `RSERV_SCHEMA_NAME` map to `schema_name` instead of nested keys.
		.add_source(config::Environment::with_prefix("RSERV").separator("__"));

	let cfg = builder.build()?;
	let partial: PartialSettings = cfg.try_deserialize()?;

	let mut s = Settings::default();
	partial.overlay(&mut s);

	macro_rules! env_take {
		($($name:literal => $field:ident : $ty:ty),+ $(,)?) => {
			$(if let Some(v) = env_override::<$ty>($name) {
				s.$field = v;
			})+
		};
	}
	env_take!(
		"HOST" => host: String,
		"PORT" => port: u16,
		"DATA_DIR" => data_dir: String,
		"SCHEMA_DIR" => schema_dir: String,
		"SCHEMA_NAME" => schema_name: String,
		"PATCH_NULL" => patch_null: PatchNull,
		"CASCADING_DELETE" => cascading_delete: bool,
		"RSERV_GRAPH" => rserv_graph: GraphMode,
		"ADJACENCY_LIST_FILE" => adjacency_list_file: String,
		"ADJACENCY_INDEX_FILE" => adjacency_index_file: String,
		"GRAPH_CYCLE_DETECTION" => graph_cycle_detection: CyclePolicy,
		"CACHE_TTL" => cache_ttl: u64,
		"GRAPH_QUERY_TTL" => graph_query_ttl: u64,
		"DEFAULT_PAGE_SIZE" => default_page_size: usize,
		"MAX_QUERY_DEPTH" => max_query_depth: usize,
		"REF_EMBED_DEPTH" => ref_embed_depth: usize,
		"FULLTEXT_ENABLED" => fulltext_enabled: bool,
	);
	if let Some(level) = env_override::<String>("LOG_LEVEL") {
		s.log_level = Some(level);
	}

	Ok(s)
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use std::env;

	#[test]
	fn parse_enum_options() {
		assert_eq!("store".parse::<PatchNull>().unwrap(), PatchNull::Store);
		assert_eq!("DELETE".parse::<PatchNull>().unwrap(), PatchNull::Delete);
		assert_eq!("indexed".parse::<GraphMode>().unwrap(), GraphMode::Indexed);
		assert_eq!("warn".parse::<CyclePolicy>().unwrap(), CyclePolicy::Warn);
		assert!("sideways".parse::<GraphMode>().is_err());
	}

	#[test]
	fn graph_enabled_derived_from_mode() {
		let mut s = Settings::default();
		s.rserv_graph = GraphMode::Disabled;
		assert!(!s.graph_enabled());
		s.rserv_graph = GraphMode::Memory;
		assert!(s.graph_enabled());
		assert!(!s.graph_indexed());
		s.rserv_graph = GraphMode::Indexed;
		assert!(s.graph_enabled() && s.graph_indexed());
	}

	#[test]
	fn test_load_defaults_and_env_overlay() {
		// Save original values so we can restore them
		let orig_host = env::var_os("RSERV_HOST");
		let orig_port = env::var_os("RSERV_PORT");
		let orig_graph = env::var_os("RSERV_RSERV_GRAPH");

		unsafe { env::remove_var("RSERV_HOST") };
		unsafe { env::remove_var("RSERV_PORT") };
		unsafe { env::remove_var("RSERV_RSERV_GRAPH") };

		let s = load().expect("load should succeed with defaults");
		let d = Settings::default();
		assert_eq!(s.host, d.host);
		assert_eq!(s.port, d.port);
		assert_eq!(s.rserv_graph, d.rserv_graph);

		// Overlay environment values and verify they take effect
		unsafe { env::set_var("RSERV_HOST", "127.0.0.1") };
		unsafe { env::set_var("RSERV_PORT", "8080") };
		unsafe { env::set_var("RSERV_RSERV_GRAPH", "memory") };

		let s2 = load().expect("load should succeed with env");
		assert_eq!(s2.host, "127.0.0.1");
		assert_eq!(s2.port, 8080u16);
		assert_eq!(s2.rserv_graph, GraphMode::Memory);

		// restore originals
		match orig_host {
			Some(v) => unsafe { env::set_var("RSERV_HOST", v) },
			None => unsafe { env::remove_var("RSERV_HOST") },
		}
		match orig_port {
			Some(v) => unsafe { env::set_var("RSERV_PORT", v) },
			None => unsafe { env::remove_var("RSERV_PORT") },
		}
		match orig_graph {
			Some(v) => unsafe { env::set_var("RSERV_RSERV_GRAPH", v) },
			None => unsafe { env::remove_var("RSERV_RSERV_GRAPH") },
		}
	}
}
