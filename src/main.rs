use std::str::FromStr;

use clap::Parser;
use rserv::config::{self, CyclePolicy, GraphMode, PatchNull, Settings};
use rserv::{observability, run};

/// CLI flags overlay the loaded configuration: flags > env > defaults.
#[derive(Parser)]
#[command(name = "rserv", version, about = "rserv - a file-backed document server with a property-graph overlay")]
struct Cli {
	/// Bind host
	#[arg(long)]
	host: Option<String>,
	/// Bind port
	#[arg(long)]
	port: Option<u16>,
	/// Root directory for entity documents
	#[arg(long)]
	data_dir: Option<String>,
	/// Root directory for schema files
	#[arg(long)]
	schema_dir: Option<String>,
	/// Active schema name
	#[arg(long)]
	schema_name: Option<String>,
	/// PATCH null handling: store | delete
	#[arg(long, value_parser = PatchNull::from_str)]
	patch_null: Option<PatchNull>,
	/// Transitively delete documents reachable via REF fields
	#[arg(long)]
	cascading_delete: Option<bool>,
	/// Graph overlay mode: disabled | memory | indexed
	#[arg(long, value_parser = GraphMode::from_str)]
	rserv_graph: Option<GraphMode>,
	/// DFS cycle handling: error | warn | ignore | disable
	#[arg(long, value_parser = CyclePolicy::from_str)]
	graph_cycle_detection: Option<CyclePolicy>,
	/// Read/listing/search cache TTL in seconds
	#[arg(long)]
	cache_ttl: Option<u64>,
	/// Query session retention in seconds
	#[arg(long)]
	graph_query_ttl: Option<u64>,
	#[arg(long)]
	default_page_size: Option<usize>,
	#[arg(long)]
	max_query_depth: Option<usize>,
	#[arg(long)]
	ref_embed_depth: Option<usize>,
	/// Maintain the full-text token index
	#[arg(long)]
	fulltext_enabled: Option<bool>,
	/// Log level when RUST_LOG is unset
	#[arg(long)]
	log_level: Option<String>,
}

impl Cli {
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

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	let mut settings = match config::load() {
		Ok(s) => s,
		Err(e) => {
			eprintln!("warning: failed to load config: {}", e);
			Settings::default()
		}
	};
	cli.overlay(&mut settings);

	if let Err(e) = observability::init_logging(settings.log_level.as_deref()) {
		eprintln!("warning: failed to initialize logging: {}", e);
	}

	run(settings).await;
}
