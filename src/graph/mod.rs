pub mod ops;
pub mod query;
pub mod sessions;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::Value;

use crate::config::GraphMode;
use crate::store::{EntityStore, node_ref, ref_fields};

/// Prefix of the companion edge maintained opposite every forward edge.
pub const REVERSE_PREFIX: &str = "reverse_";

/// Index key tagging nodes that carry a REF field with the given name.
pub fn relationship_key(field: &str) -> String {
	format!("relationship:{field}")
}

/// One node of the overlay: its type tag, a mirror of the document
/// properties, and the outgoing edges in insertion order.
///
/// Edges are `(target, label)` pairs; the label is the field that produced
/// the edge, or a `reverse_`-prefixed companion label. Several edges may
/// share a target (one per field), but each forward label appears at most
/// once per node, mirroring the one-value-per-field shape of documents.
#[derive(Debug, Clone)]
pub struct NodeEntry {
	pub node_type: String,
	pub properties: Value,
	pub outgoing: Vec<(String, String)>,
}

impl NodeEntry {
	fn placeholder(node_type: &str) -> Self {
		Self {
			node_type: node_type.to_string(),
			properties: Value::Object(serde_json::Map::new()),
			outgoing: Vec::new(),
		}
	}

	/// Property lookup used by pattern matching and WHERE evaluation.
	pub fn property(&self, name: &str) -> Option<&Value> {
		self.properties.get(name)
	}

	pub fn has_edge(&self, target: &str, label: &str) -> bool {
		self.outgoing
			.iter()
			.any(|(t, l)| t == target && l == label)
	}

	/// Distinct neighbour targets in first-edge order.
	pub fn targets(&self) -> Vec<&str> {
		let mut seen = HashSet::new();
		self.outgoing
			.iter()
			.filter(|(t, _)| seen.insert(t.as_str()))
			.map(|(t, _)| t.as_str())
			.collect()
	}
}

/// In-memory property-graph overlay derived from stored documents, with an
/// inverted index for start-node lookup and two on-disk dump files.
///
/// The overlay is best-effort with respect to the document store: dump
/// persistence failures are logged by callers and the overlay is rebuilt
/// from the store at startup.
pub struct GraphOverlay {
	mode: GraphMode,
	adjacency_path: PathBuf,
	index_path: PathBuf,
	nodes: IndexMap<String, NodeEntry>,
	index: BTreeMap<String, BTreeSet<String>>,
}

impl GraphOverlay {
	pub fn new(
		mode: GraphMode,
		adjacency_path: impl Into<PathBuf>,
		index_path: impl Into<PathBuf>,
	) -> Self {
		Self {
			mode,
			adjacency_path: adjacency_path.into(),
			index_path: index_path.into(),
			nodes: IndexMap::new(),
			index: BTreeMap::new(),
		}
	}

	pub fn enabled(&self) -> bool {
		self.mode != GraphMode::Disabled
	}

	pub fn indexed(&self) -> bool {
		self.mode == GraphMode::Indexed
	}

	pub fn node(&self, node_id: &str) -> Option<&NodeEntry> {
		self.nodes.get(node_id)
	}

	pub fn nodes(&self) -> impl Iterator<Item = (&String, &NodeEntry)> {
		self.nodes.iter()
	}

	pub fn contains(&self, node_id: &str) -> bool {
		self.nodes.contains_key(node_id)
	}

	pub fn index_lookup(&self, key: &str) -> Option<&BTreeSet<String>> {
		self.index.get(key)
	}

	/// Edges pointing at `node_id`, as `(source, label)` pairs in node
	/// insertion order.
	pub fn incoming(&self, node_id: &str) -> Vec<(String, String)> {
		let mut edges = Vec::new();
		for (source, entry) in &self.nodes {
			for (target, label) in &entry.outgoing {
				if target == node_id {
					edges.push((source.clone(), label.clone()));
				}
			}
		}
		edges
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	pub fn edge_count(&self) -> usize {
		self.nodes.values().map(|n| n.outgoing.len()).sum()
	}

	/// Mirror a document write into the overlay.
	///
	/// The node's own forward edges (and their reverse companions) are
	/// removed, its type and properties refreshed, and edges re-added from
	/// the document's current REF fields. Reverse companions held on behalf
	/// of *other* documents' references survive the rewrite, so edges from
	/// unrelated documents are not lost.
	pub fn apply_write(&mut self, entity: &str, id: i64, doc: &Value) {
		if !self.enabled() {
			return;
		}
		let node_id = node_ref(entity, id);

		self.drop_forward_edges(&node_id);
		self.drop_index_membership(&node_id);

		let entry = self
			.nodes
			.entry(node_id.clone())
			.or_insert_with(|| NodeEntry::placeholder(entity));
		entry.node_type = entity.to_string();
		entry.properties = doc.clone();

		if self.indexed() {
			self.index
				.entry(entity.to_string())
				.or_default()
				.insert(node_id.clone());
		}

		for (field, doc_ref) in ref_fields(doc) {
			let target = doc_ref.node_ref();
			let reverse = format!("{REVERSE_PREFIX}{field}");

			if let Some(entry) = self.nodes.get_mut(&node_id) {
				// One forward edge per field.
				entry.outgoing.retain(|(_, label)| *label != field);
				entry.outgoing.push((target.clone(), field.clone()));
			}
			let target_entry = self
				.nodes
				.entry(target)
				.or_insert_with(|| NodeEntry::placeholder(&doc_ref.entity));
			target_entry
				.outgoing
				.retain(|(t, label)| !(t == &node_id && label == &reverse));
			target_entry.outgoing.push((node_id.clone(), reverse));

			if self.indexed() {
				self.index
					.entry(doc_ref.entity.clone())
					.or_default()
					.insert(node_id.clone());
				self.index
					.entry(relationship_key(&field))
					.or_default()
					.insert(node_id.clone());
			}
		}
	}

	/// Mirror a document deletion: remove the node, every edge involving it,
	/// and all of its index membership.
	pub fn remove_document(&mut self, entity: &str, id: i64) {
		if !self.enabled() {
			return;
		}
		let node_id = node_ref(entity, id);
		self.nodes.shift_remove(&node_id);
		for entry in self.nodes.values_mut() {
			entry.outgoing.retain(|(target, _)| target != &node_id);
		}
		self.drop_index_membership(&node_id);
	}

	fn drop_forward_edges(&mut self, node_id: &str) {
		let forwards: Vec<(String, String)> = match self.nodes.get(node_id) {
			Some(entry) => entry
				.outgoing
				.iter()
				.filter(|(_, label)| !label.starts_with(REVERSE_PREFIX))
				.cloned()
				.collect(),
			None => return,
		};
		if let Some(entry) = self.nodes.get_mut(node_id) {
			entry
				.outgoing
				.retain(|(_, label)| label.starts_with(REVERSE_PREFIX));
		}
		for (target, label) in forwards {
			let reverse = format!("{REVERSE_PREFIX}{label}");
			if let Some(target_entry) = self.nodes.get_mut(&target) {
				target_entry
					.outgoing
					.retain(|(t, l)| !(t == node_id && *l == reverse));
			}
		}
	}

	fn drop_index_membership(&mut self, node_id: &str) {
		self.index.retain(|_, members| {
			members.remove(node_id);
			!members.is_empty()
		});
	}

	/// Write the adjacency dump and the inverted-index dump.
	///
	/// One adjacency line per node, `<node-id>:<space-separated-neighbors>`;
	/// the index file is a single JSON object mapping index key to an array
	/// of node ids. Only meaningful in `indexed` mode.
	pub async fn persist(&self) -> Result<()> {
		if !self.indexed() {
			return Ok(());
		}

		let mut adjacency = String::new();
		for (node_id, entry) in &self.nodes {
			adjacency.push_str(node_id);
			adjacency.push(':');
			adjacency.push_str(&entry.targets().join(" "));
			adjacency.push('\n');
		}
		tokio::fs::write(&self.adjacency_path, adjacency)
			.await
			.with_context(|| format!("writing {}", self.adjacency_path.display()))?;

		let index_json = serde_json::to_vec(&self.index)?;
		tokio::fs::write(&self.index_path, index_json)
			.await
			.with_context(|| format!("writing {}", self.index_path.display()))?;

		Ok(())
	}

	/// Load both dump files, tolerating partial or missing data.
	///
	/// The adjacency dump carries no edge labels or properties, so loaded
	/// edges are unlabelled and node types default to the entity prefix of
	/// the node id. A subsequent [`GraphOverlay::rebuild`] restores full
	/// fidelity from the document store.
	pub async fn load(&mut self) -> Result<()> {
		self.nodes.clear();
		self.index.clear();

		match tokio::fs::read_to_string(&self.adjacency_path).await {
			Ok(contents) => {
				for line in contents.lines() {
					let line = line.trim();
					if line.is_empty() {
						continue;
					}
					// Node ids are "<entity>:<id>", so the neighbor list
					// starts after the second colon.
					let Some((entity, rest)) = line.split_once(':') else {
						continue;
					};
					let (id_part, neighbors) = rest.split_once(':').unwrap_or((rest, ""));
					let node_id = format!("{entity}:{id_part}");
					let entry = self
						.nodes
						.entry(node_id.clone())
						.or_insert_with(|| NodeEntry::placeholder(entity));
					entry.node_type = entity.to_string();
					for neighbor in neighbors.split_whitespace() {
						if !entry.has_edge(neighbor, "") {
							entry.outgoing.push((neighbor.to_string(), String::new()));
						}
					}
				}
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e.into()),
		}

		match tokio::fs::read(&self.index_path).await {
			Ok(bytes) => match serde_json::from_slice(&bytes) {
				Ok(index) => self.index = index,
				Err(e) => {
					tracing::warn!(error = %e, "ignoring unparsable graph index dump");
				}
			},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e.into()),
		}

		Ok(())
	}

	/// Rebuild the whole overlay by scanning the document store.
	pub async fn rebuild(&mut self, store: &EntityStore) -> Result<()> {
		if !self.enabled() {
			return Ok(());
		}
		self.nodes.clear();
		self.index.clear();

		for entity in store.entities().await? {
			for doc in store.list(&entity).await? {
				if let Some(id) = doc.get("id").and_then(Value::as_i64) {
					self.apply_write(&entity, id, &doc);
				}
			}
		}

		tracing::info!(
			nodes = self.node_count(),
			edges = self.edge_count(),
			"graph overlay rebuilt from store"
		);
		Ok(())
	}
}
