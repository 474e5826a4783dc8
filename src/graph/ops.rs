use std::collections::{HashSet, VecDeque};

use serde_json::{Value, json};

use crate::graph::GraphOverlay;

/// Direction filter for degree, incident-edge, and relationship listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	In,
	Out,
	All,
}

impl Direction {
	pub fn parse(s: Option<&str>) -> Direction {
		match s {
			Some("in") => Direction::In,
			Some("out") => Direction::Out,
			_ => Direction::All,
		}
	}
}

/// Nodes whose properties contain every `(key, value)` pair of `criteria`.
pub fn search_nodes<'a>(
	graph: &'a GraphOverlay,
	criteria: &serde_json::Map<String, Value>,
) -> Vec<(&'a String, &'a Value)> {
	graph
		.nodes()
		.filter(|(_, entry)| {
			criteria
				.iter()
				.all(|(key, expected)| entry.property(key) == Some(expected))
		})
		.map(|(id, entry)| (id, &entry.properties))
		.collect()
}

/// Bounded breadth-first shortest path between two nodes.
///
/// Outgoing adjacency includes the reverse companion of every forward edge,
/// so following it explores the graph as undirected, matching how the
/// convenience endpoints treat connectivity. Returns the node chain from
/// start to end inclusive, or `None` when no path of at most `max_depth`
/// hops exists.
pub fn shortest_path(
	graph: &GraphOverlay,
	start: &str,
	end: &str,
	max_depth: usize,
) -> Option<Vec<String>> {
	if !graph.contains(start) || !graph.contains(end) {
		return None;
	}
	if start == end {
		return Some(vec![start.to_string()]);
	}

	let mut queue: VecDeque<Vec<String>> = VecDeque::new();
	let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
	queue.push_back(vec![start.to_string()]);

	while let Some(path) = queue.pop_front() {
		if path.len() > max_depth {
			continue;
		}
		let current = path.last().expect("paths are never empty");
		let Some(entry) = graph.node(current) else {
			continue;
		};
		for neighbor in entry.targets() {
			if !visited.insert(neighbor.to_string()) {
				continue;
			}
			let mut next = path.clone();
			next.push(neighbor.to_string());
			if neighbor == end {
				return Some(next);
			}
			queue.push_back(next);
		}
	}
	None
}

pub fn path_exists(graph: &GraphOverlay, start: &str, end: &str, max_depth: usize) -> bool {
	shortest_path(graph, start, end, max_depth).is_some()
}

/// Neighbours shared by both nodes, in the first node's adjacency order.
pub fn common_neighbors(graph: &GraphOverlay, a: &str, b: &str) -> Vec<String> {
	let (Some(entry_a), Some(entry_b)) = (graph.node(a), graph.node(b)) else {
		return Vec::new();
	};
	let b_targets: HashSet<&str> = entry_b.targets().into_iter().collect();
	entry_a
		.targets()
		.into_iter()
		.filter(|n| b_targets.contains(n))
		.map(str::to_string)
		.collect()
}

pub fn degree(graph: &GraphOverlay, node_id: &str, direction: Direction) -> usize {
	let out = graph.node(node_id).map_or(0, |e| e.outgoing.len());
	match direction {
		Direction::Out => out,
		Direction::In => graph.incoming(node_id).len(),
		Direction::All => out + graph.incoming(node_id).len(),
	}
}

/// Distinct edge labels incident to a node, filtered by direction.
pub fn relationship_types(
	graph: &GraphOverlay,
	node_id: &str,
	direction: Direction,
) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut types = Vec::new();
	let mut push = |label: &str| {
		if seen.insert(label.to_string()) {
			types.push(label.to_string());
		}
	};

	if direction != Direction::In {
		if let Some(entry) = graph.node(node_id) {
			for (_, label) in &entry.outgoing {
				push(label);
			}
		}
	}
	if direction != Direction::Out {
		for (_, label) in graph.incoming(node_id) {
			push(&label);
		}
	}
	types
}

/// Distinct nodes within `depth` hops of `start`, excluding the start itself.
fn neighborhood(graph: &GraphOverlay, start: &str, depth: usize) -> Vec<String> {
	let mut found = Vec::new();
	let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
	let mut queue: VecDeque<(String, usize)> = VecDeque::from([(start.to_string(), 0)]);

	while let Some((current, hops)) = queue.pop_front() {
		if hops == depth {
			continue;
		}
		let Some(entry) = graph.node(&current) else {
			continue;
		};
		for neighbor in entry.targets() {
			if visited.insert(neighbor.to_string()) {
				found.push(neighbor.to_string());
				queue.push_back((neighbor.to_string(), hops + 1));
			}
		}
	}
	found
}

/// Count/sum/avg of a property across the k-hop neighbourhood of a node.
/// `count` counts neighbours carrying the property; `sum` and `avg` skip
/// non-numeric values, and `avg` over zero numeric values is null.
pub fn neighborhood_aggregate(
	graph: &GraphOverlay,
	node_id: &str,
	depth: usize,
	property: &str,
	aggregation: &str,
) -> Option<Value> {
	let values: Vec<&Value> = neighborhood(graph, node_id, depth)
		.iter()
		.filter_map(|n| graph.node(n))
		.filter_map(|entry| entry.property(property))
		.collect();

	match aggregation {
		"count" => Some(Value::from(values.len())),
		"sum" | "avg" => {
			let numeric: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
			let sum: f64 = numeric.iter().sum();
			if aggregation == "sum" {
				Some(Value::from(sum))
			} else if numeric.is_empty() {
				Some(Value::Null)
			} else {
				Some(Value::from(sum / numeric.len() as f64))
			}
		}
		_ => None,
	}
}

/// Node count, edge count, and average out-degree of the overlay.
pub fn statistics(graph: &GraphOverlay) -> Value {
	let node_count = graph.node_count();
	let edge_count = graph.edge_count();
	let avg_out_degree = if node_count == 0 {
		0.0
	} else {
		edge_count as f64 / node_count as f64
	};
	json!({
		"node_count": node_count,
		"edge_count": edge_count,
		"avg_out_degree": avg_out_degree,
	})
}

/// Incident edge records in the original wire shape.
pub fn outgoing_edges(graph: &GraphOverlay, node_id: &str) -> Vec<Value> {
	let Some(entry) = graph.node(node_id) else {
		return Vec::new();
	};
	entry
		.outgoing
		.iter()
		.map(|(target, label)| {
			let target_props = graph
				.node(target)
				.map(|e| e.properties.clone())
				.unwrap_or(Value::Null);
			json!({
				"source": node_id,
				"relationship": { "type": label },
				"target": { "id": target, "properties": target_props },
			})
		})
		.collect()
}

pub fn incoming_edges(graph: &GraphOverlay, node_id: &str) -> Vec<Value> {
	graph
		.incoming(node_id)
		.into_iter()
		.map(|(source, label)| {
			let source_props = graph
				.node(&source)
				.map(|e| e.properties.clone())
				.unwrap_or(Value::Null);
			json!({
				"source": { "id": source, "properties": source_props },
				"relationship": { "type": label },
				"target": node_id,
			})
		})
		.collect()
}

/// The subgraph induced by the k-hop neighbourhood of a node: the node set
/// (start included) and every overlay edge between members.
pub fn subgraph(graph: &GraphOverlay, node_id: &str, depth: usize) -> Value {
	let mut members = vec![node_id.to_string()];
	members.extend(neighborhood(graph, node_id, depth));
	let member_set: HashSet<&String> = members.iter().collect();

	let nodes: Vec<Value> = members
		.iter()
		.map(|id| {
			let props = graph
				.node(id)
				.map(|e| e.properties.clone())
				.unwrap_or(Value::Null);
			json!({ "id": id, "properties": props })
		})
		.collect();

	let mut relationships = Vec::new();
	for id in &members {
		let Some(entry) = graph.node(id) else {
			continue;
		};
		for (target, label) in &entry.outgoing {
			if member_set.contains(target) {
				relationships.push(json!({
					"source": id,
					"type": label,
					"target": target,
				}));
			}
		}
	}

	json!({ "nodes": nodes, "relationships": relationships })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::GraphMode;
	use serde_json::json;

	fn chain_graph() -> (tempfile::TempDir, GraphOverlay) {
		let dir = tempfile::tempdir().unwrap();
		let mut g = GraphOverlay::new(
			GraphMode::Indexed,
			dir.path().join("graph.data"),
			dir.path().join("graph.index"),
		);
		// comment:3 -> post:7 -> author:1
		g.apply_write("author", 1, &json!({"id": 1, "name": "alice"}));
		g.apply_write(
			"post",
			7,
			&json!({"id": 7, "score": 10, "author": {"type": "REF", "entity": "author", "id": 1}}),
		);
		g.apply_write(
			"comment",
			3,
			&json!({"id": 3, "score": 4, "post": {"type": "REF", "entity": "post", "id": 7}}),
		);
		(dir, g)
	}

	#[test]
	fn search_matches_all_criteria() {
		let (_dir, g) = chain_graph();
		let criteria = json!({"name": "alice"}).as_object().cloned().unwrap();
		let hits = search_nodes(&g, &criteria);
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].0, "author:1");

		let criteria = json!({"name": "alice", "id": 2}).as_object().cloned().unwrap();
		assert!(search_nodes(&g, &criteria).is_empty());
	}

	#[test]
	fn shortest_path_spans_reverse_companions() {
		let (_dir, g) = chain_graph();
		let path = shortest_path(&g, "comment:3", "author:1", 10).unwrap();
		assert_eq!(path, vec!["comment:3", "post:7", "author:1"]);
		// And back again, through reverse edges.
		let back = shortest_path(&g, "author:1", "comment:3", 10).unwrap();
		assert_eq!(back.len(), 3);
	}

	#[test]
	fn shortest_path_respects_max_depth() {
		let (_dir, g) = chain_graph();
		assert!(shortest_path(&g, "comment:3", "author:1", 1).is_none());
		assert!(!path_exists(&g, "comment:3", "author:1", 1));
		assert!(path_exists(&g, "comment:3", "author:1", 2));
	}

	#[test]
	fn missing_endpoints_have_no_path() {
		let (_dir, g) = chain_graph();
		assert!(shortest_path(&g, "comment:3", "ghost:1", 5).is_none());
		assert!(shortest_path(&g, "ghost:1", "comment:3", 5).is_none());
	}

	#[test]
	fn common_neighbors_intersects_adjacency() {
		let (_dir, g) = chain_graph();
		// comment:3 and author:1 are both adjacent to post:7.
		assert_eq!(common_neighbors(&g, "comment:3", "author:1"), vec!["post:7"]);
		assert!(common_neighbors(&g, "comment:3", "ghost:9").is_empty());
	}

	#[test]
	fn degree_direction_filters() {
		let (_dir, g) = chain_graph();
		// post:7 has one forward edge (author) plus one reverse companion
		// (from comment:3); both incoming mirrors exist as well.
		assert_eq!(degree(&g, "post:7", Direction::Out), 2);
		assert_eq!(degree(&g, "post:7", Direction::In), 2);
		assert_eq!(degree(&g, "post:7", Direction::All), 4);
	}

	#[test]
	fn relationship_types_are_distinct() {
		let (_dir, g) = chain_graph();
		let types = relationship_types(&g, "post:7", Direction::Out);
		assert_eq!(types, vec!["author", "reverse_post"]);
		let types = relationship_types(&g, "post:7", Direction::All);
		assert!(types.contains(&"post".to_string()));
	}

	#[test]
	fn neighborhood_aggregate_count_sum_avg() {
		let (_dir, g) = chain_graph();
		let count = neighborhood_aggregate(&g, "post:7", 1, "id", "count").unwrap();
		assert_eq!(count, 2);
		let sum = neighborhood_aggregate(&g, "post:7", 1, "score", "sum").unwrap();
		assert_eq!(sum, 4.0);
		let avg = neighborhood_aggregate(&g, "post:7", 1, "name", "avg").unwrap();
		assert_eq!(avg, Value::Null);
		assert!(neighborhood_aggregate(&g, "post:7", 1, "id", "median").is_none());
	}

	#[test]
	fn statistics_shape() {
		let (_dir, g) = chain_graph();
		let stats = statistics(&g);
		assert_eq!(stats["node_count"], 3);
		assert_eq!(stats["edge_count"], 4);
		assert!(stats["avg_out_degree"].as_f64().unwrap() > 1.0);
	}

	#[test]
	fn incident_edges_shape() {
		let (_dir, g) = chain_graph();
		let out = outgoing_edges(&g, "comment:3");
		assert_eq!(out.len(), 1);
		assert_eq!(out[0]["relationship"]["type"], "post");
		assert_eq!(out[0]["target"]["id"], "post:7");

		let incoming = incoming_edges(&g, "post:7");
		assert_eq!(incoming.len(), 2);
	}

	#[test]
	fn subgraph_induces_member_edges() {
		let (_dir, g) = chain_graph();
		let sub = subgraph(&g, "post:7", 1);
		assert_eq!(sub["nodes"].as_array().unwrap().len(), 3);
		// All four overlay edges connect members of the 1-hop neighbourhood.
		assert_eq!(sub["relationships"].as_array().unwrap().len(), 4);

		let sub = subgraph(&g, "author:1", 0);
		assert_eq!(sub["nodes"].as_array().unwrap().len(), 1);
		assert!(sub["relationships"].as_array().unwrap().is_empty());
	}
}
