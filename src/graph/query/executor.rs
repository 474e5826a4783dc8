use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{Map, Value};

use crate::config::CyclePolicy;
use crate::graph::{GraphOverlay, NodeEntry};

use super::{
	Aggregate, Algorithm, CompareOp, Condition, NodePattern, PathStep, Plan, QueryError,
	RelPattern, ReturnItem,
};

/// Traversal limits and cycle handling for one execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
	pub max_depth: usize,
	pub cycle_policy: CyclePolicy,
}

/// The finished result of a plan: one projected record per surviving path
/// binding, plus the number of nodes expanded during traversal.
#[derive(Debug)]
pub struct Execution {
	pub rows: Vec<Map<String, Value>>,
	pub nodes_traversed: u64,
}

/// Per-path variable bindings, `var -> node id`.
type Bindings = HashMap<String, String>;

/// Execute a parsed plan against the overlay. The caller holds the overlay
/// read lock for the duration.
pub fn execute(
	plan: &Plan,
	graph: &GraphOverlay,
	cfg: &ExecConfig,
) -> Result<Execution, QueryError> {
	let mut traversed: u64 = 0;
	let mut paths: Vec<Bindings> = Vec::new();

	for start in start_nodes(graph, &plan.path[0].node) {
		let mut bindings = Bindings::new();
		bindings.insert(plan.path[0].node.var.clone(), start.clone());
		match plan.algorithm {
			Algorithm::Bfs => bfs(graph, cfg, &plan.path, start, bindings, &mut paths, &mut traversed),
			Algorithm::Dfs => {
				let mut visited = HashSet::from([start.clone()]);
				dfs(
					graph,
					cfg,
					&plan.path,
					&start,
					1,
					&mut bindings,
					&mut visited,
					&mut paths,
					&mut traversed,
				)?;
			}
		}
	}

	let surviving: Vec<Bindings> = paths
		.into_iter()
		.filter(|bindings| {
			plan.conditions
				.iter()
				.all(|c| evaluate_condition(graph, bindings, c))
		})
		.collect();

	let rows = project(graph, &surviving, &plan.returns);
	Ok(Execution {
		rows,
		nodes_traversed: traversed,
	})
}

/// Candidate start nodes for the first path step.
///
/// With an indexed overlay and a typed first pattern, candidates come from
/// the inverted-index posting set for that type (set semantics) and are then
/// filtered by the remaining constraints. Otherwise every node is scanned
/// and tested against the pattern.
fn start_nodes(graph: &GraphOverlay, pattern: &NodePattern) -> Vec<String> {
	if graph.indexed() {
		if let Some(node_type) = &pattern.node_type {
			return match graph.index_lookup(node_type) {
				Some(members) => members
					.iter()
					.filter(|id| {
						graph
							.node(id)
							.is_some_and(|n| node_matches(n, pattern))
					})
					.cloned()
					.collect(),
				None => Vec::new(),
			};
		}
	}
	graph
		.nodes()
		.filter(|(_, entry)| node_matches(entry, pattern))
		.map(|(id, _)| id.clone())
		.collect()
}

fn bfs(
	graph: &GraphOverlay,
	cfg: &ExecConfig,
	path: &[PathStep],
	start: String,
	start_bindings: Bindings,
	paths: &mut Vec<Bindings>,
	traversed: &mut u64,
) {
	let mut queue: VecDeque<(String, usize, Bindings)> = VecDeque::new();
	queue.push_back((start, 1, start_bindings));

	while let Some((current, step, bindings)) = queue.pop_front() {
		if step == path.len() {
			paths.push(bindings);
			continue;
		}
		if step > cfg.max_depth {
			continue;
		}
		*traversed += 1;

		let Some(entry) = graph.node(&current) else {
			continue;
		};
		let pattern = &path[step];
		for (neighbor, label) in &entry.outgoing {
			if !step_matches(graph, neighbor, label, pattern) {
				continue;
			}
			let mut next = bindings.clone();
			next.insert(pattern.node.var.clone(), neighbor.clone());
			queue.push_back((neighbor.clone(), step + 1, next));
		}
	}
}

#[allow(clippy::too_many_arguments)]
fn dfs(
	graph: &GraphOverlay,
	cfg: &ExecConfig,
	path: &[PathStep],
	current: &str,
	step: usize,
	bindings: &mut Bindings,
	visited: &mut HashSet<String>,
	paths: &mut Vec<Bindings>,
	traversed: &mut u64,
) -> Result<(), QueryError> {
	if step == path.len() {
		paths.push(bindings.clone());
		return Ok(());
	}
	if step > cfg.max_depth {
		return Ok(());
	}
	*traversed += 1;

	let Some(entry) = graph.node(current) else {
		return Ok(());
	};
	let pattern = &path[step];
	// Collect to release the borrow on the overlay entry before recursing.
	let neighbors: Vec<(String, String)> = entry
		.outgoing
		.iter()
		.map(|(n, l)| (n.clone(), l.clone()))
		.collect();

	for (neighbor, label) in neighbors {
		if !step_matches(graph, &neighbor, &label, pattern) {
			continue;
		}
		if visited.contains(&neighbor) {
			match cfg.cycle_policy {
				CyclePolicy::Error => return Err(QueryError::Cycle(neighbor)),
				CyclePolicy::Warn => {
					tracing::warn!(node = %neighbor, "cycle detected during DFS traversal");
					continue;
				}
				CyclePolicy::Ignore | CyclePolicy::Disable => continue,
			}
		}

		let shadowed = bindings.insert(pattern.node.var.clone(), neighbor.clone());
		visited.insert(neighbor.clone());
		let result = dfs(
			graph,
			cfg,
			path,
			&neighbor,
			step + 1,
			bindings,
			visited,
			paths,
			traversed,
		);
		visited.remove(&neighbor);
		match shadowed {
			Some(previous) => {
				bindings.insert(pattern.node.var.clone(), previous);
			}
			None => {
				bindings.remove(&pattern.node.var);
			}
		}
		result?;
	}

	Ok(())
}

fn step_matches(graph: &GraphOverlay, neighbor: &str, label: &str, pattern: &PathStep) -> bool {
	let Some(entry) = graph.node(neighbor) else {
		return false;
	};
	edge_matches(label, pattern.relationship.as_ref()) && node_matches(entry, &pattern.node)
}

fn node_matches(entry: &NodeEntry, pattern: &NodePattern) -> bool {
	if let Some(node_type) = &pattern.node_type {
		if entry.node_type != *node_type {
			return false;
		}
	}
	pattern
		.props
		.iter()
		.all(|(key, expected)| entry.property(key) == Some(expected))
}

fn edge_matches(label: &str, pattern: Option<&RelPattern>) -> bool {
	let Some(pattern) = pattern else {
		return true;
	};
	if let Some(rel_type) = &pattern.rel_type {
		if label != rel_type {
			return false;
		}
	}
	// Overlay edges carry no properties beyond their label, so any property
	// constraint on a relationship fails the match.
	pattern.props.is_empty()
}

fn evaluate_condition(graph: &GraphOverlay, bindings: &Bindings, cond: &Condition) -> bool {
	let actual = bindings
		.get(&cond.variable)
		.and_then(|node_id| graph.node(node_id))
		.and_then(|entry| entry.property(&cond.property));

	let Some(actual) = actual else {
		// A missing property only satisfies `!=` against a concrete literal.
		return cond.op == CompareOp::Ne && !cond.value.is_null();
	};

	match cond.op {
		CompareOp::Eq => values_equal(actual, &cond.value),
		CompareOp::Ne => !values_equal(actual, &cond.value),
		CompareOp::Lt | CompareOp::Gt | CompareOp::Le | CompareOp::Ge => {
			let Some(ordering) = partial_compare(actual, &cond.value) else {
				return false;
			};
			match cond.op {
				CompareOp::Lt => ordering.is_lt(),
				CompareOp::Gt => ordering.is_gt(),
				CompareOp::Le => ordering.is_le(),
				CompareOp::Ge => ordering.is_ge(),
				_ => unreachable!(),
			}
		}
	}
}

/// Equality with numeric cross-type tolerance (`1 == 1.0`); any other type
/// mismatch compares unequal.
fn values_equal(a: &Value, b: &Value) -> bool {
	match (a.as_f64(), b.as_f64()) {
		(Some(x), Some(y)) => x == y,
		_ => a == b,
	}
}

/// Ordering on homogeneous types only; mismatched types yield `None`.
fn partial_compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
	if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
		return x.partial_cmp(&y);
	}
	if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
		return Some(x.cmp(y));
	}
	None
}

fn project(
	graph: &GraphOverlay,
	bindings: &[Bindings],
	returns: &[ReturnItem],
) -> Vec<Map<String, Value>> {
	// Aggregates range over all surviving bindings and repeat per row.
	let mut aggregates: HashMap<String, Value> = HashMap::new();
	for item in returns {
		if let ReturnItem::Aggregate { agg, var, text } = item {
			aggregates.insert(text.clone(), compute_aggregate(*agg, var, bindings));
		}
	}

	bindings
		.iter()
		.map(|binding| {
			let mut row = Map::new();
			for item in returns {
				let value = match item {
					ReturnItem::Property { var, prop, .. } => binding
						.get(var)
						.and_then(|node_id| graph.node(node_id))
						.and_then(|entry| entry.property(prop).cloned())
						.unwrap_or(Value::Null),
					ReturnItem::Variable { var, .. } => binding
						.get(var)
						.map(|id| Value::String(id.clone()))
						.unwrap_or(Value::Null),
					ReturnItem::Aggregate { text, .. } => {
						aggregates.get(text).cloned().unwrap_or(Value::Null)
					}
				};
				row.insert(item.text().to_string(), value);
			}
			row
		})
		.collect()
}

fn compute_aggregate(agg: Aggregate, var: &str, bindings: &[Bindings]) -> Value {
	let values: Vec<Value> = bindings
		.iter()
		.map(|b| {
			b.get(var)
				.map(|id| Value::String(id.clone()))
				.unwrap_or(Value::Null)
		})
		.collect();

	match agg {
		Aggregate::Count => Value::from(values.iter().filter(|v| !v.is_null()).count()),
		Aggregate::Sum | Aggregate::Avg => {
			let numeric: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
			let sum: f64 = numeric.iter().sum();
			match agg {
				Aggregate::Sum => Value::from(sum),
				// Division by zero yields null.
				Aggregate::Avg if numeric.is_empty() => Value::Null,
				Aggregate::Avg => Value::from(sum / numeric.len() as f64),
				_ => unreachable!(),
			}
		}
		Aggregate::Min | Aggregate::Max => {
			let mut best: Option<&Value> = None;
			for value in values.iter().filter(|v| !v.is_null()) {
				best = match best {
					None => Some(value),
					Some(current) => match partial_compare(value, current) {
						Some(std::cmp::Ordering::Less) if agg == Aggregate::Min => Some(value),
						Some(std::cmp::Ordering::Greater) if agg == Aggregate::Max => {
							Some(value)
						}
						_ => Some(current),
					},
				};
			}
			best.cloned().unwrap_or(Value::Null)
		}
	}
}
