pub mod executor;
pub mod parser;

use serde_json::Value;
use thiserror::Error;

/// Failures raised while parsing or executing a Sulpher query. These become
/// the `failed` status (and failure message) of the owning query session.
#[derive(Debug, Error)]
pub enum QueryError {
	#[error("Invalid Sulpher query near '{0}'")]
	Parse(String),
	#[error("Cycle detected at node: {0} during DFS traversal")]
	Cycle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
	Bfs,
	Dfs,
}

/// `(var:type {k: v, ...})`
#[derive(Debug, Clone)]
pub struct NodePattern {
	pub var: String,
	pub node_type: Option<String>,
	pub props: Vec<(String, Value)>,
}

/// `-[name:type {k: v, ...}]->` — the relationship variable name, if any, is
/// not bound; only the type and property constraints participate in matching.
#[derive(Debug, Clone, Default)]
pub struct RelPattern {
	pub rel_type: Option<String>,
	pub props: Vec<(String, Value)>,
}

/// One step of the path pattern: the node to match and the relationship
/// that leads into it (absent for the first step).
#[derive(Debug, Clone)]
pub struct PathStep {
	pub node: NodePattern,
	pub relationship: Option<RelPattern>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
	Eq,
	Ne,
	Lt,
	Gt,
	Le,
	Ge,
}

/// `var.prop <op> literal`
#[derive(Debug, Clone)]
pub struct Condition {
	pub variable: String,
	pub property: String,
	pub op: CompareOp,
	pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
	Count,
	Sum,
	Avg,
	Min,
	Max,
}

/// A RETURN projection item, keyed in result rows by its original text.
#[derive(Debug, Clone)]
pub enum ReturnItem {
	Property { var: String, prop: String, text: String },
	Aggregate { agg: Aggregate, var: String, text: String },
	Variable { var: String, text: String },
}

impl ReturnItem {
	pub fn text(&self) -> &str {
		match self {
			ReturnItem::Property { text, .. }
			| ReturnItem::Aggregate { text, .. }
			| ReturnItem::Variable { text, .. } => text,
		}
	}
}

/// Execution plan produced by the parser.
#[derive(Debug, Clone)]
pub struct Plan {
	pub algorithm: Algorithm,
	pub path: Vec<PathStep>,
	pub conditions: Vec<Condition>,
	pub returns: Vec<ReturnItem>,
}
