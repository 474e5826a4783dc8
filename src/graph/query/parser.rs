use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{
	Aggregate, Algorithm, CompareOp, Condition, NodePattern, PathStep, Plan, QueryError,
	RelPattern, ReturnItem,
};

static QUERY: Lazy<Regex> = Lazy::new(|| {
	Regex::new(
		r"(?s)^\s*(?:(BFS|DFS)\s+)?MATCH\s+(.+?)(?:\s+WHERE\s+(.+?))?\s+RETURN\s+(.+?)\s*$",
	)
	.unwrap()
});

static PATH_STEP: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"\(([^)]*)\)(?:\s*-\[([^\]]*)\]->)?").unwrap());

static PROPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^}]*)\}").unwrap());

static CONDITION: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\s*(\w+)\.(\w+)\s*(!=|<=|>=|=|<|>)\s*(.+?)\s*$").unwrap());

static AGGREGATE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^(COUNT|SUM|AVG|MIN|MAX)\((\w+)\)$").unwrap());

static PROPERTY_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)\.(\w+)$").unwrap());

static VARIABLE_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").unwrap());

/// Parse a Sulpher query string into an execution [`Plan`].
///
/// ```text
/// [BFS|DFS] MATCH (a:type {k: v})-[rel:type]->(b) [WHERE a.prop = lit [AND ...]] RETURN items
/// ```
///
/// Parse errors name the offending substring.
pub fn parse(query: &str) -> Result<Plan, QueryError> {
	let caps = QUERY
		.captures(query)
		.ok_or_else(|| QueryError::Parse(query.trim().to_string()))?;

	let algorithm = match caps.get(1).map(|m| m.as_str()) {
		Some("DFS") => Algorithm::Dfs,
		_ => Algorithm::Bfs,
	};

	let path = parse_path(caps.get(2).map_or("", |m| m.as_str()))?;
	let conditions = match caps.get(3) {
		Some(m) => parse_conditions(m.as_str())?,
		None => Vec::new(),
	};
	let returns = parse_returns(caps.get(4).map_or("", |m| m.as_str()))?;

	Ok(Plan {
		algorithm,
		path,
		conditions,
		returns,
	})
}

fn parse_path(pattern: &str) -> Result<Vec<PathStep>, QueryError> {
	let mut steps = Vec::new();
	let mut pending_rel: Option<RelPattern> = None;

	for caps in PATH_STEP.captures_iter(pattern) {
		let node = parse_node(caps.get(1).map_or("", |m| m.as_str()))?;
		steps.push(PathStep {
			node,
			relationship: pending_rel.take(),
		});
		pending_rel = match caps.get(2) {
			Some(m) => Some(parse_relationship(m.as_str())?),
			None => None,
		};
	}

	if steps.is_empty() {
		return Err(QueryError::Parse(pattern.trim().to_string()));
	}
	// A trailing `-[..]->` with no node to land on is malformed.
	if pending_rel.is_some() {
		return Err(QueryError::Parse(pattern.trim().to_string()));
	}
	Ok(steps)
}

fn parse_node(text: &str) -> Result<NodePattern, QueryError> {
	let props = parse_props(text)?;
	let head = text.split('{').next().unwrap_or("").trim();
	let (var, node_type) = match head.split_once(':') {
		Some((v, t)) => (v.trim(), non_empty(t)),
		None => (head, None),
	};
	if var.is_empty() || !VARIABLE_ITEM.is_match(var) {
		return Err(QueryError::Parse(text.trim().to_string()));
	}
	Ok(NodePattern {
		var: var.to_string(),
		node_type,
		props,
	})
}

/// Relationship patterns accept `name:type`, `:type`, a bare `type`, or
/// nothing at all; a bare identifier is taken as the edge type.
fn parse_relationship(text: &str) -> Result<RelPattern, QueryError> {
	let props = parse_props(text)?;
	let head = text.split('{').next().unwrap_or("").trim();
	let rel_type = match head.split_once(':') {
		Some((_, t)) => non_empty(t),
		None => non_empty(head),
	};
	Ok(RelPattern { rel_type, props })
}

fn parse_props(text: &str) -> Result<Vec<(String, Value)>, QueryError> {
	let Some(caps) = PROPS.captures(text) else {
		return Ok(Vec::new());
	};
	let body = caps.get(1).map_or("", |m| m.as_str());
	let mut props = Vec::new();
	for entry in body.split(',') {
		if entry.trim().is_empty() {
			continue;
		}
		let (key, value) = entry
			.split_once(':')
			.ok_or_else(|| QueryError::Parse(entry.trim().to_string()))?;
		let key = key.trim();
		if key.is_empty() {
			return Err(QueryError::Parse(entry.trim().to_string()));
		}
		props.push((key.to_string(), parse_literal(value)));
	}
	Ok(props)
}

fn parse_conditions(clause: &str) -> Result<Vec<Condition>, QueryError> {
	let mut conditions = Vec::new();
	for part in clause.split(" AND ") {
		let caps = CONDITION
			.captures(part)
			.ok_or_else(|| QueryError::Parse(part.trim().to_string()))?;
		let op = match &caps[3] {
			"=" => CompareOp::Eq,
			"!=" => CompareOp::Ne,
			"<" => CompareOp::Lt,
			">" => CompareOp::Gt,
			"<=" => CompareOp::Le,
			">=" => CompareOp::Ge,
			other => return Err(QueryError::Parse(other.to_string())),
		};
		conditions.push(Condition {
			variable: caps[1].to_string(),
			property: caps[2].to_string(),
			op,
			value: parse_literal(&caps[4]),
		});
	}
	Ok(conditions)
}

fn parse_returns(clause: &str) -> Result<Vec<ReturnItem>, QueryError> {
	let mut items = Vec::new();
	for part in clause.split(',') {
		let text = part.trim();
		if text.is_empty() {
			return Err(QueryError::Parse(clause.trim().to_string()));
		}
		if let Some(caps) = AGGREGATE.captures(text) {
			let agg = match &caps[1] {
				"COUNT" => Aggregate::Count,
				"SUM" => Aggregate::Sum,
				"AVG" => Aggregate::Avg,
				"MIN" => Aggregate::Min,
				"MAX" => Aggregate::Max,
				_ => unreachable!(),
			};
			items.push(ReturnItem::Aggregate {
				agg,
				var: caps[2].to_string(),
				text: text.to_string(),
			});
		} else if let Some(caps) = PROPERTY_ITEM.captures(text) {
			items.push(ReturnItem::Property {
				var: caps[1].to_string(),
				prop: caps[2].to_string(),
				text: text.to_string(),
			});
		} else if VARIABLE_ITEM.is_match(text) {
			items.push(ReturnItem::Variable {
				var: text.to_string(),
				text: text.to_string(),
			});
		} else {
			return Err(QueryError::Parse(text.to_string()));
		}
	}
	if items.is_empty() {
		return Err(QueryError::Parse(clause.trim().to_string()));
	}
	Ok(items)
}

/// Literals: integers, floats, booleans, quoted strings, bare strings.
fn parse_literal(text: &str) -> Value {
	let text = text.trim();
	if let Ok(n) = text.parse::<i64>() {
		return Value::from(n);
	}
	if let Ok(f) = text.parse::<f64>() {
		return Value::from(f);
	}
	match text.to_ascii_lowercase().as_str() {
		"true" => return Value::Bool(true),
		"false" => return Value::Bool(false),
		_ => {}
	}
	Value::String(text.trim_matches(['"', '\'']).to_string())
}

fn non_empty(s: &str) -> Option<String> {
	let s = s.trim();
	if s.is_empty() {
		None
	} else {
		Some(s.to_string())
	}
}
