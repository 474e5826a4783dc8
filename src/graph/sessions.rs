use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of a submitted Sulpher query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
	Pending,
	Completed,
	Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
	pub nodes_traversed: u64,
	pub start_time: Option<DateTime<Utc>>,
	pub end_time: Option<DateTime<Utc>>,
}

/// One tracked query: its text, status, result (or failure message), and
/// execution stats. Sessions are mutated only by the executor task that owns
/// them; everyone else reads snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySession {
	pub id: Uuid,
	pub query: String,
	pub status: QueryStatus,
	pub result: Option<Value>,
	pub stats: QueryStats,
}

/// UUID-keyed table of asynchronous query sessions with TTL cleanup.
pub struct SessionManager {
	sessions: DashMap<Uuid, QuerySession>,
}

impl SessionManager {
	pub fn new() -> Self {
		Self {
			sessions: DashMap::new(),
		}
	}

	/// Record a new pending session and return its id.
	pub fn create(&self, query: &str) -> Uuid {
		let id = Uuid::new_v4();
		self.sessions.insert(
			id,
			QuerySession {
				id,
				query: query.to_string(),
				status: QueryStatus::Pending,
				result: None,
				stats: QueryStats {
					nodes_traversed: 0,
					start_time: Some(Utc::now()),
					end_time: None,
				},
			},
		);
		id
	}

	pub fn get(&self, id: &Uuid) -> Option<QuerySession> {
		self.sessions.get(id).map(|s| s.clone())
	}

	pub fn complete(&self, id: &Uuid, result: Value, nodes_traversed: u64) {
		if let Some(mut session) = self.sessions.get_mut(id) {
			session.status = QueryStatus::Completed;
			session.result = Some(result);
			session.stats.nodes_traversed = nodes_traversed;
			session.stats.end_time = Some(Utc::now());
		}
	}

	/// Mark a session failed; the failure message becomes its result.
	pub fn fail(&self, id: &Uuid, message: String, nodes_traversed: u64) {
		if let Some(mut session) = self.sessions.get_mut(id) {
			session.status = QueryStatus::Failed;
			session.result = Some(Value::String(message));
			session.stats.nodes_traversed = nodes_traversed;
			session.stats.end_time = Some(Utc::now());
		}
	}

	/// Drop finished sessions whose `end_time` is older than `ttl`. Returns
	/// the number of sessions removed.
	pub fn cleanup(&self, ttl: Duration) -> usize {
		let cutoff =
			Utc::now() - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
		let before = self.sessions.len();
		self.sessions
			.retain(|_, session| match session.stats.end_time {
				Some(end) => end > cutoff,
				None => true,
			});
		before - self.sessions.len()
	}

	/// Spawn the periodic cleanup task. Runs for the lifetime of the process.
	pub fn spawn_cleanup(manager: Arc<SessionManager>, ttl_secs: u64) {
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(Duration::from_secs(60));
			loop {
				interval.tick().await;
				let removed = manager.cleanup(Duration::from_secs(ttl_secs));
				if removed > 0 {
					tracing::info!(removed, "expired graph query sessions removed");
				}
			}
		});
	}
}

impl Default for SessionManager {
	fn default() -> Self {
		Self::new()
	}
}
