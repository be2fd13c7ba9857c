// =============================================================================
// ActivityLog — append-only, per-agent audit trail
// =============================================================================
//
// Every cycle milestone, order event, and error an agent produces is logged
// here as a typed `Activity` row. Grounded on the teacher's
// `DecisionEnvelope` convention of a small, fully-populated, serialisable
// record created at the point of decision rather than assembled later.
// Retention (≥7 days) is enforced by `prune`, called once per scheduler tick
// rather than on every write.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error as log_error, info, warn};
use uuid::Uuid;

use crate::types::ActivityType;

const RETENTION: ChronoDuration = ChronoDuration::days(7);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub struct ActivityLog {
    entries: RwLock<Vec<Activity>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn log(&self, agent_id: &str, activity_type: ActivityType, message: impl Into<String>) -> Activity {
        self.log_with_details(agent_id, activity_type, message, None)
    }

    pub fn log_with_details(
        &self,
        agent_id: &str,
        activity_type: ActivityType,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Activity {
        let message = message.into();
        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            activity_type,
            message: message.clone(),
            details,
            created_at: Utc::now(),
        };

        match activity_type {
            ActivityType::Error => log_error!(agent_id, %activity_type, "{message}"),
            ActivityType::Warning => warn!(agent_id, %activity_type, "{message}"),
            _ => info!(agent_id, %activity_type, "{message}"),
        }

        self.entries.write().push(activity.clone());
        activity
    }

    pub fn for_agent(&self, agent_id: &str, limit: usize) -> Vec<Activity> {
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|a| a.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn recent(&self, limit: usize) -> Vec<Activity> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    /// Drop rows older than the retention window. Returns the number dropped.
    pub fn prune(&self) -> usize {
        let cutoff = Utc::now() - RETENTION;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|a| a.created_at >= cutoff);
        before - entries.len()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLog")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_and_fetch_for_agent() {
        let log = ActivityLog::new();
        log.log("agent-1", ActivityType::CycleBegin, "cycle started");
        log.log("agent-2", ActivityType::CycleBegin, "cycle started");
        assert_eq!(log.for_agent("agent-1", 10).len(), 1);
    }

    #[test]
    fn prune_drops_rows_past_retention() {
        let log = ActivityLog::new();
        log.log("agent-1", ActivityType::CycleBegin, "old");
        {
            let mut entries = log.entries.write();
            entries[0].created_at = Utc::now() - ChronoDuration::days(8);
        }
        let dropped = log.prune();
        assert_eq!(dropped, 1);
        assert!(log.for_agent("agent-1", 10).is_empty());
    }

    #[test]
    fn recent_orders_newest_first() {
        let log = ActivityLog::new();
        log.log("agent-1", ActivityType::CycleBegin, "first");
        log.log("agent-1", ActivityType::CycleEnd, "second");
        let recent = log.recent(1);
        assert_eq!(recent[0].message, "second");
    }
}
