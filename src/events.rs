//! Lock event log.
//!
//! Every state change made through [`crate::locks::SchedulerLock`] appends an
//! event to the store next to the lock rows, so operators can tell a clean
//! release from a stale takeover after the fact. `schedlock run` also records
//! how each guarded command ended.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: provision, acquire, takeover, release, release_rejected, clear,
//!   run_finished
//! - `consultant_id`: the lock key
//! - `actor`: the owner string (e.g., `user@HOST`)
//! - `details`: freeform object with action-specific details
//!
//! Recording is best-effort: a failed append is logged and never turns a
//! successful lock transition into an error.

use crate::error::{Result, SchedlockError};
use crate::locks::get_owner_string;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Lock row created for a consultant
    Provision,
    /// Lock acquired from idle
    Acquire,
    /// Stale running lock taken over
    Takeover,
    /// Lock released (plain or fenced)
    Release,
    /// Fenced release refused because the token no longer matched
    ReleaseRejected,
    /// Lock cleared by an operator
    Clear,
    /// Guarded command finished (exit status and duration in details)
    RunFinished,
}

impl EventAction {
    /// Stored name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Provision => "provision",
            EventAction::Acquire => "acquire",
            EventAction::Takeover => "takeover",
            EventAction::Release => "release",
            EventAction::ReleaseRejected => "release_rejected",
            EventAction::Clear => "clear",
            EventAction::RunFinished => "run_finished",
        }
    }

    /// Parse a stored action name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provision" => Some(Self::Provision),
            "acquire" => Some(Self::Acquire),
            "takeover" => Some(Self::Takeover),
            "release" => Some(Self::Release),
            "release_rejected" => Some(Self::ReleaseRejected),
            "clear" => Some(Self::Clear),
            "run_finished" => Some(Self::RunFinished),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// When the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The lock key the action applied to.
    pub consultant_id: String,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event for `consultant_id`.
    ///
    /// The timestamp is set to the current time, and the actor is
    /// determined from the environment (USER@HOSTNAME).
    pub fn new(action: EventAction, consultant_id: &str) -> Self {
        Self {
            ts: Utc::now(),
            action,
            consultant_id: consultant_id.to_string(),
            actor: get_owner_string(),
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the details object.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Set the actor explicitly.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Serialize the event as a single NDJSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SchedlockError::UserError(format!("failed to serialize event: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_defaults() {
        let event = Event::new(EventAction::Acquire, "C1");
        assert_eq!(event.action, EventAction::Acquire);
        assert_eq!(event.consultant_id, "C1");
        assert!(event.actor.contains('@'));
        assert!(event.details.as_object().unwrap().is_empty());
    }

    #[test]
    fn event_json_line_is_single_line() {
        let event = Event::new(EventAction::Takeover, "C1")
            .with_actor("ops@replica-1")
            .with_details(json!({"previous_holder": "ops@replica-0", "age_seconds": 360}));

        let line = event.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"action\":\"takeover\""));
        assert!(line.contains("ops@replica-0"));

        let parsed: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.action, EventAction::Takeover);
        assert_eq!(parsed.actor, "ops@replica-1");
    }

    #[test]
    fn action_names_match_serde_names() {
        for action in [
            EventAction::Provision,
            EventAction::Acquire,
            EventAction::Takeover,
            EventAction::Release,
            EventAction::ReleaseRejected,
            EventAction::Clear,
            EventAction::RunFinished,
        ] {
            let serialized = serde_json::to_value(action).unwrap();
            assert_eq!(serialized, json!(action.as_str()));
            assert_eq!(EventAction::parse(action.as_str()), Some(action));
            assert_eq!(action.to_string(), action.as_str());
        }
        assert_eq!(EventAction::parse("unknown"), None);
    }
}
