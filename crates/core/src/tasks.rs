//! Queue task contract shared by the producer (service) and consumer (worker).
//!
//! Task types are plain string constants stored in the `tasks.task_type`
//! column; payloads are JSON. Adding a task type means adding a constant, a
//! payload struct, and a handler registration in the worker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Task types
// ---------------------------------------------------------------------------

/// Generate a verification code for a user and email it.
pub const TASK_SEND_VERIFY_EMAIL: &str = "send_verify_email";

/// Prefix of task keys derived from outbox events (`outbox:{event_id}`).
pub const OUTBOX_TASK_KEY_PREFIX: &str = "outbox";

/// Maximum backoff delay between attempts of a failing task.
pub const MAX_RETRY_BACKOFF_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSendVerifyEmail {
    pub username: String,
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// Named queues. Higher weight is polled proportionally more often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    Critical,
    Default,
}

impl Queue {
    pub const ALL: [Queue; 2] = [Queue::Critical, Queue::Default];

    pub fn name(self) -> &'static str {
        match self {
            Queue::Critical => "critical",
            Queue::Default => "default",
        }
    }

    pub fn weight(self) -> u32 {
        match self {
            Queue::Critical => 10,
            Queue::Default => 5,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.name() == name)
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Enqueue options. `Default` is the verification-email policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Attempts after the first failure before the task is dropped.
    pub max_retry: i32,
    /// Minimum delay before the task becomes claimable.
    pub process_in: Duration,
    pub queue: Queue,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            max_retry: 10,
            process_in: Duration::from_secs(10),
            queue: Queue::Critical,
        }
    }
}

/// Task key for the task derived from an outbox event.
pub fn outbox_task_key(event_id: crate::types::DbId) -> String {
    format!("{OUTBOX_TASK_KEY_PREFIX}:{event_id}")
}

/// Delay before the next attempt after `retried` failures: 2^retried seconds,
/// capped at [`MAX_RETRY_BACKOFF_SECS`].
pub fn retry_delay_secs(retried: i32) -> i64 {
    let exp = retried.clamp(0, 30) as u32;
    2i64.pow(exp).min(MAX_RETRY_BACKOFF_SECS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_verification_policy() {
        let opts = TaskOptions::default();
        assert_eq!(opts.max_retry, 10);
        assert_eq!(opts.process_in, Duration::from_secs(10));
        assert_eq!(opts.queue, Queue::Critical);
    }

    #[test]
    fn queue_names_and_weights() {
        assert_eq!(Queue::Critical.name(), "critical");
        assert_eq!(Queue::Default.weight(), 5);
        assert_eq!(Queue::from_name("default"), Some(Queue::Default));
        assert_eq!(Queue::from_name("low"), None);
    }

    #[test]
    fn payload_wire_format() {
        let payload = PayloadSendVerifyEmail {
            username: "alice".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({ "username": "alice" }));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(retry_delay_secs(0), 1);
        assert_eq!(retry_delay_secs(1), 2);
        assert_eq!(retry_delay_secs(5), 32);
        assert_eq!(retry_delay_secs(12), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(retry_delay_secs(500), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn outbox_key_format() {
        assert_eq!(outbox_task_key(42), "outbox:42");
    }
}
