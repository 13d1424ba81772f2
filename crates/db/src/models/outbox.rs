//! Outbox event model.

use serde::Serialize;
use sqlx::FromRow;
use tessera_core::types::{DbId, Timestamp};

/// A row from the `outbox_events` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct OutboxEvent {
    pub id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub dispatched_at: Option<Timestamp>,
}

impl OutboxEvent {
    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }
}

/// DTO for recording an event inside the triggering transaction.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}
