use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Notification Sink & Realtime Event Emitter Ports
// ============================================================================
//
// Both are fire-and-forget: a failure here must never fail the orchestration
// operation once the aggregate state was durably written. The orchestration
// layer wraps these in a best-effort guard that logs and swallows errors.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderStatus,
    RiderAssignment,
    PickupProgress,
    Cancellation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Value,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, title: title.into(), message: message.into(), data: Value::Null }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Scope of a realtime broadcast: the parent order's channel or one
/// sub-order's tracking channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    MultiOrder(Uuid),
    SubOrder(Uuid),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: Uuid, notification: Notification) -> anyhow::Result<()>;
}

#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, scope: EventScope, event: &str, payload: Value) -> anyhow::Result<()>;
}
