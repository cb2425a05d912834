use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::ports::{EventEmitter, EventScope, Notification, NotificationSink};
use crate::utils::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

// ============================================================================
// Best-Effort Delivery
// ============================================================================
//
// Notifications and realtime events must never fail an orchestration
// operation once the aggregate state was durably written. This wrapper logs
// and swallows every failure, and a circuit breaker per channel stops
// hammering a sink that is consistently down.
//
// ============================================================================

pub struct BestEffortNotifier {
    sink: Arc<dyn NotificationSink>,
    emitter: Arc<dyn EventEmitter>,
    sink_breaker: CircuitBreaker,
    emitter_breaker: CircuitBreaker,
}

impl BestEffortNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            sink,
            emitter,
            sink_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            emitter_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    /// Deliver a notification, swallowing any failure.
    pub async fn notify(&self, user_id: Uuid, notification: Notification) {
        let kind = notification.kind;
        match self
            .sink_breaker
            .call(self.sink.notify(user_id, notification))
            .await
        {
            Ok(()) => {}
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::debug!(%user_id, ?kind, "Notification skipped, sink circuit open");
            }
            Err(CircuitBreakerError::OperationFailed(error)) => {
                tracing::warn!(%user_id, ?kind, %error, "Notification delivery failed");
            }
        }
    }

    /// Broadcast a realtime event, swallowing any failure.
    pub async fn emit(&self, scope: EventScope, event: &str, payload: Value) {
        match self
            .emitter_breaker
            .call(self.emitter.emit(scope, event, payload))
            .await
        {
            Ok(()) => {}
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::debug!(event, "Event broadcast skipped, emitter circuit open");
            }
            Err(CircuitBreakerError::OperationFailed(error)) => {
                tracing::warn!(event, %error, "Event broadcast failed");
            }
        }
    }
}
