//! Outbound notification trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Result, SettlementError};

/// Fire-and-forget outbound notifications (webhooks, plugins).
///
/// Callers log a failed delivery and carry on; a notification must never
/// decide the fate of the settlement that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &str, payload: serde_json::Value) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    delivered: Vec<(String, serde_json::Value)>,
    fail_on_notify: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_notify = fail;
    }

    pub fn delivered_count(&self) -> usize {
        self.state.read().unwrap().delivered.len()
    }

    /// Number of deliveries for one event name.
    pub fn delivered_for(&self, event: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .delivered
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_notify {
            return Err(SettlementError::Notifier(
                "Webhook endpoint unreachable".to_string(),
            ));
        }
        state.delivered.push((event.to_string(), payload));
        Ok(())
    }
}
