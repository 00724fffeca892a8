//! Application event channel: user-facing notices and state-change
//! notifications, broadcast as JSON strings to any listening consumer.

use serde_json::Value;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppEvents {
    tx: broadcast::Sender<String>,
}

impl Default for AppEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AppEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// A one-line message meant for the user.
    pub fn notice(&self, message: &str) {
        tracing::info!(notice = %message, "user notice");
        self.emit("notice", serde_json::json!({ "message": message }));
    }

    /// Broadcast `{"type": kind, ...payload}`. Sending with no listeners is fine.
    pub fn emit(&self, kind: &str, payload: Value) {
        let mut event = serde_json::json!({ "type": kind });
        if let (Some(obj), Value::Object(extra)) = (event.as_object_mut(), payload) {
            obj.extend(extra);
        }
        let _ = self.tx.send(event.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notice_is_broadcast() {
        let events = AppEvents::new();
        let mut rx = events.subscribe();
        events.notice("Please install a wallet like MetaMask.");

        let msg: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "notice");
        assert_eq!(msg["message"], "Please install a wallet like MetaMask.");
    }

    #[test]
    fn emit_without_listeners_does_not_fail() {
        AppEvents::new().emit("session:changed", serde_json::json!({}));
    }
}
