//! Chat callback contract
//!
//! Every chat request carries a [`ChatListener`]. The dispatcher calls
//! `on_update` zero or more times, then exactly one of `on_finish` or
//! `on_error`.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::session::dispatcher::ChatError;

pub trait ChatListener: Send + Sync {
    /// Incremental progress: the text so far and the fragment just added.
    /// Load progress arrives here too, as `(stage text, stage text)`.
    fn on_update(&self, _message: &str, _chunk: &str) {}

    fn on_finish(&self, message: String);

    fn on_error(&self, error: ChatError);
}

/// Callback invocations as values, for UIs that consume a channel
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    Update { message: String, chunk: String },
    Finish { message: String },
    Error { error: ChatError },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Finish { .. } | ChatEvent::Error { .. })
    }
}

impl ChatListener for mpsc::UnboundedSender<ChatEvent> {
    fn on_update(&self, message: &str, chunk: &str) {
        let _ = self.send(ChatEvent::Update {
            message: message.to_string(),
            chunk: chunk.to_string(),
        });
    }

    fn on_finish(&self, message: String) {
        if self.send(ChatEvent::Finish { message }).is_err() {
            tracing::debug!("Chat event receiver dropped before finish");
        }
    }

    fn on_error(&self, error: ChatError) {
        if self.send(ChatEvent::Error { error }).is_err() {
            tracing::debug!("Chat event receiver dropped before error");
        }
    }
}

/// A listener that forwards every callback into a channel
pub fn event_channel() -> (Arc<dyn ChatListener>, mpsc::UnboundedReceiver<ChatEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Arc<dyn ChatListener> = Arc::new(tx);
    (listener, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_call_order() {
        let (listener, mut rx) = event_channel();
        listener.on_update("Hel", "Hel");
        listener.on_finish("Hello".to_string());

        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::Update {
                message: "Hel".to_string(),
                chunk: "Hel".to_string()
            }
        );
        let last = rx.try_recv().unwrap();
        assert!(last.is_terminal());
        assert_eq!(
            last,
            ChatEvent::Finish {
                message: "Hello".to_string()
            }
        );
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (listener, rx) = event_channel();
        drop(rx);
        listener.on_update("a", "a");
        listener.on_error(ChatError::EmptyResponse);
    }
}
