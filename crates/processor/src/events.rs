//! Event fanout
//!
//! Subscribers (SSE bridges, dashboards) get processed commands through a
//! broadcast channel. Dropping a receiver unsubscribes it; a slow receiver
//! that falls behind the channel capacity loses oldest events rather than
//! blocking the processor.

use tokio::sync::broadcast;

use mnemon_core::CommandResponse;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    CommandProcessed { response: CommandResponse },
}

/// Broadcast fanout for processor events
pub struct EventBus {
    tx: broadcast::Sender<ProcessorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.tx.subscribe()
    }

    /// Emit to all current subscribers; a send with no subscribers is fine
    pub fn emit(&self, event: ProcessorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(command_id: &str) -> CommandResponse {
        CommandResponse {
            command_id: command_id.to_string(),
            assistant_text: "ok".to_string(),
            actions: Vec::new(),
            memories_used: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        bus.emit(ProcessorEvent::CommandProcessed {
            response: response("c1"),
        });

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                ProcessorEvent::CommandProcessed { response } => {
                    assert_eq!(response.command_id, "c1");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit(ProcessorEvent::CommandProcessed {
            response: response("c1"),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
