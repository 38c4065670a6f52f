//! Live deployment event channel
//!
//! One process-wide broadcast hub. Subscribers filter by pipeline and
//! deployment id; a subscriber that is not connected when an event is
//! published simply misses it, the log file and deployment record remain the
//! source of truth.

use tokio::sync::broadcast;

use gantry_core::domain::event::DeployEvent;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<DeployEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes an event; delivery to zero subscribers is not an error
    pub fn publish(&self, event: DeployEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeployEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
