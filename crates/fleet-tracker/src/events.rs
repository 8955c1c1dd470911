//! Event bus for distributing processing events to collaborators

use fleet_core::Event;

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Event bus fanning processing events out to subscribers
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    /// Recent events kept for late subscribers and diagnostics
    history: Arc<RwLock<Vec<Event>>>,
    max_history: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            history: Arc::new(RwLock::new(Vec::new())),
            max_history: 256,
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event
    pub fn publish(&self, event: Event) {
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                history.remove(0);
            }
        }

        // Send errors only mean there are no subscribers right now
        let _ = self.sender.send(event);
        debug!("event published");
    }

    /// Get the most recent events, oldest first
    pub fn recent(&self, count: usize) -> Vec<Event> {
        let history = self.history.read();
        let start = history.len().saturating_sub(count);
        history[start..].to_vec()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            history: self.history.clone(),
            max_history: self.max_history,
        }
    }
}
