//! Event bus carrying guidance output to the host.

use beacon_common::Vec2;
use beacon_nav::{Announcement, TraverseEvent};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Events published by the [`Guide`](crate::guide::Guide).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GuideEvent {
    /// Text for the speech layer.
    Announcement(Announcement),
    /// Movement intent changed.
    Intent {
        /// Right axis, `[-1, 1]`.
        x: f32,
        /// Forward axis, `[-1, 1]`.
        y: f32,
    },
    /// Guidance started or ended.
    GuidanceChanged {
        /// Whether guidance is now active.
        active: bool,
        /// Target name while active.
        target: Option<String>,
    },
    /// Auto-traversal state change.
    Traverse(TraverseEvent),
}

impl GuideEvent {
    /// Intent event from a vector.
    #[must_use]
    pub fn intent(intent: Vec2) -> Self {
        Self::Intent {
            x: intent.x,
            y: intent.y,
        }
    }

    /// The announcement, if this is one.
    #[must_use]
    pub const fn as_announcement(&self) -> Option<&Announcement> {
        match self {
            Self::Announcement(a) => Some(a),
            _ => None,
        }
    }
}

/// Bounded, non-blocking broadcast of [`GuideEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    sender: Sender<GuideEvent>,
    receiver: Receiver<GuideEvent>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event. When the bus is full the event is dropped.
    pub fn publish(&self, event: GuideEvent) {
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<GuideEvent> {
        self.receiver.try_iter().collect()
    }

    /// Number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Extra sender for publishing from elsewhere.
    #[must_use]
    pub fn sender(&self) -> Sender<GuideEvent> {
        self.sender.clone()
    }

    /// Extra receiver; each event goes to exactly one receiver.
    #[must_use]
    pub fn receiver(&self) -> Receiver<GuideEvent> {
        self.receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_drain() {
        let bus = EventBus::new(8);
        bus.publish(GuideEvent::Announcement(Announcement::RouteStopped));
        bus.publish(GuideEvent::intent(Vec2::new(0.5, -1.0)));
        assert_eq!(bus.pending_count(), 2);

        let events = bus.drain();
        assert_eq!(
            events[0].as_announcement(),
            Some(&Announcement::RouteStopped)
        );
        assert_eq!(events[1], GuideEvent::Intent { x: 0.5, y: -1.0 });
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops() {
        let bus = EventBus::new(2);
        for _ in 0..5 {
            bus.publish(GuideEvent::Announcement(Announcement::NoPointsOfInterest));
        }
        assert_eq!(bus.pending_count(), 2);
        assert_eq!(bus.capacity(), 2);
    }
}
