//! Outbound event stream: per-tick delta bundles for subscribers.
//!
//! After each resolved action the engine publishes what changed; the
//! boundary layer (websocket, UI, whatever) renders it. State remains
//! authoritative on the core side; subscribers receive diffs, not the world.

use crate::world::{Coordinate, RoomChange};
use serde::Serialize;
use tokio::sync::mpsc;

/// A compact view of the player for delta bundles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerDigest {
    pub name: String,
    pub level: u32,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub gold: u32,
}

/// What changed during one tick.
#[derive(Debug, Clone, Serialize)]
pub struct StateDelta {
    pub turn: u64,
    pub position: Coordinate,
    pub player: PlayerDigest,
    /// Room changes applied since the previous broadcast.
    pub room_changes: Vec<(Coordinate, RoomChange)>,
    /// Narrative additions this tick.
    pub narrative: Vec<String>,
    pub audio_hint: Option<String>,
    pub in_combat: bool,
}

/// Fan-out of tick deltas to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<StateDelta>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; deltas arrive from the next tick on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StateDelta> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Publish a delta, dropping subscribers that went away.
    pub fn publish(&mut self, delta: &StateDelta) {
        self.subscribers.retain(|tx| tx.send(delta.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(turn: u64) -> StateDelta {
        StateDelta {
            turn,
            position: Coordinate::ORIGIN,
            player: PlayerDigest {
                name: "Hero".into(),
                level: 1,
                hp: 10,
                max_hp: 10,
                mp: 5,
                max_mp: 5,
                gold: 0,
            },
            room_changes: Vec::new(),
            narrative: vec!["something happened".into()],
            audio_hint: None,
            in_combat: false,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_deltas() {
        let mut bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(&delta(1));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.turn, 1);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.publish(&delta(1));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
