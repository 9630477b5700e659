//! Achievement state-change signals.
//!
//! The cache computes transitions; the bus fans them out to whoever is
//! listening (toast layer, list windows, logs). Delivery order within
//! one merge pass matches the order transitions were computed.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Signals emitted after a merge pass for cross-cutting concerns.
#[derive(Debug, Clone, PartialEq)]
pub enum AchievementSignal {
    /// locked -> unlocked: the celebratory case.
    Unlocked {
        game_id: String,
        technical_key: String,
        unlock_time: Option<DateTime<Utc>>,
    },

    /// Any other unlocked-state change (e.g. a re-lock). Subscribers
    /// refresh silently, no celebration.
    StateChanged {
        game_id: String,
        technical_key: String,
        unlocked: bool,
    },
}

/// Fan-out bus for achievement signals. Subscribers that drop their
/// receiver are pruned on the next emit.
#[derive(Default)]
pub struct SignalBus {
    subscribers: Mutex<Vec<UnboundedSender<AchievementSignal>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<AchievementSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn emit(&self, signal: AchievementSignal) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| tx.send(signal.clone()).is_ok());
    }

    pub fn emit_all(&self, signals: impl IntoIterator<Item = AchievementSignal>) {
        for signal in signals {
            self.emit(signal);
        }
    }
}
