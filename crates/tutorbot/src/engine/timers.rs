//! Deadlines owned by the engine.
//!
//! Each deadline is a spawned task that sleeps and then posts its key back to
//! the engine loop, so expiry is handled on the loop like any other event.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::survey::{AnnouncementId, FormId, ViewId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    View(ViewId),
    Announcement(AnnouncementId),
    Feedback(FormId),
}

/// Receiving end of fired deadlines.
pub type TimerReceiver = mpsc::UnboundedReceiver<TimerKey>;

#[derive(Debug)]
pub struct Timers {
    tx: mpsc::UnboundedSender<TimerKey>,
    handles: HashMap<TimerKey, AbortHandle>,
}

impl Timers {
    pub fn new() -> (Self, TimerReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                handles: HashMap::new(),
            },
            rx,
        )
    }

    /// Fire `key` after `after`. Rescheduling a key replaces its old deadline.
    pub fn schedule(&mut self, key: TimerKey, after: Duration) {
        let tx = self.tx.clone();
        let fired = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(fired);
        });
        if let Some(previous) = self.handles.insert(key, handle.abort_handle()) {
            previous.abort();
        }
    }

    /// Consume a fired key. False if it was cancelled or already handled.
    pub fn fired(&mut self, key: &TimerKey) -> bool {
        self.handles.remove(key).is_some()
    }

    pub fn pending(&self) -> usize {
        self.handles.len()
    }

    pub fn abort_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
