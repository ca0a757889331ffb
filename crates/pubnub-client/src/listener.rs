//! Listener registry and non-blocking event fan-out.
//!
//! Each listener is a bundle of three unbounded channels, so delivery to a
//! slow consumer never blocks delivery to the others or the poll loop. The
//! registry keeps its own lock, independent of subscription state, and is
//! never held across an await.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::types::{MessageEvent, PresenceEvent, Status};

/// Receiving side of one registered listener. Obtained from
/// [`Client::add_listener`](crate::Client::add_listener); dropping it (or
/// calling [`Client::remove_listener`](crate::Client::remove_listener))
/// stops delivery.
#[derive(Debug)]
pub struct Listener {
    pub status: mpsc::UnboundedReceiver<Status>,
    pub message: mpsc::UnboundedReceiver<MessageEvent>,
    pub presence: mpsc::UnboundedReceiver<PresenceEvent>,
    pub(crate) id: u64,
}

struct Slot {
    id: u64,
    status_tx: mpsc::UnboundedSender<Status>,
    message_tx: mpsc::UnboundedSender<MessageEvent>,
    presence_tx: mpsc::UnboundedSender<PresenceEvent>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status) = mpsc::unbounded_channel();
        let (message_tx, message) = mpsc::unbounded_channel();
        let (presence_tx, presence) = mpsc::unbounded_channel();
        self.slots.lock().expect("listener lock poisoned").push(Slot {
            id,
            status_tx,
            message_tx,
            presence_tx,
        });
        Listener {
            status,
            message,
            presence,
            id,
        }
    }

    /// Remove a listener; no event is delivered to it afterwards.
    pub(crate) fn remove(&self, id: u64) {
        self.slots
            .lock()
            .expect("listener lock poisoned")
            .retain(|slot| slot.id != id);
    }

    pub(crate) fn broadcast_status(&self, status: &Status) {
        self.slots
            .lock()
            .expect("listener lock poisoned")
            .retain(|slot| slot.status_tx.send(status.clone()).is_ok());
    }

    pub(crate) fn broadcast_message(&self, message: &MessageEvent) {
        self.slots
            .lock()
            .expect("listener lock poisoned")
            .retain(|slot| slot.message_tx.send(message.clone()).is_ok());
    }

    pub(crate) fn broadcast_presence(&self, presence: &PresenceEvent) {
        self.slots
            .lock()
            .expect("listener lock poisoned")
            .retain(|slot| slot.presence_tx.send(presence.clone()).is_ok());
    }
}
