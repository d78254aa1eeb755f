//! Fan-out of backend events to channel connections.
//!
//! Each open channel connection holds exactly one [`Subscription`].  The
//! subscription is released when it is dropped (or explicitly via
//! [`Subscription::release`]); the hub counts both live and released
//! subscriptions so leaks and double releases are observable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use ng_protocol::BackendEvent;

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    released: AtomicUsize,
}

pub struct EventHub {
    tx: broadcast::Sender<BackendEvent>,
    counters: Arc<Counters>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Publish an event to every live subscription.  Returns the number of
    /// subscriptions it was delivered to.
    ///
    /// Besides the gateway's own status, log and command events, this is
    /// where an embedding node-event source injects `invoice`, `payment`,
    /// `channel`, `peer` and `transaction` notifications.
    pub fn publish(&self, event: BackendEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        Subscription {
            rx: self.tx.subscribe(),
            lease: Lease {
                counters: self.counters.clone(),
            },
        }
    }

    /// Subscriptions currently held.
    pub fn active_subscriptions(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Subscriptions released since the hub was created.
    pub fn released_total(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

/// A connection's handle on the event stream.
pub struct Subscription {
    rx: broadcast::Receiver<BackendEvent>,
    lease: Lease,
}

impl Subscription {
    /// Next event, or `None` once the hub is gone.
    ///
    /// A subscriber that falls behind the buffer skips the missed events
    /// and keeps going.
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "channel subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription now.
    pub fn release(self) {
        drop(self);
    }
}

struct Lease {
    counters: Arc<Counters>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("backend subscription released");
    }
}
