// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Typed notifications published by the sync subsystem.
//!
//! Subscribers receive every event published after they subscribed. A slow
//! subscriber that falls more than the channel capacity behind skips the
//! oldest events rather than blocking publishers.

use std::time::Duration;

use kn_core::{ActionKind, ConnectivityState, Operation, ResourceType};
use tokio::sync::broadcast;
use tracing::warn;

const EVENT_CAPACITY: usize = 256;

/// Something observable happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    ConnectivityChanged {
        from: ConnectivityState,
        to: ConnectivityState,
    },
    ActionSucceeded {
        action_id: String,
        resource_id: String,
        kind: ActionKind,
        resource_type: ResourceType,
    },
    ActionRetryScheduled {
        action_id: String,
        retry_count: u32,
        delay: Duration,
    },
    ActionFailed {
        action_id: String,
        error: String,
    },
    /// A sync cycle completed.
    Synced {
        sent: usize,
        received: usize,
        conflicts: usize,
    },
    SyncError {
        message: String,
    },
    /// A document entered the `conflict` state.
    Conflict {
        document_id: String,
    },
    Initialized {
        document_id: String,
    },
    Change {
        document_id: String,
        operation: Operation,
    },
    Saved {
        document_id: String,
        version: i64,
    },
}

/// Publish side of the event channel. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { tx }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Registers a subscriber.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive side of one subscriber. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<SyncEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Stops receiving events. Same as dropping the subscription: the
    /// receiver is released and the bus stops counting it.
    pub fn unsubscribe(self) {
        drop(self.rx);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
