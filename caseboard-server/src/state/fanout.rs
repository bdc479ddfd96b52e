// Copyright 2025 Caseboard (https://github.com/caseboard)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Subscriber fan-out for the caseboard and alert streams.
//!
//! Each subscriber is an independent bounded sink. Delivery is `try_send`:
//! a subscriber whose buffer is full (or whose receiver is gone) is removed
//! on the spot, so a slow consumer never exerts back-pressure on the
//! mutation path. Delivery is best-effort and in-order per subscriber.

use caseboard_core::{Alert, CaseSnapshot};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Wire message for both streams. ISO-8601 timestamps.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Sent once, immediately on caseboard subscription.
    Snapshot {
        payload: Vec<CaseSnapshot>,
        timestamp: DateTime<Utc>,
    },
    /// One per graph mutation, in mutation order.
    GraphUpdate {
        action: &'static str,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    /// One per published alert.
    NewAlert { alert: Alert },
}

pub type SubscriberId = u64;

pub struct StreamFanout {
    caseboard: DashMap<SubscriberId, mpsc::Sender<StreamMessage>>,
    alerts: DashMap<SubscriberId, mpsc::Sender<StreamMessage>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl StreamFanout {
    pub fn new(buffer: usize) -> Self {
        Self {
            caseboard: DashMap::new(),
            alerts: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a caseboard subscriber with its initial snapshot already
    /// queued. The caller (the graph store) invokes this under its state
    /// lock, so the subscriber observes snapshot-then-every-later-mutation
    /// with no gap and no duplicate.
    pub fn register_caseboard(
        &self,
        snapshots: Vec<CaseSnapshot>,
    ) -> (SubscriberId, mpsc::Receiver<StreamMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.buffer);
        // Fresh channel with capacity >= 1: the snapshot always fits.
        let _ = tx.try_send(StreamMessage::Snapshot {
            payload: snapshots,
            timestamp: Utc::now(),
        });
        self.caseboard.insert(id, tx);
        debug!("Caseboard subscriber {id} connected");
        (id, rx)
    }

    pub fn register_alerts(&self) -> (SubscriberId, mpsc::Receiver<StreamMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.alerts.insert(id, tx);
        debug!("Alert subscriber {id} connected");
        (id, rx)
    }

    pub fn unsubscribe_caseboard(&self, id: SubscriberId) {
        self.caseboard.remove(&id);
    }

    pub fn unsubscribe_alerts(&self, id: SubscriberId) {
        self.alerts.remove(&id);
    }

    /// Deliver a graph mutation to every caseboard subscriber.
    pub fn broadcast_caseboard(&self, message: StreamMessage) {
        Self::broadcast(&self.caseboard, message, "caseboard");
    }

    /// Deliver a published alert to every alert subscriber.
    pub fn publish_alert(&self, alert: Alert) {
        Self::broadcast(&self.alerts, StreamMessage::NewAlert { alert }, "alert");
    }

    fn broadcast(
        subscribers: &DashMap<SubscriberId, mpsc::Sender<StreamMessage>>,
        message: StreamMessage,
        stream: &str,
    ) {
        let mut dead: Vec<SubscriberId> = Vec::new();
        for entry in subscribers.iter() {
            match entry.value().try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Dropping slow {stream} subscriber {}", entry.key());
                    dead.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }
        for id in dead {
            subscribers.remove(&id);
        }
    }

    pub fn caseboard_subscriber_count(&self) -> usize {
        self.caseboard.len()
    }

    pub fn alert_subscriber_count(&self) -> usize {
        self.alerts.len()
    }
}
