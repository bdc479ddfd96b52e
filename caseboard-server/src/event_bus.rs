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

//! Process-wide event bus for non-graph domain events
//! (`ReportReceived`, `edge:created`, ...).
//!
//! Graph mutations do NOT flow through the bus; they take the
//! store -> controller path so the scheduling bookkeeping stays race-free.
//!
//! `emit` returns as soon as the event is enqueued. The dispatcher task
//! spawns every matching handler, so one failing or slow handler never
//! prevents the others from running or later events from being dispatched.

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub type EventPayload = Value;

type Handler = Arc<dyn Fn(EventPayload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    /// topic -> [(handler name, handler)]; the name makes registration
    /// idempotent per (topic, name).
    handlers: RwLock<HashMap<String, Vec<(String, Handler)>>>,
    sender: Mutex<Option<mpsc::UnboundedSender<(String, EventPayload)>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `(topic, name)`. Registering the same pair
    /// twice replaces the first registration, so it runs once per event.
    pub fn subscribe<F>(&self, topic: &str, name: &str, handler: F)
    where
        F: Fn(EventPayload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write();
        let entry = handlers.entry(topic.to_string()).or_default();
        let handler: Handler = Arc::new(handler);
        if let Some(existing) = entry.iter_mut().find(|(n, _)| n == name) {
            existing.1 = handler;
        } else {
            entry.push((name.to_string(), handler));
        }
    }

    /// Fire-and-forget. A no-op before `start()` and after `stop()`.
    pub fn emit(&self, topic: &str, payload: EventPayload) {
        let sender = self.sender.lock();
        if let Some(tx) = sender.as_ref() {
            if tx.send((topic.to_string(), payload)).is_err() {
                debug!("Event bus dispatcher gone, dropping {topic}");
            }
        }
    }

    pub fn start(self: &Arc<Self>) {
        let mut sender = self.sender.lock();
        if sender.is_some() {
            return;
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, EventPayload)>();
        *sender = Some(tx);

        let bus = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some((topic, payload)) = rx.recv().await {
                let matching: Vec<(String, Handler)> = bus
                    .handlers
                    .read()
                    .get(&topic)
                    .cloned()
                    .unwrap_or_default();
                for (name, handler) in matching {
                    let fut = handler(payload.clone());
                    let topic = topic.clone();
                    tokio::spawn(async move {
                        if let Err(e) = fut.await {
                            error!("Event handler {name} failed for {topic}: {e:#}");
                        }
                    });
                }
            }
        });
        *self.dispatcher.lock() = Some(handle);
        info!("Event bus started");
    }

    pub async fn stop(&self) {
        // Dropping the sender lets the dispatcher drain and exit.
        self.sender.lock().take();
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Event bus stopped");
    }
}
