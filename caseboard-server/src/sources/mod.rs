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

//! The knowledge sources and their registration with the controller.
//!
//! Each source reads the graph for its case and produces further mutations
//! through the graph store, which re-enter the controller as new triggers.
//! Cooldowns, dedup and the per-case cap bound the resulting cascade.

pub mod classifier;
pub mod clustering;
pub mod forensics;
pub mod forensics_xref;
pub mod network;
pub mod recluster;
pub mod synthesizer;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::controller::{BlackboardController, Priority, SourceHandler, TriggerPayload};
use crate::services::ServiceHub;
use crate::state::GraphStore;

/// Everything a knowledge source needs: the graph and the external
/// services. Handlers never touch the store except through its operations.
pub struct SourceContext {
    pub graph: Arc<GraphStore>,
    pub services: ServiceHub,
}

fn handler<F, Fut>(ctx: &Arc<SourceContext>, f: F) -> SourceHandler
where
    F: Fn(Arc<SourceContext>, TriggerPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    Arc::new(move |payload| Box::pin(f(Arc::clone(&ctx), payload)))
}

fn payload_has_media(payload: &TriggerPayload) -> bool {
    payload
        .record
        .node()
        .map(|n| n.data.media_url().is_some())
        .unwrap_or(false)
}

fn payload_has_claims(payload: &TriggerPayload) -> bool {
    payload
        .record
        .node()
        .map(|n| n.data.has_claims())
        .unwrap_or(false)
}

/// Register every knowledge source. Priorities, trigger sets, conditions
/// and cooldowns are the scheduling contract the controller enforces.
pub fn register_knowledge_sources(controller: &BlackboardController, ctx: &Arc<SourceContext>) {
    controller.register(
        "clustering",
        Priority::Critical,
        &["node:report", "edge:repost_of", "edge:mutation_of"],
        handler(ctx, clustering::run),
        None,
        Some(Duration::from_secs_f64(2.0)),
    );

    controller.register(
        "forensics",
        Priority::High,
        &["node:report"],
        handler(ctx, forensics::run),
        Some(Arc::new(payload_has_media)),
        Some(Duration::from_secs_f64(2.0)),
    );

    controller.register(
        "recluster_debunk",
        Priority::High,
        &["edge:debunked_by"],
        handler(ctx, recluster::run),
        None,
        Some(Duration::from_secs_f64(1.0)),
    );

    controller.register(
        "network",
        Priority::Medium,
        &["node:report"],
        handler(ctx, network::run),
        None,
        Some(Duration::from_secs_f64(1.0)),
    );

    controller.register(
        "forensics_xref",
        Priority::Medium,
        &["update:report"],
        handler(ctx, forensics_xref::run),
        Some(Arc::new(payload_has_claims)),
        Some(Duration::from_secs_f64(3.0)),
    );

    controller.register(
        "classifier",
        Priority::Low,
        &[
            "edge:similar_to",
            "edge:repost_of",
            "edge:mutation_of",
            "edge:debunked_by",
            "edge:amplified_by",
            "node:fact_check",
            "node:external_source",
        ],
        handler(ctx, classifier::run),
        None,
        Some(Duration::from_secs_f64(2.0)),
    );

    controller.register(
        "case_synthesizer",
        Priority::Background,
        &["update:report"],
        handler(ctx, synthesizer::run),
        Some(Arc::new(payload_has_claims)),
        Some(Duration::from_secs_f64(5.0)),
    );
}
