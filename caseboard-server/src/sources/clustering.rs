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

//! Clustering - temporal, geographic and semantic report similarity.
//!
//! Compares the triggering report against every other report in its case.
//! Combined score 0.3*temporal + 0.3*geographic + 0.4*semantic; at or above
//! 0.4 a `similar_to` edge is emitted with the component scores attached.
//! A missing timestamp or location on either side zeroes that component.

use caseboard_core::{EdgeKind, GeoPoint, GraphNode, MutationRecord, NodeData, NodeKind};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::controller::TriggerPayload;
use crate::sources::SourceContext;

const TEMPORAL_WINDOW_SECS: f64 = 30.0 * 60.0;
const GEO_RADIUS_METERS: f64 = 200.0;
const SIMILARITY_THRESHOLD: f64 = 0.4;
const WEIGHT_TEMPORAL: f64 = 0.3;
const WEIGHT_GEO: f64 = 0.3;
const WEIGHT_SEMANTIC: f64 = 0.4;

/// Great-circle distance in meters.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlam = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlam / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Lowercased words longer than 3 characters.
pub fn token_bag(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(String::from)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn temporal_score(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else { return 0.0 };
    let delta = (a - b).num_seconds().abs() as f64;
    if delta <= TEMPORAL_WINDOW_SECS {
        1.0
    } else {
        // Linear decay to zero over the next window.
        (1.0 - (delta - TEMPORAL_WINDOW_SECS) / TEMPORAL_WINDOW_SECS).max(0.0)
    }
}

fn geo_score(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else { return 0.0 };
    let dist = haversine_meters(a.lat, a.lng, b.lat, b.lng);
    if dist <= GEO_RADIUS_METERS {
        1.0
    } else {
        (1.0 - (dist - GEO_RADIUS_METERS) / GEO_RADIUS_METERS).max(0.0)
    }
}

/// (combined, temporal, geographic, semantic) for a report pair.
pub fn similarity(report: &GraphNode, other: &GraphNode) -> (f64, f64, f64, f64) {
    let t = temporal_score(report.data.timestamp(), other.data.timestamp());
    let g = geo_score(
        report.data.location().as_ref(),
        other.data.location().as_ref(),
    );
    let s = jaccard(
        &token_bag(report.data.text_body().unwrap_or_default()),
        &token_bag(other.data.text_body().unwrap_or_default()),
    );
    (
        WEIGHT_TEMPORAL * t + WEIGHT_GEO * g + WEIGHT_SEMANTIC * s,
        t,
        g,
        s,
    )
}

/// The triggering report: the added node, or the source endpoint of the
/// repost/mutation edge that fired the trigger.
fn triggering_report(ctx: &SourceContext, payload: &TriggerPayload) -> Option<GraphNode> {
    match &payload.record {
        MutationRecord::AddNode { node } if node.kind == NodeKind::Report => Some(node.clone()),
        MutationRecord::AddEdge { edge } => ctx
            .graph
            .get_node(&edge.source_id)
            .filter(|n| n.kind == NodeKind::Report),
        _ => None,
    }
}

pub async fn run(ctx: Arc<SourceContext>, payload: TriggerPayload) -> anyhow::Result<()> {
    let Some(report) = triggering_report(&ctx, &payload) else {
        return Ok(());
    };

    let already_linked: HashSet<String> = ctx
        .graph
        .edges_for_node(&report.id)
        .into_iter()
        .filter(|e| e.kind == EdgeKind::SimilarTo)
        .map(|e| {
            if e.source_id == report.id {
                e.target_id
            } else {
                e.source_id
            }
        })
        .collect();

    for other in ctx.graph.nodes_of_kind(&payload.case_id, NodeKind::Report) {
        if other.id == report.id || already_linked.contains(&other.id) {
            continue;
        }
        let (score, t, g, s) = similarity(&report, &other);
        if score < SIMILARITY_THRESHOLD {
            continue;
        }
        debug!(
            "Reports {} and {} cluster at {score:.2} (t={t:.2} g={g:.2} s={s:.2})",
            report.id, other.id
        );
        ctx.graph.add_edge(
            EdgeKind::SimilarTo,
            &report.id,
            &other.id,
            NodeData(
                json!({"score": score, "t": t, "g": g, "s": s})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
        )?;
    }
    Ok(())
}
