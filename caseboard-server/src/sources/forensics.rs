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

//! Forensics - media variant tracking by perceptual hash.
//!
//! Hashes the triggering report's media, records a `media_variant` node,
//! and compares against every pre-existing media variant in the case by
//! Hamming distance: 0-5 is a repost, 6-15 a mutation, above 15 unrelated.

use caseboard_core::{EdgeKind, NodeData, NodeKind};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::controller::TriggerPayload;
use crate::sources::SourceContext;

const REPOST_MAX_DISTANCE: u32 = 5;
const MUTATION_MAX_DISTANCE: u32 = 15;

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".webm", ".avi", ".mkv"];

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Edge kind for a Hamming distance between media hashes, if any.
pub fn variant_edge_kind(distance: u32) -> Option<EdgeKind> {
    if distance <= REPOST_MAX_DISTANCE {
        Some(EdgeKind::RepostOf)
    } else if distance <= MUTATION_MAX_DISTANCE {
        Some(EdgeKind::MutationOf)
    } else {
        None
    }
}

fn is_video_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub async fn run(ctx: Arc<SourceContext>, payload: TriggerPayload) -> anyhow::Result<()> {
    let Some(report) = payload
        .record
        .node()
        .filter(|n| n.kind == NodeKind::Report)
        .cloned()
    else {
        return Ok(());
    };
    let Some(media_url) = report.data.media_url().map(String::from) else {
        return Ok(());
    };

    let phash = ctx.services.media.phash(&media_url).await.unwrap_or(None);
    let Some(phash) = phash else {
        debug!("No perceptual hash for {media_url}, skipping forensics");
        return Ok(());
    };

    let mut media_data = json!({
        "media_url": media_url,
        "phash": format!("{phash:016x}"),
        "analyzed_at": Utc::now().to_rfc3339(),
    });
    if is_video_url(&media_url) {
        let query = report.data.text_body().unwrap_or(&media_url);
        let matches = ctx
            .services
            .media
            .video_search(query)
            .await
            .unwrap_or_default();
        if let Some(obj) = media_data.as_object_mut() {
            obj.insert("media_type".into(), json!("video"));
            obj.insert("search_results".into(), json!(matches));
        }
    }

    // Peers are the variants that existed before this one.
    let existing = ctx
        .graph
        .nodes_of_kind(&payload.case_id, NodeKind::MediaVariant);
    let media_node = ctx.graph.add_node(
        NodeKind::MediaVariant,
        &payload.case_id,
        NodeData(media_data.as_object().cloned().unwrap_or_default()),
        None,
    )?;
    debug!(
        "Media variant {} recorded for report {}",
        media_node.id, report.id
    );

    for other in existing {
        let Some(other_hash) = other.data.phash() else {
            continue;
        };
        let distance = hamming_distance(phash, other_hash);
        let Some(kind) = variant_edge_kind(distance) else {
            continue;
        };
        ctx.graph.add_edge(
            kind,
            &report.id,
            &other.id,
            NodeData(
                json!({"hamming": distance})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
        )?;
    }

    ctx.graph.update_node(
        &report.id,
        NodeData(
            json!({"phash": format!("{phash:016x}")})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        ),
    )?;
    Ok(())
}
