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

//! Forensic cross-reference - once a report has claims, hunt for video
//! postings of them and graft the hits in as `external_source` nodes.

use caseboard_core::{EdgeKind, NodeData, NodeKind};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::controller::TriggerPayload;
use crate::sources::SourceContext;

const MAX_CLAIMS: usize = 2;
const MAX_MATCHES_PER_CLAIM: usize = 2;

pub async fn run(ctx: Arc<SourceContext>, payload: TriggerPayload) -> anyhow::Result<()> {
    let Some(report) = payload
        .record
        .node()
        .filter(|n| n.kind == NodeKind::Report)
        .cloned()
    else {
        return Ok(());
    };
    let claims = report.data.claims();
    if claims.is_empty() {
        return Ok(());
    }

    for claim in claims.iter().take(MAX_CLAIMS) {
        if claim.statement.is_empty() {
            continue;
        }
        let matches = ctx
            .services
            .media
            .video_search(&claim.statement)
            .await
            .unwrap_or_default();
        debug!(
            "Video search for report {} claim returned {} match(es)",
            report.id,
            matches.len()
        );
        for hit in matches.iter().take(MAX_MATCHES_PER_CLAIM) {
            let query: String = claim.statement.chars().take(200).collect();
            let source = ctx.graph.add_node(
                NodeKind::ExternalSource,
                &payload.case_id,
                NodeData(
                    json!({
                        "search_query": query,
                        "platform": "video",
                        "url": hit.url,
                        "status": "found",
                        "score": hit.score,
                    })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                ),
                None,
            )?;
            ctx.graph.add_edge(
                EdgeKind::SimilarTo,
                &report.id,
                &source.id,
                NodeData(
                    json!({"score": hit.score})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                ),
            )?;
        }
    }
    Ok(())
}
