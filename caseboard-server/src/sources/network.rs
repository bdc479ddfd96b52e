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

//! Network crawler - claim extraction, fact-check lookup, search seeding.
//!
//! Updates the triggering report with extracted claims and urgency, turns
//! fact-check reviews into `fact_check` nodes with `debunked_by` edges, and
//! seeds `external_source` nodes (deduped per case by search query) with
//! `similar_to` edges for downstream correlation.

use caseboard_core::{EdgeKind, NodeData, NodeKind};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::controller::TriggerPayload;
use crate::services::ai;
use crate::sources::SourceContext;

const MAX_REVIEWS_PER_CLAIM: usize = 3;

pub async fn run(ctx: Arc<SourceContext>, payload: TriggerPayload) -> anyhow::Result<()> {
    let Some(report) = payload
        .record
        .node()
        .filter(|n| n.kind == NodeKind::Report)
        .cloned()
    else {
        return Ok(());
    };

    let text = report.data.text_body().unwrap_or_default().to_string();
    let location = report.data.location();
    let timestamp = report
        .data
        .get("timestamp")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let extraction =
        ai::extract_claims(ctx.services.ai.as_ref(), &text, location.as_ref(), &timestamp).await;
    debug!(
        "Extracted {} claim(s) from report {}",
        extraction.claims.len(),
        report.id
    );

    ctx.graph.update_node(
        &report.id,
        NodeData(
            json!({
                "claims": extraction.claims,
                "urgency": extraction.urgency,
                "misinformation_flags": extraction.misinformation_flags,
                "suggested_verifications": extraction.suggested_verifications,
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        ),
    )?;

    for claim in &extraction.claims {
        if claim.statement.is_empty() {
            continue;
        }
        let reviews = ctx
            .services
            .factcheck
            .lookup(&claim.statement)
            .await
            .unwrap_or_default();
        for review in reviews.iter().take(MAX_REVIEWS_PER_CLAIM) {
            let claim_text = if review.claim_text.is_empty() {
                &claim.statement
            } else {
                &review.claim_text
            };
            let clipped: String = claim_text.chars().take(300).collect();
            let fact_check = ctx.graph.add_node(
                NodeKind::FactCheck,
                &payload.case_id,
                NodeData(
                    json!({
                        "claim_text": clipped,
                        "rating": review.rating,
                        "reviewer": review.reviewer,
                        "url": review.url,
                    })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                ),
                None,
            )?;
            ctx.graph.add_edge(
                EdgeKind::DebunkedBy,
                &report.id,
                &fact_check.id,
                NodeData::new(),
            )?;
        }
    }

    let queries = ai::generate_search_queries(ctx.services.ai.as_ref(), &extraction.claims).await;
    for query in queries {
        if ctx
            .graph
            .external_source_by_query(&payload.case_id, &query)
            .is_some()
        {
            continue;
        }
        let source = ctx.graph.add_node(
            NodeKind::ExternalSource,
            &payload.case_id,
            NodeData(
                json!({
                    "search_query": query,
                    "platform": "web",
                    "url": "",
                    "status": "pending",
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
            NodeData(json!({"score": 0.5}).as_object().cloned().unwrap_or_default()),
        )?;
    }

    Ok(())
}
