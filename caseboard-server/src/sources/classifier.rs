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

//! Semantic role classifier for report nodes.
//!
//! Deterministic given the graph, in rule order: outgoing mutation edge
//! makes a mutator, outgoing repost edge an amplifier, the earliest
//! timestamp in the case the originator, no outgoing edge to an external
//! source or fact check an unwitting sharer; anything else is left alone.

use caseboard_core::{EdgeKind, GraphEdge, GraphNode, NodeData, NodeKind, SemanticRole};
use serde_json::json;
use std::sync::Arc;

use crate::controller::TriggerPayload;
use crate::sources::SourceContext;

/// The report with the earliest timestamp; insertion order breaks ties.
fn earliest_report_id(reports: &[GraphNode]) -> Option<String> {
    reports
        .iter()
        .filter_map(|r| r.data.timestamp().map(|ts| (ts, &r.id)))
        .min_by_key(|(ts, _)| *ts)
        .map(|(_, id)| id.clone())
}

fn classify(
    ctx: &SourceContext,
    node: &GraphNode,
    earliest_id: Option<&str>,
    incident: &[GraphEdge],
) -> Option<SemanticRole> {
    let outgoing: Vec<&GraphEdge> = incident
        .iter()
        .filter(|e| e.source_id == node.id)
        .collect();

    if outgoing.iter().any(|e| e.kind == EdgeKind::MutationOf) {
        return Some(SemanticRole::Mutator);
    }
    if outgoing.iter().any(|e| e.kind == EdgeKind::RepostOf) {
        return Some(SemanticRole::Amplifier);
    }
    if earliest_id == Some(node.id.as_str()) {
        return Some(SemanticRole::Originator);
    }
    let touches_external = outgoing.iter().any(|e| {
        ctx.graph
            .get_node(&e.target_id)
            .map(|t| matches!(t.kind, NodeKind::ExternalSource | NodeKind::FactCheck))
            .unwrap_or(false)
    });
    if !touches_external {
        return Some(SemanticRole::UnwittingSharer);
    }
    None
}

pub async fn run(ctx: Arc<SourceContext>, payload: TriggerPayload) -> anyhow::Result<()> {
    let reports = ctx.graph.nodes_of_kind(&payload.case_id, NodeKind::Report);
    if reports.is_empty() {
        return Ok(());
    }
    let earliest_id = earliest_report_id(&reports);

    for node in &reports {
        let incident = ctx.graph.edges_for_node(&node.id);
        let Some(role) = classify(&ctx, node, earliest_id.as_deref(), &incident) else {
            continue;
        };
        if node.data.semantic_role() == Some(role) {
            continue;
        }
        ctx.graph.update_node(
            &node.id,
            NodeData(
                json!({"semantic_role": role.as_str()})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
        )?;
    }
    Ok(())
}
