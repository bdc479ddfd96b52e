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

//! Case synthesizer - background narrative pass once a report has claims.
//! Feeds a digest of the case graph to the AI and records the structured
//! synthesis on every report node. AI failure leaves the graph untouched.

use caseboard_core::{NodeData, NodeKind};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::controller::TriggerPayload;
use crate::services::ai;
use crate::sources::SourceContext;

const MAX_CONTEXT_NODES: usize = 15;
const MAX_NODE_DIGEST_CHARS: usize = 300;

pub async fn run(ctx: Arc<SourceContext>, payload: TriggerPayload) -> anyhow::Result<()> {
    let case_id = &payload.case_id;
    let Some(snapshot) = ctx.graph.case_snapshot(case_id) else {
        return Ok(());
    };

    let mut context_parts = vec![format!("Case {case_id}")];
    for node in snapshot.nodes.iter().take(MAX_CONTEXT_NODES) {
        let digest: String = serde_json::to_string(&node.data)
            .unwrap_or_default()
            .chars()
            .take(MAX_NODE_DIGEST_CHARS)
            .collect();
        context_parts.push(format!("- {}: {digest}", node.kind.as_str()));
    }
    let context = context_parts.join("\n");

    let Some(synthesis) = ai::synthesize_case(ctx.services.ai.as_ref(), &context).await else {
        debug!("No synthesis for case {case_id}");
        return Ok(());
    };

    let patch = NodeData(
        json!({
            "case_narrative": synthesis.narrative,
            "origin_analysis": synthesis.origin_analysis,
            "spread_map": synthesis.spread_map,
            "confidence_score": synthesis.confidence_score,
            "recommended_action": synthesis.recommended_action,
        })
        .as_object()
        .cloned()
        .unwrap_or_default(),
    );
    for report in ctx.graph.nodes_of_kind(case_id, NodeKind::Report) {
        ctx.graph.update_node(&report.id, patch.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ServiceHub, TextCompletion};
    use crate::state::{GraphStore, StreamFanout};
    use anyhow::Result;
    use async_trait::async_trait;
    use caseboard_core::MutationRecord;

    struct CannedSynthesis;

    #[async_trait]
    impl TextCompletion for CannedSynthesis {
        async fn complete(&self, _prompt: &str, _purpose: &str) -> Result<Option<String>> {
            Ok(Some(
                "{\"narrative\": \"single rumor, one origin\", \
                 \"origin_analysis\": \"started at the library\", \
                 \"confidence_score\": 0.7, \
                 \"recommended_action\": \"monitor\"}"
                    .to_string(),
            ))
        }
    }

    fn payload(ctx: &SourceContext) -> TriggerPayload {
        let node = ctx.graph.get_node("R-1").unwrap();
        TriggerPayload {
            event_type: "update:report".into(),
            case_id: "C1".into(),
            record: MutationRecord::UpdateNode {
                node_id: "R-1".into(),
                merged_data: NodeData::new(),
                node,
            },
        }
    }

    #[tokio::test]
    async fn test_synthesis_lands_on_reports() {
        let fanout = Arc::new(StreamFanout::new(64));
        let mut services = ServiceHub::disabled();
        services.ai = Arc::new(CannedSynthesis);
        let ctx = Arc::new(SourceContext {
            graph: Arc::new(GraphStore::new(fanout)),
            services,
        });
        ctx.graph
            .add_node(NodeKind::Report, "C1", NodeData::new(), Some("R-1".into()))
            .unwrap();

        run(ctx.clone(), payload(&ctx)).await.unwrap();

        let report = ctx.graph.get_node("R-1").unwrap();
        assert_eq!(
            report.data.get("case_narrative").and_then(|v| v.as_str()),
            Some("single rumor, one origin")
        );
        assert_eq!(
            report.data.get("confidence_score").and_then(|v| v.as_f64()),
            Some(0.7)
        );
    }

    #[tokio::test]
    async fn test_ai_failure_leaves_graph_untouched() {
        let fanout = Arc::new(StreamFanout::new(64));
        let ctx = Arc::new(SourceContext {
            graph: Arc::new(GraphStore::new(fanout)),
            services: ServiceHub::disabled(),
        });
        ctx.graph
            .add_node(NodeKind::Report, "C1", NodeData::new(), Some("R-1".into()))
            .unwrap();

        run(ctx.clone(), payload(&ctx)).await.unwrap();
        assert!(ctx
            .graph
            .get_node("R-1")
            .unwrap()
            .data
            .get("case_narrative")
            .is_none());
    }
}
