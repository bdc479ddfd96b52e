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

//! Debunk propagation - recount `debunked_by` edges per report whenever one
//! appears, and record the count on the report node.

use caseboard_core::{EdgeKind, NodeData, NodeKind};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::controller::TriggerPayload;
use crate::sources::SourceContext;

pub async fn run(ctx: Arc<SourceContext>, payload: TriggerPayload) -> anyhow::Result<()> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for edge in ctx.graph.edges_for_case(&payload.case_id) {
        if edge.kind == EdgeKind::DebunkedBy {
            *counts.entry(edge.source_id).or_insert(0) += 1;
        }
    }

    for (node_id, count) in counts {
        let Some(node) = ctx.graph.get_node(&node_id) else {
            continue;
        };
        if node.kind != NodeKind::Report || node.data.debunk_count() == Some(count) {
            continue;
        }
        ctx.graph.update_node(
            &node_id,
            NodeData(
                json!({"debunk_count": count})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
        )?;
    }
    Ok(())
}
