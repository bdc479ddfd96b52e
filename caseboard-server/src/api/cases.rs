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

//! Case listing, snapshots, metadata, manual links, boundary deletes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use caseboard_core::{CaseMetadata, CaseSnapshot, CaseSummary, EdgeKind, GraphNode, NodeData, NodeKind};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};

pub async fn list_cases(State(state): State<AppState>) -> Json<Vec<CaseSummary>> {
    Json(state.graph.all_cases())
}

pub async fn get_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> Result<Json<CaseSnapshot>, ApiError> {
    state
        .graph
        .case_snapshot(&case_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("case {case_id} not found")))
}

pub async fn set_case_metadata(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(metadata): Json<CaseMetadata>,
) -> Json<Value> {
    state.graph.set_case_metadata(&case_id, metadata);
    Json(json!({"case_id": case_id, "status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct EdgeCreate {
    pub kind: EdgeKind,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub data: Option<NodeData>,
}

/// Officer-drawn link between two nodes. The mutation takes the normal
/// store path (so it streams and triggers); the bus event is for non-graph
/// listeners such as the audit log.
pub async fn create_edge(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(body): Json<EdgeCreate>,
) -> Result<Json<Value>, ApiError> {
    let edge = state.graph.add_edge(
        body.kind,
        &body.source_id,
        &body.target_id,
        body.data.unwrap_or_default(),
    )?;
    if edge.case_id != case_id {
        // The edge landed in the endpoints' case; report it as such.
        tracing::warn!(
            "Edge {} created in case {} via case {case_id} route",
            edge.id,
            edge.case_id
        );
    }
    state.bus.emit(
        "edge:created",
        json!({
            "edge_id": edge.id,
            "case_id": edge.case_id,
            "kind": edge.kind.as_str(),
        }),
    );
    Ok(Json(serde_json::to_value(&edge).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct EvidenceCreate {
    pub kind: NodeKind,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Officer-uploaded evidence: a plain node insertion into the case graph,
/// streamed and triggered like any other mutation.
pub async fn add_evidence(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(body): Json<EvidenceCreate>,
) -> Result<(StatusCode, Json<GraphNode>), ApiError> {
    let node = state
        .graph
        .add_node(body.kind, &case_id, body.data, body.node_id)?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// Boundary cascade delete; bypasses the reactive engine by design.
pub async fn delete_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted_edges = state.graph.remove_node(&node_id)?;
    Ok(Json(json!({
        "deleted_node": node_id,
        "deleted_edges": deleted_edges,
    })))
}
