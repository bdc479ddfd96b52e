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

//! Public tip submission and the officer-side report listing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use caseboard_core::{ids, GeoPoint, NodeData, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ReportCreate {
    pub text_body: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default = "default_anonymous")]
    pub anonymous: bool,
    #[serde(default)]
    pub contact: Option<String>,
}

fn default_anonymous() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ReportOut {
    pub case_id: String,
    pub report_id: String,
    pub status: &'static str,
}

/// Public tip submission: assigns a case, creates the report node (the
/// mutation that wakes the engine), indexes the raw payload, and announces
/// the report on the event bus.
pub async fn submit_report(
    State(state): State<AppState>,
    Json(body): Json<ReportCreate>,
) -> Result<(StatusCode, Json<ReportOut>), ApiError> {
    let case_id = ids::generate_case_id();
    let report_id = ids::generate_report_id();
    let timestamp = body.timestamp.unwrap_or_else(Utc::now);

    let report_data = json!({
        "text_body": body.text_body,
        "location": body.location,
        "timestamp": timestamp.to_rfc3339(),
        "media_url": body.media_url,
        "anonymous": body.anonymous,
        "contact": body.contact,
        "status": "processing",
        "created_at": Utc::now().to_rfc3339(),
    });

    let node = state
        .graph
        .add_node(
            NodeKind::Report,
            &case_id,
            NodeData(report_data.as_object().cloned().unwrap_or_default()),
            Some(report_id.clone()),
        )
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    state
        .graph
        .add_report(&case_id, &report_id, report_data, &node.id);

    info!("Report {report_id} accepted into case {case_id}");
    state.bus.emit(
        "ReportReceived",
        json!({
            "case_id": case_id,
            "report_id": report_id,
            "report_node_id": node.id,
        }),
    );

    Ok((
        StatusCode::CREATED,
        Json(ReportOut {
            case_id,
            report_id,
            status: "processing",
        }),
    ))
}

pub async fn list_reports(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(state.graph.all_reports())
}
