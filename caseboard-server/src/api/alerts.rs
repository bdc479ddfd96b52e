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

//! Alert drafting and publication. Publication pushes to the alert stream;
//! drafting is AI-assisted with a plain fallback.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use caseboard_core::{ids, Alert, AlertStatus, CaseSnapshot, NodeKind};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::services::ai;

#[derive(Debug, Deserialize)]
pub struct AlertDraftRequest {
    pub case_id: String,
    #[serde(default)]
    pub officer_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AlertDraftResponse {
    pub case_id: String,
    pub draft_text: String,
    pub status: &'static str,
    pub location_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlertApproveRequest {
    pub case_id: String,
    pub final_text: String,
}

fn location_summary(snapshot: &CaseSnapshot) -> Option<String> {
    snapshot
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Report)
        .find_map(|n| n.data.location())
        .map(|loc| {
            loc.building
                .unwrap_or_else(|| format!("{},{}", loc.lat, loc.lng))
        })
}

fn case_context(snapshot: &CaseSnapshot) -> String {
    let mut parts = vec![format!("Case {}", snapshot.case_id)];
    for node in snapshot.nodes.iter().take(10) {
        let digest: String = serde_json::to_string(&node.data)
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        parts.push(format!("- {}: {digest}", node.kind.as_str()));
    }
    parts.join("\n")
}

pub async fn draft_alert(
    State(state): State<AppState>,
    Json(body): Json<AlertDraftRequest>,
) -> Json<AlertDraftResponse> {
    let Some(snapshot) = state.graph.case_snapshot(&body.case_id) else {
        return Json(AlertDraftResponse {
            case_id: body.case_id,
            draft_text: "[Case not found or no data]".into(),
            status: "draft",
            location_summary: None,
        });
    };
    let draft_text = ai::compose_alert(
        state.services.ai.as_ref(),
        &case_context(&snapshot),
        body.officer_notes.as_deref(),
    )
    .await
    .unwrap_or_else(|| format!("Campus advisory for {}: under review.", snapshot.label));

    Json(AlertDraftResponse {
        location_summary: location_summary(&snapshot),
        case_id: body.case_id,
        draft_text,
        status: "draft",
    })
}

/// Publish: optional audio render, then fan out to the alert stream.
pub async fn approve_alert(
    State(state): State<AppState>,
    Json(body): Json<AlertApproveRequest>,
) -> Json<Alert> {
    let alert_id = ids::generate_alert_id();

    let mut audio_url = None;
    if let Ok(Some(audio)) = state.services.tts.tts(&body.final_text).await {
        state.alert_audio.insert(alert_id.clone(), audio);
        audio_url = Some(format!("/api/alerts/{alert_id}/audio"));
    }

    let alert = Alert {
        id: alert_id,
        location_summary: state
            .graph
            .case_snapshot(&body.case_id)
            .as_ref()
            .and_then(location_summary),
        case_id: body.case_id,
        text: body.final_text,
        status: AlertStatus::Published,
        audio_url,
        created_at: Utc::now(),
    };

    state.alerts.write().push(alert.clone());
    state.fanout.publish_alert(alert.clone());
    info!("Alert {} published for case {}", alert.id, alert.case_id);
    Json(alert)
}

pub async fn list_alerts(State(state): State<AppState>) -> Json<Vec<Alert>> {
    Json(state.alerts.read().clone())
}

pub async fn get_alert_audio(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let audio = state
        .alert_audio
        .get(&alert_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ApiError::NotFound(format!("no audio for alert {alert_id}")))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/mpeg")],
        audio,
    ))
}
