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

//! Thin HTTP/WS glue over the engine. Everything interesting happens in
//! the graph store and the controller; these handlers decode, delegate and
//! encode.

pub mod alerts;
pub mod cases;
pub mod health;
pub mod realtime;
pub mod reports;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use caseboard_core::{Alert, GraphError};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::controller::BlackboardController;
use crate::event_bus::EventBus;
use crate::services::ServiceHub;
use crate::state::{GraphStore, StreamFanout};

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<GraphStore>,
    pub controller: Arc<BlackboardController>,
    pub bus: Arc<EventBus>,
    pub fanout: Arc<StreamFanout>,
    pub services: ServiceHub,
    pub config: Arc<ServerConfig>,
    pub alerts: Arc<RwLock<Vec<Alert>>>,
    pub alert_audio: Arc<DashMap<String, Vec<u8>>>,
}

/// Uniform error envelope. Invalid mutations surface as 400s; everything
/// else is a 404 or a 500.
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownNode { .. } => ApiError::NotFound(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/report", post(reports::submit_report))
        .route("/api/reports", get(reports::list_reports))
        .route("/api/cases", get(cases::list_cases))
        .route("/api/cases/:case_id", get(cases::get_case))
        .route("/api/cases/:case_id/metadata", post(cases::set_case_metadata))
        .route("/api/cases/:case_id/edges", post(cases::create_edge))
        .route("/api/cases/:case_id/evidence", post(cases::add_evidence))
        .route("/api/nodes/:node_id", delete(cases::delete_node))
        .route("/api/alerts", get(alerts::list_alerts))
        .route("/api/alerts/draft", post(alerts::draft_alert))
        .route("/api/alerts/approve", post(alerts::approve_alert))
        .route("/api/alerts/:alert_id/audio", get(alerts::get_alert_audio))
        .route("/ws/caseboard", get(realtime::ws_caseboard))
        .route("/ws/alerts", get(realtime::ws_alerts))
        .with_state(state)
}
