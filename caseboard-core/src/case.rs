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

//! Case summaries and snapshots, assembled from the nodes and edges that
//! share a `case_id`. A case is implicit; the only stored extras are the
//! optional officer-supplied metadata overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{GraphEdge, GraphNode, NodeKind};

const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Officer/seed-supplied overrides for a case's derived presentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CaseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per-case listing row: counts plus derived presentation fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseSummary {
    pub case_id: String,
    pub label: String,
    pub status: String,
    pub report_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub updated_at: DateTime<Utc>,
    pub summary: String,
    pub location: String,
    pub story: String,
}

/// Full case snapshot: derived presentation plus every node and edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseSnapshot {
    pub case_id: String,
    pub label: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub summary: String,
    pub location: String,
    pub story: String,
    pub node_count: usize,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Presentation fields derived from a case's report nodes.
struct Derived {
    updated_at: Option<DateTime<Utc>>,
    summary: String,
    location: String,
    story: String,
}

fn derive(nodes: &[GraphNode]) -> Derived {
    let mut updated_at = None;
    let mut summary = String::new();
    let mut location = UNKNOWN_LOCATION.to_string();
    let mut story_parts: Vec<String> = Vec::new();

    for node in nodes {
        if updated_at.map(|u| node.created_at > u).unwrap_or(true) {
            updated_at = Some(node.created_at);
        }
        if node.kind != NodeKind::Report {
            continue;
        }
        let text = node.data.text_body().unwrap_or_default();
        if !text.is_empty() && summary.is_empty() {
            summary = if text.len() > 200 {
                let cut = text
                    .char_indices()
                    .take_while(|(i, _)| *i < 200)
                    .last()
                    .map(|(i, c)| i + c.len_utf8())
                    .unwrap_or(text.len());
                format!("{}...", &text[..cut])
            } else {
                text.to_string()
            };
        }
        if location == UNKNOWN_LOCATION {
            if let Some(loc) = node.data.location() {
                if let Some(building) = loc.building.filter(|b| !b.is_empty()) {
                    location = building;
                }
            }
        }
        if !text.is_empty() {
            match node.data.get("timestamp").and_then(|v| v.as_str()) {
                Some(ts) => story_parts.push(format!("Report ({ts}): {text}")),
                None => story_parts.push(text.to_string()),
            }
        }
    }

    Derived {
        updated_at,
        summary,
        location,
        story: story_parts.join("\n\n"),
    }
}

fn apply_overrides(
    metadata: Option<&CaseMetadata>,
    label: &mut String,
    status: &mut String,
    location: &mut String,
    summary: &mut String,
    story: &mut String,
    updated_at: &mut DateTime<Utc>,
) {
    let Some(meta) = metadata else { return };
    if let Some(l) = meta.label.as_ref().filter(|l| !l.is_empty()) {
        *label = l.clone();
    }
    if let Some(s) = meta.status.as_ref().filter(|s| !s.is_empty()) {
        *status = s.clone();
    }
    if location == UNKNOWN_LOCATION {
        if let Some(l) = meta.location.as_ref().filter(|l| !l.is_empty()) {
            *location = l.clone();
        }
    }
    if summary.is_empty() {
        if let Some(s) = meta.summary.as_ref().filter(|s| !s.is_empty()) {
            *summary = s.clone();
        }
    }
    if story.is_empty() {
        if let Some(s) = meta.story.as_ref().filter(|s| !s.is_empty()) {
            *story = s.clone();
        }
    }
    if let Some(u) = meta.updated_at {
        *updated_at = u;
    }
}

impl CaseSnapshot {
    /// Assemble a snapshot from a case's nodes and edges plus optional
    /// metadata overrides. Returns `None` when the case has no content.
    pub fn assemble(
        case_id: &str,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
        metadata: Option<&CaseMetadata>,
    ) -> Option<Self> {
        if nodes.is_empty() && edges.is_empty() {
            return None;
        }
        let derived = derive(&nodes);
        let mut label = case_id.to_string();
        let mut status = "active".to_string();
        let mut location = derived.location;
        let mut summary = derived.summary;
        let mut story = derived.story;
        let mut updated_at = derived.updated_at.unwrap_or_else(Utc::now);
        apply_overrides(
            metadata,
            &mut label,
            &mut status,
            &mut location,
            &mut summary,
            &mut story,
            &mut updated_at,
        );
        Some(Self {
            case_id: case_id.to_string(),
            label,
            status,
            updated_at,
            summary,
            location,
            story,
            node_count: nodes.len(),
            nodes,
            edges,
        })
    }
}

impl CaseSummary {
    /// Listing row from the same inputs as a snapshot, plus the report
    /// index length.
    pub fn assemble(
        case_id: &str,
        nodes: &[GraphNode],
        edge_count: usize,
        report_count: usize,
        metadata: Option<&CaseMetadata>,
    ) -> Self {
        let derived = derive(nodes);
        let mut label = case_id.to_string();
        let mut status = "active".to_string();
        let mut location = derived.location;
        let mut summary = derived.summary;
        let mut story = derived.story;
        let mut updated_at = derived.updated_at.unwrap_or_else(Utc::now);
        apply_overrides(
            metadata,
            &mut label,
            &mut status,
            &mut location,
            &mut summary,
            &mut story,
            &mut updated_at,
        );
        Self {
            case_id: case_id.to_string(),
            label,
            status,
            report_count,
            node_count: nodes.len(),
            edge_count,
            updated_at,
            summary,
            location,
            story,
        }
    }
}

/// Case urgency derived from the highest report urgency.
pub fn case_urgency(nodes: &[GraphNode]) -> &'static str {
    let max = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Report)
        .filter_map(|n| n.data.urgency())
        .fold(None::<f64>, |acc, u| Some(acc.map_or(u, |a| a.max(u))));
    match max {
        None => "unknown",
        Some(u) if u >= 0.8 => "high",
        Some(u) if u >= 0.5 => "medium",
        Some(_) => "low",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeData;
    use serde_json::json;

    fn node(id: &str, kind: NodeKind, data: serde_json::Value) -> GraphNode {
        GraphNode {
            id: id.into(),
            kind,
            case_id: "C1".into(),
            data: NodeData(data.as_object().cloned().unwrap_or_default()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_empty_case_is_none() {
        assert!(CaseSnapshot::assemble("C1", vec![], vec![], None).is_none());
    }

    #[test]
    fn test_snapshot_derives_summary_and_location() {
        let n = node(
            "R-1",
            NodeKind::Report,
            json!({
                "text_body": "fire alarm at the library",
                "timestamp": "2025-03-01T12:00:00Z",
                "location": {"lat": 35.78, "lng": -78.68, "building": "Hunt Library"}
            }),
        );
        let snap = CaseSnapshot::assemble("C1", vec![n], vec![], None).unwrap();
        assert_eq!(snap.summary, "fire alarm at the library");
        assert_eq!(snap.location, "Hunt Library");
        assert!(snap.story.contains("Report (2025-03-01T12:00:00Z)"));
        assert_eq!(snap.node_count, 1);
    }

    #[test]
    fn test_metadata_overrides_win() {
        let n = node("R-1", NodeKind::Report, json!({"text_body": "alarm"}));
        let meta = CaseMetadata {
            label: Some("Library Fire Rumor".into()),
            status: Some("resolved".into()),
            ..Default::default()
        };
        let snap = CaseSnapshot::assemble("C1", vec![n], vec![], Some(&meta)).unwrap();
        assert_eq!(snap.label, "Library Fire Rumor");
        assert_eq!(snap.status, "resolved");
        // Derived summary survives because the override had none.
        assert_eq!(snap.summary, "alarm");
    }

    #[test]
    fn test_case_urgency_thresholds() {
        assert_eq!(case_urgency(&[]), "unknown");
        let low = node("R-1", NodeKind::Report, json!({"urgency": 0.2}));
        let med = node("R-2", NodeKind::Report, json!({"urgency": 0.6}));
        let high = node("R-3", NodeKind::Report, json!({"urgency": 0.9}));
        assert_eq!(case_urgency(std::slice::from_ref(&low)), "low");
        assert_eq!(case_urgency(&[low.clone(), med.clone()]), "medium");
        assert_eq!(case_urgency(&[low, med, high]), "high");
    }
}
