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

//! Graph node/edge types and mutation records.
//!
//! Node `data` is intrinsically schemaless (different node kinds carry
//! different fields), so it is stored as a JSON object with typed accessors
//! for the fields the engine actually reads. Merging a patch preserves
//! unspecified keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node kinds in the incident graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Report,
    ExternalSource,
    FactCheck,
    MediaVariant,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Report => "report",
            NodeKind::ExternalSource => "external_source",
            NodeKind::FactCheck => "fact_check",
            NodeKind::MediaVariant => "media_variant",
        }
    }

    /// Id prefix for nodes of this kind (`R-…`, `E-…`, `F-…`, `M-…`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            NodeKind::Report => "R",
            NodeKind::ExternalSource => "E",
            NodeKind::FactCheck => "F",
            NodeKind::MediaVariant => "M",
        }
    }
}

/// Edge kinds in the incident graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    SimilarTo,
    RepostOf,
    MutationOf,
    DebunkedBy,
    AmplifiedBy,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::SimilarTo => "similar_to",
            EdgeKind::RepostOf => "repost_of",
            EdgeKind::MutationOf => "mutation_of",
            EdgeKind::DebunkedBy => "debunked_by",
            EdgeKind::AmplifiedBy => "amplified_by",
        }
    }
}

/// Semantic role assigned to report nodes by the classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    /// Earliest report in the case timeline.
    Originator,
    /// Connected to earlier media via a repost edge.
    Amplifier,
    /// Connected to earlier media via a mutation edge.
    Mutator,
    /// No outgoing edges to external sources or fact checks.
    UnwittingSharer,
}

impl SemanticRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticRole::Originator => "originator",
            SemanticRole::Amplifier => "amplifier",
            SemanticRole::Mutator => "mutator",
            SemanticRole::UnwittingSharer => "unwitting_sharer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "originator" => Some(SemanticRole::Originator),
            "amplifier" => Some(SemanticRole::Amplifier),
            "mutator" => Some(SemanticRole::Mutator),
            "unwitting_sharer" => Some(SemanticRole::UnwittingSharer),
            _ => None,
        }
    }
}

/// A latitude/longitude point, optionally with a building label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
}

/// A claim extracted from a report's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Free-form node payload with typed accessors for the fields the engine
/// reads. All other keys pass through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct NodeData(pub Map<String, Value>);

impl NodeData {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: keys in `patch` overwrite, all other keys survive.
    pub fn merge(&mut self, patch: &NodeData) {
        for (k, v) in &patch.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn text_body(&self) -> Option<&str> {
        self.str_field("text_body")
    }

    pub fn media_url(&self) -> Option<&str> {
        self.str_field("media_url").filter(|s| !s.is_empty())
    }

    pub fn search_query(&self) -> Option<&str> {
        self.str_field("search_query")
    }

    /// ISO-8601 timestamp, tolerant of a trailing `Z`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.str_field("timestamp")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn location(&self) -> Option<GeoPoint> {
        self.0
            .get("location")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.0
            .get("claims")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn has_claims(&self) -> bool {
        self.0
            .get("claims")
            .and_then(Value::as_array)
            .map(|a| !a.is_empty())
            .unwrap_or(false)
    }

    /// 64-bit perceptual hash stored as a hex string.
    pub fn phash(&self) -> Option<u64> {
        self.str_field("phash")
            .and_then(|s| u64::from_str_radix(s, 16).ok())
    }

    pub fn urgency(&self) -> Option<f64> {
        self.0.get("urgency").and_then(Value::as_f64)
    }

    pub fn debunk_count(&self) -> Option<u64> {
        self.0.get("debunk_count").and_then(Value::as_u64)
    }

    pub fn semantic_role(&self) -> Option<SemanticRole> {
        self.str_field("semantic_role").and_then(SemanticRole::parse)
    }
}

impl From<Map<String, Value>> for NodeData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A node in the incident graph. Created by a mutation, mutated in place by
/// merge patches, never deleted by the reactive engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub case_id: String,
    #[serde(default)]
    pub data: NodeData,
    pub created_at: DateTime<Utc>,
}

/// A directed edge in the incident graph. Created once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: String,
    pub kind: EdgeKind,
    pub source_id: String,
    pub target_id: String,
    pub case_id: String,
    #[serde(default)]
    pub data: NodeData,
    pub created_at: DateTime<Utc>,
}

/// A tagged description of a graph change, produced atomically with every
/// mutation and delivered first to caseboard subscribers, then to the
/// blackboard controller.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MutationRecord {
    AddNode {
        node: GraphNode,
    },
    AddEdge {
        edge: GraphEdge,
    },
    UpdateNode {
        node_id: String,
        merged_data: NodeData,
        node: GraphNode,
    },
}

impl MutationRecord {
    /// Trigger event type derived from the record: `node:{kind}`,
    /// `edge:{kind}` or `update:{kind}`.
    pub fn event_type(&self) -> String {
        match self {
            MutationRecord::AddNode { node } => format!("node:{}", node.kind.as_str()),
            MutationRecord::AddEdge { edge } => format!("edge:{}", edge.kind.as_str()),
            MutationRecord::UpdateNode { node, .. } => format!("update:{}", node.kind.as_str()),
        }
    }

    pub fn case_id(&self) -> &str {
        match self {
            MutationRecord::AddNode { node } => &node.case_id,
            MutationRecord::AddEdge { edge } => &edge.case_id,
            MutationRecord::UpdateNode { node, .. } => &node.case_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            MutationRecord::AddNode { .. } => "add_node",
            MutationRecord::AddEdge { .. } => "add_edge",
            MutationRecord::UpdateNode { .. } => "update_node",
        }
    }

    /// Full post-mutation representation delivered to subscribers.
    pub fn payload(&self) -> Value {
        match self {
            MutationRecord::AddNode { node } => serde_json::to_value(node).unwrap_or(Value::Null),
            MutationRecord::AddEdge { edge } => serde_json::to_value(edge).unwrap_or(Value::Null),
            MutationRecord::UpdateNode { node, .. } => {
                serde_json::to_value(node).unwrap_or(Value::Null)
            }
        }
    }

    /// The node the record is about, when it is about one.
    pub fn node(&self) -> Option<&GraphNode> {
        match self {
            MutationRecord::AddNode { node } => Some(node),
            MutationRecord::UpdateNode { node, .. } => Some(node),
            MutationRecord::AddEdge { .. } => None,
        }
    }

    pub fn edge(&self) -> Option<&GraphEdge> {
        match self {
            MutationRecord::AddEdge { edge } => Some(edge),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_node(data: Value) -> GraphNode {
        GraphNode {
            id: "R-1".into(),
            kind: NodeKind::Report,
            case_id: "C1".into(),
            data: NodeData(data.as_object().cloned().unwrap_or_default()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_preserves_unrelated_keys() {
        let mut data = NodeData(
            json!({"text_body": "alarm", "urgency": 0.7})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let patch = NodeData(json!({"urgency": 0.9}).as_object().cloned().unwrap());
        data.merge(&patch);

        assert_eq!(data.text_body(), Some("alarm"));
        assert_eq!(data.urgency(), Some(0.9));
    }

    #[test]
    fn test_timestamp_parses_zulu_suffix() {
        let data = NodeData(
            json!({"timestamp": "2025-03-01T12:00:00Z"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let ts = data.timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_phash_round_trips_hex() {
        let data = NodeData(json!({"phash": "a1b2c3d4e5f60789"}).as_object().cloned().unwrap());
        assert_eq!(data.phash(), Some(0xa1b2c3d4e5f60789));
    }

    #[test]
    fn test_event_type_derivation() {
        let node = report_node(json!({}));
        let record = MutationRecord::AddNode { node: node.clone() };
        assert_eq!(record.event_type(), "node:report");
        assert_eq!(record.action(), "add_node");

        let edge = GraphEdge {
            id: "EDGE-1".into(),
            kind: EdgeKind::SimilarTo,
            source_id: "R-1".into(),
            target_id: "R-2".into(),
            case_id: "C1".into(),
            data: NodeData::new(),
            created_at: Utc::now(),
        };
        let record = MutationRecord::AddEdge { edge };
        assert_eq!(record.event_type(), "edge:similar_to");
        assert_eq!(record.case_id(), "C1");

        let record = MutationRecord::UpdateNode {
            node_id: node.id.clone(),
            merged_data: NodeData::new(),
            node,
        };
        assert_eq!(record.event_type(), "update:report");
    }

    #[test]
    fn test_claims_accessor_tolerates_missing_field() {
        let data = NodeData::new();
        assert!(data.claims().is_empty());
        assert!(!data.has_claims());

        let data = NodeData(
            json!({"claims": [{"statement": "fire in library"}]})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(data.has_claims());
        assert_eq!(data.claims()[0].statement, "fire in library");
    }
}
