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

//! The authoritative in-process graph: node map, edge list, per-case
//! adjacency and report indexes, case metadata, raw report payloads.
//!
//! Every mutation is atomic behind one mutex and produces exactly one
//! mutation record, delivered while the lock is still held: first to every
//! caseboard subscriber, then to the controller's `notify`. Holding the
//! lock across delivery makes record order identical to delivery order and
//! keeps the controller's dedup/cooldown accounting race-free (both sinks
//! are synchronous and never call back into the store).
//!
//! Values handed out are clones; no reference into the store survives a
//! mutation boundary.

use caseboard_core::{
    case, ids, CaseMetadata, CaseSnapshot, CaseSummary, EdgeKind, GraphEdge, GraphError,
    GraphNode, MutationRecord, NodeData, NodeKind,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::controller::BlackboardController;
use crate::state::fanout::{StreamFanout, StreamMessage, SubscriberId};
use tokio::sync::mpsc;

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<String, GraphNode>,
    node_order: Vec<String>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<String, usize>,
    /// node_id -> incident edge ids (both directions).
    adjacency: HashMap<String, Vec<String>>,
    /// case_id -> report ids, append-only in insertion order.
    case_reports: HashMap<String, Vec<String>>,
    report_payloads: HashMap<String, Value>,
    case_metadata: HashMap<String, CaseMetadata>,
    /// Cases in first-seen order, for stable listings.
    case_order: Vec<String>,
}

impl GraphInner {
    fn touch_case(&mut self, case_id: &str) {
        if !self.case_order.iter().any(|c| c == case_id) {
            self.case_order.push(case_id.to_string());
        }
    }

    fn nodes_for_case(&self, case_id: &str) -> Vec<GraphNode> {
        self.node_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.case_id == case_id)
            .cloned()
            .collect()
    }

    fn edges_for_case(&self, case_id: &str) -> Vec<GraphEdge> {
        self.edges
            .iter()
            .filter(|e| e.case_id == case_id)
            .cloned()
            .collect()
    }

    fn snapshot(&self, case_id: &str) -> Option<CaseSnapshot> {
        CaseSnapshot::assemble(
            case_id,
            self.nodes_for_case(case_id),
            self.edges_for_case(case_id),
            self.case_metadata.get(case_id),
        )
    }

    fn all_snapshots(&self) -> Vec<CaseSnapshot> {
        self.case_order
            .iter()
            .filter_map(|case_id| self.snapshot(case_id))
            .collect()
    }
}

pub struct GraphStore {
    inner: Mutex<GraphInner>,
    fanout: Arc<StreamFanout>,
    /// Bound late to break the store <-> controller cycle.
    controller: RwLock<Option<Arc<BlackboardController>>>,
}

impl GraphStore {
    pub fn new(fanout: Arc<StreamFanout>) -> Self {
        Self {
            inner: Mutex::new(GraphInner::default()),
            fanout,
            controller: RwLock::new(None),
        }
    }

    pub fn set_controller(&self, controller: Arc<BlackboardController>) {
        *self.controller.write() = Some(controller);
    }

    /// Deliver a record: caseboard subscribers first, then the controller.
    /// Called with the state lock held; both sinks are synchronous.
    fn deliver(&self, record: &MutationRecord) {
        self.fanout.broadcast_caseboard(StreamMessage::GraphUpdate {
            action: record.action(),
            payload: record.payload(),
            timestamp: Utc::now(),
        });
        if let Some(controller) = self.controller.read().as_ref() {
            controller.notify(&record.event_type(), record);
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn add_node(
        &self,
        kind: NodeKind,
        case_id: &str,
        data: NodeData,
        node_id: Option<String>,
    ) -> Result<GraphNode, GraphError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let id = node_id.unwrap_or_else(|| ids::generate_node_id(kind));
        if inner.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode { id });
        }
        let node = GraphNode {
            id: id.clone(),
            kind,
            case_id: case_id.to_string(),
            data,
            created_at: Utc::now(),
        };
        inner.nodes.insert(id.clone(), node.clone());
        inner.node_order.push(id.clone());
        inner.touch_case(case_id);
        debug!("Created {} node {id} in case {case_id}", kind.as_str());

        self.deliver(&MutationRecord::AddNode { node: node.clone() });
        Ok(node)
    }

    pub fn add_edge(
        &self,
        kind: EdgeKind,
        source_id: &str,
        target_id: &str,
        data: NodeData,
    ) -> Result<GraphEdge, GraphError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let source = inner
            .nodes
            .get(source_id)
            .ok_or_else(|| GraphError::MissingEndpoint {
                id: source_id.to_string(),
            })?;
        let target = inner
            .nodes
            .get(target_id)
            .ok_or_else(|| GraphError::MissingEndpoint {
                id: target_id.to_string(),
            })?;
        if source.case_id != target.case_id {
            return Err(GraphError::CrossCaseEdge {
                source_case: source.case_id.clone(),
                target_case: target.case_id.clone(),
            });
        }
        let edge = GraphEdge {
            id: ids::generate_edge_id(),
            kind,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            case_id: source.case_id.clone(),
            data,
            created_at: Utc::now(),
        };
        let idx = inner.edges.len();
        inner.edge_index.insert(edge.id.clone(), idx);
        inner
            .adjacency
            .entry(source_id.to_string())
            .or_default()
            .push(edge.id.clone());
        inner
            .adjacency
            .entry(target_id.to_string())
            .or_default()
            .push(edge.id.clone());
        inner.edges.push(edge.clone());

        self.deliver(&MutationRecord::AddEdge { edge: edge.clone() });
        Ok(edge)
    }

    /// Shallow-merge `patch` into the node's data. An empty patch changes
    /// nothing but still produces a record; that is observable and
    /// intentional (it lets external logic re-trigger the engine).
    pub fn update_node(&self, node_id: &str, patch: NodeData) -> Result<GraphNode, GraphError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| GraphError::UnknownNode {
                id: node_id.to_string(),
            })?;
        node.data.merge(&patch);
        let node = node.clone();

        self.deliver(&MutationRecord::UpdateNode {
            node_id: node_id.to_string(),
            merged_data: patch,
            node: node.clone(),
        });
        Ok(node)
    }

    /// Cascade delete for the HTTP boundary. Produces no mutation record
    /// and never reaches the controller; the reactive engine only ever
    /// grows the graph.
    pub fn remove_node(&self, node_id: &str) -> Result<usize, GraphError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.nodes.contains_key(node_id) {
            return Err(GraphError::UnknownNode {
                id: node_id.to_string(),
            });
        }
        let removed: Vec<String> = inner
            .edges
            .iter()
            .filter(|e| e.source_id == node_id || e.target_id == node_id)
            .map(|e| e.id.clone())
            .collect();
        inner
            .edges
            .retain(|e| e.source_id != node_id && e.target_id != node_id);
        inner.edge_index.clear();
        for (idx, edge) in inner.edges.iter().enumerate() {
            inner.edge_index.insert(edge.id.clone(), idx);
        }
        inner.adjacency.remove(node_id);
        for incident in inner.adjacency.values_mut() {
            incident.retain(|id| !removed.contains(id));
        }
        for report_ids in inner.case_reports.values_mut() {
            report_ids.retain(|id| id != node_id);
        }
        inner.nodes.remove(node_id);
        inner.node_order.retain(|id| id != node_id);
        info!("Deleted node {node_id} and {} incident edges", removed.len());
        Ok(removed.len())
    }

    /// Append to the per-case report index and stash the raw payload. Does
    /// not create a node; the caller adds the report node first.
    pub fn add_report(&self, case_id: &str, report_id: &str, payload: Value, node_id: &str) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut payload = payload;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("case_id".into(), Value::String(case_id.to_string()));
            obj.insert("report_id".into(), Value::String(report_id.to_string()));
            obj.insert("report_node_id".into(), Value::String(node_id.to_string()));
        }
        inner.touch_case(case_id);
        inner
            .case_reports
            .entry(case_id.to_string())
            .or_default()
            .push(report_id.to_string());
        inner.report_payloads.insert(report_id.to_string(), payload);
    }

    pub fn set_case_metadata(&self, case_id: &str, metadata: CaseMetadata) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.touch_case(case_id);
        inner.case_metadata.insert(case_id.to_string(), metadata);
    }

    // ------------------------------------------------------------------
    // Reads (all return clones)
    // ------------------------------------------------------------------

    pub fn get_node(&self, node_id: &str) -> Option<GraphNode> {
        self.inner.lock().nodes.get(node_id).cloned()
    }

    pub fn get_edge(&self, edge_id: &str) -> Option<GraphEdge> {
        let inner = self.inner.lock();
        inner
            .edge_index
            .get(edge_id)
            .and_then(|&idx| inner.edges.get(idx))
            .cloned()
    }

    pub fn nodes_for_case(&self, case_id: &str) -> Vec<GraphNode> {
        self.inner.lock().nodes_for_case(case_id)
    }

    pub fn nodes_of_kind(&self, case_id: &str, kind: NodeKind) -> Vec<GraphNode> {
        self.inner
            .lock()
            .nodes_for_case(case_id)
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    pub fn edges_for_case(&self, case_id: &str) -> Vec<GraphEdge> {
        self.inner.lock().edges_for_case(case_id)
    }

    /// Incident edges (both directions) via the adjacency index.
    pub fn edges_for_node(&self, node_id: &str) -> Vec<GraphEdge> {
        let inner = self.inner.lock();
        inner
            .adjacency
            .get(node_id)
            .map(|edge_ids| {
                edge_ids
                    .iter()
                    .filter_map(|id| inner.edge_index.get(id))
                    .filter_map(|&idx| inner.edges.get(idx))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Existing external_source node in the case carrying the same search
    /// query, if any. Queries compare on their first 500 bytes.
    pub fn external_source_by_query(&self, case_id: &str, query: &str) -> Option<GraphNode> {
        let clipped = |s: &str| -> String { s.chars().take(500).collect() };
        let wanted = clipped(query);
        let inner = self.inner.lock();
        inner
            .node_order
            .iter()
            .filter_map(|id| inner.nodes.get(id))
            .find(|n| {
                n.case_id == case_id
                    && n.kind == NodeKind::ExternalSource
                    && clipped(n.data.search_query().unwrap_or_default()) == wanted
            })
            .cloned()
    }

    pub fn case_snapshot(&self, case_id: &str) -> Option<CaseSnapshot> {
        self.inner.lock().snapshot(case_id)
    }

    pub fn all_snapshots(&self) -> Vec<CaseSnapshot> {
        self.inner.lock().all_snapshots()
    }

    pub fn all_cases(&self) -> Vec<CaseSummary> {
        let inner = self.inner.lock();
        inner
            .case_order
            .iter()
            .map(|case_id| {
                let nodes = inner.nodes_for_case(case_id);
                let edge_count = inner.edges.iter().filter(|e| &e.case_id == case_id).count();
                let report_count = inner
                    .case_reports
                    .get(case_id)
                    .map(|r| r.len())
                    .unwrap_or(0);
                CaseSummary::assemble(
                    case_id,
                    &nodes,
                    edge_count,
                    report_count,
                    inner.case_metadata.get(case_id),
                )
            })
            .collect()
    }

    pub fn all_reports(&self) -> Vec<Value> {
        let inner = self.inner.lock();
        inner
            .case_order
            .iter()
            .flat_map(|case_id| {
                inner
                    .case_reports
                    .get(case_id)
                    .into_iter()
                    .flatten()
                    .filter_map(|report_id| inner.report_payloads.get(report_id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn report_ids_for_case(&self, case_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .case_reports
            .get(case_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_case_metadata(&self, case_id: &str) -> Option<CaseMetadata> {
        self.inner.lock().case_metadata.get(case_id).cloned()
    }

    pub fn case_urgency(&self, case_id: &str) -> &'static str {
        case::case_urgency(&self.inner.lock().nodes_for_case(case_id))
    }

    /// Register a caseboard subscriber atomically with the mutation stream:
    /// the snapshot is built and queued under the state lock, so no
    /// mutation is missed and none is duplicated.
    pub fn subscribe_caseboard(&self) -> (SubscriberId, mpsc::Receiver<StreamMessage>) {
        let inner = self.inner.lock();
        self.fanout.register_caseboard(inner.all_snapshots())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (Arc<GraphStore>, Arc<StreamFanout>) {
        let fanout = Arc::new(StreamFanout::new(64));
        (Arc::new(GraphStore::new(fanout.clone())), fanout)
    }

    fn data(v: serde_json::Value) -> NodeData {
        NodeData(v.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_duplicate_node_rejected_and_snapshot_unchanged() {
        let (store, _) = store();
        store
            .add_node(NodeKind::Report, "C1", data(json!({})), Some("R-1".into()))
            .unwrap();
        let err = store
            .add_node(NodeKind::Report, "C1", data(json!({})), Some("R-1".into()))
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode { id: "R-1".into() });

        let snap = store.case_snapshot("C1").unwrap();
        assert_eq!(snap.nodes.len(), 1);
        assert!(snap.edges.is_empty());
    }

    #[tokio::test]
    async fn test_cross_case_edge_rejected() {
        let (store, _) = store();
        store
            .add_node(NodeKind::Report, "C1", data(json!({})), Some("R-1".into()))
            .unwrap();
        store
            .add_node(NodeKind::Report, "C2", data(json!({})), Some("R-2".into()))
            .unwrap();
        let err = store
            .add_edge(EdgeKind::SimilarTo, "R-1", "R-2", NodeData::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::CrossCaseEdge { .. }));

        let err = store
            .add_edge(EdgeKind::SimilarTo, "R-1", "R-404", NodeData::new())
            .unwrap_err();
        assert_eq!(err, GraphError::MissingEndpoint { id: "R-404".into() });
    }

    #[tokio::test]
    async fn test_update_merges_and_empty_patch_still_emits() {
        let (store, _) = store();
        let (_, mut rx) = store.subscribe_caseboard();
        store
            .add_node(
                NodeKind::Report,
                "C1",
                data(json!({"text_body": "alarm", "urgency": 0.3})),
                Some("R-1".into()),
            )
            .unwrap();
        store
            .update_node("R-1", data(json!({"urgency": 0.8})))
            .unwrap();
        let node = store.get_node("R-1").unwrap();
        assert_eq!(node.data.text_body(), Some("alarm"));
        assert_eq!(node.data.urgency(), Some(0.8));

        // Empty patch: data untouched, record still delivered.
        store.update_node("R-1", NodeData::new()).unwrap();
        assert_eq!(store.get_node("R-1").unwrap().data, node.data);

        assert!(matches!(rx.recv().await, Some(StreamMessage::Snapshot { .. })));
        let mut actions = Vec::new();
        for _ in 0..3 {
            match rx.recv().await {
                Some(StreamMessage::GraphUpdate { action, .. }) => actions.push(action),
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert_eq!(actions, vec!["add_node", "update_node", "update_node"]);
    }

    #[tokio::test]
    async fn test_report_index_is_append_only_in_order() {
        let (store, _) = store();
        for i in 1..=3 {
            let id = format!("R-{i}");
            store
                .add_node(NodeKind::Report, "C1", data(json!({})), Some(id.clone()))
                .unwrap();
            store.add_report("C1", &id, json!({"text_body": "t"}), &id);
        }
        assert_eq!(store.report_ids_for_case("C1"), vec!["R-1", "R-2", "R-3"]);
        assert_eq!(store.all_reports().len(), 3);
    }

    #[tokio::test]
    async fn test_adjacency_index_serves_incident_edges() {
        let (store, _) = store();
        for id in ["R-1", "R-2", "R-3"] {
            store
                .add_node(NodeKind::Report, "C1", data(json!({})), Some(id.into()))
                .unwrap();
        }
        store
            .add_edge(EdgeKind::SimilarTo, "R-1", "R-2", NodeData::new())
            .unwrap();
        store
            .add_edge(EdgeKind::RepostOf, "R-3", "R-1", NodeData::new())
            .unwrap();

        let incident = store.edges_for_node("R-1");
        assert_eq!(incident.len(), 2);
        assert_eq!(store.edges_for_node("R-2").len(), 1);
    }

    #[tokio::test]
    async fn test_double_subscribe_yields_identical_snapshots() {
        let (store, _) = store();
        store
            .add_node(
                NodeKind::Report,
                "C1",
                data(json!({"text_body": "alarm"})),
                Some("R-1".into()),
            )
            .unwrap();

        let (_, mut rx_a) = store.subscribe_caseboard();
        let (_, mut rx_b) = store.subscribe_caseboard();
        let snap_a = match rx_a.recv().await {
            Some(StreamMessage::Snapshot { payload, .. }) => payload,
            other => panic!("unexpected: {other:?}"),
        };
        let snap_b = match rx_b.recv().await {
            Some(StreamMessage::Snapshot { payload, .. }) => payload,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(snap_a, snap_b);
        assert_eq!(snap_a.len(), 1);
        assert_eq!(snap_a[0].nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_node_cascades_without_record() {
        let (store, _) = store();
        let (_, mut rx) = store.subscribe_caseboard();
        for id in ["R-1", "R-2"] {
            store
                .add_node(NodeKind::Report, "C1", data(json!({})), Some(id.into()))
                .unwrap();
        }
        store
            .add_edge(EdgeKind::SimilarTo, "R-1", "R-2", NodeData::new())
            .unwrap();

        let removed_edges = store.remove_node("R-1").unwrap();
        assert_eq!(removed_edges, 1);
        assert!(store.get_node("R-1").is_none());
        assert!(store.edges_for_node("R-2").is_empty());

        // Snapshot + the three mutations; the delete adds nothing.
        assert!(matches!(rx.recv().await, Some(StreamMessage::Snapshot { .. })));
        for _ in 0..3 {
            assert!(matches!(
                rx.recv().await,
                Some(StreamMessage::GraphUpdate { .. })
            ));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_case_listing_counts() {
        let (store, _) = store();
        store
            .add_node(
                NodeKind::Report,
                "C1",
                data(json!({"text_body": "loud bang near dorms", "urgency": 0.9})),
                Some("R-1".into()),
            )
            .unwrap();
        store.add_report("C1", "R-1", json!({"text_body": "loud bang near dorms"}), "R-1");
        store
            .add_node(NodeKind::FactCheck, "C1", data(json!({})), None)
            .unwrap();

        let cases = store.all_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].case_id, "C1");
        assert_eq!(cases[0].node_count, 2);
        assert_eq!(cases[0].report_count, 1);
        assert_eq!(cases[0].edge_count, 0);
        assert_eq!(store.case_urgency("C1"), "high");
    }
}
