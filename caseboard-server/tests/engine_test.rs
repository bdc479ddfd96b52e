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

//! End-to-end engine scenarios: drive the graph store the way the HTTP
//! boundary does, let the knowledge sources react, and assert on the
//! quiesced graph. External services are disabled, so the AI contributes
//! nothing and every outcome is deterministic.

use caseboard_core::{EdgeKind, NodeData, NodeKind, SemanticRole};
use caseboard_server::config::ServerConfig;
use caseboard_server::controller::Priority;
use caseboard_server::services::ServiceHub;
use caseboard_server::state::StreamMessage;
use caseboard_server::{build_engine, start_engine, stop_engine, Engine};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUIESCENCE: Duration = Duration::from_secs(5);

fn test_engine(subscriber_buffer: usize) -> Engine {
    let mut config = ServerConfig::default();
    config.engine.subscriber_buffer = subscriber_buffer;
    let engine = build_engine(Arc::new(config), ServiceHub::disabled());
    start_engine(&engine);
    engine
}

fn data(v: Value) -> NodeData {
    NodeData(v.as_object().cloned().unwrap_or_default())
}

async fn quiesce(engine: &Engine) {
    assert!(
        engine.controller.wait_idle(QUIESCENCE).await,
        "engine did not quiesce"
    );
}

#[tokio::test]
async fn test_single_report_no_media() {
    let engine = test_engine(64);
    engine
        .graph
        .add_node(
            NodeKind::Report,
            "C1",
            data(json!({
                "text_body": "alarm at library",
                "timestamp": "2025-03-01T12:00:00Z",
                "location": {"lat": 35.78, "lng": -78.68},
                "claims": []
            })),
            Some("R-1".into()),
        )
        .unwrap();

    quiesce(&engine).await;

    let snapshot = engine.graph.case_snapshot("C1").unwrap();
    assert_eq!(snapshot.nodes.len(), 1);
    assert_eq!(snapshot.nodes[0].id, "R-1");
    assert!(snapshot.edges.is_empty());

    stop_engine(&engine).await;
}

#[tokio::test]
async fn test_two_close_reports_cluster() {
    let engine = test_engine(64);
    engine
        .graph
        .add_node(
            NodeKind::Report,
            "C1",
            data(json!({
                "text_body": "fire alarm hunt library",
                "timestamp": "2025-03-01T12:00:00Z",
                "location": {"lat": 35.7847, "lng": -78.6821}
            })),
            Some("R-1".into()),
        )
        .unwrap();
    quiesce(&engine).await;

    // Clustering ran for the case when R-1 arrived; wait out its cooldown
    // so the second report is eligible to re-trigger it.
    tokio::time::sleep(Duration::from_millis(2100)).await;

    engine
        .graph
        .add_node(
            NodeKind::Report,
            "C1",
            data(json!({
                "text_body": "alarm library hunt",
                "timestamp": "2025-03-01T12:05:00Z",
                "location": {"lat": 35.7848, "lng": -78.6820}
            })),
            Some("R-2".into()),
        )
        .unwrap();
    quiesce(&engine).await;

    let similar: Vec<_> = engine
        .graph
        .edges_for_case("C1")
        .into_iter()
        .filter(|e| e.kind == EdgeKind::SimilarTo)
        .collect();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].source_id, "R-2");
    assert_eq!(similar[0].target_id, "R-1");
    let score = similar[0]
        .data
        .get("score")
        .and_then(Value::as_f64)
        .unwrap();
    assert!(score >= 0.4, "score {score} below threshold");

    stop_engine(&engine).await;
}

#[tokio::test]
async fn test_debunk_propagates() {
    let engine = test_engine(64);
    engine
        .graph
        .add_node(
            NodeKind::Report,
            "C1",
            data(json!({
                "text_body": "chemical spill in lab building",
                "timestamp": "2025-03-01T09:00:00Z"
            })),
            Some("R-1".into()),
        )
        .unwrap();
    quiesce(&engine).await;

    engine
        .graph
        .add_node(
            NodeKind::FactCheck,
            "C1",
            data(json!({"rating": "False", "reviewer": "Campus Desk"})),
            Some("F-1".into()),
        )
        .unwrap();
    engine
        .graph
        .add_edge(EdgeKind::DebunkedBy, "R-1", "F-1", NodeData::new())
        .unwrap();
    quiesce(&engine).await;

    let report = engine.graph.get_node("R-1").unwrap();
    assert_eq!(report.data.debunk_count(), Some(1));
    // The classifier has also assigned a role by now: R-1 is the only
    // report, so it is the originator.
    assert_eq!(report.data.semantic_role(), Some(SemanticRole::Originator));

    stop_engine(&engine).await;
}

#[tokio::test]
async fn test_anti_loop_cap_quiesces_pathological_source() {
    let engine = test_engine(64);
    let cap = engine.config.engine.max_triggers_per_case;
    let provoked = Arc::new(AtomicU32::new(0));

    // Two sources that feed each other: every external_source node one of
    // them adds re-triggers the other, an infinite regress but for the cap.
    for name in ["pathological_a", "pathological_b"] {
        let graph = Arc::clone(&engine.graph);
        let counter = Arc::clone(&provoked);
        engine.controller.register(
            name,
            Priority::Medium,
            &["node:report", "node:external_source"],
            Arc::new(move |payload| {
                let graph = Arc::clone(&graph);
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    graph.add_node(
                        NodeKind::ExternalSource,
                        &payload.case_id,
                        NodeData::new(),
                        None,
                    )?;
                    Ok(())
                })
            }),
            None,
            Some(Duration::ZERO),
        );
    }

    engine
        .graph
        .add_node(
            NodeKind::Report,
            "C-PATH",
            data(json!({"text_body": "rumor mill"})),
            Some("R-1".into()),
        )
        .unwrap();

    quiesce(&engine).await;

    assert!(engine.controller.trigger_count("C-PATH") <= cap);
    assert!(
        provoked.load(Ordering::SeqCst) <= cap,
        "pathological sources ran {} times, cap is {cap}",
        provoked.load(Ordering::SeqCst)
    );

    stop_engine(&engine).await;
}

#[tokio::test]
async fn test_slow_subscriber_is_dropped() {
    // Buffer of 1: a subscriber that never drains fills on its snapshot.
    // The controller stays stopped so the one external mutation is the
    // only traffic; this scenario is about the fan-out alone.
    let mut config = ServerConfig::default();
    config.engine.subscriber_buffer = 1;
    let engine = build_engine(Arc::new(config), ServiceHub::disabled());

    let (_, mut rx_a) = engine.graph.subscribe_caseboard();
    let (_, _rx_b) = engine.graph.subscribe_caseboard();
    assert_eq!(engine.fanout.caseboard_subscriber_count(), 2);

    // A drains its snapshot; B blocks forever (its buffer stays full).
    assert!(matches!(
        rx_a.recv().await,
        Some(StreamMessage::Snapshot { .. })
    ));

    engine
        .graph
        .add_node(NodeKind::Report, "C1", NodeData::new(), Some("R-1".into()))
        .unwrap();

    let timeout = engine.config.engine.fanout_send_timeout();
    let received = tokio::time::timeout(timeout, rx_a.recv())
        .await
        .expect("subscriber A did not receive the update in time")
        .expect("subscriber A channel closed");
    assert!(matches!(received, StreamMessage::GraphUpdate { .. }));
    assert_eq!(engine.fanout.caseboard_subscriber_count(), 1);
}

#[tokio::test]
async fn test_cooldown_runs_source_exactly_once() {
    let engine = test_engine(64);
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    engine.controller.register(
        "cooled",
        Priority::Medium,
        &["node:report"],
        Arc::new(move |_| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }),
        None,
        Some(Duration::from_secs_f64(2.0)),
    );

    engine
        .graph
        .add_node(NodeKind::Report, "C1", NodeData::new(), Some("R-1".into()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine
        .graph
        .add_node(NodeKind::Report, "C1", NodeData::new(), Some("R-2".into()))
        .unwrap();
    quiesce(&engine).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    stop_engine(&engine).await;
}

#[tokio::test]
async fn test_mutation_stream_orders_snapshot_then_updates() {
    let engine = test_engine(64);
    let (_, mut rx) = engine.graph.subscribe_caseboard();

    engine
        .graph
        .add_node(
            NodeKind::Report,
            "C1",
            data(json!({"text_body": "two sightings"})),
            Some("R-1".into()),
        )
        .unwrap();
    quiesce(&engine).await;

    assert!(matches!(
        rx.recv().await,
        Some(StreamMessage::Snapshot { .. })
    ));
    // First mutation after the snapshot is the report itself; whatever the
    // sources emitted afterwards arrives in mutation order.
    match rx.recv().await {
        Some(StreamMessage::GraphUpdate { action, payload, .. }) => {
            assert_eq!(action, "add_node");
            assert_eq!(payload.get("id").and_then(Value::as_str), Some("R-1"));
        }
        other => panic!("expected the report mutation, got {other:?}"),
    }

    stop_engine(&engine).await;
}
