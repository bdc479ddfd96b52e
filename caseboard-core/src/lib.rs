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

//! Caseboard Core - Domain types for the Caseboard incident graph
//!
//! This crate defines the graph vocabulary (nodes, edges, mutation records),
//! case summaries and snapshots, alerts, and id generation shared by the
//! server and any future SDK.

pub mod alert;
pub mod case;
pub mod error;
pub mod graph;
pub mod ids;

pub use alert::{Alert, AlertStatus};
pub use case::{CaseMetadata, CaseSnapshot, CaseSummary};
pub use error::GraphError;
pub use graph::{
    Claim, EdgeKind, GeoPoint, GraphEdge, GraphNode, MutationRecord, NodeData, NodeKind,
    SemanticRole,
};
