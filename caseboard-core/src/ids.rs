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

//! Noir-themed case id generation plus prefixed random ids for nodes,
//! edges, reports and alerts.

use rand::Rng;

use crate::graph::NodeKind;

const ADJECTIVES: &[&str] = &[
    "Crimson", "Midnight", "Silent", "Shadow", "Obsidian", "Velvet", "Phantom", "Smoke", "Iron",
    "Steel", "Cold", "Deep", "Dark", "Whisper", "Echo", "Ghost",
];

const NOUNS: &[&str] = &[
    "Alibi", "Cipher", "Dossier", "Agent", "Drop", "Signal", "Trace", "File", "Wire", "Source",
    "Asset", "Cover",
];

const HEX: &[u8] = b"0123456789ABCDEF";

fn hex_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| HEX[rng.gen_range(0..HEX.len())] as char).collect()
}

/// `CASE-{ADJECTIVE}-{NOUN}-{4 digits}`.
pub fn generate_case_id() -> String {
    let mut rng = rand::thread_rng();
    let adj = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let digits = rng.gen_range(1000..10000);
    format!("CASE-{adj}-{noun}-{digits}")
}

pub fn generate_report_id() -> String {
    format!("R-{}", hex_suffix(12))
}

pub fn generate_node_id(kind: NodeKind) -> String {
    format!("{}-{}", kind.id_prefix(), hex_suffix(12))
}

pub fn generate_edge_id() -> String {
    format!("EDGE-{}", hex_suffix(12))
}

pub fn generate_alert_id() -> String {
    format!("ALT-{}", hex_suffix(12))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_id_shape() {
        let id = generate_case_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "CASE");
        assert_eq!(parts[3].len(), 4);
    }

    #[test]
    fn test_node_ids_are_kind_prefixed() {
        assert!(generate_node_id(NodeKind::Report).starts_with("R-"));
        assert!(generate_node_id(NodeKind::ExternalSource).starts_with("E-"));
        assert!(generate_node_id(NodeKind::FactCheck).starts_with("F-"));
        assert!(generate_node_id(NodeKind::MediaVariant).starts_with("M-"));
    }

    #[test]
    fn test_ids_are_unique_enough() {
        let a = generate_edge_id();
        let b = generate_edge_id();
        assert_ne!(a, b);
    }
}
