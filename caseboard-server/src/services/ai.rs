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

//! Structured AI calls built on the `TextCompletion` contract: claim
//! extraction, search-query generation, case synthesis, alert composition.
//! Every failure degrades to the documented empty fallback.

use caseboard_core::{Claim, GeoPoint};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::TextCompletion;

/// Claim-analysis result for one report. Defaults are the fallback used
/// when the AI is unavailable or returns garbage.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClaimExtraction {
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default = "default_urgency")]
    pub urgency: f64,
    #[serde(default)]
    pub misinformation_flags: Vec<String>,
    #[serde(default)]
    pub suggested_verifications: Vec<String>,
}

fn default_urgency() -> f64 {
    0.5
}

/// Structured case synthesis.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseSynthesis {
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub origin_analysis: String,
    #[serde(default)]
    pub spread_map: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub recommended_action: String,
}

/// Strip a Markdown code fence if the model wrapped its JSON in one.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(strip_fences(text)).ok()
}

/// Extract claims from a report. Empty extraction on any failure.
pub async fn extract_claims(
    ai: &dyn TextCompletion,
    report_text: &str,
    location: Option<&GeoPoint>,
    timestamp: &str,
) -> ClaimExtraction {
    let location = location
        .map(|l| format!("{}, {}", l.lat, l.lng))
        .unwrap_or_else(|| "unknown".to_string());
    let prompt = format!(
        "Analyze this campus safety report and respond with JSON only: \
         {{\"claims\": [{{\"statement\": str, \"category\": str, \"confidence\": float}}], \
         \"urgency\": float, \"misinformation_flags\": [str], \
         \"suggested_verifications\": [str]}}.\n\n\
         Report: {report_text}\nLocation: {location}\nTimestamp: {timestamp}"
    );
    let Ok(Some(text)) = ai.complete(&prompt, "extract_claims").await else {
        return ClaimExtraction::default();
    };
    parse_json(&text)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Search queries to hunt for the claims elsewhere. Empty on failure.
pub async fn generate_search_queries(ai: &dyn TextCompletion, claims: &[Claim]) -> Vec<String> {
    if claims.is_empty() {
        return Vec::new();
    }
    let statements: Vec<&str> = claims.iter().map(|c| c.statement.as_str()).collect();
    let prompt = format!(
        "Generate up to 3 short web search queries to find other postings of \
         these claims. Respond with a JSON array of strings only.\n\nClaims: {}",
        statements.join("; ")
    );
    let Ok(Some(text)) = ai.complete(&prompt, "search_queries").await else {
        return Vec::new();
    };
    parse_json(&text)
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .map(|queries| {
            queries
                .into_iter()
                .filter(|q| !q.trim().is_empty())
                .take(3)
                .collect()
        })
        .unwrap_or_default()
}

/// Synthesize the case into a structured summary. None on failure.
pub async fn synthesize_case(ai: &dyn TextCompletion, case_context: &str) -> Option<CaseSynthesis> {
    let prompt = format!(
        "All analysis on this case is complete. Synthesize it and respond with \
         JSON only: {{\"narrative\": str, \"origin_analysis\": str, \
         \"spread_map\": str, \"confidence_score\": float, \
         \"recommended_action\": str}}.\n\n{case_context}"
    );
    let text = ai.complete(&prompt, "synthesize_case").await.ok()??;
    let synthesis: CaseSynthesis = parse_json(&text)
        .and_then(|v| serde_json::from_value(v).ok())?;
    if synthesis.narrative.is_empty() {
        debug!("Case synthesis returned no narrative, discarding");
        return None;
    }
    Some(synthesis)
}

/// Draft a public alert from case context. None on failure; the caller
/// substitutes a placeholder.
pub async fn compose_alert(
    ai: &dyn TextCompletion,
    case_context: &str,
    officer_notes: Option<&str>,
) -> Option<String> {
    let mut prompt = format!(
        "Draft a short public campus alert for this case. Plain text only, \
         no preamble.\n\nCase context:\n{case_context}"
    );
    if let Some(notes) = officer_notes {
        prompt.push_str(&format!("\n\nOfficer notes: {notes}"));
    }
    let text = ai.complete(&prompt, "compose_alert").await.ok()??;
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}
