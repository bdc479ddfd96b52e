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

//! Google Fact Check Tools API adapter. Empty list on any failure.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::FactCheckLookup;

const BASE_URL: &str = "https://factchecktools.googleapis.com/v1alpha1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One published review of a claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimReview {
    pub claim_text: String,
    pub rating: String,
    pub reviewer: String,
    pub url: String,
}

pub struct GoogleFactCheck {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    claims: Vec<ApiClaim>,
}

#[derive(Deserialize)]
struct ApiClaim {
    text: Option<String>,
    #[serde(rename = "claimReview", default)]
    claim_review: Vec<ApiReview>,
}

#[derive(Deserialize)]
struct ApiReview {
    #[serde(rename = "textualRating")]
    textual_rating: Option<String>,
    url: Option<String>,
    publisher: Option<ApiPublisher>,
}

#[derive(Deserialize)]
struct ApiPublisher {
    name: Option<String>,
}

impl GoogleFactCheck {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
        }
    }
}

#[async_trait]
impl FactCheckLookup for GoogleFactCheck {
    async fn lookup(&self, claim_text: &str) -> Result<Vec<ClaimReview>> {
        let query: String = claim_text.chars().take(500).collect();
        let response = match self
            .client
            .get(format!("{BASE_URL}/claims:search"))
            .query(&[("query", query.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Fact check lookup failed: {e}");
                return Ok(Vec::new());
            }
        };
        if !response.status().is_success() {
            warn!("Fact check lookup returned {}", response.status());
            return Ok(Vec::new());
        }
        let parsed: SearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Fact check response unreadable: {e}");
                return Ok(Vec::new());
            }
        };
        let reviews = parsed
            .claims
            .into_iter()
            .flat_map(|claim| {
                let text = claim.text.unwrap_or_default();
                claim.claim_review.into_iter().map(move |review| ClaimReview {
                    claim_text: text.clone(),
                    rating: review
                        .textual_rating
                        .unwrap_or_else(|| "unknown".to_string()),
                    reviewer: review
                        .publisher
                        .and_then(|p| p.name)
                        .unwrap_or_else(|| "unknown".to_string()),
                    url: review.url.unwrap_or_default(),
                })
            })
            .collect();
        Ok(reviews)
    }
}
