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

//! Media forensics adapter: perceptual hashing and video search against a
//! media-intelligence API. Null/empty on any failure.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::MediaIntel;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One video hit for a claim search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoMatch {
    pub source: String,
    pub url: String,
    pub score: f64,
}

pub struct HttpMediaIntel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct PhashResponse {
    phash: Option<String>,
}

#[derive(Deserialize)]
struct VideoSearchResponse {
    #[serde(default)]
    results: Vec<VideoMatch>,
}

impl HttpMediaIntel {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaIntel for HttpMediaIntel {
    async fn phash(&self, media_url: &str) -> Result<Option<u64>> {
        let response = match self
            .client
            .get(format!("{}/v1/phash", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("url", media_url)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Perceptual hash request failed: {e}");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            warn!("Perceptual hash request returned {}", response.status());
            return Ok(None);
        }
        let parsed: PhashResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Perceptual hash response unreadable: {e}");
                return Ok(None);
            }
        };
        Ok(parsed
            .phash
            .and_then(|hex| u64::from_str_radix(&hex, 16).ok()))
    }

    async fn video_search(&self, query: &str) -> Result<Vec<VideoMatch>> {
        let response = match self
            .client
            .get(format!("{}/v1/search", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("query", query)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Video search failed: {e}");
                return Ok(Vec::new());
            }
        };
        if !response.status().is_success() {
            warn!("Video search returned {}", response.status());
            return Ok(Vec::new());
        }
        let parsed: VideoSearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Video search response unreadable: {e}");
                return Ok(Vec::new());
            }
        };
        Ok(parsed.results)
    }
}
