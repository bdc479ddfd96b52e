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

//! ElevenLabs-style text-to-speech adapter. Null on any failure.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::SpeechSynthesis;

const BASE_URL: &str = "https://api.elevenlabs.io/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
}

impl ElevenLabsTts {
    pub fn new(api_key: String, voice_id: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            voice_id,
        }
    }
}

#[async_trait]
impl SpeechSynthesis for ElevenLabsTts {
    async fn tts(&self, text: &str) -> Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .post(format!("{BASE_URL}/text-to-speech/{}", self.voice_id))
            .header("xi-api-key", &self.api_key)
            .json(&json!({"text": text}))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Speech synthesis failed: {e}");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            warn!("Speech synthesis returned {}", response.status());
            return Ok(None);
        }
        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes.to_vec())),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("Speech synthesis body unreadable: {e}");
                Ok(None)
            }
        }
    }
}
