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

//! External service contracts consumed by the knowledge sources.
//!
//! Each service is a narrow async trait with a reqwest-backed
//! implementation and a disabled implementation selected when its API key
//! is missing. Knowledge sources absorb every failure here and produce
//! best-effort partial output; nothing in this module can stall the
//! controller.

pub mod ai;
pub mod factcheck;
pub mod gemini;
pub mod media;
pub mod tts;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::ServicesConfig;
pub use factcheck::ClaimReview;
pub use media::VideoMatch;

/// AI text completion. `purpose` labels the call for logging.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str, purpose: &str) -> Result<Option<String>>;
}

/// Fact-check claim lookup.
#[async_trait]
pub trait FactCheckLookup: Send + Sync {
    async fn lookup(&self, claim_text: &str) -> Result<Vec<ClaimReview>>;
}

/// Media forensics: 64-bit perceptual hash and video search.
#[async_trait]
pub trait MediaIntel: Send + Sync {
    async fn phash(&self, media_url: &str) -> Result<Option<u64>>;
    async fn video_search(&self, query: &str) -> Result<Vec<VideoMatch>>;
}

/// Text-to-speech. Used only by alert approval.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn tts(&self, text: &str) -> Result<Option<Vec<u8>>>;
}

/// One bundle of every external adapter, shared by the knowledge sources
/// and the alert routes.
#[derive(Clone)]
pub struct ServiceHub {
    pub ai: Arc<dyn TextCompletion>,
    pub factcheck: Arc<dyn FactCheckLookup>,
    pub media: Arc<dyn MediaIntel>,
    pub tts: Arc<dyn SpeechSynthesis>,
}

impl ServiceHub {
    /// Pick an adapter per service: real when its key is configured,
    /// disabled otherwise.
    pub fn from_config(services: &ServicesConfig) -> Self {
        let ai: Arc<dyn TextCompletion> = match &services.ai_api_key {
            Some(key) if !key.is_empty() => Arc::new(gemini::GeminiCompletion::new(
                key.clone(),
                services.ai_model.clone(),
            )),
            _ => {
                info!("AI completion disabled (no api key)");
                Arc::new(Disabled)
            }
        };
        let factcheck: Arc<dyn FactCheckLookup> = match &services.factcheck_api_key {
            Some(key) if !key.is_empty() => {
                Arc::new(factcheck::GoogleFactCheck::new(key.clone()))
            }
            _ => {
                info!("Fact-check lookup disabled (no api key)");
                Arc::new(Disabled)
            }
        };
        let media: Arc<dyn MediaIntel> = match (&services.media_api_key, &services.media_base_url)
        {
            (Some(key), Some(base)) if !key.is_empty() && !base.is_empty() => {
                Arc::new(media::HttpMediaIntel::new(key.clone(), base.clone()))
            }
            _ => {
                info!("Media forensics disabled (no api key or base url)");
                Arc::new(Disabled)
            }
        };
        let tts: Arc<dyn SpeechSynthesis> = match (&services.tts_api_key, &services.tts_voice_id)
        {
            (Some(key), Some(voice)) if !key.is_empty() && !voice.is_empty() => {
                Arc::new(tts::ElevenLabsTts::new(key.clone(), voice.clone()))
            }
            _ => {
                info!("Text-to-speech disabled (no api key or voice id)");
                Arc::new(Disabled)
            }
        };
        Self {
            ai,
            factcheck,
            media,
            tts,
        }
    }

    /// Every service disabled; deterministic for tests.
    pub fn disabled() -> Self {
        Self {
            ai: Arc::new(Disabled),
            factcheck: Arc::new(Disabled),
            media: Arc::new(Disabled),
            tts: Arc::new(Disabled),
        }
    }
}

/// The adapter used when a service has no credentials: every call returns
/// the documented empty fallback.
pub struct Disabled;

#[async_trait]
impl TextCompletion for Disabled {
    async fn complete(&self, _prompt: &str, _purpose: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[async_trait]
impl FactCheckLookup for Disabled {
    async fn lookup(&self, _claim_text: &str) -> Result<Vec<ClaimReview>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl MediaIntel for Disabled {
    async fn phash(&self, _media_url: &str) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn video_search(&self, _query: &str) -> Result<Vec<VideoMatch>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl SpeechSynthesis for Disabled {
    async fn tts(&self, _text: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
