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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Caseboard Server Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:47200")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all, use specific origins in production)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Tuning knobs for the blackboard orchestration engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Anti-loop cap: maximum tasks enqueued per case over the controller's
    /// lifetime. Must be >= 1.
    #[serde(default = "default_max_triggers_per_case")]
    pub max_triggers_per_case: u32,

    /// Cooldown applied to sources registered without their own.
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: f64,

    /// Wall-time budget for a single knowledge-source invocation.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: f64,

    /// Socket-write budget per frame; a slower subscriber is dropped.
    #[serde(default = "default_fanout_send_timeout_secs")]
    pub fanout_send_timeout_secs: f64,

    /// Number of worker tasks draining the priority queue. Must be >= 1.
    /// The at-most-one (source, case) invariant holds for any value.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Bounded outbound queue per stream subscriber; overflow drops the
    /// subscriber, never the producer.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Optional: reset a case's trigger count once its graph has been
    /// mutation-free for this many seconds. Unset = never reset, so a case
    /// that hits the cap stays quiesced for the lifetime of the run.
    #[serde(default)]
    pub trigger_reset_idle_secs: Option<f64>,
}

/// API keys for the external services the knowledge sources consume. A
/// missing key selects the disabled adapter for that service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServicesConfig {
    /// Text-completion API key (claim extraction, search queries, synthesis)
    pub ai_api_key: Option<String>,

    /// Model name for text completion
    pub ai_model: Option<String>,

    /// Google Fact Check Tools API key
    pub factcheck_api_key: Option<String>,

    /// Media forensics API key (perceptual hash + video search)
    pub media_api_key: Option<String>,

    /// Media forensics API base URL
    pub media_base_url: Option<String>,

    /// Text-to-speech API key (alert audio)
    pub tts_api_key: Option<String>,

    /// Text-to-speech voice id
    pub tts_voice_id: Option<String>,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:47200".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_max_triggers_per_case() -> u32 {
    10
}

fn default_cooldown_secs() -> f64 {
    2.0
}

fn default_handler_timeout_secs() -> f64 {
    30.0
}

fn default_fanout_send_timeout_secs() -> f64 {
    1.0
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_subscriber_buffer() -> usize {
    256
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_triggers_per_case: default_max_triggers_per_case(),
            default_cooldown_secs: default_cooldown_secs(),
            handler_timeout_secs: default_handler_timeout_secs(),
            fanout_send_timeout_secs: default_fanout_send_timeout_secs(),
            worker_concurrency: default_worker_concurrency(),
            subscriber_buffer: default_subscriber_buffer(),
            trigger_reset_idle_secs: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig::default(),
            engine: EngineConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.default_cooldown_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.handler_timeout_secs)
    }

    pub fn fanout_send_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.fanout_send_timeout_secs)
    }

    pub fn trigger_reset_idle(&self) -> Option<Duration> {
        self.trigger_reset_idle_secs.map(Duration::from_secs_f64)
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - CASEBOARD_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:47200)
    /// - CASEBOARD_ENABLE_CORS: Enable CORS (default: true)
    /// - CASEBOARD_MAX_TRIGGERS_PER_CASE: Anti-loop cap (default: 10)
    /// - CASEBOARD_DEFAULT_COOLDOWN_SECS: Default source cooldown (default: 2.0)
    /// - CASEBOARD_HANDLER_TIMEOUT_SECS: Handler timeout (default: 30)
    /// - CASEBOARD_FANOUT_SEND_TIMEOUT_SECS: Slow-subscriber budget (default: 1.0)
    /// - CASEBOARD_WORKER_CONCURRENCY: Controller workers (default: 1)
    /// - CASEBOARD_TRIGGER_RESET_IDLE_SECS: Optional trigger-count reset interval
    /// - CASEBOARD_AI_API_KEY, CASEBOARD_AI_MODEL
    /// - CASEBOARD_FACTCHECK_API_KEY
    /// - CASEBOARD_MEDIA_API_KEY, CASEBOARD_MEDIA_BASE_URL
    /// - CASEBOARD_TTS_API_KEY, CASEBOARD_TTS_VOICE_ID
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CASEBOARD_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(cors) = std::env::var("CASEBOARD_ENABLE_CORS") {
            config.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(cap) = std::env::var("CASEBOARD_MAX_TRIGGERS_PER_CASE") {
            if let Ok(val) = cap.parse() {
                config.engine.max_triggers_per_case = val;
            }
        }

        if let Ok(cooldown) = std::env::var("CASEBOARD_DEFAULT_COOLDOWN_SECS") {
            if let Ok(val) = cooldown.parse() {
                config.engine.default_cooldown_secs = val;
            }
        }

        if let Ok(timeout) = std::env::var("CASEBOARD_HANDLER_TIMEOUT_SECS") {
            if let Ok(val) = timeout.parse() {
                config.engine.handler_timeout_secs = val;
            }
        }

        if let Ok(timeout) = std::env::var("CASEBOARD_FANOUT_SEND_TIMEOUT_SECS") {
            if let Ok(val) = timeout.parse() {
                config.engine.fanout_send_timeout_secs = val;
            }
        }

        if let Ok(workers) = std::env::var("CASEBOARD_WORKER_CONCURRENCY") {
            if let Ok(val) = workers.parse() {
                config.engine.worker_concurrency = val;
            }
        }

        if let Ok(idle) = std::env::var("CASEBOARD_TRIGGER_RESET_IDLE_SECS") {
            if let Ok(val) = idle.parse() {
                config.engine.trigger_reset_idle_secs = Some(val);
            }
        }

        if let Ok(key) = std::env::var("CASEBOARD_AI_API_KEY") {
            config.services.ai_api_key = Some(key);
        }
        if let Ok(model) = std::env::var("CASEBOARD_AI_MODEL") {
            config.services.ai_model = Some(model);
        }
        if let Ok(key) = std::env::var("CASEBOARD_FACTCHECK_API_KEY") {
            config.services.factcheck_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("CASEBOARD_MEDIA_API_KEY") {
            config.services.media_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("CASEBOARD_MEDIA_BASE_URL") {
            config.services.media_base_url = Some(url);
        }
        if let Ok(key) = std::env::var("CASEBOARD_TTS_API_KEY") {
            config.services.tts_api_key = Some(key);
        }
        if let Ok(voice) = std::env::var("CASEBOARD_TTS_VOICE_ID") {
            config.services.tts_voice_id = Some(voice);
        }

        config
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::from_env()
            }
        } else {
            Self::from_env()
        };

        Ok(config)
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration. The server refuses to start on failure.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.engine.max_triggers_per_case < 1 {
            anyhow::bail!("engine.max_triggers_per_case must be >= 1");
        }
        if self.engine.worker_concurrency < 1 {
            anyhow::bail!("engine.worker_concurrency must be >= 1");
        }
        if self.engine.subscriber_buffer < 1 {
            anyhow::bail!("engine.subscriber_buffer must be >= 1");
        }
        for (name, value) in [
            ("default_cooldown_secs", self.engine.default_cooldown_secs),
            ("handler_timeout_secs", self.engine.handler_timeout_secs),
            (
                "fanout_send_timeout_secs",
                self.engine.fanout_send_timeout_secs,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("engine.{name} must be a non-negative number");
            }
        }
        if let Some(idle) = self.engine.trigger_reset_idle_secs {
            if !idle.is_finite() || idle <= 0.0 {
                anyhow::bail!("engine.trigger_reset_idle_secs must be positive when set");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:47200");
        assert_eq!(config.engine.max_triggers_per_case, 10);
        assert_eq!(config.engine.worker_concurrency, 1);
        assert!(config.engine.trigger_reset_idle_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("CASEBOARD_HTTP_ADDR", "0.0.0.0:8080");
        std::env::set_var("CASEBOARD_MAX_TRIGGERS_PER_CASE", "25");

        let config = ServerConfig::from_env();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.engine.max_triggers_per_case, 25);

        std::env::remove_var("CASEBOARD_HTTP_ADDR");
        std::env::remove_var("CASEBOARD_MAX_TRIGGERS_PER_CASE");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.engine.max_triggers_per_case = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.engine.default_cooldown_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server.listen_addr = "not-an-addr".into();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.engine.trigger_reset_idle_secs = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_src = r#"
            [server]
            listen_addr = "127.0.0.1:9000"

            [engine]
            max_triggers_per_case = 5
            worker_concurrency = 2

            [services]
            ai_api_key = "k"
        "#;
        let config: ServerConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.engine.max_triggers_per_case, 5);
        assert_eq!(config.engine.worker_concurrency, 2);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.engine.default_cooldown_secs, 2.0);
        assert_eq!(config.services.ai_api_key.as_deref(), Some("k"));
    }
}
