//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::knowledge::DEFAULT_LEVEL_THRESHOLDS;

/// AI provider kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Claude,
}

/// Configuration for the student reply generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Provider to use (gemini or claude).
    #[serde(default)]
    pub provider: ProviderKind,
    /// Model that voices the student.
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Base URL for the API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable name for the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_permissive: true,
        }
    }
}

/// Database location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the `SQLite` file. Falls back to the platform data directory.
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Resolved database path.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::store::default_database_path)
    }
}

/// Teaching session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    /// Seconds to wait for the student's reply before falling back.
    pub generation_timeout_secs: u64,
    /// Most recent transcript messages included in the prompt.
    pub history_messages: usize,
    /// Character budget for the transcript in the prompt.
    pub history_chars: usize,
    /// Cumulative XP required per level, indexed by level.
    pub level_thresholds: Vec<u64>,
}

impl TutorConfig {
    /// Generation timeout as a [`Duration`].
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: 45,
            history_messages: 20,
            history_chars: 6000,
            level_thresholds: DEFAULT_LEVEL_THRESHOLDS.to_vec(),
        }
    }
}

/// Limits on teaching turns per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of the fixed window in seconds.
    pub window_secs: u64,
    /// Turns allowed per agent per window.
    pub max_turns: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_turns: 20,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub ai: AiConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tutor: TutorConfig,
    pub rate_limit: RateLimitConfig,
}
