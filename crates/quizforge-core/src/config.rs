//! Runtime configuration.
//!
//! Every field has a code-level default so partial YAML files work; the
//! shipped defaults mirror the production pool shapes (small fail-fast
//! privileged pool, larger load-shedding standard pool).
//!
//! | Environment variable | Description |
//! |----------------------|-------------|
//! | `QUIZFORGE_AI_API_KEY` | Generation service API key |
//! | `OPENAI_API_KEY` | Fallback API key |
//! | `QUIZFORGE_AI_BASE_URL` | Generation service base URL |

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{CoreError, CoreResult};

/// Top-level configuration for the execution core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub dispatch: DispatchConfig,
    pub ai: AiConfig,
    pub scoring: ScoringConfig,
}

impl CoreConfig {
    /// Load from a YAML file, falling back to defaults for missing fields.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            CoreError::config(format!("failed to parse config {}: {}", path.display(), e))
        })
    }
}

/// What a pool does with a submission once workers and queue are both
/// exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaturationPolicy {
    /// Reject the submission synchronously; the caller is told immediately.
    Reject,
    /// Accept and drop the task without execution or notification.
    Discard,
}

/// Shape of one worker pool. Immutable after startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub core_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    /// How long an overflow worker lingers without work before exiting.
    pub idle_expiry_secs: u64,
    /// Artificial delay before each task begins executing. A throttling
    /// policy knob, not a correctness requirement; zero disables it.
    pub start_delay_ms: u64,
    pub saturation: SaturationPolicy,
}

impl PoolConfig {
    /// Small fail-fast pool for privileged callers.
    pub fn privileged() -> Self {
        Self {
            core_workers: 5,
            max_workers: 10,
            queue_capacity: 50,
            idle_expiry_secs: 60,
            start_delay_ms: 0,
            saturation: SaturationPolicy::Reject,
        }
    }

    /// Larger load-shedding pool for everyone else.
    pub fn standard() -> Self {
        Self {
            core_workers: 10,
            max_workers: 20,
            queue_capacity: 100,
            idle_expiry_secs: 60,
            start_delay_ms: 10_000,
            saturation: SaturationPolicy::Discard,
        }
    }

    pub fn idle_expiry(&self) -> Duration {
        Duration::from_secs(self.idle_expiry_secs)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Dispatcher configuration: one pool per tier plus the shutdown grace.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    #[serde(default = "PoolConfig::privileged")]
    pub privileged: PoolConfig,
    #[serde(default = "PoolConfig::standard")]
    pub standard: PoolConfig,
    /// How long shutdown waits for in-flight tasks before aborting them.
    pub shutdown_grace_secs: u64,
}

impl DispatchConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            privileged: PoolConfig::privileged(),
            standard: PoolConfig::standard(),
            shutdown_grace_secs: 60,
        }
    }
}

/// Upstream generation service parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl AiConfig {
    /// Defaults, with the base URL and API key taken from the
    /// environment when present.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("QUIZFORGE_AI_BASE_URL") {
            cfg.base_url = url;
        }
        cfg
    }

    /// Resolve the API key: explicit config wins, then environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("QUIZFORGE_AI_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            max_tokens: 2048,
            temperature: 1.0,
        }
    }
}

/// Scoring memoizer parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub cache_max_entries: u64,
    /// Idle expiry for cached results, measured from last access.
    pub cache_idle_secs: u64,
    /// Bounded wait to acquire the per-fingerprint lock.
    pub lock_wait_secs: u64,
    /// Maximum lock hold time before the lock service reclaims it.
    pub lock_lease_secs: u64,
    pub temperature: f32,
}

impl ScoringConfig {
    pub fn cache_idle(&self) -> Duration {
        Duration::from_secs(self.cache_idle_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: 10_000,
            cache_idle_secs: 300,
            lock_wait_secs: 3,
            lock_lease_secs: 15,
            temperature: 1.0,
        }
    }
}
