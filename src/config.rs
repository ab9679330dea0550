use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// Overrides the default automations database location
    pub db_path: Option<PathBuf>,
    pub headless: bool,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8766),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            db_path: env::var("AUTOMATION_DB").ok().map(PathBuf::from),
            headless: env::var("HEADLESS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            engine: EngineConfig::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8766,
            host: "127.0.0.1".to_string(),
            db_path: None,
            headless: false,
            engine: EngineConfig::default(),
        }
    }
}

/// Timing and retry knobs for capture and playback.
///
/// All durations are milliseconds so the struct can be loaded from JSON or
/// environment variables without a custom duration format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub input_debounce_ms: u64,
    pub scroll_debounce_ms: u64,
    pub resolve_poll_ms: u64,
    pub visibility_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub navigate_timeout_ms: u64,
    pub max_action_attempts: u32,
    pub retry_delay_ms: u64,
    pub stale_context_retries: u32,
    pub stale_context_delay_ms: u64,
    pub install_attempts: u32,
    pub install_backoff_ms: u64,
    pub install_backoff_max_ms: u64,
    pub health_check_ms: u64,
    pub settle_delay_ms: u64,
    pub click_text_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_debounce_ms: 300,
            scroll_debounce_ms: 250,
            resolve_poll_ms: 100,
            visibility_timeout_ms: 5_000,
            action_timeout_ms: 10_000,
            navigate_timeout_ms: 30_000,
            max_action_attempts: 3,
            retry_delay_ms: 500,
            stale_context_retries: 5,
            stale_context_delay_ms: 200,
            install_attempts: 5,
            install_backoff_ms: 100,
            install_backoff_max_ms: 1_600,
            health_check_ms: 2_000,
            settle_delay_ms: 300,
            click_text_limit: 30,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `AUTOMATION_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        override_u64(&mut config.input_debounce_ms, "AUTOMATION_INPUT_DEBOUNCE_MS");
        override_u64(&mut config.scroll_debounce_ms, "AUTOMATION_SCROLL_DEBOUNCE_MS");
        override_u64(&mut config.resolve_poll_ms, "AUTOMATION_RESOLVE_POLL_MS");
        override_u64(&mut config.visibility_timeout_ms, "AUTOMATION_VISIBILITY_TIMEOUT_MS");
        override_u64(&mut config.action_timeout_ms, "AUTOMATION_ACTION_TIMEOUT_MS");
        override_u64(&mut config.navigate_timeout_ms, "AUTOMATION_NAVIGATE_TIMEOUT_MS");
        override_u32(&mut config.max_action_attempts, "AUTOMATION_MAX_ATTEMPTS");
        override_u64(&mut config.retry_delay_ms, "AUTOMATION_RETRY_DELAY_MS");
        override_u32(&mut config.install_attempts, "AUTOMATION_INSTALL_ATTEMPTS");
        override_u64(&mut config.health_check_ms, "AUTOMATION_HEALTH_CHECK_MS");
        override_u64(&mut config.settle_delay_ms, "AUTOMATION_SETTLE_DELAY_MS");
        config
    }

    pub fn input_debounce(&self) -> Duration {
        Duration::from_millis(self.input_debounce_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn resolve_poll(&self) -> Duration {
        Duration::from_millis(self.resolve_poll_ms.max(1))
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn navigate_timeout(&self) -> Duration {
        Duration::from_millis(self.navigate_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stale_context_delay(&self) -> Duration {
        Duration::from_millis(self.stale_context_delay_ms)
    }

    pub fn health_check(&self) -> Duration {
        Duration::from_millis(self.health_check_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn install_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.install_attempts.max(1),
            initial_backoff: Duration::from_millis(self.install_backoff_ms),
            max_backoff: Duration::from_millis(self.install_backoff_max_ms),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay to wait before attempt number `attempt` (1-based). The first
    /// attempt runs immediately.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

fn override_u64(slot: &mut u64, key: &str) {
    if let Some(v) = env::var(key).ok().and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn override_u32(slot: &mut u32, key: &str) {
    if let Some(v) = env::var(key).ok().and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}
