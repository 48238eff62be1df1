//! Engine configuration.
//!
//! Plain value structs with defaults, builder-style setters and optional
//! environment overrides:
//!
//! - `SPARK_FIBER_UNSUPPORTED_TAGS` = `error` | `skip`
//! - `SPARK_FIBER_WARN_DUPLICATE_KEYS` = `0` | `1`
//! - `SPARK_FIBER_FRAME_MS` = milliseconds per scheduler slice

use std::env;
use std::time::Duration;

// =============================================================================
// Reconciler Config
// =============================================================================

/// What begin/complete do with a tag they cannot process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedTagPolicy {
    /// Abort the pass with `ReconcileError::UnsupportedTag`.
    Error,
    /// Log a warning and treat the fiber as a leaf with no output.
    Skip,
}

impl Default for UnsupportedTagPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Error
        } else {
            Self::Skip
        }
    }
}

/// Settings for a reconciliation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub unsupported_tags: UnsupportedTagPolicy,
    /// Warn when siblings share a key.
    pub warn_duplicate_keys: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            unsupported_tags: UnsupportedTagPolicy::default(),
            warn_duplicate_keys: cfg!(debug_assertions),
        }
    }
}

impl ReconcilerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var("SPARK_FIBER_UNSUPPORTED_TAGS") {
            match value.trim().to_ascii_lowercase().as_str() {
                "error" => config.unsupported_tags = UnsupportedTagPolicy::Error,
                "skip" => config.unsupported_tags = UnsupportedTagPolicy::Skip,
                other => tracing::warn!(value = other, "ignoring SPARK_FIBER_UNSUPPORTED_TAGS"),
            }
        }
        if let Some(flag) = env_flag("SPARK_FIBER_WARN_DUPLICATE_KEYS") {
            config.warn_duplicate_keys = flag;
        }
        config
    }

    pub fn with_unsupported_tags(mut self, policy: UnsupportedTagPolicy) -> Self {
        self.unsupported_tags = policy;
        self
    }

    pub fn with_warn_duplicate_keys(mut self, warn: bool) -> Self {
        self.warn_duplicate_keys = warn;
        self
    }
}

// =============================================================================
// Scheduler Config
// =============================================================================

/// Settings for the cooperative scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Length of one slice before the scheduler yields back to the host.
    pub frame_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(5),
        }
    }
}

impl SchedulerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var("SPARK_FIBER_FRAME_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.frame_interval = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %value, "ignoring SPARK_FIBER_FRAME_MS"),
            }
        }
        config
    }

    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
