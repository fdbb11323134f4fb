use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

/// Default number of fill iterations per batch cycle.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default wall-clock budget of a fill phase.
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 1000;

/// Env var selecting the active profile.
pub const PROFILE_KEY: &str = "BATCHLINE_PROFILE";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Active profile from `BATCHLINE_PROFILE`, upper-cased (empty = default).
pub fn active_profile() -> String {
    env_opt(PROFILE_KEY).unwrap_or_default().to_uppercase()
}

/// Read a profiled key: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_opt(lookup: &dyn Fn(&str) -> Option<String>, profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = lookup(&prefixed).filter(|s| !s.is_empty()) {
            return Some(v);
        }
    }
    lookup(key).filter(|s| !s.is_empty())
}

fn profiled_parse<T: FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    profile: &str,
    key: &str,
) -> Option<T> {
    let raw = profiled_opt(lookup, profile, key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}

// ── Batch settings ────────────────────────────────────────────

/// Raw batch limits as they appear in env vars and config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Maximum number of fill iterations per cycle.
    pub batch_size: usize,
    /// Content cap checked before `batch_size`. Zero disables it.
    pub out_batch_size: usize,
    /// Wall-clock budget of one fill phase, in milliseconds.
    pub batch_timeout_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            out_batch_size: 0,
            batch_timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
        }
    }
}

impl BatchSettings {
    /// Build settings from environment variables (call `load_dotenv()` first).
    ///
    /// Reads `BATCH_SIZE`, `BATCH_OUT_SIZE` and `BATCH_TIMEOUT_MS`. When
    /// `BATCHLINE_PROFILE` is set (e.g. `PROD`), every key is first looked up
    /// as `{PROFILE}_{KEY}`.
    pub fn from_env() -> Self {
        Self::from_lookup(&active_profile(), &env_opt)
    }

    /// Build settings from an arbitrary key lookup, starting from defaults.
    pub fn from_lookup(profile: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        settings.apply_overrides(profile, lookup);
        settings
    }

    /// Overwrite fields for which the lookup yields a parseable value.
    pub fn apply_overrides(&mut self, profile: &str, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = profiled_parse(lookup, profile, "BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = profiled_parse(lookup, profile, "BATCH_OUT_SIZE") {
            self.out_batch_size = v;
        }
        if let Some(v) = profiled_parse(lookup, profile, "BATCH_TIMEOUT_MS") {
            self.batch_timeout_ms = v;
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

// ── Accumulator config ────────────────────────────────────────

fn default_name() -> String {
    "batch-accumulator".to_string()
}

/// File-level configuration of one accumulator.
///
/// ```toml
/// name = "orders"
///
/// [batch]
/// batch_size = 500
/// out_batch_size = 50
/// batch_timeout_ms = 250
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorConfig {
    /// Name used in log fields and `Display`.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub batch: BatchSettings,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            batch: BatchSettings::default(),
        }
    }
}

impl AccumulatorConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        Self::from_toml_with(toml_str, &active_profile(), &env_opt)
    }

    /// Like [`from_toml`](Self::from_toml) with an explicit override source.
    pub fn from_toml_with(
        toml_str: &str,
        profile: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_overrides(profile, lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    fn apply_overrides(&mut self, profile: &str, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(name) = profiled_opt(lookup, profile, "BATCHLINE_NAME") {
            self.name = name;
        }
        self.batch.apply_overrides(profile, lookup);
    }

    /// Reject configs that cannot drive an accumulator.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Config("accumulator name must not be empty".into()));
        }
        if self.batch.out_batch_size > 0 && self.batch.batch_size < self.batch.out_batch_size {
            warn!(
                batch_size = self.batch.batch_size,
                out_batch_size = self.batch.out_batch_size,
                "out_batch_size exceeds batch_size and can never fire"
            );
        }
        Ok(())
    }
}
