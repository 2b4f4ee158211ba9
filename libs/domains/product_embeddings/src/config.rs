use core_config::{ConfigError, FromEnv, env_flag, env_or_default, env_parse};
use serde::{Deserialize, Serialize};

use crate::models::{Pacing, ProcessingOptions};
use crate::retry::BackoffPolicy;

/// Smallest vector size the engine accepts
pub const MIN_EMBEDDING_DIMENSIONS: usize = 8;

/// Batch size, pause and retry budget used together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingSettings {
    pub batch_size: usize,
    pub delay_between_batches_ms: u64,
    pub max_retries: u32,
}

impl PacingSettings {
    pub const STANDARD: Self = Self {
        batch_size: 10,
        delay_between_batches_ms: 1000,
        max_retries: 3,
    };

    pub const CONSERVATIVE: Self = Self {
        batch_size: 5,
        delay_between_batches_ms: 3000,
        max_retries: 5,
    };
}

/// Engine-wide settings, independent of any single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Dimensionality every stored vector is validated against
    pub expected_dimensions: usize,
    /// Version tag written into embedding metadata
    pub embedding_version: String,
    pub standard: PacingSettings,
    pub conservative: PacingSettings,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Randomize retry delays between 50% and 100% of their nominal value
    pub retry_jitter: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            expected_dimensions: 1536,
            embedding_version: "v1".to_string(),
            standard: PacingSettings::STANDARD,
            conservative: PacingSettings::CONSERVATIVE,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            retry_jitter: false,
        }
    }
}

impl SyncConfig {
    pub fn with_expected_dimensions(mut self, dimensions: usize) -> Self {
        self.expected_dimensions = dimensions;
        self
    }

    pub fn with_retry_delays(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.retry_base_delay_ms = base_ms;
        self.retry_max_delay_ms = max_ms;
        self
    }

    pub fn with_retry_jitter(mut self, enabled: bool) -> Self {
        self.retry_jitter = enabled;
        self
    }

    pub fn with_pacing(mut self, standard: PacingSettings, conservative: PacingSettings) -> Self {
        self.standard = standard;
        self.conservative = conservative;
        self
    }

    pub fn pacing(&self, pacing: Pacing) -> PacingSettings {
        match pacing {
            Pacing::Conservative => self.conservative,
            Pacing::Standard => self.standard,
        }
    }

    /// Backoff delays for the embedder; attempts come from each run's options
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new()
            .with_base_delay(self.retry_base_delay_ms)
            .with_max_delay(self.retry_max_delay_ms)
            .with_jitter(self.retry_jitter)
    }

    /// Processing options seeded from the standard pacing
    pub fn default_options(&self) -> ProcessingOptions {
        ProcessingOptions::default()
            .with_batch_size(self.standard.batch_size)
            .with_delay_ms(self.standard.delay_between_batches_ms)
            .with_max_retries(self.standard.max_retries)
    }
}

impl FromEnv for SyncConfig {
    /// Every variable is optional; unset ones keep the defaults:
    /// - EMBEDDING_DIMENSIONS: 1536
    /// - EMBEDDING_VERSION: v1
    /// - SYNC_BATCH_SIZE / SYNC_BATCH_DELAY_MS / SYNC_MAX_RETRIES: 10 / 1000 / 3
    /// - SYNC_CONSERVATIVE_BATCH_SIZE / _BATCH_DELAY_MS / _MAX_RETRIES: 5 / 3000 / 5
    /// - SYNC_RETRY_BASE_DELAY_MS / SYNC_RETRY_MAX_DELAY_MS: 1000 / 30000
    /// - SYNC_RETRY_JITTER: false
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            expected_dimensions: env_parse("EMBEDDING_DIMENSIONS", defaults.expected_dimensions)?,
            embedding_version: env_or_default("EMBEDDING_VERSION", &defaults.embedding_version),
            standard: PacingSettings {
                batch_size: env_parse("SYNC_BATCH_SIZE", defaults.standard.batch_size)?,
                delay_between_batches_ms: env_parse(
                    "SYNC_BATCH_DELAY_MS",
                    defaults.standard.delay_between_batches_ms,
                )?,
                max_retries: env_parse("SYNC_MAX_RETRIES", defaults.standard.max_retries)?,
            },
            conservative: PacingSettings {
                batch_size: env_parse(
                    "SYNC_CONSERVATIVE_BATCH_SIZE",
                    defaults.conservative.batch_size,
                )?,
                delay_between_batches_ms: env_parse(
                    "SYNC_CONSERVATIVE_BATCH_DELAY_MS",
                    defaults.conservative.delay_between_batches_ms,
                )?,
                max_retries: env_parse(
                    "SYNC_CONSERVATIVE_MAX_RETRIES",
                    defaults.conservative.max_retries,
                )?,
            },
            retry_base_delay_ms: env_parse("SYNC_RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms)?,
            retry_max_delay_ms: env_parse("SYNC_RETRY_MAX_DELAY_MS", defaults.retry_max_delay_ms)?,
            retry_jitter: env_flag("SYNC_RETRY_JITTER", defaults.retry_jitter),
        };

        if config.expected_dimensions < MIN_EMBEDDING_DIMENSIONS {
            return Err(ConfigError::ParseError {
                key: "EMBEDDING_DIMENSIONS".to_string(),
                details: format!(
                    "{} is below the minimum of {}",
                    config.expected_dimensions, MIN_EMBEDDING_DIMENSIONS
                ),
            });
        }

        for (key, settings) in [
            ("SYNC_BATCH_SIZE", config.standard),
            ("SYNC_CONSERVATIVE_BATCH_SIZE", config.conservative),
        ] {
            if !(1..=50).contains(&settings.batch_size) {
                return Err(ConfigError::ParseError {
                    key: key.to_string(),
                    details: format!("batch size {} is outside 1..=50", settings.batch_size),
                });
            }
        }

        Ok(config)
    }
}
