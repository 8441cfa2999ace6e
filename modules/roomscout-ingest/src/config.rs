use std::time::Duration;

use roomscout_common::{Config, ValidationMode};

/// Everything the pipeline needs, grouped per stage and passed in at
/// construction time.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub batch: BatchConfig,
    pub reconcile: ReconcileConfig,
    pub validation: ValidationMode,
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub temperature: f32,
    /// Retries after the first attempt, rate limiting only.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Send the extraction type's JSON schema instead of plain JSON-object mode.
    pub json_schema: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(2000),
            json_schema: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Posts extracted concurrently per chunk.
    pub chunk_size: usize,
    /// Pause between chunks.
    pub chunk_delay: Duration,
    /// Upper bound for one whole batch. Chunks already running finish.
    pub deadline: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3,
            chunk_delay: Duration::from_millis(2000),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// City used in the placeholder title when no district was extracted.
    pub default_city: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            default_city: "Hà Nội".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extraction: ExtractionConfig {
                temperature: config.extraction_temperature,
                max_retries: config.max_retries,
                retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
                json_schema: config.extraction_json_schema,
            },
            batch: BatchConfig {
                chunk_size: config.batch_size.max(1),
                chunk_delay: Duration::from_millis(config.batch_delay_ms),
                deadline: config.webhook_deadline_secs.map(Duration::from_secs),
            },
            reconcile: ReconcileConfig {
                default_city: config.default_city.clone(),
            },
            validation: config.validation_mode,
        }
    }

    /// Disable chunk pacing and backoff sleeps.
    pub fn without_delays(mut self) -> Self {
        self.extraction.retry_base_delay = Duration::ZERO;
        self.batch.chunk_delay = Duration::ZERO;
        self
    }

    pub fn with_validation(mut self, mode: ValidationMode) -> Self {
        self.validation = mode;
        self
    }
}
