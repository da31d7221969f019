//! Pipeline configuration.
//!
//! Sources are layered: built-in defaults, then an optional file, then
//! `TRIAGE__*` environment variables (e.g. `TRIAGE__ENRICHMENT__THRESHOLD=0.7`).

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Default decision-support boundary given to every judgment call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a clinical decision support system. \
You do NOT diagnose. You do NOT prescribe treatment. You ONLY help prioritize clinical \
attention. Respond only with a JSON object matching the requested shape. When uncertain, \
say so through the uncertainty field rather than guessing.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub judgment: JudgmentConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrichment: EnrichmentConfig::default(),
            run: RunConfig::default(),
            judgment: JudgmentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Enrichment fires when running uncertainty is strictly above this.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Maximum characters kept from an enrichment excerpt.
    #[serde(default = "default_max_excerpt_chars")]
    pub max_excerpt_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_excerpt_chars: default_max_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Deadline for a whole run, covering every external call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_threshold() -> f64 {
    0.6
}

const fn default_max_excerpt_chars() -> usize {
    512
}

const fn default_timeout_ms() -> u64 {
    30_000
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PipelineConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigurationError> {
        let load_err = |e: config::ConfigError| ConfigurationError::Load(e.to_string());

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&PipelineConfig::default()).map_err(load_err)?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TRIAGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: PipelineConfig = builder
            .build()
            .map_err(load_err)?
            .try_deserialize()
            .map_err(load_err)?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let threshold = self.enrichment.threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigurationError::InvalidThreshold(threshold));
        }
        if self.enrichment.max_excerpt_chars == 0 {
            return Err(ConfigurationError::ZeroExcerptBound);
        }
        if self.run.timeout_ms == 0 {
            return Err(ConfigurationError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.enrichment.threshold = threshold;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.run.timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.enrichment.threshold, 0.6);
        assert_eq!(config.enrichment.max_excerpt_chars, 512);
        assert_eq!(config.run.timeout_ms, 30_000);
        assert!(config.judgment.system_prompt.contains("do NOT diagnose"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        for bad in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
            let config = PipelineConfig::default().with_threshold(bad);
            assert!(matches!(
                config.validate(),
                Err(ConfigurationError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_zero_bounds_rejected() {
        let config = PipelineConfig::default().with_timeout_ms(0);
        assert_eq!(config.validate(), Err(ConfigurationError::ZeroTimeout));

        let mut config = PipelineConfig::default();
        config.enrichment.max_excerpt_chars = 0;
        assert_eq!(config.validate(), Err(ConfigurationError::ZeroExcerptBound));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("triage-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pipeline.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[enrichment]\nthreshold = 0.75\n\n[run]\ntimeout_ms = 5000").unwrap();

        let config = PipelineConfig::load(path.to_str()).unwrap();
        assert_eq!(config.enrichment.threshold, 0.75);
        assert_eq!(config.run.timeout_ms, 5000);
        assert_eq!(config.enrichment.max_excerpt_chars, 512);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.enrichment.threshold, 0.6);
    }
}
