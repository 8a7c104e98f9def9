//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Combat resolution settings.
    #[serde(default)]
    pub combat: CombatConfig,

    /// Content generation (client sampling) settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = self.combat.win_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::ValidationError {
                message: format!("Invalid combat win_probability {p}. Must be between 0.0 and 1.0"),
            });
        }

        if self.generation.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "generation timeout_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// What happens to a subject that loses a fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefeatEffect {
    /// The subject is carried back to the starting location.
    #[default]
    Retreat,
    /// Nothing changes; the monster is still there.
    Stay,
}

/// Combat configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombatConfig {
    /// Probability that an attack defeats the monster (0.0 - 1.0).
    /// Default: 0.5
    #[serde(default = "default_win_probability")]
    pub win_probability: f64,

    /// Effect applied when an attack fails.
    #[serde(default)]
    pub on_defeat: DefeatEffect,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            win_probability: default_win_probability(),
            on_defeat: DefeatEffect::default(),
        }
    }
}

const fn default_win_probability() -> f64 {
    0.5
}

/// Content generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Ask the client to generate flavour text when it supports sampling.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds to wait for a generation round trip before giving up.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Token budget passed to the client with each generation request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_tokens() -> u32 {
    200
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
