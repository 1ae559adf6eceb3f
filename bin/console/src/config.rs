//! Console configuration.
//!
//! Loaded via the `config` crate from `HEARTH_`-prefixed environment
//! variables. Nested keys use `__`, e.g. `HEARTH_SESSION__TIMEOUT_MINUTES`.

use chrono::TimeDelta;
use hearth_conversation::SessionConfig;
use serde::Deserialize;

/// Console configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ConsoleConfig {
    /// Entity ID of the console's conversation agent.
    #[serde(default = "default_entity_id")]
    pub entity_id: String,

    /// Language tag sent with every utterance.
    #[serde(default = "default_language")]
    pub language: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_entity_id() -> String {
    "conversation.console".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its field.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("HEARTH")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load(environment: config::Environment) -> Result<Self, config::ConfigError> {
        let loaded: Self = config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let timeout = self.session.timeout_minutes;
        if timeout <= 0 || TimeDelta::try_minutes(timeout).is_none() {
            return Err(config::ConfigError::Message(format!(
                "session.timeout_minutes must be a positive number of minutes, got {timeout}"
            )));
        }
        if self.session.cleanup_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "session.cleanup_interval_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
