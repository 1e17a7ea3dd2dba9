//! Timer configuration.
//!
//! [`TimerConfig`] controls the dedicated thread a
//! [`TimerDriver`](crate::TimerDriver) runs its deadlines on. It is
//! serde-serializable; with the `config-file` feature it can be parsed from
//! TOML:
//!
//! ```ignore
//! let config = TimerConfig::from_toml_str(r#"
//!     thread_name = "app-timer"
//!     stack_size = 262144
//! "#)?;
//! let driver = TimerDriver::with_config(config)?;
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default name of the timer thread.
pub const DEFAULT_TIMER_THREAD_NAME: &str = "pledge-timer";

/// Smallest stack size accepted for the timer thread.
pub const MIN_TIMER_STACK_SIZE: usize = 16 * 1024;

/// Configuration for a timer driver thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Name given to the timer thread.
    pub thread_name: String,
    /// Stack size for the timer thread; the platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_TIMER_THREAD_NAME.to_string(),
            stack_size: None,
        }
    }
}

impl TimerConfig {
    /// Sets the thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the thread stack size.
    #[must_use]
    pub const fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Checks the configuration for values the driver cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "thread_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.thread_name.contains('\0') {
            return Err(ConfigError::Invalid {
                field: "thread_name",
                reason: "must not contain NUL bytes".to_string(),
            });
        }
        if let Some(size) = self.stack_size {
            if size < MIN_TIMER_STACK_SIZE {
                return Err(ConfigError::Invalid {
                    field: "stack_size",
                    reason: format!("{size} is below the minimum of {MIN_TIMER_STACK_SIZE}"),
                });
            }
        }
        Ok(())
    }

    /// Parses and validates a configuration from TOML.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }
}

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value the driver cannot use.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The TOML document could not be parsed.
    #[cfg(feature = "config-file")]
    #[error("failed to parse timer config: {0}")]
    Parse(#[from] toml::de::Error),
}
