//! Runtime configuration

use std::env;

/// Smallest stack accepted for a thread.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Upper bound for the thread and key tables (handles carry a 16-bit index).
pub const MAX_TABLE_CAPACITY: usize = 0xFFFF;

const ENV_MAX_THREADS: &str = "PX_PTHREAD_MAX_THREADS";
const ENV_MAX_KEYS: &str = "PX_PTHREAD_MAX_KEYS";
const ENV_STACK_SIZE: &str = "PX_PTHREAD_STACK_SIZE";

/// Runtime limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Thread table capacity, including the slot reserved for the initial
    /// thread.
    pub max_threads: usize,
    /// Number of thread-specific data keys.
    pub max_keys: usize,
    /// Maximum number of destructor passes at thread exit.
    pub destructor_iterations: usize,
    /// Name buffer size (including the terminator) of created threads.
    pub name_len: usize,
    /// Stack size of threads created without an explicit size.
    pub default_stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_threads: 64,
            max_keys: 64,
            destructor_iterations: 4,
            name_len: 32,
            default_stack_size: 256 * 1024,
        }
    }
}

impl Config {
    /// Builds a configuration from the defaults and the `PX_PTHREAD_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but is not a
    /// number, or any error of [`Config::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = read_var(ENV_MAX_THREADS)? {
            config.max_threads = value;
        }
        if let Some(value) = read_var(ENV_MAX_KEYS)? {
            config.max_keys = value;
        }
        if let Some(value) = read_var(ENV_STACK_SIZE)? {
            config.default_stack_size = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the limits against what the runtime can represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // One slot for the initial thread plus at least one more
        if !(2..=MAX_TABLE_CAPACITY).contains(&self.max_threads) {
            return Err(ConfigError::ThreadCapacity(self.max_threads));
        }
        if !(1..=MAX_TABLE_CAPACITY).contains(&self.max_keys) {
            return Err(ConfigError::KeyCapacity(self.max_keys));
        }
        if self.destructor_iterations == 0 {
            return Err(ConfigError::DestructorIterations);
        }
        if self.name_len == 0 {
            return Err(ConfigError::NameLength);
        }
        if self.default_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::StackSize(self.default_stack_size));
        }
        Ok(())
    }
}

fn read_var(name: &'static str) -> Result<Option<usize>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var: name, value: raw }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable does not hold a number.
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },
    /// The thread capacity is outside `2..=65535`.
    #[error("thread capacity {0} out of range")]
    ThreadCapacity(usize),
    /// The key capacity is outside `1..=65535`.
    #[error("key capacity {0} out of range")]
    KeyCapacity(usize),
    /// At least one destructor pass is required.
    #[error("destructor iterations must be non-zero")]
    DestructorIterations,
    /// The name buffer must hold at least the terminator.
    #[error("name length must be non-zero")]
    NameLength,
    /// The default stack is below the minimum.
    #[error("default stack size {0} below minimum")]
    StackSize(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_tiny_thread_table() {
        let config = Config {
            max_threads: 1,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ThreadCapacity(1)));
    }

    #[test]
    fn test_validate_rejects_small_stack() {
        let config = Config {
            default_stack_size: 1024,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::StackSize(1024)));
    }
}
