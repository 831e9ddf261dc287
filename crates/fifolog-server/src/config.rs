use std::time::Duration;

use fifolog_frame::WriterConfig;

use crate::error::{Result, ServerError};

/// Default process name of the reader.
pub const DEFAULT_PROCESS_NAME: &str = "fifolog-reader";

/// Reader loop behavior.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Consecutive empty reads after which a pending termination request ends the loop.
    pub idle_threshold: u32,
    /// Pause after each empty read.
    pub idle_sleep: Duration,
    /// Drop partial lines not extended for this long. Disabled when `None`.
    pub stale_fragment_timeout: Option<Duration>,
    /// Name given to the reader process.
    pub process_name: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            idle_threshold: 3,
            idle_sleep: Duration::from_millis(100),
            stale_fragment_timeout: None,
            process_name: DEFAULT_PROCESS_NAME.to_string(),
        }
    }
}

impl ReaderConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.idle_threshold == 0 {
            return Err(ServerError::InvalidConfig(
                "idle_threshold must be at least 1".to_string(),
            ));
        }
        if self.process_name.as_bytes().contains(&0) {
            return Err(ServerError::InvalidConfig(
                "process_name must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Supervisor lifecycle behavior.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Writer handed to the caller. Its terminator is also the reader's.
    pub writer: WriterConfig,
    /// Reader loop settings.
    pub reader: ReaderConfig,
    /// How long start-up waits for the reader to attach to the channel.
    pub startup_timeout: Duration,
    /// How long release waits for the reader to drain and exit.
    pub shutdown_timeout: Duration,
    /// Send SIGKILL to a reader that outlives `shutdown_timeout`.
    pub kill_on_timeout: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            reader: ReaderConfig::default(),
            startup_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(10),
            kill_on_timeout: false,
        }
    }
}

impl SupervisorConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        self.reader.validate()?;
        if self.writer.line_terminator.is_empty() {
            return Err(ServerError::InvalidConfig(
                "line_terminator must not be empty".to_string(),
            ));
        }
        if self.startup_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "startup_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SupervisorConfig::default();
        assert!(!config.writer.blocking);
        assert_eq!(config.writer.cache_capacity, 500);
        assert_eq!(config.reader.idle_threshold, 3);
        assert_eq!(config.reader.idle_sleep, Duration::from_millis(100));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert!(!config.kill_on_timeout);
        assert!(config.reader.stale_fragment_timeout.is_none());
        assert_eq!(config.reader.process_name, "fifolog-reader");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_idle_threshold() {
        let config = ReaderConfig {
            idle_threshold: 0,
            ..ReaderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_nul_in_process_name() {
        let config = SupervisorConfig {
            reader: ReaderConfig {
                process_name: "bad\0name".to_string(),
                ..ReaderConfig::default()
            },
            ..SupervisorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
