//! Migration configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. User's config file (`XMIG_CONFIG_RS`, compile time)
//! 4. Library defaults
//!
//! ```rust,ignore
//! use xmig_runtime::config::MigrateConfig;
//!
//! let config = MigrateConfig::from_env()
//!     .max_frames(64)
//!     .capture_host_state(false);
//! config.validate()?;
//! ```

pub mod defaults;

use xmig_core::constants::{MIN_STACK_SIZE, STACK_ALIGN};
use xmig_core::env::{env_get, env_get_bool, env_get_size};
use xmig_core::kprintln;
use xmig_core::MigrateError;

/// Per-thread migration settings, fixed at attach time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfig {
    /// Bytes per stack half (the region holds two halves plus a guard page)
    pub stack_size: usize,
    /// Frame limit for stack walks
    pub max_frames: usize,
    /// Capacity of the process-wide migration trace ring
    pub trace_capacity: usize,
    /// Seed a new thread image with the host's live FP environment and flags
    pub capture_host_state: bool,
    /// Raise the log level to debug on attach
    pub debug_logging: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl MigrateConfig {
    /// Compile-time defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `XMIG_STACK_SIZE` - bytes per stack half, accepts K/M/G suffixes
    /// - `XMIG_MAX_FRAMES` - frame limit for stack walks
    /// - `XMIG_TRACE_CAPACITY` - migration trace ring size
    /// - `XMIG_CAPTURE_HOST_STATE` - seed FP environment from the host (0/1)
    /// - `XMIG_DEBUG` - debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get_size("XMIG_STACK_SIZE", defaults::STACK_SIZE),
            max_frames: env_get("XMIG_MAX_FRAMES", defaults::MAX_FRAMES),
            trace_capacity: env_get("XMIG_TRACE_CAPACITY", defaults::TRACE_CAPACITY),
            capture_host_state: env_get_bool(
                "XMIG_CAPTURE_HOST_STATE",
                defaults::CAPTURE_HOST_STATE,
            ),
            debug_logging: env_get_bool("XMIG_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Compile-time defaults only, no environment
    pub fn new() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            max_frames: defaults::MAX_FRAMES,
            trace_capacity: defaults::TRACE_CAPACITY,
            capture_host_state: defaults::CAPTURE_HOST_STATE,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn max_frames(mut self, n: usize) -> Self {
        self.max_frames = n;
        self
    }

    pub fn trace_capacity(mut self, n: usize) -> Self {
        self.trace_capacity = n;
        self
    }

    pub fn capture_host_state(mut self, enable: bool) -> Self {
        self.capture_host_state = enable;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
        }
        if self.stack_size % STACK_ALIGN as usize != 0 {
            return Err(ConfigError::InvalidValue("stack_size must be a multiple of 16"));
        }
        if self.max_frames == 0 {
            return Err(ConfigError::InvalidValue("max_frames must be > 0"));
        }
        if self.trace_capacity == 0 {
            return Err(ConfigError::InvalidValue("trace_capacity must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("xmig configuration:");
        kprintln!("  stack_size:          {}", self.stack_size);
        kprintln!("  max_frames:          {}", self.max_frames);
        kprintln!("  trace_capacity:      {}", self.trace_capacity);
        kprintln!("  capture_host_state:  {}", self.capture_host_state);
        kprintln!("  debug_logging:       {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for MigrateError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => MigrateError::InvalidConfig(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MigrateConfig::new().validate().is_ok());
        assert_eq!(MigrateConfig::new().max_frames, defaults::MAX_FRAMES);
    }

    #[test]
    fn test_builder() {
        let config = MigrateConfig::new()
            .stack_size(256 * 1024)
            .max_frames(16)
            .capture_host_state(false)
            .debug_logging(true);
        assert_eq!(config.stack_size, 256 * 1024);
        assert_eq!(config.max_frames, 16);
        assert!(!config.capture_host_state);
        assert!(config.debug_logging);
    }

    #[test]
    fn test_validation() {
        let too_small = MigrateConfig::new().stack_size(4096);
        assert_eq!(
            too_small.validate(),
            Err(ConfigError::InvalidValue("stack_size must be >= 64KB"))
        );
        assert!(MigrateConfig::new().stack_size(64 * 1024 + 8).validate().is_err());
        assert!(MigrateConfig::new().max_frames(0).validate().is_err());
        assert!(MigrateConfig::new().trace_capacity(0).validate().is_err());
    }

    #[test]
    fn test_config_error_converts() {
        let err: MigrateError = ConfigError::InvalidValue("x").into();
        assert_eq!(err, MigrateError::InvalidConfig("x"));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("XMIG_MAX_FRAMES", "7");
        std::env::set_var("XMIG_STACK_SIZE", "128K");
        let config = MigrateConfig::from_env();
        std::env::remove_var("XMIG_MAX_FRAMES");
        std::env::remove_var("XMIG_STACK_SIZE");
        assert_eq!(config.max_frames, 7);
        assert_eq!(config.stack_size, 128 * 1024);
    }
}
