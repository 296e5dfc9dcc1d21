//! Reader configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// How columns of a row may be accessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// Columns are decoded up to the highest requested ordinal and can be
    /// read again in any order within the row.
    #[default]
    Default,
    /// Columns must be read in increasing ordinal order. Large values can be
    /// streamed in chunks without being buffered.
    Sequential,
}

/// Configuration for a [`DataReader`](crate::DataReader).
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Column access mode (default: [`AccessMode::Default`]).
    pub access_mode: AccessMode,
    /// Stop after the first row of the result (default: false).
    pub single_row: bool,
    /// Decode a null `rowversion` as an empty binary instead of a null
    /// (default: false).
    pub legacy_rowversion_null_behavior: bool,
    /// Deadline for each asynchronous operation (default: 30 seconds).
    /// `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::Default,
            single_row: false,
            legacy_rowversion_null_behavior: false,
            command_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ReaderConfig {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the column access mode.
    #[must_use]
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Shorthand for [`AccessMode::Sequential`].
    #[must_use]
    pub fn sequential(self) -> Self {
        self.access_mode(AccessMode::Sequential)
    }

    /// Stop after the first row.
    #[must_use]
    pub fn single_row(mut self, single_row: bool) -> Self {
        self.single_row = single_row;
        self
    }

    /// Enable the legacy null handling for `rowversion` columns.
    #[must_use]
    pub fn legacy_rowversion_null_behavior(mut self, enabled: bool) -> Self {
        self.legacy_rowversion_null_behavior = enabled;
        self
    }

    /// Set the per-operation deadline.
    #[must_use]
    pub fn command_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.command_timeout = timeout.into();
        self
    }

    /// Returns whether columns must be read in order.
    #[must_use]
    pub fn is_sequential(&self) -> bool {
        self.access_mode == AccessMode::Sequential
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config(
                "command timeout must be non-zero; use None to wait indefinitely".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::default();
        assert_eq!(config.access_mode, AccessMode::Default);
        assert!(!config.single_row);
        assert!(!config.legacy_rowversion_null_behavior);
        assert_eq!(config.command_timeout, Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ReaderConfig::new()
            .sequential()
            .single_row(true)
            .command_timeout(None);
        assert!(config.is_sequential());
        assert!(config.single_row);
        assert_eq!(config.command_timeout, None);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ReaderConfig::new().command_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
