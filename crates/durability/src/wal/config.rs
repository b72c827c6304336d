//! WAL configuration.

/// WAL configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalConfig {
    /// Maximum segment size in bytes (default: 64MB).
    ///
    /// When the next record would push a segment past this size, a new
    /// segment is created. A single oversized record still gets written.
    pub segment_size: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            segment_size: 64 * 1024 * 1024,
        }
    }
}

impl WalConfig {
    /// Create a new WAL configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set segment size (builder pattern).
    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.segment_size < 1024 {
            return Err(WalConfigError::SegmentSizeTooSmall(self.segment_size));
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small segments).
    pub fn for_testing() -> Self {
        WalConfig {
            segment_size: 64 * 1024,
        }
    }
}

/// WAL configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalConfigError {
    /// Segment size is too small (minimum 1KB).
    #[error("WAL segment size must be at least 1024 bytes, got {0}")]
    SegmentSizeTooSmall(u64),

    /// Unknown durability mode name.
    #[error("Unknown durability mode '{0}' (expected cache, standard or always)")]
    UnknownDurability(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WalConfig::default();
        assert_eq!(config.segment_size, 64 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_segment_too_small() {
        let config = WalConfig::new().with_segment_size(512);
        assert_eq!(
            config.validate(),
            Err(WalConfigError::SegmentSizeTooSmall(512))
        );
    }

    #[test]
    fn test_testing_config() {
        let config = WalConfig::for_testing();
        assert!(config.validate().is_ok());
        assert!(config.segment_size < WalConfig::default().segment_size);
    }
}
