//! Per-context configuration.

#![warn(clippy::all, rust_2018_idioms)]

use std::time::Duration;

/// Default maximum heap size for a context's isolate (256MB).
pub const DEFAULT_MAX_HEAP_SIZE_BYTES: usize = 256 * 1024 * 1024;

/// Configuration for a [`Context`](crate::Context)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Maximum heap size in bytes (default: 256MB)
    pub max_heap_size_bytes: usize,

    /// Deadline applied to every operation that runs JavaScript.
    ///
    /// `None` (the default) lets scripts run until they finish; they can still
    /// be stopped through an [`InterruptHandle`](crate::InterruptHandle).
    pub timeout: Option<Duration>,
}

impl ContextConfig {
    pub fn with_max_heap_size(mut self, bytes: usize) -> Self {
        self.max_heap_size_bytes = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_heap_size_bytes: DEFAULT_MAX_HEAP_SIZE_BYTES,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ContextConfig::default();
        assert_eq!(config.max_heap_size_bytes, 256 * 1024 * 1024);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ContextConfig::default()
            .with_max_heap_size(64 * 1024 * 1024)
            .with_timeout(Duration::from_millis(250));

        assert_eq!(config.max_heap_size_bytes, 64 * 1024 * 1024);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
    }
}
