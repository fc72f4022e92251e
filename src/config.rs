//! Segment identity and creation settings

use std::fmt;

/// Prefix of the POSIX shared memory object backing a key
const SLOTQ_SHM_PREFIX: &str = "/slotq_";

/// Well-known key shared by every cooperating process
pub const DEFAULT_KEY: u32 = 123456;

/// Permission bits of a freshly created segment
pub const DEFAULT_MODE: u32 = 0o666;

/// Numeric rendezvous identifier of a shared segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey(pub u32);

impl SegmentKey {
    /// Name of the shared memory object for this key
    pub fn shm_name(&self) -> String {
        format!("{}{}", SLOTQ_SHM_PREFIX, self.0)
    }
}

impl Default for SegmentKey {
    fn default() -> Self {
        Self(DEFAULT_KEY)
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Segment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Key every process uses to find the segment
    pub key: SegmentKey,
    /// Permission bits applied when the segment is created
    pub mode: u32,
}

impl SegmentConfig {
    pub fn with_key(key: u32) -> Self {
        Self {
            key: SegmentKey(key),
            ..Self::default()
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            key: SegmentKey::default(),
            mode: DEFAULT_MODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SegmentConfig::default();
        assert_eq!(config.key, SegmentKey(123456));
        assert_eq!(config.mode, 0o666);
        assert_eq!(config.key.shm_name(), "/slotq_123456");
    }

    #[test]
    fn test_with_key() {
        let config = SegmentConfig::with_key(42);
        assert_eq!(config.key.to_string(), "42");
        assert_eq!(config.mode, DEFAULT_MODE);
    }
}
