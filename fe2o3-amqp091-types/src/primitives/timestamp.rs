use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// An absolute point in time
///
/// 64-bit POSIX time, in seconds since the unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a new [`Timestamp`] from seconds
    pub fn from_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    /// Get the timestamp value as seconds
    pub fn seconds(&self) -> u64 {
        self.0
    }

    /// Consume the wrapper into the inner u64
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// The current system time truncated to seconds
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }
}

impl From<u64> for Timestamp {
    fn from(seconds: u64) -> Self {
        Self(seconds)
    }
}

/// Times before the unix epoch saturate to zero
impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let seconds = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(seconds)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(value: Timestamp) -> Self {
        UNIX_EPOCH + Duration::from_secs(value.0)
    }
}
