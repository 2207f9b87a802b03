use serde::{Deserialize, Serialize};

/// A long string. The wire format does not restrict the content to UTF-8,
/// so the raw bytes are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongString(#[serde(with = "serde_bytes")] Vec<u8>);

impl LongString {
    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the content if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Consume the wrapper into the inner bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for LongString {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<String> for LongString {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for LongString {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl std::fmt::Display for LongString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}
