//! Resource limits

use serde::{Deserialize, Serialize};

/// Bounds applied while reading types and decoding payloads.
///
/// Every field has a default, so a partial JSON object is a valid configuration:
///
/// ```
/// let limits: shapr::Limits = serde_json::from_str(r#"{"max_depth": 8}"#).unwrap();
/// assert_eq!(limits.max_depth, 8);
/// assert_eq!(limits.max_occurs, shapr::Limits::default().max_occurs);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum record nesting depth accepted by the reader.
    pub max_depth: usize,
    /// Maximum payload length in characters, header included.
    pub max_payload_len: usize,
    /// Maximum width of a single leaf slot.
    pub max_width: usize,
    /// Maximum number of occurrence slots of a repeated member.
    pub max_occurs: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_payload_len: 16 * 1024 * 1024,
            max_width: 1024 * 1024,
            max_occurs: 1_000_000,
        }
    }
}

impl Limits {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_payload_len(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    pub fn with_max_width(mut self, max_width: usize) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_max_occurs(mut self, max_occurs: usize) -> Self {
        self.max_occurs = max_occurs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let limits: Limits = serde_json::from_str(r#"{"max_width": 12}"#).unwrap();
        assert_eq!(limits.max_width, 12);
        assert_eq!(limits.max_depth, Limits::default().max_depth);
    }

    #[test]
    fn builders() {
        let limits = Limits::default().with_max_occurs(3).with_max_payload_len(10);
        assert_eq!(limits.max_occurs, 3);
        assert_eq!(limits.max_payload_len, 10);
    }
}
