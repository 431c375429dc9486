//! Producer Type
//!
//! Selects the sequencer a ring buffer is built with. The choice is fixed at
//! construction time.

use serde::{Deserialize, Serialize};

/// Specifies how many threads may publish to a ring buffer
///
/// # Examples
/// ```
/// use ringbatch::disruptor::ProducerType;
///
/// assert!(ProducerType::Single.is_single());
/// assert!(ProducerType::Multi.is_multi());
/// assert_eq!(ProducerType::default(), ProducerType::Multi);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerType {
    /// Exactly one publishing thread; the caller guarantees it
    ///
    /// Claims are plain counters and the cursor moves on publish, so no per-slot
    /// availability tracking is needed.
    Single,

    /// Any number of concurrent publishing threads
    ///
    /// Claims use a CAS on the cursor and every slot carries an availability marker.
    #[default]
    Multi,
}

impl ProducerType {
    /// Returns true if this is [`ProducerType::Single`]
    pub fn is_single(self) -> bool {
        matches!(self, Self::Single)
    }

    /// Returns true if this is [`ProducerType::Multi`]
    pub fn is_multi(self) -> bool {
        matches!(self, Self::Multi)
    }
}

impl std::fmt::Display for ProducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
        }
    }
}
