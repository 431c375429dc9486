//! Sequence implementation for the Disruptor
//!
//! The Sequence is used to track progress through the ring buffer and coordinate
//! between producers and consumers. Every value sits on its own cache line so that
//! the cursor, consumer sequences and the shared work counter never false-share.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{fence, AtomicI64, Ordering};
use std::sync::Arc;

use crate::disruptor::INITIAL_CURSOR_VALUE;

/// A padded, atomically updated 64-bit progress counter
///
/// Reads are `Acquire` and plain writes are `Release`: a consumer that observes a
/// sequence value also observes every slot write made before that value was set.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Set the sequence value (release store)
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Set the sequence value followed by a full fence
    ///
    /// Orders this store before any later load, used where a store must be visible
    /// before re-reading other threads' sequences.
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    /// Atomically set the value to `new` if it currently equals `expected`
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Get the minimum value over a set of sequences, or `default` if the set is empty
pub fn get_minimum_sequence(sequences: &[Arc<Sequence>], default: i64) -> i64 {
    sequences
        .iter()
        .map(|sequence| sequence.get())
        .fold(default, i64::min)
}

/// The upstream progress a barrier must not overtake
///
/// Either a single sequence (the cursor when a stage depends on nothing but
/// publication) or a fixed group whose value is the minimum of its members.
#[derive(Debug, Clone)]
pub enum DependentSequence {
    Single(Arc<Sequence>),
    Group(Arc<[Arc<Sequence>]>),
}

impl DependentSequence {
    /// Build the dependency view for a barrier
    ///
    /// With no dependencies the barrier tracks the cursor itself.
    pub fn new(cursor: &Arc<Sequence>, dependencies: &[Arc<Sequence>]) -> Self {
        match dependencies {
            [] => Self::Single(Arc::clone(cursor)),
            [single] => Self::Single(Arc::clone(single)),
            many => Self::Group(many.iter().cloned().collect()),
        }
    }

    /// Current value: the sequence itself, or the minimum over the group
    #[inline]
    pub fn get(&self) -> i64 {
        match self {
            Self::Single(sequence) => sequence.get(),
            Self::Group(sequences) => get_minimum_sequence(sequences, i64::MAX),
        }
    }
}
