//! Sequence Barrier Implementation
//!
//! This module provides sequence barriers for coordinating dependencies between
//! event processors. A barrier combines the sequencer's cursor, the upstream
//! sequences a stage may not overtake, and a wait strategy. Consumers never read
//! past what their barrier reports as available.

use crate::disruptor::{DependentSequence, Sequence, Sequencer, WaitResult, WaitStrategy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordination barrier for managing dependencies between event processors
pub trait SequenceBarrier: Send + Sync + std::fmt::Debug {
    /// Wait for the given sequence to become available
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    ///
    /// # Returns
    /// `Available(s)` with the highest contiguous available sequence, which may be
    /// below `sequence` after a partial wake, `Alerted` when the barrier was alerted,
    /// or `TimedOut` when a timeout-flavoured strategy saw no progress.
    fn wait_for(&self, sequence: i64) -> WaitResult;

    /// Current value of the dependent sequence this barrier gates on
    fn cursor(&self) -> i64;

    /// Check if this barrier has been alerted
    fn is_alerted(&self) -> bool;

    /// Alert this barrier and wake any waiting threads
    fn alert(&self);

    /// Clear the alert status so the barrier can be reused
    fn clear_alert(&self);
}

/// Barrier handed to event processors for waiting on the ring buffer
#[derive(Debug)]
pub struct ProcessingSequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    dependent: DependentSequence,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a new processing sequence barrier
    ///
    /// # Arguments
    /// * `sequencer` - The sequencer whose publications are awaited
    /// * `dependencies` - Upstream sequences that must be passed first; when empty
    ///   the barrier depends on publication alone
    pub fn new(sequencer: Arc<dyn Sequencer>, dependencies: &[Arc<Sequence>]) -> Self {
        let cursor = sequencer.cursor();
        let wait_strategy = sequencer.wait_strategy();
        let dependent = DependentSequence::new(&cursor, dependencies);

        Self {
            sequencer,
            wait_strategy,
            cursor,
            dependent,
            alerted: AtomicBool::new(false),
        }
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> WaitResult {
        if self.is_alerted() {
            return WaitResult::Alerted;
        }

        match self
            .wait_strategy
            .wait_for(sequence, &self.cursor, &self.dependent, self)
        {
            WaitResult::Available(available) if available < sequence => {
                WaitResult::Available(available)
            }
            WaitResult::Available(available) => WaitResult::Available(
                self.sequencer
                    .highest_published_sequence(sequence, available),
            ),
            signal => signal,
        }
    }

    fn cursor(&self) -> i64 {
        self.dependent.get()
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BlockingWaitStrategy, BusySpinWaitStrategy, MultiProducerSequencer,
        SingleProducerSequencer,
    };
    use std::thread;
    use std::time::{Duration, Instant};

    fn multi_producer(size: usize) -> Arc<dyn Sequencer> {
        Arc::new(MultiProducerSequencer::new(size, Arc::new(BlockingWaitStrategy::new())).unwrap())
    }

    #[test]
    fn test_wait_for_published_sequence() {
        let sequencer = multi_producer(16);
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), &[]);

        let hi = sequencer.next_n(3).unwrap();
        sequencer.publish_range(0, hi);

        assert_eq!(barrier.wait_for(0), WaitResult::Available(2));
        assert_eq!(barrier.cursor(), 2);
    }

    #[test]
    fn test_wait_for_stops_at_first_unpublished_gap() {
        let sequencer = multi_producer(16);
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), &[]);

        sequencer.next_n(4).unwrap();
        sequencer.publish(0);
        sequencer.publish(1);
        sequencer.publish(3);

        // The cursor says 3, but slot 2 is still being written
        assert_eq!(barrier.wait_for(1), WaitResult::Available(1));
        assert_eq!(barrier.wait_for(0), WaitResult::Available(1));
    }

    #[test]
    fn test_wait_for_respects_dependencies() {
        let sequencer: Arc<dyn Sequencer> = Arc::new(
            SingleProducerSequencer::new(16, Arc::new(BusySpinWaitStrategy::new())).unwrap(),
        );
        let upstream = Arc::new(Sequence::new(-1));
        let barrier =
            ProcessingSequenceBarrier::new(Arc::clone(&sequencer), &[Arc::clone(&upstream)]);

        let hi = sequencer.next_n(10).unwrap();
        sequencer.publish(hi);
        assert_eq!(barrier.cursor(), -1);

        let advancer = {
            let upstream = Arc::clone(&upstream);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                upstream.set(4);
            })
        };

        assert_eq!(barrier.wait_for(3), WaitResult::Available(4));
        advancer.join().unwrap();
    }

    #[test]
    fn test_alert_interrupts_blocked_wait() {
        let sequencer = multi_producer(16);
        let barrier = Arc::new(ProcessingSequenceBarrier::new(sequencer, &[]));

        let alerter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                barrier.alert();
            })
        };

        let start = Instant::now();
        assert_eq!(barrier.wait_for(0), WaitResult::Alerted);
        assert!(start.elapsed() < Duration::from_millis(500));
        alerter.join().unwrap();
    }

    #[test]
    fn test_alert_is_checked_before_waiting_and_can_be_cleared() {
        let sequencer = multi_producer(16);
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), &[]);
        sequencer.next().unwrap();
        sequencer.publish(0);

        barrier.alert();
        assert!(barrier.is_alerted());
        assert_eq!(barrier.wait_for(0), WaitResult::Alerted);

        barrier.clear_alert();
        assert!(!barrier.is_alerted());
        assert_eq!(barrier.wait_for(0), WaitResult::Available(0));
    }
}
