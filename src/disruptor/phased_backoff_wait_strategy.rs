//! Phased backoff wait strategy
//!
//! Spins, then yields, then hands the wait over to a fallback strategy once the
//! configured durations elapse without progress.

use crate::disruptor::{
    BlockingWaitStrategy, DependentSequence, LiteBlockingWaitStrategy, Sequence, SequenceBarrier,
    SleepingWaitStrategy, WaitResult, WaitStrategy,
};
use std::thread;
use std::time::{Duration, Instant};

const SPIN_TRIES: u32 = 10_000;

/// Escalates spin → yield → fallback strategy
///
/// Useful when throughput and low latency matter less than CPU use, but bursts
/// should still be picked up quickly.
#[derive(Debug)]
pub struct PhasedBackoffWaitStrategy {
    spin_timeout: Duration,
    yield_timeout: Duration,
    fallback: Box<dyn WaitStrategy>,
}

impl PhasedBackoffWaitStrategy {
    /// Create a phased backoff strategy
    ///
    /// # Arguments
    /// * `spin_timeout` - How long to spin before yielding
    /// * `yield_timeout` - How long to yield, counted after `spin_timeout`, before falling back
    /// * `fallback` - The strategy used once both phases are exhausted
    pub fn new(
        spin_timeout: Duration,
        yield_timeout: Duration,
        fallback: Box<dyn WaitStrategy>,
    ) -> Self {
        Self {
            spin_timeout,
            yield_timeout: spin_timeout + yield_timeout,
            fallback,
        }
    }

    /// Fall back to a [`BlockingWaitStrategy`]
    pub fn with_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(
            spin_timeout,
            yield_timeout,
            Box::new(BlockingWaitStrategy::new()),
        )
    }

    /// Fall back to a [`LiteBlockingWaitStrategy`]
    pub fn with_lite_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(
            spin_timeout,
            yield_timeout,
            Box::new(LiteBlockingWaitStrategy::new()),
        )
    }

    /// Fall back to a [`SleepingWaitStrategy`] that sleeps straight away
    pub fn with_sleep(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(
            spin_timeout,
            yield_timeout,
            Box::new(SleepingWaitStrategy::with_retries(
                0,
                Duration::from_nanos(100),
            )),
        )
    }
}

impl WaitStrategy for PhasedBackoffWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        let mut start: Option<Instant> = None;
        let mut counter = SPIN_TRIES;

        loop {
            let available = dependent.get();
            if available >= sequence {
                return WaitResult::Available(available);
            }

            counter -= 1;
            if counter == 0 {
                if barrier.is_alerted() {
                    return WaitResult::Alerted;
                }

                match start {
                    None => start = Some(Instant::now()),
                    Some(started) => {
                        let elapsed = started.elapsed();
                        if elapsed > self.yield_timeout {
                            return self.fallback.wait_for(sequence, cursor, dependent, barrier);
                        } else if elapsed > self.spin_timeout {
                            thread::yield_now();
                        }
                    }
                }
                counter = SPIN_TRIES;
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        self.fallback.signal_all_when_blocking();
    }
}
