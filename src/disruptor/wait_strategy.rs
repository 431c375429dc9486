//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer idles while the sequence it needs has not
//! been published yet. This module holds the trait, the [`WaitResult`] returned by
//! every strategy, and the non-blocking spin family. The lock based strategies live
//! in [`crate::disruptor::blocking_wait_strategy`] and the escalating strategy in
//! [`crate::disruptor::phased_backoff_wait_strategy`].

use crate::disruptor::{DependentSequence, Sequence, SequenceBarrier};
use std::thread;
use std::time::Duration;

/// Outcome of waiting on a barrier
///
/// Cancellation and idle timeouts are ordinary control signals, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The highest sequence currently available; may be below the requested one
    Available(i64),
    /// The barrier was alerted while waiting
    Alerted,
    /// A timeout-flavoured strategy saw no progress within its window
    TimedOut,
}

/// Strategy for waiting for events to become available
///
/// Implementations must observe `barrier.is_alerted()` at least once per idle
/// cycle so that a halted processor unwinds promptly.
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait for `sequence` to be published on `cursor` and processed by `dependent`
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    /// * `cursor` - The sequencer's cursor
    /// * `dependent` - The upstream progress the caller may not overtake
    /// * `barrier` - The barrier on whose behalf the wait happens, checked for alerts
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult;

    /// Wake every thread parked inside [`WaitStrategy::wait_for`]
    fn signal_all_when_blocking(&self);
}

/// Spin on the dependent sequence until it reaches `sequence` or the barrier alerts
#[inline]
pub(crate) fn spin_on_dependent(
    sequence: i64,
    dependent: &DependentSequence,
    barrier: &dyn SequenceBarrier,
) -> WaitResult {
    loop {
        let available = dependent.get();
        if available >= sequence {
            return WaitResult::Available(available);
        }
        if barrier.is_alerted() {
            return WaitResult::Alerted;
        }
        std::hint::spin_loop();
    }
}

/// Busy-spin wait strategy
///
/// Lowest latency, but burns a full core while idle. Use this only when you can
/// dedicate CPU cores to the consumers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Create a new busy-spin wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {}
}

/// Yielding wait strategy
///
/// Spins for a fixed number of iterations, then yields the thread on every
/// following iteration. A good compromise when there are spare hyperthreads.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    const DEFAULT_SPIN_TRIES: u32 = 100;

    /// Create a new yielding wait strategy
    pub fn new() -> Self {
        Self::with_spin_tries(Self::DEFAULT_SPIN_TRIES)
    }

    /// Create a yielding wait strategy that spins `spin_tries` times before yielding
    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        let mut counter = self.spin_tries;

        loop {
            let available = dependent.get();
            if available >= sequence {
                return WaitResult::Available(available);
            }
            if barrier.is_alerted() {
                return WaitResult::Alerted;
            }

            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                std::hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Sleeping wait strategy
///
/// Spins, then yields, then sleeps for a short quantum on every further
/// iteration. Low CPU use at the price of latency spikes after idle periods.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep_duration: Duration,
}

impl SleepingWaitStrategy {
    const DEFAULT_RETRIES: u32 = 200;
    const DEFAULT_SLEEP: Duration = Duration::from_nanos(100);

    /// Create a new sleeping wait strategy with default retries and sleep quantum
    pub fn new() -> Self {
        Self::with_retries(Self::DEFAULT_RETRIES, Self::DEFAULT_SLEEP)
    }

    /// Create a sleeping wait strategy with a custom sleep quantum
    ///
    /// # Arguments
    /// * `sleep_duration` - How long to sleep between checks once spinning and yielding are exhausted
    pub fn new_with_duration(sleep_duration: Duration) -> Self {
        Self::with_retries(Self::DEFAULT_RETRIES, sleep_duration)
    }

    /// Create a sleeping wait strategy
    ///
    /// The first half of `retries` spins, the second half yields, after which
    /// every iteration sleeps for `sleep_duration`.
    pub fn with_retries(retries: u32, sleep_duration: Duration) -> Self {
        Self {
            retries,
            sleep_duration,
        }
    }

    #[inline]
    fn apply_wait_method(&self, counter: u32) -> u32 {
        if counter > self.retries / 2 {
            std::hint::spin_loop();
            counter - 1
        } else if counter > 0 {
            thread::yield_now();
            counter - 1
        } else {
            thread::sleep(self.sleep_duration);
            counter
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        let mut counter = self.retries;

        loop {
            let available = dependent.get();
            if available >= sequence {
                return WaitResult::Available(available);
            }
            if barrier.is_alerted() {
                return WaitResult::Alerted;
            }
            counter = self.apply_wait_method(counter);
        }
    }

    fn signal_all_when_blocking(&self) {}
}


#[cfg(test)]
mod tests {
    use super::test_support::{cursor_at, AlertFlag};
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn assert_returns_when_published<W: WaitStrategy + 'static>(strategy: W) {
        let strategy = Arc::new(strategy);
        let (cursor, dependent) = cursor_at(-1);
        let barrier = AlertFlag::default();

        let publisher_cursor = Arc::clone(&cursor);
        let publisher_strategy = Arc::clone(&strategy);
        let publisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            publisher_cursor.set(0);
            publisher_strategy.signal_all_when_blocking();
        });

        let result = strategy.wait_for(0, &cursor, &dependent, &barrier);
        publisher.join().unwrap();
        assert_eq!(result, WaitResult::Available(0));
    }

    #[test]
    fn test_strategies_return_immediately_when_available() {
        let (cursor, dependent) = cursor_at(10);
        let barrier = AlertFlag::default();

        let strategies: Vec<Box<dyn WaitStrategy>> = vec![
            Box::new(BusySpinWaitStrategy::new()),
            Box::new(YieldingWaitStrategy::new()),
            Box::new(SleepingWaitStrategy::new()),
        ];

        for strategy in strategies {
            assert_eq!(
                strategy.wait_for(5, &cursor, &dependent, &barrier),
                WaitResult::Available(10)
            );
        }
    }

    #[test]
    fn test_spin_family_observes_publication() {
        assert_returns_when_published(BusySpinWaitStrategy::new());
        assert_returns_when_published(YieldingWaitStrategy::new());
        assert_returns_when_published(SleepingWaitStrategy::new_with_duration(
            Duration::from_micros(100),
        ));
    }

    #[test]
    fn test_alert_unwinds_spinning_wait() {
        let (cursor, dependent) = cursor_at(-1);
        let barrier = Arc::new(AlertFlag::default());

        let alerter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                barrier.alert();
            })
        };

        let start = Instant::now();
        let result =
            SleepingWaitStrategy::new().wait_for(0, &cursor, &dependent, barrier.as_ref());
        alerter.join().unwrap();

        assert_eq!(result, WaitResult::Alerted);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleeping_wait_method_escalates() {
        let strategy = SleepingWaitStrategy::with_retries(4, Duration::from_nanos(1));
        assert_eq!(strategy.apply_wait_method(4), 3); // spin
        assert_eq!(strategy.apply_wait_method(2), 1); // yield
        assert_eq!(strategy.apply_wait_method(0), 0); // sleep
    }
}
