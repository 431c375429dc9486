//! Lock based wait strategies
//!
//! These strategies park waiting consumers on a mutex/condition variable pair. The
//! lock never protects event data: it only exists so that a consumer can sleep
//! until a producer (or an alert) wakes it.
//!
//! The "lite" variants keep a `signal_needed` flag so that producers can skip the
//! lock entirely while nobody is parked. A waiter always raises the flag with a
//! sequentially consistent swap *before* re-checking the cursor, and a producer
//! always clears it with a swap *after* storing the cursor. Both sides operate on
//! the same atomic, so either the producer's swap observes the raised flag and
//! broadcasts under the lock, or the waiter's swap is ordered after it and the
//! waiter's re-check sees the new cursor. No wake-up can be lost in between.

use crate::disruptor::wait_strategy::spin_on_dependent;
use crate::disruptor::{DependentSequence, Sequence, SequenceBarrier, WaitResult, WaitStrategy};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Mutex and condition variable used purely for idling
#[derive(Debug, Default)]
struct Parking {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Parking {
    /// Park until the cursor reaches `sequence`
    ///
    /// Returns `None` once the cursor has caught up, otherwise the signal that
    /// interrupted the wait.
    fn park_until_published(
        &self,
        sequence: i64,
        cursor: &Sequence,
        barrier: &dyn SequenceBarrier,
        deadline: Option<Instant>,
        signal_needed: Option<&AtomicBool>,
    ) -> Option<WaitResult> {
        if cursor.get() >= sequence {
            return None;
        }

        let mut guard = self.mutex.lock();
        loop {
            if let Some(flag) = signal_needed {
                flag.swap(true, Ordering::SeqCst);
            }

            if cursor.get() >= sequence {
                return None;
            }
            if barrier.is_alerted() {
                return Some(WaitResult::Alerted);
            }

            match deadline {
                Some(deadline) => {
                    let timed_out = self.condvar.wait_until(&mut guard, deadline).timed_out();
                    if timed_out && cursor.get() < sequence {
                        return Some(WaitResult::TimedOut);
                    }
                }
                None => self.condvar.wait(&mut guard),
            }
        }
    }

    fn wake_all(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking wait strategy using a lock and condition variable
///
/// Use when CPU is more precious than latency. Every publish acquires the lock to
/// broadcast, see [`LiteBlockingWaitStrategy`] for a variant that avoids it.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    parking: Parking,
}

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        if let Some(signal) = self
            .parking
            .park_until_published(sequence, cursor, barrier, None, None)
        {
            return signal;
        }
        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        self.parking.wake_all();
    }
}

/// Blocking strategy that elides the broadcast when no consumer is parked
#[derive(Debug, Default)]
pub struct LiteBlockingWaitStrategy {
    parking: Parking,
    signal_needed: AtomicBool,
}

impl LiteBlockingWaitStrategy {
    /// Create a new lite blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for LiteBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        if let Some(signal) = self.parking.park_until_published(
            sequence,
            cursor,
            barrier,
            None,
            Some(&self.signal_needed),
        ) {
            return signal;
        }
        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        if self.signal_needed.swap(false, Ordering::SeqCst) {
            self.parking.wake_all();
        }
    }
}

/// Blocking strategy that reports [`WaitResult::TimedOut`] after an idle window
///
/// Processors turn the timeout into a call to the handler's `on_timeout` hook, which
/// gives handlers a periodic idle callback.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    parking: Parking,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    /// Create a new timeout blocking wait strategy
    pub fn new(timeout: Duration) -> Self {
        Self {
            parking: Parking::default(),
            timeout,
        }
    }

    /// The configured idle window
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        let deadline = Instant::now() + self.timeout;
        if let Some(signal) =
            self.parking
                .park_until_published(sequence, cursor, barrier, Some(deadline), None)
        {
            return signal;
        }
        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        self.parking.wake_all();
    }
}

/// Timeout blocking strategy that elides the broadcast when no consumer is parked
#[derive(Debug)]
pub struct LiteTimeoutBlockingWaitStrategy {
    parking: Parking,
    signal_needed: AtomicBool,
    timeout: Duration,
}

impl LiteTimeoutBlockingWaitStrategy {
    /// Create a new lite timeout blocking wait strategy
    pub fn new(timeout: Duration) -> Self {
        Self {
            parking: Parking::default(),
            signal_needed: AtomicBool::new(false),
            timeout,
        }
    }

    /// The configured idle window
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for LiteTimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> WaitResult {
        let deadline = Instant::now() + self.timeout;
        if let Some(signal) = self.parking.park_until_published(
            sequence,
            cursor,
            barrier,
            Some(deadline),
            Some(&self.signal_needed),
        ) {
            return signal;
        }
        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        if self.signal_needed.swap(false, Ordering::SeqCst) {
            self.parking.wake_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::wait_strategy::test_support::{cursor_at, AlertFlag};
    use std::sync::Arc;
    use std::thread;

    fn assert_wakes_on_publish(strategy: Arc<dyn WaitStrategy>) {
        let (cursor, dependent) = cursor_at(-1);
        let barrier = AlertFlag::default();

        let publisher = {
            let cursor = Arc::clone(&cursor);
            let strategy = Arc::clone(&strategy);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cursor.set(0);
                strategy.signal_all_when_blocking();
            })
        };

        let result = strategy.wait_for(0, &cursor, &dependent, &barrier);
        publisher.join().unwrap();
        assert_eq!(result, WaitResult::Available(0));
    }

    fn assert_alert_wakes_parked_waiter(strategy: Arc<dyn WaitStrategy>) {
        let (cursor, dependent) = cursor_at(-1);
        let barrier = Arc::new(AlertFlag::default());

        let alerter = {
            let barrier = Arc::clone(&barrier);
            let strategy = Arc::clone(&strategy);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                barrier.alert();
                strategy.signal_all_when_blocking();
            })
        };

        let start = Instant::now();
        let result = strategy.wait_for(0, &cursor, &dependent, barrier.as_ref());
        alerter.join().unwrap();

        assert_eq!(result, WaitResult::Alerted);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_blocking_strategies_wake_on_publish() {
        assert_wakes_on_publish(Arc::new(BlockingWaitStrategy::new()));
        assert_wakes_on_publish(Arc::new(LiteBlockingWaitStrategy::new()));
        assert_wakes_on_publish(Arc::new(TimeoutBlockingWaitStrategy::new(
            Duration::from_secs(5),
        )));
        assert_wakes_on_publish(Arc::new(LiteTimeoutBlockingWaitStrategy::new(
            Duration::from_secs(5),
        )));
    }

    #[test]
    fn test_blocking_strategies_wake_on_alert() {
        assert_alert_wakes_parked_waiter(Arc::new(BlockingWaitStrategy::new()));
        assert_alert_wakes_parked_waiter(Arc::new(LiteBlockingWaitStrategy::new()));
    }

    #[test]
    fn test_timeout_reported_after_configured_window() {
        let timeout = Duration::from_millis(50);
        let strategies: Vec<Box<dyn WaitStrategy>> = vec![
            Box::new(TimeoutBlockingWaitStrategy::new(timeout)),
            Box::new(LiteTimeoutBlockingWaitStrategy::new(timeout)),
        ];

        for strategy in strategies {
            let (cursor, dependent) = cursor_at(5);
            let barrier = AlertFlag::default();

            let start = Instant::now();
            let result = strategy.wait_for(6, &cursor, &dependent, &barrier);
            assert_eq!(result, WaitResult::TimedOut);
            assert!(start.elapsed() >= timeout);
        }
    }

    #[test]
    fn test_lite_signal_skips_lock_when_nobody_waits() {
        let strategy = LiteBlockingWaitStrategy::new();
        strategy.signal_all_when_blocking();
        assert!(!strategy.signal_needed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_waits_for_dependent_after_cursor() {
        let strategy = Arc::new(BlockingWaitStrategy::new());
        let cursor = Arc::new(Sequence::new(10));
        let upstream = Arc::new(Sequence::new(-1));
        let dependent = DependentSequence::new(&cursor, &[Arc::clone(&upstream)]);
        let barrier = AlertFlag::default();

        let advancer = {
            let upstream = Arc::clone(&upstream);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                upstream.set(3);
            })
        };

        let result = strategy.wait_for(2, &cursor, &dependent, &barrier);
        advancer.join().unwrap();
        assert_eq!(result, WaitResult::Available(3));
    }
}
