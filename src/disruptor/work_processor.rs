//! Work Processor Implementation
//!
//! A work processor competes with its siblings in a [`crate::disruptor::WorkerPool`]
//! for events. Workers claim sequences one at a time from a shared work counter
//! with a CAS, so each published event is handled by exactly one worker. A
//! sequence is only claimed once the barrier reports it published, so the counter
//! never runs ahead of the cursor. A worker whose handler fails does not retry
//! the event.

use crate::disruptor::event_processor::{IdleOnExit, HALTED, IDLE, RUNNING};
use crate::disruptor::{
    DisruptorError, EventProcessor, EventReleaser, ExceptionHandler, Result, RingBuffer,
    Sequence, SequenceBarrier, WaitResult, WorkHandler,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// One competing consumer of a worker pool
pub struct WorkProcessor<T, H> {
    sequence: Arc<Sequence>,
    work_sequence: Arc<Sequence>,
    ring_buffer: Arc<RingBuffer<T>>,
    sequence_barrier: Arc<dyn SequenceBarrier>,
    work_handler: Mutex<H>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    state: AtomicU8,
}

impl<T, H> WorkProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: WorkHandler<T>,
{
    /// Create a new work processor
    ///
    /// # Arguments
    /// * `ring_buffer` - The buffer to read from
    /// * `sequence_barrier` - The barrier gating the pool
    /// * `work_handler` - Receives the events this worker wins; gets an
    ///   [`EventReleaser`] for this worker's sequence
    /// * `exception_handler` - Receives handler failures
    /// * `work_sequence` - The counter shared by every worker of the pool
    pub fn new(
        ring_buffer: Arc<RingBuffer<T>>,
        sequence_barrier: Arc<dyn SequenceBarrier>,
        mut work_handler: H,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_sequence: Arc<Sequence>,
    ) -> Self {
        let sequence = Arc::new(Sequence::default());
        work_handler.set_event_releaser(EventReleaser::new(Arc::clone(&sequence)));

        Self {
            sequence,
            work_sequence,
            ring_buffer,
            sequence_barrier,
            work_handler: Mutex::new(work_handler),
            exception_handler,
            state: AtomicU8::new(IDLE),
        }
    }

    fn process_events(&self, handler: &mut H) {
        let mut cached_available_sequence = i64::MIN;

        loop {
            let next_sequence = self.work_sequence.get() + 1;
            self.sequence.set(next_sequence - 1);

            if cached_available_sequence >= next_sequence {
                // Losing the race means a sibling took it; retry with the new counter
                if !self
                    .work_sequence
                    .compare_and_set(next_sequence - 1, next_sequence)
                {
                    continue;
                }

                // SAFETY: the barrier reported `next_sequence` as published, the CAS
                // made this worker its only reader and this worker's sequence keeps
                // the producer from reclaiming it
                let event = unsafe { self.ring_buffer.get(next_sequence) };
                if let Err(error) = handler.on_event(event, next_sequence) {
                    self.exception_handler
                        .handle_event_exception(error, next_sequence, Some(event));
                }
                continue;
            }

            match self.sequence_barrier.wait_for(next_sequence) {
                WaitResult::Available(available) => cached_available_sequence = available,
                WaitResult::TimedOut => {
                    let sequence = self.sequence.get();
                    if let Err(error) = handler.on_timeout(sequence) {
                        self.exception_handler
                            .handle_event_exception(error, sequence, None);
                    }
                }
                WaitResult::Alerted => {
                    if self.state.load(Ordering::Acquire) != RUNNING {
                        break;
                    }
                }
            }
        }
    }

    fn notify_start(&self, handler: &mut H) {
        if let Err(error) = handler.on_start() {
            self.exception_handler.handle_on_start_exception(error);
        }
    }

    fn notify_shutdown(&self, handler: &mut H) {
        if let Err(error) = handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(error);
        }
    }
}

impl<T, H> EventProcessor for WorkProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: WorkHandler<T>,
{
    fn get_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    fn halt(&self) {
        self.state.store(HALTED, Ordering::Release);
        self.sequence_barrier.alert();
    }

    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) != IDLE
    }

    fn run(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(RUNNING) => return Err(DisruptorError::AlreadyRunning),
            Err(_) => {
                let _idle = IdleOnExit(&self.state);
                let mut handler = self.work_handler.lock();
                self.notify_start(&mut handler);
                self.notify_shutdown(&mut handler);
                return Ok(());
            }
        }

        let _idle = IdleOnExit(&self.state);
        let mut handler = self.work_handler.lock();

        self.sequence_barrier.clear_alert();
        self.notify_start(&mut handler);

        if self.state.load(Ordering::Acquire) == RUNNING {
            self.process_events(&mut handler);
        }

        tracing::debug!(sequence = self.sequence.get(), "work processor stopped");
        self.notify_shutdown(&mut handler);
        Ok(())
    }
}
