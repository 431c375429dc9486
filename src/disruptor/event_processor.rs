//! Event Processor implementation for the Disruptor
//!
//! Event processors own the consumer loop. A [`BatchEventProcessor`] reads every
//! published event in order, hands it to its [`EventHandler`], and advances its
//! own sequence once per batch so that downstream stages and the producer see
//! progress without per-event atomic writes.

use crate::disruptor::{
    DisruptorError, EventHandler, ExceptionHandler, FatalExceptionHandler, Result, RingBuffer,
    Sequence, SequenceBarrier, WaitResult,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// A long-running consumer loop
pub trait EventProcessor: Send + Sync {
    /// The sequence this processor has completed up to
    fn get_sequence(&self) -> Arc<Sequence>;

    /// Ask the loop to stop at its next wait
    fn halt(&self);

    /// Check if the processor is running
    fn is_running(&self) -> bool;

    /// Run the loop on the calling thread until halted
    ///
    /// # Errors
    /// `AlreadyRunning` if the processor is already running on another thread
    fn run(&self) -> Result<()>;
}

/// Builds a custom processor for a place in the consumer graph
///
/// The returned processor must not overtake `barrier_sequences`; build its
/// barrier with [`RingBuffer::new_barrier`] over them.
pub trait EventProcessorFactory<T> {
    fn create_event_processor(
        &self,
        ring_buffer: &Arc<RingBuffer<T>>,
        barrier_sequences: &[Arc<Sequence>],
    ) -> Arc<dyn EventProcessor>;
}

impl<T, F> EventProcessorFactory<T> for F
where
    F: Fn(&Arc<RingBuffer<T>>, &[Arc<Sequence>]) -> Arc<dyn EventProcessor>,
{
    fn create_event_processor(
        &self,
        ring_buffer: &Arc<RingBuffer<T>>,
        barrier_sequences: &[Arc<Sequence>],
    ) -> Arc<dyn EventProcessor> {
        self(ring_buffer, barrier_sequences)
    }
}

pub(crate) const IDLE: u8 = 0;
pub(crate) const HALTED: u8 = 1;
pub(crate) const RUNNING: u8 = 2;

/// Returns a processor to IDLE when its loop exits, including by panic
pub(crate) struct IdleOnExit<'a>(pub(crate) &'a AtomicU8);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

/// Batch event processor: exclusive, in-order consumer of the full stream
pub struct BatchEventProcessor<T, H> {
    sequence: Arc<Sequence>,
    ring_buffer: Arc<RingBuffer<T>>,
    sequence_barrier: Arc<dyn SequenceBarrier>,
    event_handler: Mutex<H>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler<T>>>,
    state: AtomicU8,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    /// Create a new batch event processor
    ///
    /// The handler receives this processor's sequence through
    /// [`EventHandler::set_sequence_callback`].
    ///
    /// # Arguments
    /// * `ring_buffer` - The buffer to read from
    /// * `sequence_barrier` - The barrier gating this processor
    /// * `event_handler` - The handler to dispatch events to
    pub fn new(
        ring_buffer: Arc<RingBuffer<T>>,
        sequence_barrier: Arc<dyn SequenceBarrier>,
        mut event_handler: H,
    ) -> Self {
        let sequence = Arc::new(Sequence::default());
        event_handler.set_sequence_callback(Arc::clone(&sequence));

        Self {
            sequence,
            ring_buffer,
            sequence_barrier,
            event_handler: Mutex::new(event_handler),
            exception_handler: RwLock::new(Arc::new(FatalExceptionHandler)),
            state: AtomicU8::new(IDLE),
        }
    }

    /// Replace the exception handler; defaults to [`FatalExceptionHandler`]
    pub fn set_exception_handler(&self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        *self.exception_handler.write() = exception_handler;
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler<T>> {
        Arc::clone(&self.exception_handler.read())
    }

    fn process_events(&self, handler: &mut H) {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            match self.sequence_barrier.wait_for(next_sequence) {
                WaitResult::Available(available_sequence) => {
                    if available_sequence < next_sequence {
                        continue;
                    }

                    for sequence in next_sequence..=available_sequence {
                        // SAFETY: the barrier reported `sequence` as published and
                        // producers cannot reclaim it until our sequence passes it
                        let event = unsafe { self.ring_buffer.get(sequence) };
                        if let Err(error) =
                            handler.on_event(event, sequence, sequence == available_sequence)
                        {
                            self.exception_handler()
                                .handle_event_exception(error, sequence, Some(event));
                        }
                    }

                    self.sequence.set(available_sequence);
                    next_sequence = available_sequence + 1;
                }
                WaitResult::TimedOut => {
                    let sequence = self.sequence.get();
                    if let Err(error) = handler.on_timeout(sequence) {
                        self.exception_handler()
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
            self.exception_handler().handle_on_start_exception(error);
        }
    }

    fn notify_shutdown(&self, handler: &mut H) {
        if let Err(error) = handler.on_shutdown() {
            self.exception_handler().handle_on_shutdown_exception(error);
        }
    }
}

impl<T, H> EventProcessor for BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
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
                // Halted before the loop ever started
                let _idle = IdleOnExit(&self.state);
                let mut handler = self.event_handler.lock();
                self.notify_start(&mut handler);
                self.notify_shutdown(&mut handler);
                return Ok(());
            }
        }

        let _idle = IdleOnExit(&self.state);
        let mut handler = self.event_handler.lock();

        self.sequence_barrier.clear_alert();
        self.notify_start(&mut handler);
        tracing::debug!(sequence = self.sequence.get(), "batch event processor started");

        if self.state.load(Ordering::Acquire) == RUNNING {
            self.process_events(&mut handler);
        }

        tracing::debug!(sequence = self.sequence.get(), "batch event processor stopped");
        self.notify_shutdown(&mut handler);
        Ok(())
    }
}

impl<T, H> std::fmt::Debug for BatchEventProcessor<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEventProcessor")
            .field("sequence", &self.sequence)
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish()
    }
}
