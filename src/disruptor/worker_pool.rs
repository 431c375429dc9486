//! Worker Pool Implementation
//!
//! A pool of [`WorkProcessor`]s sharing one work counter. The producer is gated by
//! every worker's sequence plus the shared counter, i.e. by the slowest worker.

use crate::disruptor::{
    get_minimum_sequence, DisruptorError, EventProcessor, ExceptionHandler, Executor, Result,
    RingBuffer, Sequence, SequenceBarrier, WorkHandler, WorkProcessor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Competing consumers: every published event is handled by exactly one worker
pub struct WorkerPool<T> {
    work_sequence: Arc<Sequence>,
    ring_buffer: Arc<RingBuffer<T>>,
    work_processors: Vec<Arc<dyn EventProcessor>>,
    started: AtomicBool,
}

impl<T> WorkerPool<T>
where
    T: Send + Sync + 'static,
{
    /// Create a worker pool with one worker per handler
    ///
    /// # Arguments
    /// * `ring_buffer` - The buffer to read from
    /// * `sequence_barrier` - The barrier shared by all workers
    /// * `exception_handler` - Receives failures from every worker
    /// * `work_handlers` - One handler per worker
    pub fn new<H>(
        ring_buffer: Arc<RingBuffer<T>>,
        sequence_barrier: Arc<dyn SequenceBarrier>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_handlers: Vec<H>,
    ) -> Self
    where
        H: WorkHandler<T> + 'static,
    {
        let work_sequence = Arc::new(Sequence::default());
        let work_processors = work_handlers
            .into_iter()
            .map(|handler| {
                Arc::new(WorkProcessor::new(
                    Arc::clone(&ring_buffer),
                    Arc::clone(&sequence_barrier),
                    handler,
                    Arc::clone(&exception_handler),
                    Arc::clone(&work_sequence),
                )) as Arc<dyn EventProcessor>
            })
            .collect();

        Self {
            work_sequence,
            ring_buffer,
            work_processors,
            started: AtomicBool::new(false),
        }
    }

    /// Every worker's sequence plus the shared work counter
    ///
    /// These are the pool's gating sequences.
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.work_processors
            .iter()
            .map(|processor| processor.get_sequence())
            .chain(std::iter::once(Arc::clone(&self.work_sequence)))
            .collect()
    }

    /// Number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.work_processors.len()
    }

    /// Start every worker on `executor`
    ///
    /// Workers begin after the current cursor: events published before the pool
    /// started are not delivered.
    ///
    /// # Errors
    /// `AlreadyStarted` if the pool is running, `Spawn` if a thread could not start
    pub fn start(&self, executor: &dyn Executor) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DisruptorError::AlreadyStarted);
        }

        let cursor = self.ring_buffer.cursor();
        self.work_sequence.set(cursor);

        for (index, processor) in self.work_processors.iter().enumerate() {
            processor.get_sequence().set(cursor);
            let processor = Arc::clone(processor);
            executor.execute(
                &format!("worker-{index}"),
                Box::new(move || {
                    if let Err(error) = processor.run() {
                        tracing::error!(%error, "work processor failed to run");
                    }
                }),
            )?;
        }

        tracing::info!(
            workers = self.work_processors.len(),
            cursor,
            "worker pool started"
        );
        Ok(())
    }

    /// Wait until every published event is handled, then halt the workers
    pub fn drain_and_halt(&self) {
        let worker_sequences = self.worker_sequences();
        while self.ring_buffer.cursor() > get_minimum_sequence(&worker_sequences, i64::MAX) {
            thread::yield_now();
        }

        tracing::debug!(cursor = self.ring_buffer.cursor(), "worker pool drained");
        self.halt();
    }

    /// Halt every worker immediately
    pub fn halt(&self) {
        for processor in &self.work_processors {
            processor.halt();
        }
        self.started.store(false, Ordering::Release);
    }

    /// Whether the pool has been started and not halted
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn processors(&self) -> &[Arc<dyn EventProcessor>] {
        &self.work_processors
    }
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("work_sequence", &self.work_sequence)
            .field("workers", &self.work_processors.len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}
