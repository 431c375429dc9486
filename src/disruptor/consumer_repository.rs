//! Consumer Repository
//!
//! Arena of every consumer wired into a [`crate::disruptor::Disruptor`]. Wiring
//! calls return [`ConsumerId`]s into this arena instead of references, so groups
//! stay plain values and the graph remains the single owner of its consumers.

use crate::disruptor::{
    get_minimum_sequence, EventProcessor, ExceptionHandlerWrapper, Executor, Result, Sequence,
    SequenceBarrier, WorkerPool,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Index of a consumer within its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(usize);

impl ConsumerId {
    /// Position of the consumer in wiring order
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

enum ConsumerKind<T> {
    Processor {
        processor: Arc<dyn EventProcessor>,
        /// True from start until the processor's loop returns
        live: Arc<AtomicBool>,
    },
    WorkerPool(WorkerPool<T>),
}

struct ConsumerInfo<T> {
    kind: ConsumerKind<T>,
    barrier: Option<Arc<dyn SequenceBarrier>>,
    exception_handler: Option<Arc<ExceptionHandlerWrapper<T>>>,
    end_of_chain: bool,
}

impl<T> ConsumerInfo<T>
where
    T: Send + Sync + 'static,
{
    fn sequences(&self) -> Vec<Arc<Sequence>> {
        match &self.kind {
            ConsumerKind::Processor { processor, .. } => vec![processor.get_sequence()],
            ConsumerKind::WorkerPool(pool) => pool.worker_sequences(),
        }
    }

    fn is_running(&self) -> bool {
        match &self.kind {
            ConsumerKind::Processor { live, .. } => live.load(Ordering::Acquire),
            ConsumerKind::WorkerPool(pool) => pool.is_running(),
        }
    }

    fn owns(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequences().iter().any(|s| Arc::ptr_eq(s, sequence))
    }
}

/// Clears the live flag when a processor task ends, including by panic
struct LiveGuard(Arc<AtomicBool>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Arena of the processors and worker pools of one graph
pub struct ConsumerRepository<T> {
    consumers: Vec<ConsumerInfo<T>>,
}

impl<T> ConsumerRepository<T>
where
    T: Send + Sync + 'static,
{
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
        }
    }

    fn push(&mut self, info: ConsumerInfo<T>) -> ConsumerId {
        self.consumers.push(info);
        ConsumerId(self.consumers.len() - 1)
    }

    /// Register an event processor as a new end of chain
    pub fn add_processor(
        &mut self,
        processor: Arc<dyn EventProcessor>,
        barrier: Option<Arc<dyn SequenceBarrier>>,
        exception_handler: Option<Arc<ExceptionHandlerWrapper<T>>>,
    ) -> ConsumerId {
        self.push(ConsumerInfo {
            kind: ConsumerKind::Processor {
                processor,
                live: Arc::new(AtomicBool::new(false)),
            },
            barrier,
            exception_handler,
            end_of_chain: true,
        })
    }

    /// Register a worker pool as a new end of chain
    pub fn add_worker_pool(
        &mut self,
        pool: WorkerPool<T>,
        barrier: Arc<dyn SequenceBarrier>,
        exception_handler: Arc<ExceptionHandlerWrapper<T>>,
    ) -> ConsumerId {
        self.push(ConsumerInfo {
            kind: ConsumerKind::WorkerPool(pool),
            barrier: Some(barrier),
            exception_handler: Some(exception_handler),
            end_of_chain: true,
        })
    }

    /// Number of registered consumers
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether no consumer has been registered
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Sequences of a consumer; a worker pool reports all of its gating sequences
    pub fn sequences_for(&self, id: ConsumerId) -> Option<Vec<Arc<Sequence>>> {
        self.consumers.get(id.0).map(ConsumerInfo::sequences)
    }

    /// The barrier a consumer waits on, if it was created by the graph
    pub fn barrier_for(&self, id: ConsumerId) -> Option<Arc<dyn SequenceBarrier>> {
        self.consumers.get(id.0).and_then(|info| info.barrier.clone())
    }

    /// The switchable exception handler of a consumer, if the graph installed one
    pub fn exception_handler_for(&self, id: ConsumerId) -> Option<Arc<ExceptionHandlerWrapper<T>>> {
        self.consumers
            .get(id.0)
            .and_then(|info| info.exception_handler.clone())
    }

    /// Whether a consumer is live
    pub fn is_running(&self, id: ConsumerId) -> bool {
        self.consumers
            .get(id.0)
            .is_some_and(ConsumerInfo::is_running)
    }

    /// Whether a consumer has no downstream dependents
    pub fn is_end_of_chain(&self, id: ConsumerId) -> bool {
        self.consumers.get(id.0).is_some_and(|info| info.end_of_chain)
    }

    /// Mark the owners of `barrier_sequences` as having a downstream stage
    pub fn unmark_end_of_chain(&mut self, barrier_sequences: &[Arc<Sequence>]) {
        for info in &mut self.consumers {
            if barrier_sequences.iter().any(|sequence| info.owns(sequence)) {
                info.end_of_chain = false;
            }
        }
    }

    /// Sequences of every end-of-chain consumer
    ///
    /// # Arguments
    /// * `include_stopped` - Also report consumers that are not running
    pub fn last_sequences_in_chain(&self, include_stopped: bool) -> Vec<Arc<Sequence>> {
        self.consumers
            .iter()
            .filter(|info| info.end_of_chain && (include_stopped || info.is_running()))
            .flat_map(ConsumerInfo::sequences)
            .collect()
    }

    /// Whether some end-of-chain consumer is behind `cursor`
    pub fn has_backlog(&self, cursor: i64, include_stopped: bool) -> bool {
        let last = self.last_sequences_in_chain(include_stopped);
        !last.is_empty() && cursor > get_minimum_sequence(&last, i64::MAX)
    }

    /// Start every consumer on `executor`
    pub fn start_all(&self, executor: &dyn Executor) -> Result<()> {
        for (index, info) in self.consumers.iter().enumerate() {
            match &info.kind {
                ConsumerKind::Processor { processor, live } => {
                    live.store(true, Ordering::Release);
                    let guard = LiveGuard(Arc::clone(live));
                    let processor = Arc::clone(processor);
                    let task = Box::new(move || {
                        let _live = guard;
                        if let Err(error) = processor.run() {
                            tracing::error!(%error, "event processor failed to run");
                        }
                    });

                    // A task that fails to spawn is dropped, which clears the flag again
                    executor.execute(&format!("processor-{index}"), task)?;
                }
                ConsumerKind::WorkerPool(pool) => pool.start(executor)?,
            }
        }
        Ok(())
    }

    /// Halt every consumer
    pub fn halt_all(&self) {
        for info in &self.consumers {
            match &info.kind {
                ConsumerKind::Processor { processor, .. } => processor.halt(),
                ConsumerKind::WorkerPool(pool) => pool.halt(),
            }
        }
    }

    /// Every event processor, including the workers of each pool
    pub fn processors(&self) -> Vec<Arc<dyn EventProcessor>> {
        self.consumers
            .iter()
            .flat_map(|info| match &info.kind {
                ConsumerKind::Processor { processor, .. } => vec![Arc::clone(processor)],
                ConsumerKind::WorkerPool(pool) => pool.processors().to_vec(),
            })
            .collect()
    }
}

impl<T> Default for ConsumerRepository<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ConsumerRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerRepository")
            .field("consumers", &self.consumers.len())
            .finish()
    }
}
