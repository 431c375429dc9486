//! Disruptor Consumer Graph
//!
//! This module provides [`Disruptor`], the entry point for wiring handlers into a
//! dependency graph over one ring buffer. Every wiring call creates a barrier over
//! the upstream stages, registers the new stage's sequences as producer gating
//! sequences and removes the upstream sequences it supersedes, so the producer
//! is only ever gated by the ends of the chain.
//!
//! Wiring calls return an [`EventHandlerGroup`], a plain value holding sequence
//! handles and [`ConsumerId`]s into the graph's consumer arena.

use crate::disruptor::{
    BatchEventProcessor, ConsumerId, ConsumerRepository, DisruptorConfig, DisruptorError,
    EventFactory, EventHandler, EventProcessor, EventProcessorFactory, EventTranslator,
    EventTranslatorOneArg, ExceptionHandler, ExceptionHandlerWrapper, Executor, ProducerType,
    Result, RingBuffer, Sequence, SequenceBarrier, WaitStrategy, WorkHandler, WorkerPool,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A stage of the consumer graph, used as the upstream of later stages
///
/// # Examples
/// ```
/// use ringbatch::disruptor::EventHandlerGroup;
///
/// let empty = EventHandlerGroup::default();
/// assert!(empty.is_empty());
/// assert_eq!(empty.and(&empty).len(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventHandlerGroup {
    sequences: Vec<Arc<Sequence>>,
    consumer_ids: Vec<ConsumerId>,
}

impl EventHandlerGroup {
    fn new(sequences: Vec<Arc<Sequence>>, consumer_ids: Vec<ConsumerId>) -> Self {
        Self {
            sequences,
            consumer_ids,
        }
    }

    /// A group containing the consumers of both groups
    pub fn and(&self, other: &EventHandlerGroup) -> EventHandlerGroup {
        let mut merged = self.clone();
        merged.sequences.extend(other.sequences.iter().cloned());
        merged.consumer_ids.extend(other.consumer_ids.iter().copied());
        merged
    }

    /// The sequences a downstream stage of this group waits on
    pub fn sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }

    /// The consumers of this group
    pub fn consumer_ids(&self) -> &[ConsumerId] {
        &self.consumer_ids
    }

    /// Number of consumers in the group
    pub fn len(&self) -> usize {
        self.consumer_ids.len()
    }

    /// Whether the group has no consumers
    pub fn is_empty(&self) -> bool {
        self.consumer_ids.is_empty()
    }
}

/// A ring buffer together with the graph of consumers reading from it
///
/// # Type Parameters
/// * `T` - The event type stored in the ring buffer
///
/// # Examples
/// ```
/// use ringbatch::disruptor::{
///     BlockingWaitStrategy, ClosureEventHandler, DefaultEventFactory, Disruptor, ProducerType,
///     ThreadExecutor,
/// };
/// use std::sync::Arc;
///
/// let executor = Arc::new(ThreadExecutor::new());
/// let mut disruptor = Disruptor::new(
///     DefaultEventFactory::<i64>::new(),
///     1024,
///     ProducerType::Single,
///     Arc::new(BlockingWaitStrategy::new()),
///     executor.clone(),
/// )
/// .unwrap();
///
/// disruptor
///     .handle_events_with(vec![ClosureEventHandler::new(|_event: &i64, _sequence, _eob| Ok(()))])
///     .unwrap();
/// disruptor.start().unwrap();
/// disruptor.publish_event(|event: &mut i64, sequence: i64| *event = sequence).unwrap();
/// disruptor.shutdown();
/// executor.join_all();
/// ```
pub struct Disruptor<T>
where
    T: Send + Sync + 'static,
{
    ring_buffer: Arc<RingBuffer<T>>,
    executor: Arc<dyn Executor>,
    consumer_repository: ConsumerRepository<T>,
    exception_handler: Arc<ExceptionHandlerWrapper<T>>,
    started: AtomicBool,
}

impl<T> Disruptor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new Disruptor
    ///
    /// # Arguments
    /// * `event_factory` - Called once per slot to pre-populate the ring buffer
    /// * `buffer_size` - Size of the ring buffer (must be a power of 2)
    /// * `producer_type` - Whether to use single or multi producer claiming
    /// * `wait_strategy` - How consumers idle while waiting for events
    /// * `executor` - Runs one long-lived task per processor
    ///
    /// # Errors
    /// Returns an error if the buffer size is invalid
    pub fn new<F>(
        event_factory: F,
        buffer_size: usize,
        producer_type: ProducerType,
        wait_strategy: Arc<dyn WaitStrategy>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let ring_buffer =
            RingBuffer::create(producer_type, event_factory, buffer_size, wait_strategy)?;
        Ok(Self::with_ring_buffer(Arc::new(ring_buffer), executor))
    }

    /// Create a Disruptor from a validated configuration
    ///
    /// Processor threads are spawned by a [`crate::disruptor::ThreadExecutor`] named
    /// and pinned as the configuration describes.
    pub fn from_config<F>(config: &DisruptorConfig, event_factory: F) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let ring_buffer = config.build_ring_buffer(event_factory)?;
        let executor = config.build_executor()?;
        Ok(Self::with_ring_buffer(
            Arc::new(ring_buffer),
            Arc::new(executor),
        ))
    }

    /// Build a graph over an existing ring buffer
    pub fn with_ring_buffer(ring_buffer: Arc<RingBuffer<T>>, executor: Arc<dyn Executor>) -> Self {
        Self {
            ring_buffer,
            executor,
            consumer_repository: ConsumerRepository::new(),
            exception_handler: Arc::new(ExceptionHandlerWrapper::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Consume every event with `handlers`, each on its own processor
    ///
    /// The new processors depend only on publication.
    ///
    /// # Errors
    /// `AlreadyStarted` once the graph has been started
    pub fn handle_events_with<H>(&mut self, handlers: Vec<H>) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
    {
        self.create_event_processors(&[], handlers)
    }

    /// Consume every event with `handlers` after `group` has processed it
    pub fn handle_events_with_after<H>(
        &mut self,
        group: &EventHandlerGroup,
        handlers: Vec<H>,
    ) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
    {
        self.create_event_processors(group.sequences(), handlers)
    }

    /// Share events between `handlers`: each event is handled by exactly one of them
    pub fn handle_events_with_worker_pool<H>(
        &mut self,
        handlers: Vec<H>,
    ) -> Result<EventHandlerGroup>
    where
        H: WorkHandler<T> + 'static,
    {
        self.create_worker_pool(&[], handlers)
    }

    /// Share events between `handlers` after `group` has processed them
    pub fn handle_events_with_worker_pool_after<H>(
        &mut self,
        group: &EventHandlerGroup,
        handlers: Vec<H>,
    ) -> Result<EventHandlerGroup>
    where
        H: WorkHandler<T> + 'static,
    {
        self.create_worker_pool(group.sequences(), handlers)
    }

    /// Add processors built outside the graph
    ///
    /// Their barriers are the caller's responsibility; the graph only gates the
    /// producer on them and runs them. Use [`Disruptor::ring_buffer`] to build
    /// their barriers.
    pub fn handle_events_with_processors(
        &mut self,
        processors: Vec<Arc<dyn EventProcessor>>,
    ) -> Result<EventHandlerGroup> {
        self.check_not_started()?;
        Ok(self.add_processors(&[], processors))
    }

    /// Add custom processors built by `factories`, depending only on publication
    pub fn handle_events_with_processor_factories<F>(
        &mut self,
        factories: Vec<F>,
    ) -> Result<EventHandlerGroup>
    where
        F: EventProcessorFactory<T>,
    {
        self.create_processors_from_factories(&[], factories)
    }

    /// Add custom processors built by `factories` after `group`
    ///
    /// Each factory receives the sequences of `group` to build its barrier over.
    /// The upstream group stops gating the producer.
    pub fn handle_events_with_processor_factories_after<F>(
        &mut self,
        group: &EventHandlerGroup,
        factories: Vec<F>,
    ) -> Result<EventHandlerGroup>
    where
        F: EventProcessorFactory<T>,
    {
        self.create_processors_from_factories(group.sequences(), factories)
    }

    fn create_processors_from_factories<F>(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        factories: Vec<F>,
    ) -> Result<EventHandlerGroup>
    where
        F: EventProcessorFactory<T>,
    {
        self.check_not_started()?;

        let processors = factories
            .iter()
            .map(|factory| factory.create_event_processor(&self.ring_buffer, barrier_sequences))
            .collect();
        let group = self.add_processors(barrier_sequences, processors);
        tracing::debug!(
            processors = group.len(),
            upstream = barrier_sequences.len(),
            "wired custom processors"
        );
        Ok(group)
    }

    fn add_processors(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        processors: Vec<Arc<dyn EventProcessor>>,
    ) -> EventHandlerGroup {
        let mut sequences = Vec::with_capacity(processors.len());
        let mut consumer_ids = Vec::with_capacity(processors.len());
        for processor in processors {
            sequences.push(processor.get_sequence());
            consumer_ids.push(self.consumer_repository.add_processor(processor, None, None));
        }

        self.update_gating_sequences_for_next_in_chain(barrier_sequences, &sequences);
        EventHandlerGroup::new(sequences, consumer_ids)
    }

    fn create_event_processors<H>(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        handlers: Vec<H>,
    ) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
    {
        self.check_not_started()?;

        let barrier: Arc<dyn SequenceBarrier> =
            Arc::new(self.ring_buffer.new_barrier(barrier_sequences));
        let mut sequences = Vec::with_capacity(handlers.len());
        let mut consumer_ids = Vec::with_capacity(handlers.len());

        for handler in handlers {
            let processor = BatchEventProcessor::new(
                Arc::clone(&self.ring_buffer),
                Arc::clone(&barrier),
                handler,
            );
            let exception_handler = self.consumer_exception_handler();
            processor.set_exception_handler(
                Arc::clone(&exception_handler) as Arc<dyn ExceptionHandler<T>>
            );

            let processor: Arc<dyn EventProcessor> = Arc::new(processor);
            sequences.push(processor.get_sequence());
            consumer_ids.push(self.consumer_repository.add_processor(
                processor,
                Some(Arc::clone(&barrier)),
                Some(exception_handler),
            ));
        }

        self.update_gating_sequences_for_next_in_chain(barrier_sequences, &sequences);
        tracing::debug!(
            processors = consumer_ids.len(),
            upstream = barrier_sequences.len(),
            "wired event processors"
        );
        Ok(EventHandlerGroup::new(sequences, consumer_ids))
    }

    fn create_worker_pool<H>(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        handlers: Vec<H>,
    ) -> Result<EventHandlerGroup>
    where
        H: WorkHandler<T> + 'static,
    {
        self.check_not_started()?;

        let barrier: Arc<dyn SequenceBarrier> =
            Arc::new(self.ring_buffer.new_barrier(barrier_sequences));
        let exception_handler = self.consumer_exception_handler();
        let pool = WorkerPool::new(
            Arc::clone(&self.ring_buffer),
            Arc::clone(&barrier),
            Arc::clone(&exception_handler) as Arc<dyn ExceptionHandler<T>>,
            handlers,
        );

        let sequences = pool.worker_sequences();
        let id = self
            .consumer_repository
            .add_worker_pool(pool, barrier, exception_handler);

        self.update_gating_sequences_for_next_in_chain(barrier_sequences, &sequences);
        tracing::debug!(upstream = barrier_sequences.len(), "wired worker pool");
        Ok(EventHandlerGroup::new(sequences, vec![id]))
    }

    fn consumer_exception_handler(&self) -> Arc<ExceptionHandlerWrapper<T>> {
        Arc::new(ExceptionHandlerWrapper::with_delegate(
            Arc::clone(&self.exception_handler) as Arc<dyn ExceptionHandler<T>>
        ))
    }

    fn update_gating_sequences_for_next_in_chain(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        processor_sequences: &[Arc<Sequence>],
    ) {
        if processor_sequences.is_empty() {
            return;
        }

        self.ring_buffer.add_gating_sequences(processor_sequences);
        for sequence in barrier_sequences {
            self.ring_buffer.remove_gating_sequence(sequence);
        }
        self.consumer_repository.unmark_end_of_chain(barrier_sequences);
    }

    fn check_not_started(&self) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(DisruptorError::AlreadyStarted);
        }
        Ok(())
    }

    /// Set the exception handler of every consumer that has no explicit one
    ///
    /// Applies to consumers wired before and after this call.
    pub fn set_default_exception_handler(&self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        self.exception_handler.switch_to(exception_handler);
    }

    /// Set the exception handler of the consumers in `group`
    pub fn handle_exceptions_for(
        &self,
        group: &EventHandlerGroup,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
    ) {
        for &id in group.consumer_ids() {
            match self.consumer_repository.exception_handler_for(id) {
                Some(wrapper) => wrapper.switch_to(Arc::clone(&exception_handler)),
                None => tracing::warn!(
                    consumer = %id,
                    "consumer was not wired by the graph, exception handler left unchanged"
                ),
            }
        }
    }

    /// Start every consumer
    ///
    /// # Errors
    /// `AlreadyStarted` on the second call, `Spawn` if the executor fails
    pub fn start(&self) -> Result<Arc<RingBuffer<T>>> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DisruptorError::AlreadyStarted);
        }

        self.consumer_repository.start_all(self.executor.as_ref())?;
        tracing::info!(
            consumers = self.consumer_repository.len(),
            buffer_size = self.ring_buffer.buffer_size(),
            "disruptor started"
        );
        Ok(Arc::clone(&self.ring_buffer))
    }

    /// Halt every consumer without waiting for the backlog
    pub fn halt(&self) {
        self.consumer_repository.halt_all();
        tracing::info!(cursor = self.ring_buffer.cursor(), "disruptor halted");
    }

    /// Wait until every published event is processed, then halt
    ///
    /// Waits without bound. A timeout can only come from
    /// [`Disruptor::shutdown_with_timeout`]; it is passed to the default
    /// exception handler here.
    pub fn shutdown(&self) {
        if let Err(error) = self.drain_and_halt(None) {
            self.exception_handler.handle_on_shutdown_exception(error);
        }
    }

    /// Wait up to `timeout` for every published event to be processed, then halt
    ///
    /// # Errors
    /// `Timeout` if the backlog did not drain in time; consumers keep running
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.drain_and_halt(Some(Instant::now() + timeout))
    }

    fn drain_and_halt(&self, deadline: Option<Instant>) -> Result<()> {
        while self.has_backlog() {
            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                tracing::warn!(
                    cursor = self.ring_buffer.cursor(),
                    "timed out waiting for consumers to drain"
                );
                return Err(DisruptorError::Timeout);
            }
            thread::yield_now();
        }

        self.halt();
        Ok(())
    }

    /// Whether a running end-of-chain consumer is behind the cursor
    pub fn has_backlog(&self) -> bool {
        self.consumer_repository
            .has_backlog(self.ring_buffer.cursor(), false)
    }

    /// The ring buffer
    pub fn ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring_buffer
    }

    /// Get the event stored for `sequence`
    ///
    /// # Safety
    /// Same contract as [`RingBuffer::get`]: `sequence` must be published and no
    /// producer may be writing its slot.
    pub unsafe fn get(&self, sequence: i64) -> &T {
        self.ring_buffer.get(sequence)
    }

    /// The last claimed sequence
    pub fn cursor(&self) -> i64 {
        self.ring_buffer.cursor()
    }

    /// Size of the ring buffer
    pub fn buffer_size(&self) -> i64 {
        self.ring_buffer.buffer_size()
    }

    /// The barrier a consumer waits on
    ///
    /// `None` for unknown ids and for processors wired with
    /// [`Disruptor::handle_events_with_processors`].
    pub fn barrier_for(&self, id: ConsumerId) -> Option<Arc<dyn SequenceBarrier>> {
        self.consumer_repository.barrier_for(id)
    }

    /// The last sequence a consumer has processed
    ///
    /// For a worker pool this is the minimum over its gating sequences.
    pub fn sequence_value_for(&self, id: ConsumerId) -> Option<i64> {
        self.consumer_repository
            .sequences_for(id)
            .map(|sequences| crate::disruptor::get_minimum_sequence(&sequences, i64::MAX))
    }

    /// Whether the graph has been started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Publish one event filled by `translator`
    pub fn publish_event<E>(&self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        self.ring_buffer.publish_event(translator)
    }

    /// Publish one event filled from `arg`
    pub fn publish_event_with<A, E>(&self, translator: E, arg: A) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
    {
        self.ring_buffer.publish_event_with(translator, arg)
    }

    /// Publish one event per argument as a single batch
    pub fn publish_events<A, E, I>(&self, translator: E, args: I) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
        I: IntoIterator<Item = A>,
        I::IntoIter: ExactSizeIterator,
    {
        self.ring_buffer.publish_events(translator, args)
    }
}

impl<T> std::fmt::Debug for Disruptor<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("ring_buffer", &self.ring_buffer)
            .field("consumers", &self.consumer_repository.len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}
