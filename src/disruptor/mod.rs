//! Ringbatch Disruptor Implementation
//!
//! This module contains the sequencing and coordination engine: the ring buffer,
//! the single and multi producer sequencers, sequence barriers with their wait
//! strategies, the batch and work processors, and the consumer graph that wires
//! them together.

pub mod blocking_wait_strategy;
pub mod config;
pub mod consumer_repository;
pub mod disruptor;
pub mod event_factory;
pub mod event_handler;
pub mod event_processor;
pub mod event_translator;
pub mod exception_handler;
pub mod phased_backoff_wait_strategy;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod thread_management;
pub mod wait_strategy;
pub mod work_processor;
pub mod worker_pool;


pub use blocking_wait_strategy::{
    BlockingWaitStrategy, LiteBlockingWaitStrategy, LiteTimeoutBlockingWaitStrategy,
    TimeoutBlockingWaitStrategy,
};
pub use config::{DisruptorConfig, PhasedBackoffFallback, WaitStrategyConfig};
pub use consumer_repository::{ConsumerId, ConsumerRepository};
pub use disruptor::{Disruptor, EventHandlerGroup};
pub use event_factory::{ClosureEventFactory, DefaultEventFactory, EventFactory};
pub use event_handler::{
    ClosureEventHandler, ClosureWorkHandler, EventHandler, EventReleaser, NoOpEventHandler,
    WorkHandler,
};
pub use event_processor::{BatchEventProcessor, EventProcessor, EventProcessorFactory};
pub use event_translator::{EventTranslator, EventTranslatorOneArg};
pub use exception_handler::{
    ClosureExceptionHandler, ExceptionHandler, ExceptionHandlerWrapper, FatalExceptionHandler,
    IgnoreExceptionHandler, LoggingExceptionHandler,
};
pub use phased_backoff_wait_strategy::PhasedBackoffWaitStrategy;
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::{get_minimum_sequence, DependentSequence, Sequence};
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use thread_management::{Executor, ManagedThread, ThreadExecutor};
pub use wait_strategy::{
    BusySpinWaitStrategy, SleepingWaitStrategy, WaitResult, WaitStrategy, YieldingWaitStrategy,
};
pub use work_processor::WorkProcessor;
pub use worker_pool::WorkerPool;

/// The initial cursor value for sequences
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Boxed error type carried by [`DisruptorError::Handler`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the Disruptor
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    #[error("Buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    #[error("Claim of {requested} slots must be between 1 and the buffer size {buffer_size}")]
    InvalidClaimSize { requested: i64, buffer_size: i64 },

    #[error("Insufficient capacity in ring buffer")]
    InsufficientCapacity,

    #[error("Event processor is already running")]
    AlreadyRunning,

    #[error("Already started")]
    AlreadyStarted,

    #[error("Timeout waiting for consumers to drain")]
    Timeout,

    #[error("Handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("Failed to spawn processor thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DisruptorError {
    /// Wrap an arbitrary failure raised by user handler code
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Handler(error.into())
    }
}

pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}
