//! `Ringbatch` - Intra-Process Disruptor Core
//!
//! A bounded, pre-allocated ring buffer with lock-free sequencing for passing
//! events between threads of one process, following the LMAX Disruptor design
//! from <https://github.com/LMAX-Exchange/disruptor>.
//!
//! ## Features
//!
//! - **Pre-allocated slots**: every event is created once and reused in place
//! - **Single and multi producer claiming**: plain counters or CAS claims with
//!   per-slot availability markers
//! - **Backpressure**: producers never overwrite a slot a consumer still needs
//! - **Pluggable waiting**: busy-spin, yielding, sleeping, blocking, timeout and
//!   phased back-off wait strategies
//! - **Consumer graphs**: pipelines, diamonds and worker pools over one buffer
//!
//! ## Quick Start
//!
//! ```rust
//! use ringbatch::disruptor::{
//!     BlockingWaitStrategy, DefaultEventFactory, Disruptor, EventHandler, ProducerType,
//!     Result, ThreadExecutor,
//! };
//! use std::sync::Arc;
//!
//! // Define your event type
//! #[derive(Debug, Default)]
//! struct MyEvent {
//!     value: i64,
//! }
//!
//! // Implement an event handler
//! struct MyEventHandler;
//!
//! impl EventHandler<MyEvent> for MyEventHandler {
//!     fn on_event(&mut self, event: &MyEvent, sequence: i64, _end_of_batch: bool) -> Result<()> {
//!         assert_eq!(event.value, sequence * 2);
//!         Ok(())
//!     }
//! }
//!
//! let executor = Arc::new(ThreadExecutor::new());
//! let mut disruptor = Disruptor::new(
//!     DefaultEventFactory::<MyEvent>::new(),
//!     1024, // Buffer size (must be power of 2)
//!     ProducerType::Single,
//!     Arc::new(BlockingWaitStrategy::new()),
//!     executor.clone(),
//! )
//! .unwrap();
//! disruptor.handle_events_with(vec![MyEventHandler]).unwrap();
//!
//! // Start the consumers
//! disruptor.start().unwrap();
//!
//! // Publish events
//! for _ in 0..10 {
//!     disruptor
//!         .publish_event(|event: &mut MyEvent, sequence: i64| event.value = sequence * 2)
//!         .unwrap();
//! }
//!
//! // Drain and stop
//! disruptor.shutdown();
//! executor.join_all();
//! ```
//!
//! ## Architecture
//!
//! - **`RingBuffer`**: pre-allocated circular buffer of events
//! - **`Sequence`**: padded atomic counter used for all coordination
//! - **`Sequencer`**: hands out claims and tracks publication (single/multi producer)
//! - **`SequenceBarrier`**: waits for the cursor and upstream consumers
//! - **`WaitStrategy`**: how a waiting consumer idles
//! - **`BatchEventProcessor`**: delivers every event, in order, to one handler
//! - **`WorkerPool`**: delivers each event to exactly one of several handlers
//! - **`Disruptor`**: wires processors into a graph and gates the producer on it

pub mod disruptor;

// Re-export the main types for convenience
pub use disruptor::{
    // Utility functions
    is_power_of_two,

    // Event processing
    BatchEventProcessor,
    // Wait strategies
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    // Convenience types
    DefaultEventFactory,

    // Core types
    Disruptor,
    DisruptorConfig,
    // Error types
    DisruptorError,
    EventFactory,
    // Event handling
    EventHandler,
    EventHandlerGroup,
    EventProcessor,
    EventProcessorFactory,
    EventTranslator,
    EventTranslatorOneArg,
    // Exception handling
    ExceptionHandler,
    Executor,
    LiteBlockingWaitStrategy,
    LiteTimeoutBlockingWaitStrategy,

    // Sequencing
    MultiProducerSequencer,
    PhasedBackoffWaitStrategy,
    ProducerType,

    Result,

    RingBuffer,
    Sequence,
    SequenceBarrier,
    Sequencer,
    SingleProducerSequencer,
    SleepingWaitStrategy,
    ThreadExecutor,
    TimeoutBlockingWaitStrategy,
    WaitResult,
    WaitStrategy,
    WorkHandler,
    WorkerPool,
    YieldingWaitStrategy,
    // Constants
    INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `Ringbatch` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
