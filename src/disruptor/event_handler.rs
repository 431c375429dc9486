//! Event Handler Implementation
//!
//! Handler capabilities plugged into processors. An [`EventHandler`] sees every
//! event of the stream through a batch processor; a [`WorkHandler`] competes with
//! its siblings in a worker pool and sees each event at most once across the pool.
//!
//! Handlers receive `&T`: several processors may read the same slot concurrently,
//! so events are immutable on the consumer side.

use crate::disruptor::{Result, Sequence};
use std::marker::PhantomData;
use std::sync::Arc;

/// Callback interface for consumers of the full event stream
///
/// Failures are returned, never panicked, and routed by the processor to its
/// exception handler. The loop carries on with the next event.
///
/// # Examples
/// ```
/// use ringbatch::disruptor::{EventHandler, Result};
///
/// struct Summer {
///     total: i64,
/// }
///
/// impl EventHandler<i64> for Summer {
///     fn on_event(&mut self, event: &i64, _sequence: i64, _end_of_batch: bool) -> Result<()> {
///         self.total += *event;
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler<T>: Send {
    /// Called for every published event, in sequence order
    ///
    /// # Arguments
    /// * `event` - The published event
    /// * `sequence` - Sequence of the event
    /// * `end_of_batch` - True for the last event of the batch the processor read
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()>;

    /// Called once on the processor thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the processor thread just before it exits
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when a timeout-flavoured wait strategy saw no progress
    ///
    /// # Arguments
    /// * `sequence` - The last sequence this handler's processor completed
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }

    /// Receive the processor's own sequence
    ///
    /// Handlers that finish work before the end of a batch can set it to release
    /// slots to the producer early.
    fn set_sequence_callback(&mut self, _sequence_callback: Arc<Sequence>) {}
}

impl<T, H> EventHandler<T> for Box<H>
where
    H: EventHandler<T> + ?Sized,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (**self).on_event(event, sequence, end_of_batch)
    }

    fn on_start(&mut self) -> Result<()> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> Result<()> {
        (**self).on_shutdown()
    }

    fn on_timeout(&mut self, sequence: i64) -> Result<()> {
        (**self).on_timeout(sequence)
    }

    fn set_sequence_callback(&mut self, sequence_callback: Arc<Sequence>) {
        (**self).set_sequence_callback(sequence_callback)
    }
}

/// Lets a work handler mark its current event as done before returning
///
/// Releasing moves the worker's sequence to `i64::MAX`, so the worker stops
/// gating the producer until it claims its next event.
#[derive(Debug, Clone)]
pub struct EventReleaser {
    sequence: Arc<Sequence>,
}

impl EventReleaser {
    pub(crate) fn new(sequence: Arc<Sequence>) -> Self {
        Self { sequence }
    }

    /// Release the event currently being handled
    pub fn release(&self) {
        self.sequence.set(i64::MAX);
    }
}

/// Callback interface for competing consumers in a worker pool
pub trait WorkHandler<T>: Send {
    /// Called for each event this worker won
    fn on_event(&mut self, event: &T, sequence: i64) -> Result<()>;

    /// Called once on the worker thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the worker thread just before it exits
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when a timeout-flavoured wait strategy saw no progress
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }

    /// Receive the releaser for this worker's sequence
    fn set_event_releaser(&mut self, _event_releaser: EventReleaser) {}
}

impl<T, H> WorkHandler<T> for Box<H>
where
    H: WorkHandler<T> + ?Sized,
{
    fn on_event(&mut self, event: &T, sequence: i64) -> Result<()> {
        (**self).on_event(event, sequence)
    }

    fn on_start(&mut self) -> Result<()> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> Result<()> {
        (**self).on_shutdown()
    }

    fn on_timeout(&mut self, sequence: i64) -> Result<()> {
        (**self).on_timeout(sequence)
    }

    fn set_event_releaser(&mut self, event_releaser: EventReleaser) {
        (**self).set_event_releaser(event_releaser)
    }
}

/// Event handler backed by a closure
pub struct ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    handler: F,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F> ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    /// Create a new closure-based event handler
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (self.handler)(event, sequence, end_of_batch)
    }
}

/// Work handler backed by a closure
pub struct ClosureWorkHandler<T, F>
where
    F: FnMut(&T, i64) -> Result<()> + Send,
{
    handler: F,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F> ClosureWorkHandler<T, F>
where
    F: FnMut(&T, i64) -> Result<()> + Send,
{
    /// Create a new closure-based work handler
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> WorkHandler<T> for ClosureWorkHandler<T, F>
where
    F: FnMut(&T, i64) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64) -> Result<()> {
        (self.handler)(event, sequence)
    }
}

/// Handler that does nothing; useful as a placeholder stage
pub struct NoOpEventHandler<T> {
    _phantom: PhantomData<fn(&T)>,
}

impl<T> NoOpEventHandler<T> {
    /// Create a new no-op event handler
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for NoOpEventHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventHandler<T> for NoOpEventHandler<T> {
    fn on_event(&mut self, _event: &T, _sequence: i64, _end_of_batch: bool) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::DisruptorError;

    #[derive(Debug, Default)]
    struct TestEvent {
        value: i64,
    }

    #[derive(Default)]
    struct Recording {
        seen: Vec<(i64, i64, bool)>,
        started: bool,
        callback: Option<Arc<Sequence>>,
    }

    impl EventHandler<TestEvent> for Recording {
        fn on_event(&mut self, event: &TestEvent, sequence: i64, end_of_batch: bool) -> Result<()> {
            self.seen.push((event.value, sequence, end_of_batch));
            Ok(())
        }

        fn on_start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        fn set_sequence_callback(&mut self, sequence_callback: Arc<Sequence>) {
            self.callback = Some(sequence_callback);
        }
    }

    #[test]
    fn test_closure_event_handler() {
        let mut total = 0;
        {
            let mut handler = ClosureEventHandler::new(|event: &TestEvent, _seq, _eob| {
                total += event.value;
                Ok(())
            });
            handler.on_event(&TestEvent { value: 2 }, 0, false).unwrap();
            handler.on_event(&TestEvent { value: 3 }, 1, true).unwrap();
            assert!(handler.on_start().is_ok());
            assert!(handler.on_timeout(1).is_ok());
        }
        assert_eq!(total, 5);
    }

    #[test]
    fn test_closure_handler_errors_propagate() {
        let mut handler = ClosureEventHandler::new(|event: &TestEvent, _seq, _eob| {
            if event.value < 0 {
                return Err(DisruptorError::handler("negative value"));
            }
            Ok(())
        });

        assert!(handler.on_event(&TestEvent { value: 1 }, 0, true).is_ok());
        assert!(matches!(
            handler.on_event(&TestEvent { value: -1 }, 1, true),
            Err(DisruptorError::Handler(_))
        ));
    }

    #[test]
    fn test_no_op_event_handler() {
        let mut handler = NoOpEventHandler::<TestEvent>::new();
        assert!(handler.on_event(&TestEvent::default(), 0, true).is_ok());
        assert!(handler.on_shutdown().is_ok());
    }

    #[test]
    fn test_boxed_handler_forwards_every_hook() {
        let mut boxed: Box<dyn EventHandler<TestEvent>> = Box::<Recording>::default();
        let sequence = Arc::new(Sequence::new(3));

        boxed.set_sequence_callback(Arc::clone(&sequence));
        boxed.on_start().unwrap();
        boxed.on_event(&TestEvent { value: 9 }, 4, true).unwrap();
        boxed.on_shutdown().unwrap();

        let mut handlers: Vec<Box<dyn EventHandler<TestEvent>>> =
            vec![boxed, Box::new(NoOpEventHandler::new())];
        for handler in &mut handlers {
            handler.on_event(&TestEvent { value: 1 }, 5, false).unwrap();
        }
    }

    #[test]
    fn test_event_releaser_parks_sequence_at_max() {
        let sequence = Arc::new(Sequence::new(10));
        let releaser = EventReleaser::new(Arc::clone(&sequence));
        releaser.release();
        assert_eq!(sequence.get(), i64::MAX);
    }

    #[test]
    fn test_closure_work_handler() {
        let mut seen = Vec::new();
        {
            let mut handler = ClosureWorkHandler::new(|event: &TestEvent, sequence| {
                seen.push((event.value, sequence));
                Ok(())
            });
            handler.on_event(&TestEvent { value: 7 }, 0).unwrap();
            handler.set_event_releaser(EventReleaser::new(Arc::new(Sequence::default())));
        }
        assert_eq!(seen, vec![(7, 0)]);
    }
}
