//! Exception Handler Implementation
//!
//! Processors never let a handler failure escape their loop. Every error returned
//! by a handler's event, lifecycle or timeout callback is passed to an
//! [`ExceptionHandler`], which decides whether to log, ignore or abort.

use crate::disruptor::DisruptorError;
use parking_lot::RwLock;
use std::sync::Arc;

/// Policy for failures raised by handler code
///
/// # Type Parameters
/// * `T` - The event type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// A handler failed while processing (or idling after) `sequence`
    ///
    /// # Arguments
    /// * `error` - The failure
    /// * `sequence` - The sequence being processed
    /// * `event` - The event, when the failure happened inside `on_event`
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, event: Option<&T>);

    /// The handler's start callback failed
    fn handle_on_start_exception(&self, error: DisruptorError);

    /// The handler's shutdown callback failed
    fn handle_on_shutdown_exception(&self, error: DisruptorError);
}

/// Logs the failure and then panics the processor thread
///
/// This is the default policy: an unexpected handler failure stops the consumer
/// instead of silently skipping data.
#[derive(Debug, Default, Clone, Copy)]
pub struct FatalExceptionHandler;

impl FatalExceptionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler {
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, _event: Option<&T>) {
        tracing::error!(sequence, %error, "Exception processing event");
        panic!("Exception processing sequence {sequence}: {error}");
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        tracing::error!(%error, "Exception during on_start()");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        tracing::error!(%error, "Exception during on_shutdown()");
    }
}

/// Logs the failure and lets the processor continue
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl LoggingExceptionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for LoggingExceptionHandler {
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, _event: Option<&T>) {
        tracing::error!(sequence, %error, "Exception processing event, continuing");
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        tracing::warn!(%error, "Exception during on_start()");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        tracing::warn!(%error, "Exception during on_shutdown()");
    }
}

/// Drops every failure
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreExceptionHandler;

impl IgnoreExceptionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler {
    fn handle_event_exception(&self, _error: DisruptorError, _sequence: i64, _event: Option<&T>) {}

    fn handle_on_start_exception(&self, _error: DisruptorError) {}

    fn handle_on_shutdown_exception(&self, _error: DisruptorError) {}
}

/// Exception handler backed by a closure
///
/// The closure receives the sequence for event failures and `None` for
/// lifecycle failures.
pub struct ClosureExceptionHandler<F>
where
    F: Fn(DisruptorError, Option<i64>) + Send + Sync,
{
    handler_fn: F,
}

impl<F> ClosureExceptionHandler<F>
where
    F: Fn(DisruptorError, Option<i64>) + Send + Sync,
{
    pub fn new(handler_fn: F) -> Self {
        Self { handler_fn }
    }
}

impl<T, F> ExceptionHandler<T> for ClosureExceptionHandler<F>
where
    F: Fn(DisruptorError, Option<i64>) + Send + Sync,
{
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, _event: Option<&T>) {
        (self.handler_fn)(error, Some(sequence));
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        (self.handler_fn)(error, None);
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        (self.handler_fn)(error, None);
    }
}

/// Exception handler whose delegate can be replaced while processors run
///
/// The consumer graph hands one wrapper to each processor so the policy can be
/// changed per consumer, or for every consumer at once through the shared
/// default, after wiring.
pub struct ExceptionHandlerWrapper<T> {
    delegate: RwLock<Arc<dyn ExceptionHandler<T>>>,
}

impl<T: 'static> ExceptionHandlerWrapper<T> {
    /// Create a wrapper delegating to [`FatalExceptionHandler`]
    pub fn new() -> Self {
        Self::with_delegate(Arc::new(FatalExceptionHandler))
    }

    /// Create a wrapper with an explicit delegate
    pub fn with_delegate(delegate: Arc<dyn ExceptionHandler<T>>) -> Self {
        Self {
            delegate: RwLock::new(delegate),
        }
    }

    /// Replace the delegate
    pub fn switch_to(&self, delegate: Arc<dyn ExceptionHandler<T>>) {
        *self.delegate.write() = delegate;
    }

    fn current(&self) -> Arc<dyn ExceptionHandler<T>> {
        Arc::clone(&self.delegate.read())
    }
}

impl<T: 'static> Default for ExceptionHandlerWrapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ExceptionHandlerWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionHandlerWrapper").finish_non_exhaustive()
    }
}

impl<T: 'static> ExceptionHandler<T> for ExceptionHandlerWrapper<T> {
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, event: Option<&T>) {
        // The lock is released before delegating so a panicking delegate cannot
        // leave it held.
        self.current().handle_event_exception(error, sequence, event);
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        self.current().handle_on_start_exception(error);
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        self.current().handle_on_shutdown_exception(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::panic::{self, AssertUnwindSafe};

    #[derive(Debug, Default)]
    struct TestEvent;

    fn recorder() -> (Arc<Mutex<Vec<Option<i64>>>>, Arc<dyn ExceptionHandler<TestEvent>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let handler = Arc::new(ClosureExceptionHandler::new(
            move |_error: DisruptorError, sequence: Option<i64>| sink.lock().push(sequence),
        ));
        (calls, handler)
    }

    #[test]
    fn test_closure_exception_handler_receives_sequence() {
        let (calls, handler) = recorder();
        handler.handle_event_exception(DisruptorError::handler("bad"), 7, Some(&TestEvent));
        handler.handle_on_start_exception(DisruptorError::handler("start"));
        handler.handle_on_shutdown_exception(DisruptorError::handler("stop"));
        assert_eq!(*calls.lock(), vec![Some(7), None, None]);
    }

    #[test]
    fn test_logging_and_ignore_handlers_continue() {
        let logging: &dyn ExceptionHandler<TestEvent> = &LoggingExceptionHandler::new();
        logging.handle_event_exception(DisruptorError::handler("bad"), 1, None);
        logging.handle_on_start_exception(DisruptorError::handler("start"));

        let ignore: &dyn ExceptionHandler<TestEvent> = &IgnoreExceptionHandler::new();
        ignore.handle_event_exception(DisruptorError::handler("bad"), 1, Some(&TestEvent));
        ignore.handle_on_shutdown_exception(DisruptorError::handler("stop"));
    }

    #[test]
    fn test_fatal_handler_panics_on_event_failure() {
        let fatal: &dyn ExceptionHandler<TestEvent> = &FatalExceptionHandler::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            fatal.handle_event_exception(DisruptorError::handler("bad"), 3, None);
        }));
        assert!(result.is_err());

        // Lifecycle failures are only logged
        fatal.handle_on_start_exception(DisruptorError::handler("start"));
    }

    #[test]
    fn test_wrapper_switches_delegate() {
        let wrapper = ExceptionHandlerWrapper::<TestEvent>::new();
        let (calls, handler) = recorder();

        wrapper.switch_to(handler);
        wrapper.handle_event_exception(DisruptorError::handler("bad"), 11, None);
        assert_eq!(*calls.lock(), vec![Some(11)]);

        wrapper.switch_to(Arc::new(IgnoreExceptionHandler));
        wrapper.handle_event_exception(DisruptorError::handler("bad"), 12, None);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_wrapper_chain_follows_shared_default() {
        let shared = Arc::new(ExceptionHandlerWrapper::<TestEvent>::new());
        let per_consumer = ExceptionHandlerWrapper::with_delegate(
            Arc::clone(&shared) as Arc<dyn ExceptionHandler<TestEvent>>
        );

        let (calls, handler) = recorder();
        shared.switch_to(handler);
        per_consumer.handle_on_start_exception(DisruptorError::handler("start"));
        assert_eq!(*calls.lock(), vec![None]);
    }
}
