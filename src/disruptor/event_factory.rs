//! Event Factory Implementation
//!
//! Every ring buffer slot is filled once, at construction, by an event factory.
//! Producers afterwards overwrite slots in place, so the factory is never invoked
//! again for the lifetime of the buffer.

use std::marker::PhantomData;

/// Pre-allocates one event per ring buffer slot
///
/// # Examples
/// ```
/// use ringbatch::disruptor::EventFactory;
///
/// struct Tick {
///     price: i64,
/// }
///
/// struct TickFactory;
///
/// impl EventFactory<Tick> for TickFactory {
///     fn new_instance(&self) -> Tick {
///         Tick { price: 0 }
///     }
/// }
/// ```
pub trait EventFactory<T>: Send + Sync {
    /// Create the initial value of one slot
    fn new_instance(&self) -> T;
}

/// Event factory that uses the Default trait
pub struct DefaultEventFactory<T: Default> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEventFactory<T> {
    /// Create a new default event factory
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Event factory backed by a closure
///
/// Useful when slots need a pre-sized allocation, e.g. a `Vec` with capacity.
pub struct ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    factory_fn: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    /// Create a new closure-based event factory
    ///
    /// # Arguments
    /// * `factory_fn` - The closure that creates new event instances
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}
