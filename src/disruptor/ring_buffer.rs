//! Ring Buffer Implementation
//!
//! This module provides the core ring buffer: a pre-allocated circular array of
//! events fronted by a [`Sequencer`]. Slots are written in place between claim
//! and publish and read by consumers only after their barrier reports the
//! sequence as available. The claim/publish protocol provides the happens-before
//! edge, the buffer itself carries no locks.

use crate::disruptor::{
    EventFactory, EventTranslator, EventTranslatorOneArg, MultiProducerSequencer,
    ProcessingSequenceBarrier, ProducerType, Result, Sequence, Sequencer, SingleProducerSequencer,
    WaitStrategy,
};
use std::cell::UnsafeCell;
use std::sync::Arc;

/// The core ring buffer for storing events
///
/// Producer mode is chosen at construction. With [`ProducerType::Single`] the
/// caller guarantees that only one thread claims and publishes at a time.
///
/// # Type Parameters
/// * `T` - The event type stored in the buffer
pub struct RingBuffer<T> {
    /// One cell per slot, written only by the holder of the claim
    slots: Box<[UnsafeCell<T>]>,
    /// Mask for fast modulo operations (buffer_size - 1)
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
}

// SAFETY: slot access is coordinated by the sequencer. A slot is written only by
// the producer that claimed its sequence, before a release publish, and read only
// by consumers after an acquire read of the cursor or availability marker.
unsafe impl<T: Send + Sync> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

/// Publishes a claimed range when dropped, including while unwinding
///
/// A claimed but unpublished sequence would stall every consumer forever, so a
/// panicking translator still releases its claim.
struct PublishOnDrop<'a> {
    sequencer: &'a dyn Sequencer,
    low: i64,
    high: i64,
}

impl Drop for PublishOnDrop<'_> {
    fn drop(&mut self) {
        if self.low == self.high {
            self.sequencer.publish(self.high);
        } else {
            self.sequencer.publish_range(self.low, self.high);
        }
    }
}

impl<T> RingBuffer<T>
where
    T: Send + Sync,
{
    /// Create a new ring buffer
    ///
    /// # Arguments
    /// * `producer_type` - Single or multi producer claiming
    /// * `event_factory` - Called once per slot to pre-populate the buffer
    /// * `buffer_size` - The size of the ring buffer (must be a power of 2)
    /// * `wait_strategy` - How consumers idle on this buffer
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if buffer_size is not a power of 2
    pub fn create<F>(
        producer_type: ProducerType,
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let sequencer: Arc<dyn Sequencer> = match producer_type {
            ProducerType::Single => {
                Arc::new(SingleProducerSequencer::new(buffer_size, wait_strategy)?)
            }
            ProducerType::Multi => Arc::new(MultiProducerSequencer::new(buffer_size, wait_strategy)?),
        };

        Ok(Self::with_sequencer(sequencer, event_factory))
    }

    /// Create a ring buffer for a single publishing thread
    pub fn create_single_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::create(ProducerType::Single, event_factory, buffer_size, wait_strategy)
    }

    /// Create a ring buffer safe for concurrent publishers
    pub fn create_multi_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::create(ProducerType::Multi, event_factory, buffer_size, wait_strategy)
    }

    fn with_sequencer<F>(sequencer: Arc<dyn Sequencer>, event_factory: F) -> Self
    where
        F: EventFactory<T>,
    {
        let buffer_size = sequencer.buffer_size();
        let slots: Box<[UnsafeCell<T>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Self {
            slots,
            index_mask: buffer_size - 1,
            sequencer,
        }
    }

    #[inline]
    fn slot(&self, sequence: i64) -> &UnsafeCell<T> {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: the mask keeps the index below slots.len()
        unsafe { self.slots.get_unchecked(index) }
    }

    /// Get the event stored for `sequence`
    ///
    /// # Safety
    /// `sequence` must have been observed as available through a barrier (or by
    /// the producer that holds its claim), and no producer may be writing it.
    #[inline]
    pub unsafe fn get(&self, sequence: i64) -> &T {
        &*self.slot(sequence).get()
    }

    /// Get mutable access to the slot for `sequence`
    ///
    /// # Safety
    /// The caller must hold the claim for `sequence` and must not have published
    /// it yet. No other reference to the slot may exist for the lifetime of the
    /// returned borrow.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut T {
        &mut *self.slot(sequence).get()
    }

    /// Claim the next sequence, blocking while the buffer is full
    pub fn next(&self) -> Result<i64> {
        self.sequencer.next()
    }

    /// Claim the next `n` sequences and return the highest one
    pub fn next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    /// Claim the next sequence, failing with `InsufficientCapacity` when full
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim the next `n` sequences without blocking
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Publish a claimed sequence
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Publish a claimed range (inclusive)
    pub fn publish_range(&self, low: i64, high: i64) {
        self.sequencer.publish_range(low, high);
    }

    /// Claim one slot, fill it with `translator` and publish it
    pub fn publish_event<E>(&self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(&translator, sequence);
        Ok(())
    }

    /// Non-blocking [`RingBuffer::publish_event`]
    ///
    /// # Errors
    /// `InsufficientCapacity` if the buffer is full; nothing is claimed.
    pub fn try_publish_event<E>(&self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        let sequence = self.sequencer.try_next()?;
        self.translate_and_publish(&translator, sequence);
        Ok(())
    }

    /// Claim one slot, fill it from `arg` and publish it
    pub fn publish_event_with<A, E>(&self, translator: E, arg: A) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
    {
        let sequence = self.sequencer.next()?;
        self.translate_one_and_publish(&translator, sequence, arg);
        Ok(())
    }

    /// Non-blocking [`RingBuffer::publish_event_with`]
    pub fn try_publish_event_with<A, E>(&self, translator: E, arg: A) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
    {
        let sequence = self.sequencer.try_next()?;
        self.translate_one_and_publish(&translator, sequence, arg);
        Ok(())
    }

    /// Claim one slot per argument, fill them in order and publish the batch
    ///
    /// # Errors
    /// `InvalidClaimSize` if the batch is larger than the buffer
    pub fn publish_events<A, E, I>(&self, translator: E, args: I) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
        I: IntoIterator<Item = A>,
        I::IntoIter: ExactSizeIterator,
    {
        let args = args.into_iter();
        let batch_size = args.len() as i64;
        if batch_size == 0 {
            return Ok(());
        }

        let high = self.sequencer.next_n(batch_size)?;
        self.translate_batch_and_publish(&translator, args, high - (batch_size - 1), high);
        Ok(())
    }

    /// Non-blocking [`RingBuffer::publish_events`]
    pub fn try_publish_events<A, E, I>(&self, translator: E, args: I) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
        I: IntoIterator<Item = A>,
        I::IntoIter: ExactSizeIterator,
    {
        let args = args.into_iter();
        let batch_size = args.len() as i64;
        if batch_size == 0 {
            return Ok(());
        }

        let high = self.sequencer.try_next_n(batch_size)?;
        self.translate_batch_and_publish(&translator, args, high - (batch_size - 1), high);
        Ok(())
    }

    fn translate_and_publish<E>(&self, translator: &E, sequence: i64)
    where
        E: EventTranslator<T>,
    {
        let _publish = PublishOnDrop {
            sequencer: self.sequencer.as_ref(),
            low: sequence,
            high: sequence,
        };
        // SAFETY: `sequence` was just claimed by this call and is unpublished
        translator.translate_to(unsafe { self.get_mut(sequence) }, sequence);
    }

    fn translate_one_and_publish<A, E>(&self, translator: &E, sequence: i64, arg: A)
    where
        E: EventTranslatorOneArg<T, A>,
    {
        let _publish = PublishOnDrop {
            sequencer: self.sequencer.as_ref(),
            low: sequence,
            high: sequence,
        };
        // SAFETY: `sequence` was just claimed by this call and is unpublished
        translator.translate_to(unsafe { self.get_mut(sequence) }, sequence, arg);
    }

    fn translate_batch_and_publish<A, E, I>(&self, translator: &E, args: I, low: i64, high: i64)
    where
        E: EventTranslatorOneArg<T, A>,
        I: Iterator<Item = A>,
    {
        let _publish = PublishOnDrop {
            sequencer: self.sequencer.as_ref(),
            low,
            high,
        };
        for (sequence, arg) in (low..=high).zip(args) {
            // SAFETY: the whole range was claimed by this call and is unpublished
            translator.translate_to(unsafe { self.get_mut(sequence) }, sequence, arg);
        }
    }

    /// Create a barrier over this buffer
    ///
    /// # Arguments
    /// * `dependencies` - Sequences the barrier's consumers must stay behind; empty
    ///   means the consumers depend on publication alone
    pub fn new_barrier(&self, dependencies: &[Arc<Sequence>]) -> ProcessingSequenceBarrier {
        ProcessingSequenceBarrier::new(Arc::clone(&self.sequencer), dependencies)
    }

    /// Add sequences the producer must not overtake
    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    /// Remove a gating sequence; returns whether it was registered
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Minimum over the gating sequences, or the cursor when there are none
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.minimum_sequence()
    }

    /// Whether `sequence` has been published
    pub fn is_available(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Whether `required_capacity` slots could be claimed right now
    pub fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.sequencer.has_available_capacity(required_capacity)
    }

    /// Number of slots that could be claimed right now
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// The current cursor value
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor().get()
    }

    /// Get the size of the buffer
    pub fn buffer_size(&self) -> i64 {
        self.sequencer.buffer_size()
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.slots.len())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BlockingWaitStrategy, DefaultEventFactory, DisruptorError, SequenceBarrier, WaitResult,
        YieldingWaitStrategy,
    };
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;

    #[derive(Debug, Default)]
    struct TestEvent {
        value: i64,
    }

    fn ring_buffer(producer_type: ProducerType, size: usize) -> RingBuffer<TestEvent> {
        RingBuffer::create(
            producer_type,
            DefaultEventFactory::<TestEvent>::new(),
            size,
            Arc::new(BlockingWaitStrategy::new()),
        )
        .unwrap()
    }

    fn value_at(buffer: &RingBuffer<TestEvent>, sequence: i64) -> i64 {
        // SAFETY: the tests only read sequences after publishing them
        unsafe { buffer.get(sequence).value }
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let result = RingBuffer::create_single_producer(
            DefaultEventFactory::<TestEvent>::new(),
            12,
            Arc::new(BlockingWaitStrategy::new()),
        );
        assert!(matches!(result, Err(DisruptorError::InvalidBufferSize(12))));
    }

    #[test]
    fn test_factory_called_once_per_slot() {
        let calls = std::sync::atomic::AtomicI64::new(0);
        let buffer = RingBuffer::create_multi_producer(
            crate::disruptor::ClosureEventFactory::new(|| TestEvent {
                value: calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            }),
            8,
            Arc::new(BlockingWaitStrategy::new()),
        )
        .unwrap();

        assert_eq!(buffer.buffer_size(), 8);
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 8);
        assert_eq!(value_at(&buffer, 3), 3);
    }

    #[test]
    fn test_claim_write_publish_read() {
        for producer_type in [ProducerType::Single, ProducerType::Multi] {
            let buffer = ring_buffer(producer_type, 8);
            let sequence = buffer.next().unwrap();
            // SAFETY: sequence is claimed and unpublished
            unsafe { buffer.get_mut(sequence).value = 42 };
            assert!(!buffer.is_available(sequence));

            buffer.publish(sequence);
            assert!(buffer.is_available(sequence));
            assert_eq!(value_at(&buffer, sequence), 42);
        }
    }

    #[test]
    fn test_publish_event_variants() {
        let buffer = ring_buffer(ProducerType::Multi, 8);

        buffer
            .publish_event(|event: &mut TestEvent, sequence: i64| event.value = sequence + 100)
            .unwrap();
        buffer
            .publish_event_with(|event: &mut TestEvent, _seq: i64, v: i64| event.value = v, 7)
            .unwrap();
        buffer
            .publish_events(
                |event: &mut TestEvent, _seq: i64, v: i64| event.value = v,
                vec![10, 11, 12],
            )
            .unwrap();

        assert_eq!(buffer.cursor(), 4);
        let values: Vec<i64> = (0..=4).map(|s| value_at(&buffer, s)).collect();
        assert_eq!(values, vec![100, 7, 10, 11, 12]);
    }

    #[test]
    fn test_empty_batch_claims_nothing() {
        let buffer = ring_buffer(ProducerType::Single, 8);
        buffer
            .publish_events(
                |event: &mut TestEvent, _seq: i64, v: i64| event.value = v,
                Vec::new(),
            )
            .unwrap();
        assert_eq!(buffer.cursor(), -1);
    }

    #[test]
    fn test_batch_larger_than_buffer_rejected() {
        let buffer = ring_buffer(ProducerType::Single, 4);
        let result = buffer.publish_events(
            |event: &mut TestEvent, _seq: i64, v: i64| event.value = v,
            vec![1; 5],
        );
        assert!(matches!(
            result,
            Err(DisruptorError::InvalidClaimSize { requested: 5, .. })
        ));
    }

    #[test]
    fn test_try_publish_reports_full_buffer() {
        let buffer = ring_buffer(ProducerType::Single, 4);
        let gate = Arc::new(Sequence::default());
        buffer.add_gating_sequences(&[Arc::clone(&gate)]);

        for i in 0..4 {
            buffer
                .try_publish_event_with(|event: &mut TestEvent, _seq: i64, v: i64| event.value = v, i)
                .unwrap();
        }
        assert_eq!(buffer.remaining_capacity(), 0);
        assert!(matches!(
            buffer.try_publish_event(|event: &mut TestEvent, _seq: i64| event.value = 0),
            Err(DisruptorError::InsufficientCapacity)
        ));
        assert!(matches!(
            buffer.try_publish_events(
                |event: &mut TestEvent, _seq: i64, v: i64| event.value = v,
                vec![1]
            ),
            Err(DisruptorError::InsufficientCapacity)
        ));

        gate.set(1);
        assert_eq!(buffer.minimum_gating_sequence(), 1);
        assert!(buffer.has_available_capacity(2));
        assert!(!buffer.has_available_capacity(3));
    }

    #[test]
    fn test_panicking_translator_still_publishes() {
        let buffer = ring_buffer(ProducerType::Multi, 8);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            buffer
                .publish_event(|event: &mut TestEvent, _seq: i64| {
                    if event.value == 0 {
                        panic!("translator failed");
                    }
                })
                .unwrap();
        }));

        assert!(result.is_err());
        assert!(buffer.is_available(0));

        buffer
            .publish_event(|event: &mut TestEvent, _seq: i64| event.value = 1)
            .unwrap();
        let barrier = buffer.new_barrier(&[]);
        assert_eq!(barrier.wait_for(0), WaitResult::Available(1));
    }

    #[test]
    fn test_concurrent_publishers_fill_every_slot() {
        let buffer = Arc::new(
            RingBuffer::create_multi_producer(
                DefaultEventFactory::<TestEvent>::new(),
                256,
                Arc::new(YieldingWaitStrategy::new()),
            )
            .unwrap(),
        );

        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..50 {
                        buffer
                            .publish_event_with(
                                |event: &mut TestEvent, _seq: i64, v: i64| event.value = v,
                                producer * 1000 + i,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let barrier = buffer.new_barrier(&[]);
        assert_eq!(barrier.wait_for(0), WaitResult::Available(199));

        let mut values: Vec<i64> = (0..200).map(|s| value_at(&buffer, s)).collect();
        values.sort_unstable();
        let mut expected: Vec<i64> = (0..4)
            .flat_map(|p| (0..50).map(move |i| p * 1000 + i))
            .collect();
        expected.sort_unstable();
        assert_eq!(values, expected);
    }
}
