//! Event Translator Implementation
//!
//! Translators fill a claimed slot in place. The ring buffer claims a sequence,
//! hands the slot to the translator, and publishes the sequence afterwards, so the
//! caller never touches raw slot references.
//!
//! Any `Fn(&mut T, i64)` closure is an [`EventTranslator`], and any
//! `Fn(&mut T, i64, A)` closure is an [`EventTranslatorOneArg`]. Several
//! arguments travel as one tuple `A`.

/// Populates an event from state the translator carries
///
/// # Examples
/// ```
/// use ringbatch::disruptor::EventTranslator;
///
/// #[derive(Default)]
/// struct Order {
///     id: i64,
///     sequence: i64,
/// }
///
/// struct OrderTranslator {
///     id: i64,
/// }
///
/// impl EventTranslator<Order> for OrderTranslator {
///     fn translate_to(&self, event: &mut Order, sequence: i64) {
///         event.id = self.id;
///         event.sequence = sequence;
///     }
/// }
/// ```
pub trait EventTranslator<T> {
    /// Write into the slot claimed for `sequence`
    fn translate_to(&self, event: &mut T, sequence: i64);
}

/// Populates an event from one caller supplied argument
pub trait EventTranslatorOneArg<T, A> {
    /// Write `arg` into the slot claimed for `sequence`
    fn translate_to(&self, event: &mut T, sequence: i64, arg: A);
}

impl<T, F> EventTranslator<T> for F
where
    F: Fn(&mut T, i64),
{
    #[inline]
    fn translate_to(&self, event: &mut T, sequence: i64) {
        self(event, sequence)
    }
}

impl<T, A, F> EventTranslatorOneArg<T, A> for F
where
    F: Fn(&mut T, i64, A),
{
    #[inline]
    fn translate_to(&self, event: &mut T, sequence: i64, arg: A) {
        self(event, sequence, arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct TestEvent {
        value: i64,
        sequence: i64,
    }

    struct FixedValue(i64);

    impl EventTranslator<TestEvent> for FixedValue {
        fn translate_to(&self, event: &mut TestEvent, sequence: i64) {
            event.value = self.0;
            event.sequence = sequence;
        }
    }

    fn apply<Tr: EventTranslator<TestEvent>>(translator: &Tr, sequence: i64) -> TestEvent {
        let mut event = TestEvent::default();
        translator.translate_to(&mut event, sequence);
        event
    }

    #[test]
    fn test_struct_translator() {
        let event = apply(&FixedValue(42), 7);
        assert_eq!(event.value, 42);
        assert_eq!(event.sequence, 7);
    }

    #[test]
    fn test_closure_translator() {
        let event = apply(
            &|event: &mut TestEvent, sequence: i64| event.value = sequence * 2,
            21,
        );
        assert_eq!(event.value, 42);
    }

    #[test]
    fn test_closure_translator_with_argument() {
        let translator = |event: &mut TestEvent, sequence: i64, value: i64| {
            event.value = value;
            event.sequence = sequence;
        };

        let mut event = TestEvent::default();
        EventTranslatorOneArg::translate_to(&translator, &mut event, 3, 99);
        assert_eq!(event.value, 99);
        assert_eq!(event.sequence, 3);
    }

    #[test]
    fn test_tuple_argument_carries_several_values() {
        let translator = |event: &mut TestEvent, _sequence: i64, (value, sequence): (i64, i64)| {
            event.value = value;
            event.sequence = sequence;
        };

        let mut event = TestEvent::default();
        EventTranslatorOneArg::translate_to(&translator, &mut event, 0, (5, 11));
        assert_eq!(event.value, 5);
        assert_eq!(event.sequence, 11);
    }
}
