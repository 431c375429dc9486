//! Disruptor Configuration
//!
//! Serializable description of a ring buffer and its consumer threads. A config
//! can be loaded from JSON, validated, and turned into the runtime pieces: the
//! wait strategy, the ring buffer and the thread executor.

use crate::disruptor::{
    is_power_of_two, BlockingWaitStrategy, BusySpinWaitStrategy, DisruptorError, EventFactory,
    LiteBlockingWaitStrategy, LiteTimeoutBlockingWaitStrategy, PhasedBackoffWaitStrategy,
    ProducerType, Result, RingBuffer, SleepingWaitStrategy, ThreadExecutor,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Final phase of a [`PhasedBackoffWaitStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhasedBackoffFallback {
    Lock,
    LiteLock,
    Sleep,
}

/// Wait strategy selection with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitStrategyConfig {
    BusySpin,
    Yielding {
        #[serde(default = "default_spin_tries")]
        spin_tries: u32,
    },
    Sleeping {
        #[serde(default = "default_sleep_retries")]
        retries: u32,
        #[serde(default = "default_sleep_nanos")]
        sleep_nanos: u64,
    },
    #[default]
    Blocking,
    LiteBlocking,
    TimeoutBlocking {
        timeout_millis: u64,
    },
    LiteTimeoutBlocking {
        timeout_millis: u64,
    },
    PhasedBackoff {
        spin_timeout_micros: u64,
        yield_timeout_micros: u64,
        fallback: PhasedBackoffFallback,
    },
}

fn default_spin_tries() -> u32 {
    100
}

fn default_sleep_retries() -> u32 {
    200
}

fn default_sleep_nanos() -> u64 {
    100
}

impl WaitStrategyConfig {
    /// Check parameters that would make the strategy useless
    ///
    /// # Errors
    /// `Config` for a zero timeout
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::TimeoutBlocking { timeout_millis } | Self::LiteTimeoutBlocking { timeout_millis }
                if *timeout_millis == 0 =>
            {
                Err(DisruptorError::Config(
                    "timeout_millis must be greater than zero".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Instantiate the configured strategy
    pub fn build(&self) -> Arc<dyn WaitStrategy> {
        match *self {
            Self::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            Self::Yielding { spin_tries } => Arc::new(YieldingWaitStrategy::with_spin_tries(spin_tries)),
            Self::Sleeping {
                retries,
                sleep_nanos,
            } => Arc::new(SleepingWaitStrategy::with_retries(
                retries,
                Duration::from_nanos(sleep_nanos),
            )),
            Self::Blocking => Arc::new(BlockingWaitStrategy::new()),
            Self::LiteBlocking => Arc::new(LiteBlockingWaitStrategy::new()),
            Self::TimeoutBlocking { timeout_millis } => Arc::new(
                TimeoutBlockingWaitStrategy::new(Duration::from_millis(timeout_millis)),
            ),
            Self::LiteTimeoutBlocking { timeout_millis } => Arc::new(
                LiteTimeoutBlockingWaitStrategy::new(Duration::from_millis(timeout_millis)),
            ),
            Self::PhasedBackoff {
                spin_timeout_micros,
                yield_timeout_micros,
                fallback,
            } => {
                let spin = Duration::from_micros(spin_timeout_micros);
                let yield_ = Duration::from_micros(yield_timeout_micros);
                Arc::new(match fallback {
                    PhasedBackoffFallback::Lock => PhasedBackoffWaitStrategy::with_lock(spin, yield_),
                    PhasedBackoffFallback::LiteLock => {
                        PhasedBackoffWaitStrategy::with_lite_lock(spin, yield_)
                    }
                    PhasedBackoffFallback::Sleep => {
                        PhasedBackoffWaitStrategy::with_sleep(spin, yield_)
                    }
                })
            }
        }
    }
}

/// Main disruptor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Number of slots; must be a power of 2
    pub buffer_size: usize,

    /// Single or multi producer claiming
    pub producer_type: ProducerType,

    /// How consumers idle
    pub wait_strategy: WaitStrategyConfig,

    /// Prefix for processor thread names
    pub thread_name_prefix: String,

    /// CPU cores to pin processor threads to, round-robin
    pub pin_cores: Option<Vec<usize>>,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            producer_type: ProducerType::Multi,
            wait_strategy: WaitStrategyConfig::Blocking,
            thread_name_prefix: "ringbatch".to_string(),
            pin_cores: None,
        }
    }
}

impl DisruptorConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the producer type
    pub fn with_producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }

    /// Set the wait strategy
    pub fn with_wait_strategy(mut self, wait_strategy: WaitStrategyConfig) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Pin processor threads to the given cores
    pub fn with_pin_cores(mut self, cores: Vec<usize>) -> Self {
        self.pin_cores = Some(cores);
        self
    }

    /// Parse and validate a JSON configuration
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DisruptorError::Config(format!("invalid JSON configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DisruptorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DisruptorError::Config(format!("cannot serialize configuration: {e}")))
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// `InvalidBufferSize` for a size that is not a power of 2, `Config` for other
    /// unusable values
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(self.buffer_size));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(DisruptorError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        if matches!(&self.pin_cores, Some(cores) if cores.is_empty()) {
            return Err(DisruptorError::Config(
                "pin_cores must list at least one core".to_string(),
            ));
        }
        self.wait_strategy.validate()
    }

    /// Build a ring buffer from this configuration
    pub fn build_ring_buffer<T, F>(&self, event_factory: F) -> Result<RingBuffer<T>>
    where
        T: Send + Sync,
        F: EventFactory<T>,
    {
        self.validate()?;
        RingBuffer::create(
            self.producer_type,
            event_factory,
            self.buffer_size,
            self.wait_strategy.build(),
        )
    }

    /// Build the thread executor described by this configuration
    pub fn build_executor(&self) -> Result<ThreadExecutor> {
        let executor = ThreadExecutor::with_name_prefix(self.thread_name_prefix.clone());
        match &self.pin_cores {
            Some(cores) => executor.pin_at_cores(cores),
            None => Ok(executor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::DefaultEventFactory;

    #[test]
    fn test_default_config_is_valid() {
        let config = DisruptorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.producer_type, ProducerType::Multi);
    }

    #[test]
    fn test_from_json_with_partial_fields() {
        let config = DisruptorConfig::from_json(
            r#"{
                "buffer_size": 64,
                "producer_type": "single",
                "wait_strategy": { "type": "timeout_blocking", "timeout_millis": 250 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.buffer_size, 64);
        assert!(config.producer_type.is_single());
        assert_eq!(
            config.wait_strategy,
            WaitStrategyConfig::TimeoutBlocking {
                timeout_millis: 250
            }
        );
        assert_eq!(config.thread_name_prefix, "ringbatch");
    }

    #[test]
    fn test_json_round_trip() {
        let config = DisruptorConfig::new()
            .with_buffer_size(256)
            .with_wait_strategy(WaitStrategyConfig::PhasedBackoff {
                spin_timeout_micros: 10,
                yield_timeout_micros: 100,
                fallback: PhasedBackoffFallback::LiteLock,
            })
            .with_thread_name_prefix("orders");

        let json = config.to_json().unwrap();
        assert_eq!(DisruptorConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            DisruptorConfig::from_json(r#"{ "buffer_size": 1000 }"#),
            Err(DisruptorError::InvalidBufferSize(1000))
        ));
        assert!(matches!(
            DisruptorConfig::from_json(r#"{ "buffer_size": "big" }"#),
            Err(DisruptorError::Config(_))
        ));
        assert!(matches!(
            DisruptorConfig::new()
                .with_wait_strategy(WaitStrategyConfig::LiteTimeoutBlocking { timeout_millis: 0 })
                .validate(),
            Err(DisruptorError::Config(_))
        ));
        assert!(matches!(
            DisruptorConfig::new().with_pin_cores(Vec::new()).validate(),
            Err(DisruptorError::Config(_))
        ));
    }

    #[test]
    fn test_sleeping_defaults_fill_missing_parameters() {
        let strategy: WaitStrategyConfig =
            serde_json::from_str(r#"{ "type": "sleeping" }"#).unwrap();
        assert_eq!(
            strategy,
            WaitStrategyConfig::Sleeping {
                retries: 200,
                sleep_nanos: 100
            }
        );
    }

    #[test]
    fn test_every_wait_strategy_builds() {
        let configs = [
            WaitStrategyConfig::BusySpin,
            WaitStrategyConfig::Yielding { spin_tries: 10 },
            WaitStrategyConfig::Sleeping {
                retries: 10,
                sleep_nanos: 1000,
            },
            WaitStrategyConfig::Blocking,
            WaitStrategyConfig::LiteBlocking,
            WaitStrategyConfig::TimeoutBlocking { timeout_millis: 5 },
            WaitStrategyConfig::LiteTimeoutBlocking { timeout_millis: 5 },
            WaitStrategyConfig::PhasedBackoff {
                spin_timeout_micros: 1,
                yield_timeout_micros: 1,
                fallback: PhasedBackoffFallback::Sleep,
            },
        ];

        for config in configs {
            let strategy = config.build();
            strategy.signal_all_when_blocking();
        }
    }

    #[test]
    fn test_build_ring_buffer_and_executor() {
        let config = DisruptorConfig::new()
            .with_buffer_size(32)
            .with_producer_type(ProducerType::Single);

        let ring_buffer = config
            .build_ring_buffer(DefaultEventFactory::<u64>::new())
            .unwrap();
        assert_eq!(ring_buffer.buffer_size(), 32);

        let executor = config.build_executor().unwrap();
        assert_eq!(executor.thread_count(), 0);
    }
}
