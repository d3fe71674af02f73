//! Producer configuration, loaded from the environment the way `common/kafka`'s
//! `KafkaConfig` is in the wider stack, or built programmatically via
//! [`crate::producer::ProducerBuilder`].

use std::time::Duration;

use envconfig::Envconfig;

use crate::client::Acks;
use crate::codec::Codec;
use crate::error::ProducerError;

/// Recognized, validated producer options (spec §3 Configuration table).
///
/// `partitioner` and `clock` are not represented here: they are injection seams
/// (trait objects), not scalar values, and are supplied to
/// [`crate::producer::ProducerBuilder`] directly rather than sourced from the
/// environment.
#[derive(Debug, Clone, Envconfig)]
pub struct ProducerConfig {
    /// Broker ack level: 0 = none, 1 = leader, -1 = all. Defaults to leader-ack, the
    /// same default the upstream producer ships.
    #[envconfig(from = "KAFKA_PRODUCER_REQ_ACKS", default = "1")]
    pub req_acks: i16,

    #[envconfig(from = "KAFKA_PRODUCER_ACK_TIMEOUT_MS", default = "1000")]
    pub ack_timeout_ms: u64,

    /// 0 = none, 1 = gzip, 2 = snappy.
    #[envconfig(from = "KAFKA_PRODUCER_CODEC", default = "0")]
    pub codec: i32,

    #[envconfig(from = "KAFKA_PRODUCER_BATCH_SEND", default = "true")]
    pub batch_send: bool,

    #[envconfig(from = "KAFKA_PRODUCER_BATCH_EVERY_N", default = "10")]
    pub batch_every_n: u32,

    #[envconfig(from = "KAFKA_PRODUCER_BATCH_EVERY_B", default = "32768")]
    pub batch_every_b: u64,

    #[envconfig(from = "KAFKA_PRODUCER_BATCH_EVERY_T_SECS", default = "30")]
    pub batch_every_t_secs: u64,

    #[envconfig(from = "KAFKA_PRODUCER_MAX_REQ_ATTEMPTS", default = "10")]
    pub max_req_attempts: u32,

    #[envconfig(from = "KAFKA_PRODUCER_RETRY_INTERVAL_MS", default = "100")]
    pub retry_interval_ms: u64,
}

impl ProducerConfig {
    pub fn acks(&self) -> Result<Acks, ProducerError> {
        Acks::try_from(self.req_acks)
    }

    pub fn codec(&self) -> Result<Codec, ProducerError> {
        Codec::try_from(self.codec)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn batch_every_t(&self) -> Duration {
        Duration::from_secs(self.batch_every_t_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Validate every field that the caller could have supplied a nonsensical value
    /// for (spec §7, "Validation" row). Called both after `init_from_env` and at the
    /// end of [`crate::producer::ProducerBuilder::build`].
    pub fn validate(&self) -> Result<(), ProducerError> {
        self.acks()?;
        self.codec()?;
        if self.max_req_attempts == 0 {
            return Err(ProducerError::Validation(
                "max_req_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch_send && self.batch_every_n == 0 && self.batch_every_b == 0 {
            return Err(ProducerError::Validation(
                "batch_send requires a nonzero batch_every_n or batch_every_b".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            req_acks: 1,
            ack_timeout_ms: 1000,
            codec: 0,
            batch_send: true,
            batch_every_n: 10,
            batch_every_b: 32768,
            batch_every_t_secs: 30,
            max_req_attempts: 10,
            retry_interval_ms: 100,
        }
    }
}
