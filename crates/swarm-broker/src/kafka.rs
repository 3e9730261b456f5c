//! Kafka broker backend.
//!
//! Production implementation of the producer/consumer traits over rdkafka.
//! Records are keyed by feedback ID so one feedback's records land on one
//! partition; the consumer joins the `iterateswarm-consumer` group and
//! commits offsets manually, only after the launcher reports a successful
//! workflow start.
//!
//! Compiled only with the `kafka` feature:
//!
//! ```toml
//! [dependencies]
//! swarm-broker = { version = "0.1", features = ["kafka"] }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, TopicPartitionList};

use crate::error::{Error, Result};
use crate::{CONSUMER_GROUP, ConsumedRecord, FeedbackConsumer, FeedbackProducer};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Kafka configuration.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated broker addresses.
    pub brokers: String,
    /// Topic for feedback events.
    pub topic: String,
    /// Consumer group for the launcher.
    pub group: String,
}

impl KafkaConfig {
    /// Creates a config with the default consumer group.
    #[must_use]
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            group: CONSUMER_GROUP.to_string(),
        }
    }
}

/// Kafka-backed producer, one per gateway process.
pub struct KafkaFeedbackProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaFeedbackProducer {
    /// Connects a producer.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn connect(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| Error::transport_with_source("failed to create kafka producer", e))?;
        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl FeedbackProducer for KafkaFeedbackProducer {
    async fn publish(&self, key: &str, payload: Bytes) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload.as_ref());
        self.producer
            .send(record, PUBLISH_TIMEOUT)
            .await
            .map_err(|(e, _)| Error::transport_with_source("failed to publish record", e))?;
        tracing::debug!(topic = %self.topic, key, "record published");
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        self.producer
            .client()
            .fetch_metadata(Some(&self.topic), PUBLISH_TIMEOUT)
            .map_err(|e| Error::transport_with_source("kafka metadata fetch failed", e))?;
        Ok(())
    }
}

/// Kafka-backed consumer, one per launcher process.
pub struct KafkaFeedbackConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaFeedbackConsumer {
    /// Connects a consumer and subscribes to the feedback topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or subscribed.
    pub fn connect(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| Error::transport_with_source("failed to create kafka consumer", e))?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| Error::transport_with_source("failed to subscribe", e))?;
        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl FeedbackConsumer for KafkaFeedbackConsumer {
    async fn next(&self) -> Result<Option<ConsumedRecord>> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| Error::transport_with_source("kafka receive failed", e))?;
        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();
        let payload = Bytes::copy_from_slice(message.payload().unwrap_or_default());
        let offset = u64::try_from(message.offset()).unwrap_or(0);
        Ok(Some(ConsumedRecord {
            key,
            payload,
            partition: message.partition(),
            offset,
        }))
    }

    async fn commit(&self, record: &ConsumedRecord) -> Result<()> {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(
            &self.topic,
            record.partition,
            rdkafka::Offset::Offset(i64::try_from(record.offset + 1).unwrap_or(i64::MAX)),
        )
        .map_err(|e| Error::transport_with_source("failed to build offset list", e))?;
        self.consumer
            .commit(&list, CommitMode::Async)
            .map_err(|e| Error::transport_with_source("kafka commit failed", e))?;
        Ok(())
    }
}
