use affil_shared::models::events::{DeadLetterSink, OrderEvent};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Dead-letter sink backed by a Kafka topic. Payload carries the original
/// event plus the failure so a redelivery consumer can replay it.
pub struct KafkaDeadLetterSink {
    producer: EventProducer,
    topic: String,
}

impl KafkaDeadLetterSink {
    pub fn new(producer: EventProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn push(
        &self,
        event: &OrderEvent,
        error: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::json!({
            "event": event,
            "error": error,
            "failed_at": chrono::Utc::now().to_rfc3339(),
        });
        self.producer
            .publish(&self.topic, event.order_id(), &payload.to_string())
            .await?;
        Ok(())
    }
}
