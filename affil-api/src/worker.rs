use std::sync::Arc;

use affil_orchestrator::orchestrator::EventOrchestrator;
use affil_shared::models::events::OrderEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::{error, info};

/// Consumes order lifecycle events and feeds them to the orchestrator.
/// Malformed payloads are logged and skipped; handler outcomes (dead-letter
/// or drop) are the orchestrator's call.
pub async fn start_order_event_worker(
    brokers: String,
    group_id: String,
    topic: String,
    orchestrator: Arc<EventOrchestrator>,
) {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Consumer creation failed");

    consumer.subscribe(&[topic.as_str()]).expect("Can't subscribe");

    info!(topic = %topic, "Order event worker started");

    loop {
        match consumer.recv().await {
            Err(e) => error!("Kafka error: {}", e),
            Ok(m) => {
                if let Some(payload) = m.payload_view::<str>() {
                    match payload {
                        Ok(json) => match serde_json::from_str::<OrderEvent>(json) {
                            Ok(event) => {
                                info!(order_id = %event.order_id(), "Processing order event");
                                orchestrator.handle(event).await;
                            }
                            Err(e) => error!("Unparseable order event, skipping: {}", e),
                        },
                        Err(e) => error!("Error reading payload: {}", e),
                    }
                }
            }
        }
    }
}
