//! Publishes domain events to NATS when a connection is configured.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        tracing::info!(url, "Connected to NATS");
        Ok(Self::new(Some(client)))
    }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    /// Best effort: failures are logged, never returned.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(&event).await;
        }
    }

    pub async fn publish(&self, event: &DomainEvent) {
        let subject = event.subject();
        let Some(client) = &self.nats else {
            tracing::debug!(subject, "NATS not configured, dropping event");
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, subject, "Failed to serialize event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
            tracing::warn!(error = %e, subject, "Failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_disabled_publisher_drops_events() {
        let publisher = EventPublisher::default();
        assert!(!publisher.is_enabled());
        publisher
            .publish_all(vec![DomainEvent::Order(OrderEvent::Cancelled { order_id: Uuid::now_v7(), refund_pending: false })])
            .await;
    }

    #[test]
    fn test_event_payload_shape() {
        let order_id = Uuid::now_v7();
        let event = DomainEvent::Order(OrderEvent::Cancelled { order_id, refund_pending: true });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "cancelled");
        assert_eq!(value["refund_pending"], true);
        assert_eq!(event.subject(), "storefront.order.cancelled");
    }
}
