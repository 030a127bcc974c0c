use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info};

use velo_core::events::OutboxEvent;
use velo_core::repository::OutboxRepository;

const RELAY_BATCH: usize = 50;

/// Drains unpublished outbox rows onto the broadcast channel. Rows are
/// marked published only after a send attempt, so a relay restart replays
/// anything in flight rather than dropping it.
pub async fn start_outbox_relay(
    outbox: Arc<dyn OutboxRepository>,
    tx: broadcast::Sender<OutboxEvent>,
    poll_interval: Duration,
) {
    info!("Outbox relay started");

    loop {
        match outbox.list_unpublished_events(RELAY_BATCH).await {
            Ok(events) => {
                for event in events {
                    let id = event.id;
                    let name = event.name.clone();
                    // send fails only when nobody is subscribed; the row
                    // is still consumed, SSE is a live feed not a queue
                    let _ = tx.send(event);
                    if let Err(err) = outbox.mark_event_published(id).await {
                        error!(event_id = %id, error = %err, "failed to mark event published");
                        break;
                    }
                    debug!(event_id = %id, event = %name, "event relayed");
                }
            }
            Err(err) => error!(error = %err, "outbox poll failed"),
        }

        sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use velo_store::MemoryStore;

    #[tokio::test]
    async fn relay_publishes_rows_and_marks_them() {
        let store = Arc::new(MemoryStore::new());
        let outbox: Arc<dyn OutboxRepository> = store.clone();
        let (tx, mut rx) = broadcast::channel(16);

        let event = OutboxEvent::new("order-status-updated", Uuid::new_v4(), serde_json::json!({}));
        outbox.append_event(&event).await.unwrap();

        let relay = tokio::spawn(start_outbox_relay(
            outbox.clone(),
            tx,
            Duration::from_millis(10),
        ));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("relay did not publish in time")
            .unwrap();
        assert_eq!(received.id, event.id);

        // give the relay a beat to stamp the row, then nothing is pending
        sleep(Duration::from_millis(50)).await;
        assert!(outbox.list_unpublished_events(10).await.unwrap().is_empty());
        relay.abort();
    }
}
