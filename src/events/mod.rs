use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::TxnType;

/// Domain events published after a unit of work commits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TransactionRecorded {
        transaction_id: Uuid,
        txn_type: TxnType,
        item_id: Uuid,
        qty: i32,
        created_by_id: Uuid,
    },
    SyncBatchProcessed {
        user_id: Uuid,
        applied: usize,
        skipped: usize,
        rejected: usize,
        failed: usize,
    },
    ProjectCreated {
        project_id: Uuid,
        code: String,
        division_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns both ends
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Publishes without waiting. A full or closed channel drops the event.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Failed to publish event: {}", e);
        }
    }
}

/// Drains the channel until every sender is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::TransactionRecorded {
                transaction_id,
                txn_type,
                item_id,
                qty,
                created_by_id,
            } => {
                info!(
                    %transaction_id,
                    %txn_type,
                    %item_id,
                    qty,
                    %created_by_id,
                    "transaction recorded"
                );
            }
            Event::SyncBatchProcessed {
                user_id,
                applied,
                skipped,
                rejected,
                failed,
            } => {
                info!(
                    %user_id,
                    applied,
                    skipped,
                    rejected,
                    failed,
                    "sync batch processed"
                );
            }
            Event::ProjectCreated {
                project_id,
                code,
                division_id,
            } => {
                info!(%project_id, code = %code, %division_id, "project created");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn processor_drains_and_stops_when_senders_drop() {
        let (sender, rx) = EventSender::channel(4);
        sender.publish(Event::ProjectCreated {
            project_id: Uuid::new_v4(),
            code: "PRJABCDE".into(),
            division_id: Uuid::new_v4(),
        });
        drop(sender);

        tokio::time::timeout(std::time::Duration::from_secs(1), process_events(rx))
            .await
            .expect("processor should stop once the channel closes");
    }

    #[tokio::test]
    async fn publish_on_full_channel_does_not_block() {
        let (sender, mut rx) = EventSender::channel(1);
        for _ in 0..3 {
            sender.publish(Event::SyncBatchProcessed {
                user_id: Uuid::nil(),
                applied: 1,
                skipped: 0,
                rejected: 0,
                failed: 0,
            });
        }
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
