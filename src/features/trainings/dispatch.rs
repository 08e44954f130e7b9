//! Exactly-once notification dispatch
//!
//! A timer firing hands the dispatcher nothing but a training id; all state
//! is re-read from the store at fire time. Success marks the training
//! completed; any failure only disarms it so the next sweep retries.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use log::{debug, warn};
use std::sync::Arc;

use crate::core::DispatchError;
use crate::database::{Database, EVERYONE};
use crate::features::trainings::queue::TrainingQueue;
use crate::transport::Transport;

/// Resolves the audience for a training, delivers the notification, and
/// flips `completed`.
#[derive(Clone)]
pub struct Dispatcher {
    database: Database,
    queue: Arc<TrainingQueue>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        database: Database,
        queue: Arc<TrainingQueue>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Dispatcher {
            database,
            queue,
            transport,
        }
    }

    /// Dispatch one armed training.
    ///
    /// The queue entry is always dropped, success or not: a failed dispatch
    /// leaves `completed = false` in the store, which is all the next sweep
    /// needs to rediscover and re-arm the training.
    pub async fn dispatch(&self, training_id: i64) -> Result<(), DispatchError> {
        debug!("Notifying about training {training_id}");

        let result = self.notify(training_id).await;
        self.queue.disarm(training_id);

        match result {
            Ok(true) => {
                self.database.mark_completed(training_id).await?;
                Ok(())
            }
            // Stray timer fire: the training vanished or already completed.
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Returns `Ok(true)` when a notification was actually sent.
    async fn notify(&self, training_id: i64) -> Result<bool, DispatchError> {
        let Some(training) = self.database.get_training(training_id).await? else {
            warn!("Training {training_id} no longer exists, dropping timer");
            return Ok(false);
        };

        if training.completed {
            debug!("Training {training_id} already completed, skipping dispatch");
            return Ok(false);
        }

        let mentions = self.resolve_mentions(training_id).await?;

        self.transport
            .send_message(&training.channel, &format!("Hey, training time! {mentions}"))
            .await?;

        if let Some(link) = training.link.as_deref().filter(|l| !l.is_empty()) {
            debug!("Training link: {link}");
            self.transport.send_message(&training.channel, link).await?;
        }

        Ok(true)
    }

    /// An empty audience or any `everyone` row means the whole channel;
    /// individual-user rows alongside the sentinel are redundant.
    async fn resolve_mentions(&self, training_id: i64) -> Result<String, DispatchError> {
        let audience = self.database.get_audience(training_id).await?;

        if audience.is_empty() || audience.iter().any(|t| t == EVERYONE) {
            return Ok("@everyone".to_string());
        }

        let mut mentions = Vec::with_capacity(audience.len());
        for target in &audience {
            mentions.push(self.transport.resolve_mention(target).await?);
        }
        Ok(mentions.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use chrono::Utc;

    struct Fixture {
        database: Database,
        queue: Arc<TrainingQueue>,
        transport: Arc<MockTransport>,
        dispatcher: Dispatcher,
    }

    async fn fixture() -> Fixture {
        let database = Database::new(":memory:").await.unwrap();
        let queue = Arc::new(TrainingQueue::new());
        let transport = Arc::new(MockTransport::new());
        let dispatcher = Dispatcher::new(database.clone(), queue.clone(), transport.clone());
        Fixture {
            database,
            queue,
            transport,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_empty_audience_mentions_everyone() {
        let f = fixture().await;
        let training = f
            .database
            .create_training("77", Utc::now(), None, &[])
            .await
            .unwrap();
        f.queue.try_arm(training.id);

        f.dispatcher.dispatch(training.id).await.unwrap();

        let sent = f.transport.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "77");
        assert_eq!(sent[0].1, "Hey, training time! @everyone");
        assert!(f.database.get_training(training.id).await.unwrap().unwrap().completed);
        assert!(!f.queue.is_armed(training.id));
    }

    #[tokio::test]
    async fn test_everyone_sentinel_dominates_mixed_audience() {
        let f = fixture().await;
        let audience = vec![EVERYONE.to_string(), "123".to_string()];
        let training = f
            .database
            .create_training("77", Utc::now(), None, &audience)
            .await
            .unwrap();
        f.queue.try_arm(training.id);

        f.dispatcher.dispatch(training.id).await.unwrap();

        let sent = f.transport.sent_messages();
        assert_eq!(sent[0].1, "Hey, training time! @everyone");
        assert!(!sent[0].1.contains("<@123>"));
    }

    #[tokio::test]
    async fn test_individual_mentions_are_resolved_and_joined() {
        let f = fixture().await;
        let audience = vec!["111".to_string(), "222".to_string()];
        let training = f
            .database
            .create_training("77", Utc::now(), None, &audience)
            .await
            .unwrap();
        f.queue.try_arm(training.id);

        f.dispatcher.dispatch(training.id).await.unwrap();

        let sent = f.transport.sent_messages();
        assert_eq!(sent[0].1, "Hey, training time! <@111> <@222>");
    }

    #[tokio::test]
    async fn test_link_is_sent_as_second_message() {
        let f = fixture().await;
        let training = f
            .database
            .create_training("77", Utc::now(), Some("https://example.com/drill"), &[])
            .await
            .unwrap();
        f.queue.try_arm(training.id);

        f.dispatcher.dispatch(training.id).await.unwrap();

        let sent = f.transport.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1, "https://example.com/drill");
    }

    #[tokio::test]
    async fn test_failed_send_disarms_but_does_not_complete() {
        let f = fixture().await;
        let training = f
            .database
            .create_training("77", Utc::now(), None, &[])
            .await
            .unwrap();
        f.queue.try_arm(training.id);
        f.transport.fail_next_sends(1);

        assert!(f.dispatcher.dispatch(training.id).await.is_err());

        assert!(!f.queue.is_armed(training.id));
        let loaded = f.database.get_training(training.id).await.unwrap().unwrap();
        assert!(!loaded.completed);
    }

    #[tokio::test]
    async fn test_completed_training_short_circuits() {
        let f = fixture().await;
        let training = f
            .database
            .create_training("77", Utc::now(), None, &[])
            .await
            .unwrap();
        f.database.mark_completed(training.id).await.unwrap();
        f.queue.try_arm(training.id);

        f.dispatcher.dispatch(training.id).await.unwrap();

        assert!(f.transport.sent_messages().is_empty());
        assert!(!f.queue.is_armed(training.id));
    }

    #[tokio::test]
    async fn test_vanished_training_is_a_noop() {
        let f = fixture().await;
        f.queue.try_arm(999);
        f.dispatcher.dispatch(999).await.unwrap();
        assert!(f.transport.sent_messages().is_empty());
        assert!(!f.queue.is_armed(999));
    }
}
