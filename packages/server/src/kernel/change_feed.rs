//! Change feed of newly inserted results.
//!
//! Delivery is at-least-once with no replay: a subscriber only sees rows
//! inserted after it subscribed, may see a row twice, and is told to reload
//! (`FeedEvent::Resync`) whenever notifications could have been missed.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::stream_hub::StreamHub;
use crate::common::SessionId;
use crate::domains::results::TossResult;

/// A message on a session's result feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    ResultInserted { result: TossResult },
    /// Notifications may have been lost; observers should bulk-load again.
    Resync,
}

/// Hub topic carrying a session's inserts.
pub fn results_topic(session_id: SessionId) -> String {
    format!("results:{}", session_id)
}

/// Cancellable handle on a session's result feed.
pub struct ResultSubscription {
    session_id: SessionId,
    topic: String,
    rx: broadcast::Receiver<FeedEvent>,
    hub: StreamHub<FeedEvent>,
}

impl ResultSubscription {
    pub async fn open(hub: &StreamHub<FeedEvent>, session_id: SessionId) -> Self {
        let topic = results_topic(session_id);
        let rx = hub.subscribe(&topic).await;
        debug!(session_id = %session_id, "Subscribed to result feed");
        Self {
            session_id,
            topic,
            rx,
            hub: hub.clone(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Next event, or `None` once the feed is gone.
    ///
    /// A lagging receiver has already lost messages, so lag is reported as
    /// `Resync` rather than skipped.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(missed)) => {
                warn!(session_id = %self.session_id, missed, "Result feed lagged");
                Some(FeedEvent::Resync)
            }
            Err(RecvError::Closed) => None,
        }
    }

    /// Release the subscription and prune the topic if nobody else uses it.
    pub async fn unsubscribe(self) {
        let Self {
            session_id,
            topic,
            rx,
            hub,
        } = self;
        drop(rx);
        hub.release(&topic).await;
        debug!(session_id = %session_id, "Released result feed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lag_becomes_resync() {
        let hub = StreamHub::<FeedEvent>::with_capacity(1);
        let session_id = SessionId::new();
        let mut sub = ResultSubscription::open(&hub, session_id).await;

        let topic = results_topic(session_id);
        hub.publish(&topic, FeedEvent::Resync).await;
        hub.publish(&topic, FeedEvent::Resync).await;
        hub.publish(&topic, FeedEvent::Resync).await;

        // first recv reports the lag, the newest message is still there
        assert_eq!(sub.recv().await, Some(FeedEvent::Resync));
        assert_eq!(sub.recv().await, Some(FeedEvent::Resync));
    }

    #[tokio::test]
    async fn unsubscribe_prunes_topic() {
        let hub = StreamHub::<FeedEvent>::new();
        let sub = ResultSubscription::open(&hub, SessionId::new()).await;
        assert_eq!(hub.topic_count().await, 1);

        sub.unsubscribe().await;
        assert_eq!(hub.topic_count().await, 0);
    }
}
