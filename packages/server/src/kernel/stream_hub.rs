//! In-process pub/sub hub for real-time streaming.
//!
//! Provides topic-keyed broadcast channels. Topics are opaque strings; the
//! hub has no knowledge of what is being streamed.
//!
//! # Usage
//!
//! Producers (store inserts, the Postgres notification bridge):
//!   hub.publish("results:abc-123", event).await;
//!
//! Consumers (aggregation pipelines, SSE endpoints):
//!   let rx = hub.subscribe("results:abc-123").await;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Generic in-process pub/sub hub.
///
/// Thread-safe, cloneable. Keyed by string topics.
pub struct StreamHub<T> {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<T>>>>,
    capacity: usize,
}

impl<T> Clone for StreamHub<T> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone + Send + 'static> StreamHub<T> {
    /// Create a new StreamHub with default capacity (256 messages per channel).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new StreamHub with the given channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish to a topic. Returns how many receivers got it; 0 if nobody
    /// is listening.
    pub async fn publish(&self, topic: &str, value: T) -> usize {
        let channels = self.channels.read().await;
        match channels.get(topic) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    /// Publish to every topic that currently has a channel.
    pub async fn publish_all(&self, value: T) {
        let channels = self.channels.read().await;
        for tx in channels.values() {
            let _ = tx.send(value.clone());
        }
    }

    /// Subscribe to a topic. Creates the channel if it doesn't exist.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<T> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Drop the channel for `topic` if it has no receivers left.
    pub async fn release(&self, topic: &str) {
        let mut channels = self.channels.write().await;
        if channels
            .get(topic)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(topic);
        }
    }

    pub async fn topic_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl<T: Clone + Send + 'static> Default for StreamHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let hub = StreamHub::<String>::new();
        let mut rx = hub.subscribe("results:a").await;

        assert_eq!(hub.publish("results:a", "hello".to_string()).await, 1);
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = StreamHub::<u32>::new();
        assert_eq!(hub.publish("nobody:listening", 1).await, 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let hub = StreamHub::<u32>::new();
        let mut a = hub.subscribe("results:a").await;
        let mut b = hub.subscribe("results:b").await;

        hub.publish("results:a", 1).await;
        hub.publish("results:b", 2).await;

        assert_eq!(a.recv().await.unwrap(), 1);
        assert_eq!(b.recv().await.unwrap(), 2);
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_all_fans_out() {
        let hub = StreamHub::<u32>::new();
        let mut a = hub.subscribe("results:a").await;
        let mut b = hub.subscribe("results:b").await;

        hub.publish_all(9).await;

        assert_eq!(a.recv().await.unwrap(), 9);
        assert_eq!(b.recv().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn release_keeps_channels_with_receivers() {
        let hub = StreamHub::<u32>::new();
        let first = hub.subscribe("results:a").await;
        let _second = hub.subscribe("results:a").await;

        drop(first);
        hub.release("results:a").await;
        assert_eq!(hub.topic_count().await, 1);
    }

    #[tokio::test]
    async fn release_prunes_topic_without_receivers() {
        let hub = StreamHub::<u32>::new();
        let rx = hub.subscribe("results:a").await;
        assert_eq!(hub.topic_count().await, 1);

        drop(rx);
        hub.release("results:a").await;
        assert_eq!(hub.topic_count().await, 0);
    }
}
