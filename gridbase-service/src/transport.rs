//! Message transport.
//!
//! The listener talks to the broker only through the [`Transport`] trait.
//! [`ChannelTransport`] implements it over tokio channels for tests and for
//! embedding the service in-process; its [`ChannelClient`] plays the role of
//! the remote caller.

use async_trait::async_trait;
use gridbase_core::TransportError;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One message taken from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Tag used to acknowledge the delivery.
    pub tag: u64,
    pub body: Vec<u8>,
    /// Queue the reply goes to, if the caller wants one.
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

/// A reply published by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub routing_key: String,
    pub correlation_id: Option<String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send {
    /// Open the connection and declare the consumed queue.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Next delivery, or `None` once the channel is closed.
    async fn receive(&mut self) -> Result<Option<Delivery>, TransportError>;

    async fn publish(
        &mut self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError>;

    async fn ack(&mut self, tag: u64) -> Result<(), TransportError>;
}

// ============================================================================
// CHANNEL TRANSPORT
// ============================================================================

#[derive(Debug, Default)]
struct Shared {
    acks: Mutex<Vec<u64>>,
    connect_attempts: AtomicUsize,
    next_tag: AtomicU64,
}

/// In-process [`Transport`] backed by tokio channels.
#[derive(Debug)]
pub struct ChannelTransport {
    address: String,
    failures_remaining: usize,
    connected: bool,
    incoming: mpsc::Receiver<Delivery>,
    outgoing: mpsc::UnboundedSender<Published>,
    shared: Arc<Shared>,
}

/// Caller side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelClient {
    sender: Option<mpsc::Sender<Delivery>>,
    replies: mpsc::UnboundedReceiver<Published>,
    shared: Arc<Shared>,
}

/// Create a linked transport/client pair with room for `capacity`
/// pending deliveries.
pub fn channel(address: impl Into<String>, capacity: usize) -> (ChannelTransport, ChannelClient) {
    let (sender, incoming) = mpsc::channel(capacity.max(1));
    let (outgoing, replies) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    (
        ChannelTransport {
            address: address.into(),
            failures_remaining: 0,
            connected: false,
            incoming,
            outgoing,
            shared: Arc::clone(&shared),
        },
        ChannelClient {
            sender: Some(sender),
            replies,
            shared,
        },
    )
}

impl ChannelTransport {
    /// Fail the first `failures` connection attempts.
    pub fn with_connect_failures(mut self, failures: usize) -> Self {
        self.failures_remaining = failures;
        self
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Unreachable {
                address: self.address.clone(),
                reason: "not connected".to_string(),
            })
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(TransportError::Unreachable {
                address: self.address.clone(),
                reason: "connection refused".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Delivery>, TransportError> {
        self.ensure_connected()?;
        Ok(self.incoming.recv().await)
    }

    async fn publish(
        &mut self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.outgoing
            .send(Published {
                routing_key: reply_to.to_string(),
                correlation_id: correlation_id.map(str::to_string),
                body,
            })
            .map_err(|_| TransportError::PublishFailed {
                reason: "reply channel closed".to_string(),
            })
    }

    async fn ack(&mut self, tag: u64) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.shared
            .acks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tag);
        Ok(())
    }
}

impl ChannelClient {
    /// Queue a message body. Returns its delivery tag.
    pub async fn send(
        &self,
        body: Vec<u8>,
        reply_to: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<u64, TransportError> {
        let sender = self.sender.as_ref().ok_or(TransportError::Closed)?;
        let tag = self.shared.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        sender
            .send(Delivery {
                tag,
                body,
                reply_to: reply_to.map(str::to_string),
                correlation_id: correlation_id.map(str::to_string),
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(tag)
    }

    /// Queue a JSON request that expects a reply on `reply_to`.
    pub async fn request(
        &self,
        request: &serde_json::Value,
        reply_to: &str,
        correlation_id: &str,
    ) -> Result<u64, TransportError> {
        let body = serde_json::to_vec(request).map_err(|e| TransportError::PublishFailed {
            reason: e.to_string(),
        })?;
        self.send(body, Some(reply_to), Some(correlation_id)).await
    }

    /// Wait for the next published reply.
    pub async fn next_reply(&mut self) -> Option<Published> {
        self.replies.recv().await
    }

    /// Tags acknowledged so far, in order.
    pub fn acks(&self) -> Vec<u64> {
        self.shared
            .acks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Close the queue; the consumer sees the end of the channel once it
    /// has drained pending deliveries.
    pub fn close(&mut self) {
        self.sender = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failures_then_success() {
        let (mut transport, client) = channel("broker:5672", 4);
        transport = transport.with_connect_failures(2);
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
        assert_eq!(client.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_receive_requires_connection() {
        let (mut transport, _client) = channel("broker:5672", 4);
        assert!(matches!(
            transport.receive().await,
            Err(TransportError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_round_trip() -> Result<(), TransportError> {
        let (mut transport, mut client) = channel("broker:5672", 4);
        transport.connect().await?;

        let tag = client.send(b"ping".to_vec(), Some("replies"), Some("c-1")).await?;
        let delivery = transport.receive().await?;
        assert_eq!(delivery.as_ref().map(|d| d.tag), Some(tag));

        transport.publish("replies", Some("c-1"), b"pong".to_vec()).await?;
        transport.ack(tag).await?;

        let reply = client.next_reply().await;
        assert_eq!(reply.map(|r| r.body), Some(b"pong".to_vec()));
        assert_eq!(client.acks(), vec![tag]);
        Ok(())
    }

    #[tokio::test]
    async fn test_close_ends_receive() -> Result<(), TransportError> {
        let (mut transport, mut client) = channel("broker:5672", 4);
        transport.connect().await?;
        client.close();
        assert_eq!(transport.receive().await?, None);
        assert_eq!(client.send(Vec::new(), None, None).await, Err(TransportError::Closed));
        Ok(())
    }
}
