//! ZeroMQ Transport — PUB/SUB Link to the Execution Agent
//!
//! The agent binds two sockets: an inbound SUB socket that receives our
//! commands and an outbound PUB socket that broadcasts its replies. We
//! connect a PUB socket to the first and a SUB socket to the second.
//!
//! Features:
//! - Subscribe filter from config (empty = every topic)
//! - Bounded receive via `tokio::time::timeout`
//! - No reconnect: faults surface as `TransportError`

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use zeromq::{PubSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::config::TransportConfig;
use crate::domain::error::TransportError;
use crate::ports::transport::Transport;

/// ZeroMQ adapter implementing the `Transport` port.
pub struct ZmqTransport {
    /// Agent inbound endpoint.
    publish_address: String,
    /// Agent outbound endpoint.
    subscribe_address: String,
    /// Subscription prefix filter.
    topic: String,
    /// Command socket, present once connected.
    publisher: Option<PubSocket>,
    /// Reply socket, present once connected.
    subscriber: Option<SubSocket>,
}

impl ZmqTransport {
    /// Create an unconnected transport from config.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            publish_address: config.publish_address.clone(),
            subscribe_address: config.subscribe_address.clone(),
            topic: config.subscribe_topic.clone(),
            publisher: None,
            subscriber: None,
        }
    }
}

#[async_trait]
impl Transport for ZmqTransport {
    #[instrument(skip(self), fields(publish = %self.publish_address, subscribe = %self.subscribe_address))]
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut publisher = PubSocket::new();
        publisher
            .connect(&self.publish_address)
            .await
            .map_err(|e| TransportError::Connect {
                address: self.publish_address.clone(),
                reason: e.to_string(),
            })?;

        let mut subscriber = SubSocket::new();
        subscriber
            .connect(&self.subscribe_address)
            .await
            .map_err(|e| TransportError::Connect {
                address: self.subscribe_address.clone(),
                reason: e.to_string(),
            })?;
        subscriber
            .subscribe(&self.topic)
            .await
            .map_err(|e| TransportError::Connect {
                address: self.subscribe_address.clone(),
                reason: format!("subscribe failed: {e}"),
            })?;

        self.publisher = Some(publisher);
        self.subscriber = Some(subscriber);

        info!(topic = %self.topic, "ZeroMQ publish/subscribe sockets connected");
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let publisher = self.publisher.as_mut().ok_or(TransportError::NotConnected)?;
        publisher
            .send(ZmqMessage::from(frame.to_string()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn try_receive(
        &mut self,
        poll_timeout: Duration,
    ) -> Result<Option<String>, TransportError> {
        let subscriber = self.subscriber.as_mut().ok_or(TransportError::NotConnected)?;

        match tokio::time::timeout(poll_timeout, subscriber.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(message)) => String::try_from(message)
                .map(Some)
                .map_err(|e| TransportError::Decode(e.to_string())),
            Ok(Err(e)) => Err(TransportError::Receive(e.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Some(subscriber) = self.subscriber.take() {
            let _ = subscriber.close().await;
            debug!("Subscriber socket closed");
        }
        if let Some(publisher) = self.publisher.take() {
            let _ = publisher.close().await;
            debug!("Publisher socket closed");
        }
    }

    fn name(&self) -> &'static str {
        "zmq"
    }
}
