//! Loopback Transport — In-process Stand-in for the Agent
//!
//! Frames the engine publishes appear on the paired `LoopbackPeer`;
//! frames the peer injects are what the engine receives. Used for
//! dry-run mode (the peer only logs) and for driving the engine in
//! tests. A gated pair holds `connect` until the peer releases it,
//! which lets callers queue commands while the engine is still
//! starting.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::domain::error::TransportError;
use crate::ports::transport::Transport;

/// Engine side of the loopback link.
pub struct LoopbackTransport {
    /// Frames published by the engine.
    outbound: mpsc::UnboundedSender<String>,
    /// Frames injected by the peer.
    inbound: mpsc::UnboundedReceiver<String>,
    /// Held until the peer releases the connection.
    gate: Option<oneshot::Receiver<()>>,
    /// Whether `connect` has completed.
    connected: bool,
}

/// Agent side of the loopback link.
pub struct LoopbackPeer {
    /// Frames published by the engine.
    sent: mpsc::UnboundedReceiver<String>,
    /// Frames to deliver to the engine.
    replies: mpsc::UnboundedSender<String>,
    /// Releases a gated `connect`.
    gate: Option<oneshot::Sender<()>>,
}

impl LoopbackTransport {
    /// A pair whose `connect` succeeds immediately.
    pub fn pair() -> (Self, LoopbackPeer) {
        Self::build(false)
    }

    /// A pair whose `connect` waits for `LoopbackPeer::release`.
    pub fn gated_pair() -> (Self, LoopbackPeer) {
        Self::build(true)
    }

    fn build(gated: bool) -> (Self, LoopbackPeer) {
        let (outbound, sent) = mpsc::unbounded_channel();
        let (replies, inbound) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = if gated {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        (
            Self {
                outbound,
                inbound,
                gate: gate_rx,
                connected: false,
            },
            LoopbackPeer {
                sent,
                replies,
                gate: gate_tx,
            },
        )
    }
}

impl LoopbackPeer {
    /// Let a gated `connect` complete. No effect on an ungated pair.
    pub fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            let _ = gate.send(());
        }
    }

    /// Wait for the next frame the engine publishes.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Take an already-published frame without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Deliver a frame to the engine. Returns false once the engine is gone.
    pub fn reply(&self, frame: impl Into<String>) -> bool {
        self.replies.send(frame.into()).is_ok()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if let Some(gate) = self.gate.take() {
            gate.await.map_err(|_| TransportError::Connect {
                address: "loopback".to_string(),
                reason: "peer dropped before releasing the connection".to_string(),
            })?;
        }
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(frame.to_string())
            .map_err(|_| TransportError::Send("loopback peer closed".to_string()))
    }

    async fn try_receive(
        &mut self,
        poll_timeout: Duration,
    ) -> Result<Option<String>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match tokio::time::timeout(poll_timeout, self.inbound.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            // Peer gone: nothing will ever arrive again.
            Ok(None) => Err(TransportError::Cancelled),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.connected = false;
        self.inbound.close();
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}
