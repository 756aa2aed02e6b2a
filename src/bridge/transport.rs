//! # Transport Seam
//!
//! The relay core never talks to a WebSocket directly; it hands outbound
//! frames to a [`MediaTransport`]. The production implementation wraps the
//! media-stream actor's address (see `websocket.rs`), tests use a recording
//! mock, and anything else that can carry the wire messages (another socket
//! library, a replay harness) can slot in here.

use crate::bridge::events::OutboundMessage;
use crate::error::BridgeError;

/// Sink for outbound wire frames.
///
/// `send_message` must not block: implementations hand the frame to their own
/// write context (an actor mailbox, a channel) and report failure rather than
/// waiting. A failed send is transient from the relay's point of view — it is
/// logged and the pipeline continues.
pub trait MediaTransport: Send + Sync {
    fn send_message(&self, message: OutboundMessage) -> Result<(), BridgeError>;
}
