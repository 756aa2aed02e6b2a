//! # Call Audio Bridge
//!
//! Bidirectional audio relay between a telephony media-stream WebSocket and
//! a conversational-audio engine.
//!
//! ## Key Components:
//! - **Wire events**: serde types for the Media Streams JSON frames
//! - **Output queue**: concurrency-safe FIFO decoupling engine output from
//!   transmission pace
//! - **Call session**: stream-SID binding, lifecycle state, per-call counters
//! - **Transport seam**: the outbound-frame sink the relay writes to
//! - **Audio bridge**: the relay core — start/stop lifecycle, inbound
//!   dispatch, paced transmitter, barge-in interrupt
//!
//! ## Audio Format:
//! Both directions carry 8 kHz mu-law, the telephony wire codec. This module
//! never transcodes; payloads are opaque bytes between base64 decode and
//! encode.

pub mod events;     // Wire message shapes + payload codec
pub mod interface;  // The relay core
pub mod queue;      // Outbound chunk FIFO
pub mod session;    // Per-call state and the live-call registry
pub mod transport;  // Outbound transport seam

pub use interface::{AudioBridge, InputCallback};
pub use session::{CallRegistry, CallSession};
pub use transport::MediaTransport;
