//! # Conversational Engine Seam
//!
//! The bridge only needs two things from an engine: somewhere to deliver
//! caller audio, and a producer that pushes synthesized audio back through
//! `AudioBridge::output` (interrupting via `AudioBridge::interrupt` on
//! barge-in). The engine itself — speech recognition, synthesis, turn
//! taking — lives behind this trait, outside this service.
//!
//! `EchoEngine` is the built-in default wiring: it loops caller audio back
//! to the call leg. That keeps the server runnable and testable end-to-end
//! with no external vendor attached.

use std::sync::Arc;

use tracing::info;

use crate::bridge::{AudioBridge, InputCallback};

/// A conversational-audio engine attached to one call leg.
///
/// `attach` is called once the call's WebSocket is up; the returned callback
/// becomes the bridge's sink for decoded caller audio. The engine keeps the
/// bridge handle to produce audio (`output`) and to barge in (`interrupt`).
/// `detach` is called when the call leg ends.
pub trait ConversationEngine: Send + Sync {
    fn attach(&self, bridge: Arc<AudioBridge>) -> InputCallback;

    fn detach(&self, _bridge: &AudioBridge) {}
}

/// Loops caller audio straight back to the call leg.
///
/// The audio is already in the wire codec, so echoing is a plain re-enqueue.
pub struct EchoEngine;

impl ConversationEngine for EchoEngine {
    fn attach(&self, bridge: Arc<AudioBridge>) -> InputCallback {
        info!(
            connection_id = %bridge.session().connection_id,
            "echo engine attached"
        );
        // The bridge owns the returned callback, so the bridge handle is held
        // weakly here to avoid a reference cycle.
        let bridge = Arc::downgrade(&bridge);
        Arc::new(move |audio: &[u8]| {
            if let Some(bridge) = bridge.upgrade() {
                bridge.output(audio.to_vec());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::session::CallSession;
    use crate::bridge::transport::testing::RecordingTransport;
    use crate::bridge::events::OutboundMessage;
    use crate::config::BridgeConfig;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_echo_engine_loops_audio_back() {
        let transport = Arc::new(RecordingTransport::new());
        let session = Arc::new(CallSession::new("echo-test".to_string()));
        let config = BridgeConfig {
            poll_interval_ms: 20,
            join_timeout_secs: 1,
            max_queue_chunks: 0,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
        };
        let bridge = Arc::new(AudioBridge::new(transport.clone(), session, config));

        let callback = EchoEngine.attach(bridge.clone());
        bridge.start(callback);
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"abc"}}"#);
        bridge.handle_message(r#"{"event":"media","media":{"payload":"AQI="}}"#);

        let deadline = Instant::now() + Duration::from_secs(2);
        while transport.sent_count() < 1 {
            assert!(Instant::now() < deadline, "echo frame never transmitted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bridge.stop().await;

        assert_eq!(
            transport.sent(),
            vec![OutboundMessage::media(Some("abc".to_string()), &[0x01, 0x02])]
        );
    }
}
