//! # Media Stream Wire Messages
//!
//! Serde types for the JSON frames exchanged with the Twilio Media Streams
//! WebSocket. The outbound shapes must serialize byte-for-byte to what the
//! far end expects:
//!
//! - media: `{"event":"media","streamSid":"<id>","media":{"payload":"<base64>"}}`
//! - clear: `{"event":"clear","streamSid":"<id>"}`
//!
//! Inbound frames are tagged the same way (`event` field); anything this
//! service does not act on still parses, so logs can name what was ignored.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// One decoded frame received from the telephony leg.
///
/// Only `Start` and `Media` drive the relay. `Connected`, `Stop`, and `Mark`
/// are part of the Media Streams protocol and are parsed so dispatch can log
/// them by name, but they take no action. Unknown event types collapse into
/// `Unknown` and are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioEvent {
    Connected,
    Start { start: StartFrame },
    Media { media: InboundMediaFrame },
    Stop,
    Mark,
    #[serde(other)]
    Unknown,
}

/// Payload of an inbound start event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFrame {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
}

/// Payload of an inbound media event. The audio bytes arrive base64-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMediaFrame {
    pub payload: String,
}

impl InboundMediaFrame {
    /// Decode the base64 payload into raw wire-codec audio bytes.
    pub fn decode(&self) -> Result<Vec<u8>, BridgeError> {
        BASE64
            .decode(&self.payload)
            .map_err(|e| BridgeError::Malformed(format!("invalid base64 payload: {}", e)))
    }
}

/// One frame to be written to the telephony leg.
///
/// `stream_sid` is `Option` because an interrupt can race call start: the
/// reference behavior is to send the clear frame anyway, with a JSON `null`
/// identifier, and that is preserved here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
        media: OutboundMediaPayload,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMediaPayload {
    pub payload: String,
}

impl OutboundMessage {
    /// Build a media frame, base64-encoding the raw audio chunk.
    pub fn media(stream_sid: Option<String>, audio: &[u8]) -> Self {
        OutboundMessage::Media {
            stream_sid,
            media: OutboundMediaPayload {
                payload: BASE64.encode(audio),
            },
        }
    }

    /// Build a clear frame instructing the far end to flush buffered playback.
    pub fn clear(stream_sid: Option<String>) -> Self {
        OutboundMessage::Clear { stream_sid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_media_wire_shape() {
        let msg = OutboundMessage::media(Some("abc".to_string()), &[0x01, 0x02]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"event":"media","streamSid":"abc","media":{"payload":"AQI="}}"#
        );
    }

    #[test]
    fn test_outbound_clear_wire_shape() {
        let msg = OutboundMessage::clear(Some("abc".to_string()));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"event":"clear","streamSid":"abc"}"#);
    }

    #[test]
    fn test_clear_without_session_serializes_null_sid() {
        let msg = OutboundMessage::clear(None);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"event":"clear","streamSid":null}"#);
    }

    #[test]
    fn test_parse_start_event() {
        let json = r#"{"event":"start","start":{"streamSid":"MZ123","callSid":"CA456"}}"#;
        let event: TwilioEvent = serde_json::from_str(json).unwrap();
        match event {
            TwilioEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZ123");
                assert_eq!(start.call_sid.as_deref(), Some("CA456"));
            }
            other => panic!("expected start event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_event_and_decode() {
        let json = r#"{"event":"media","media":{"payload":"AQI="}}"#;
        let event: TwilioEvent = serde_json::from_str(json).unwrap();
        match event {
            TwilioEvent::Media { media } => {
                assert_eq!(media.decode().unwrap(), vec![0x01, 0x02]);
            }
            other => panic!("expected media event, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_base64_payload_is_malformed() {
        let frame = InboundMediaFrame {
            payload: "not base64!!".to_string(),
        };
        assert!(matches!(frame.decode(), Err(BridgeError::Malformed(_))));
    }

    #[test]
    fn test_protocol_events_parse_with_extra_fields() {
        let json = r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#;
        let event: TwilioEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, TwilioEvent::Connected));

        let json = r#"{"event":"stop","stop":{"callSid":"CA456"}}"#;
        let event: TwilioEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, TwilioEvent::Stop));
    }

    #[test]
    fn test_unrecognized_event_type_is_unknown() {
        let json = r#"{"event":"dtmf","dtmf":{"digit":"5"}}"#;
        let event: TwilioEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, TwilioEvent::Unknown));
    }
}
