//! Transport event protocol.
//!
//! The telephony leg speaks JSON frames over a media-stream WebSocket. The
//! inbound side is the four-event contract the session controller consumes
//! (`start`, `media`, `mark`, `stop`); the outbound side carries synthesized
//! audio plus the mark label used for playback acknowledgement.
//!
//! Field names are camelCase on the wire to match the telephony provider's
//! framing.

use serde::{Deserialize, Serialize};

/// Identifiers assigned by the transport once call setup completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIds {
    pub stream_sid: String,
    pub call_sid: String,
}

/// Payload of a `start` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

/// Payload of a `media` frame: one opaque base64 audio chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
}

/// Payload of a `mark` frame: the label being acknowledged (inbound) or
/// registered (outbound).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkName {
    pub name: String,
}

/// Inbound transport events, tagged by the `event` field.
///
/// `connected` is a handshake frame emitted before `start`; the controller
/// ignores it. Unknown events fail to parse and are skipped by the socket
/// loop rather than tearing the session down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TransportEvent {
    Connected,
    Start { start: StartMeta },
    Media { media: MediaPayload },
    Mark { mark: MarkName },
    Stop,
}

/// Outbound transport frames: an audio chunk followed by the mark frame that
/// names its acknowledgement label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkName,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_frame() {
        let json = r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1"},"sequenceNumber":"1"}"#;
        let event: TransportEvent = serde_json::from_str(json).unwrap();
        match event {
            TransportEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid, "CA1");
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn parses_media_and_mark_frames() {
        let media: TransportEvent =
            serde_json::from_str(r#"{"event":"media","media":{"payload":"AAAA"}}"#).unwrap();
        assert!(matches!(media, TransportEvent::Media { media } if media.payload == "AAAA"));

        let mark: TransportEvent =
            serde_json::from_str(r#"{"event":"mark","mark":{"name":"0:hello"}}"#).unwrap();
        assert!(matches!(mark, TransportEvent::Mark { mark } if mark.name == "0:hello"));
    }

    #[test]
    fn parses_stop_with_extra_fields() {
        let event: TransportEvent =
            serde_json::from_str(r#"{"event":"stop","stop":{"accountSid":"AC1"}}"#).unwrap();
        assert!(matches!(event, TransportEvent::Stop));
    }

    #[test]
    fn unknown_event_is_a_parse_error() {
        assert!(serde_json::from_str::<TransportEvent>(r#"{"event":"dtmf"}"#).is_err());
    }

    #[test]
    fn outbound_media_frame_uses_camel_case() {
        let frame = OutboundFrame::Media {
            stream_sid: "MZ1".to_string(),
            media: MediaPayload {
                payload: "AAAA".to_string(),
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"event":"media","streamSid":"MZ1","media":{"payload":"AAAA"}}"#
        );
    }
}
