//! # MAVLink Frame Decoder
//!
//! Validates frames, decodes HEARTBEAT and VFR_HUD payloads, and reassembles
//! frames from a byte stream.

use bytes::{Buf, BytesMut};

use super::crc::frame_crc;
use super::protocol::*;
use crate::error::{GatewayError, Result};

/// Total length of the frame at the start of `buf`
///
/// # Returns
///
/// * `None` if the header is not complete yet
/// * `Some(len)` with the full frame length (header, payload, checksum, signature)
pub fn frame_length(buf: &[u8]) -> Option<usize> {
    match buf.first()? {
        &MAVLINK_STX_V1 => {
            let len = *buf.get(1)? as usize;
            Some(MAVLINK_V1_HEADER_LEN + len + MAVLINK_CHECKSUM_LEN)
        }
        &MAVLINK_STX_V2 => {
            let len = *buf.get(1)? as usize;
            let incompat = *buf.get(2)?;
            let signature = if incompat & MAVLINK_IFLAG_SIGNED != 0 {
                MAVLINK_SIGNATURE_LEN
            } else {
                0
            };
            Some(MAVLINK_V2_HEADER_LEN + len + MAVLINK_CHECKSUM_LEN + signature)
        }
        _ => None,
    }
}

/// Decode a complete MAVLink frame
///
/// # Arguments
///
/// * `frame` - Frame bytes starting at the start marker
///
/// # Returns
///
/// * `Result<MavFrame>` - Decoded frame, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Start marker is not a MAVLink v1/v2 marker
/// - Frame is shorter than its length field says
/// - The message id is not one the gateway knows (checksum cannot be verified)
/// - CRC check fails
pub fn decode_frame(frame: &[u8]) -> Result<MavFrame> {
    let stx = *frame
        .first()
        .ok_or_else(|| GatewayError::Protocol("Empty frame".to_string()))?;

    let (version, header_len) = match stx {
        MAVLINK_STX_V1 => (MavVersion::V1, MAVLINK_V1_HEADER_LEN),
        MAVLINK_STX_V2 => (MavVersion::V2, MAVLINK_V2_HEADER_LEN),
        other => {
            return Err(GatewayError::Protocol(format!(
                "Invalid start marker: 0x{:02X}",
                other
            )))
        }
    };

    let expected_len = frame_length(frame)
        .ok_or_else(|| GatewayError::Protocol("Header truncated".to_string()))?;
    if frame.len() < expected_len {
        return Err(GatewayError::Protocol(format!(
            "Frame too short: expected {} bytes, got {}",
            expected_len,
            frame.len()
        )));
    }

    let payload_len = frame[1] as usize;
    let (header, msg_id) = match version {
        MavVersion::V1 => (
            MavHeader {
                sequence: frame[2],
                system_id: frame[3],
                component_id: frame[4],
            },
            frame[5] as u32,
        ),
        MavVersion::V2 => (
            MavHeader {
                sequence: frame[4],
                system_id: frame[5],
                component_id: frame[6],
            },
            u32::from_le_bytes([frame[7], frame[8], frame[9], 0]),
        ),
    };

    let extra = crc_extra(msg_id).ok_or(GatewayError::UnknownMessage(msg_id))?;

    let body_end = header_len + payload_len;
    let received = u16::from_le_bytes([frame[body_end], frame[body_end + 1]]);
    let calculated = frame_crc(&frame[1..body_end], extra);
    if calculated != received {
        return Err(GatewayError::CrcMismatch {
            expected: calculated,
            actual: received,
        });
    }

    let payload = &frame[header_len..body_end];
    let message = decode_message(msg_id, version, payload)?;

    Ok(MavFrame {
        version,
        header,
        message,
    })
}

/// Decode a payload into a message
///
/// v2 payloads have their trailing zeros restored before field extraction;
/// v1 payloads are taken as-is so fields past the end come back as `None`.
pub fn decode_message(msg_id: u32, version: MavVersion, payload: &[u8]) -> Result<MavMessage> {
    let expected = match msg_id {
        MSG_ID_HEARTBEAT => HEARTBEAT_PAYLOAD_SIZE,
        MSG_ID_REQUEST_DATA_STREAM => REQUEST_DATA_STREAM_PAYLOAD_SIZE,
        MSG_ID_VFR_HUD => VFR_HUD_PAYLOAD_SIZE,
        other => return Err(GatewayError::UnknownMessage(other)),
    };

    let mut buf = payload.to_vec();
    if version == MavVersion::V2 && buf.len() < expected {
        buf.resize(expected, 0);
    }

    match msg_id {
        MSG_ID_HEARTBEAT => Ok(MavMessage::Heartbeat(decode_heartbeat(&buf))),
        MSG_ID_VFR_HUD => Ok(MavMessage::VfrHud(decode_vfr_hud(&buf))),
        _ => decode_request_data_stream(&buf).map(MavMessage::RequestDataStream),
    }
}

/// Decode HEARTBEAT fields that are present in the payload
pub fn decode_heartbeat(payload: &[u8]) -> Heartbeat {
    Heartbeat {
        custom_mode: field::<4>(payload, 0).map(u32::from_le_bytes),
        mav_type: payload.get(4).copied(),
        autopilot: payload.get(5).copied(),
        base_mode: payload.get(6).copied(),
        system_status: payload.get(7).copied(),
        mavlink_version: payload.get(8).copied(),
    }
}

/// Decode VFR_HUD fields, dropping any that are missing or non-finite
pub fn decode_vfr_hud(payload: &[u8]) -> VfrHud {
    VfrHud {
        airspeed: finite_f32(payload, 0),
        groundspeed: finite_f32(payload, 4),
        alt: finite_f32(payload, 8),
        climb: finite_f32(payload, 12),
        heading: field::<2>(payload, 16).map(i16::from_le_bytes),
        throttle: field::<2>(payload, 18).map(u16::from_le_bytes),
    }
}

/// Decode REQUEST_DATA_STREAM (only ever echoed back by routers)
pub fn decode_request_data_stream(payload: &[u8]) -> Result<RequestDataStream> {
    if payload.len() < REQUEST_DATA_STREAM_PAYLOAD_SIZE {
        return Err(GatewayError::Protocol(format!(
            "REQUEST_DATA_STREAM payload too short: {} bytes",
            payload.len()
        )));
    }

    Ok(RequestDataStream {
        req_message_rate: u16::from_le_bytes([payload[0], payload[1]]),
        target_system: payload[2],
        target_component: payload[3],
        req_stream_id: payload[4],
        start_stop: payload[5],
    })
}

fn field<const N: usize>(payload: &[u8], offset: usize) -> Option<[u8; N]> {
    payload.get(offset..offset + N)?.try_into().ok()
}

fn finite_f32(payload: &[u8], offset: usize) -> Option<f32> {
    field::<4>(payload, offset)
        .map(f32::from_le_bytes)
        .filter(|v| v.is_finite())
}

/// Reassembles MAVLink frames from arbitrary byte chunks
///
/// Serial links deliver partial frames and UDP datagrams may pack several
/// frames together; both are fed through [`FrameParser::push`] and drained
/// with [`FrameParser::next_frame`].
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: BytesMut,
    /// Set after a corrupt frame until the next valid one
    resyncing: bool,
}

impl FrameParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting for a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame (used when a link is re-established)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.resyncing = false;
    }

    /// Extract the next frame
    ///
    /// # Returns
    ///
    /// * `None` when no complete frame is buffered
    /// * `Some(Ok(frame))` for a valid frame
    /// * `Some(Err(e))` for a frame that was skipped; keep calling to continue
    ///
    /// After a CRC mismatch only the start marker is discarded, so a real frame
    /// hiding behind a false marker is still found. Until the next valid frame,
    /// an unknown message id is treated the same way: it is more likely a false
    /// marker inside the corrupt bytes than a real frame.
    pub fn next_frame(&mut self) -> Option<Result<MavFrame>> {
        let start = self
            .buffer
            .iter()
            .position(|&b| b == MAVLINK_STX_V1 || b == MAVLINK_STX_V2);

        match start {
            Some(pos) => self.buffer.advance(pos),
            None => {
                self.buffer.clear();
                return None;
            }
        }

        let total = frame_length(&self.buffer)?;
        if self.buffer.len() < total {
            return None;
        }

        let result = decode_frame(&self.buffer[..total]);
        match &result {
            Ok(_) => {
                self.resyncing = false;
                self.buffer.advance(total);
            }
            Err(GatewayError::CrcMismatch { .. }) | Err(GatewayError::Protocol(_)) => {
                self.resyncing = true;
                self.buffer.advance(1);
            }
            Err(GatewayError::UnknownMessage(_)) if self.resyncing => self.buffer.advance(1),
            Err(_) => self.buffer.advance(total),
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mavlink::encoder::{encode_frame, encode_payload};

    fn header(system_id: u8) -> MavHeader {
        MavHeader {
            system_id,
            component_id: 1,
            sequence: 0,
        }
    }

    fn hud(alt: f32, groundspeed: f32, heading: i16) -> MavMessage {
        MavMessage::VfrHud(VfrHud {
            airspeed: Some(14.0),
            groundspeed: Some(groundspeed),
            alt: Some(alt),
            climb: Some(0.5),
            heading: Some(heading),
            throttle: Some(40),
        })
    }

    #[test]
    fn test_decode_frame_too_short() {
        let frame = [MAVLINK_STX_V1, 0x09, 0x00];
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_frame_invalid_start_marker() {
        let frame = [0x55, 0x09, 0x00, 0x01, 0x01, 0x00];
        match decode_frame(&frame) {
            Err(GatewayError::Protocol(msg)) => assert!(msg.contains("0x55")),
            other => panic!("Expected Protocol error, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_vfr_hud_frame_v1() {
        let frame = encode_frame(MavVersion::V1, &header(1), &hud(120.5, 15.2, 270)).unwrap();
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded.version, MavVersion::V1);
        assert_eq!(decoded.header.system_id, 1);
        match decoded.message {
            MavMessage::VfrHud(hud) => {
                assert_eq!(hud.alt, Some(120.5));
                assert_eq!(hud.groundspeed, Some(15.2));
                assert_eq!(hud.heading, Some(270));
            }
            other => panic!("Expected VFR_HUD, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_truncated_v2_heartbeat_restores_zeros() {
        // Disarmed, custom mode 0: everything after the type byte is zero on the wire
        let hb = Heartbeat {
            custom_mode: Some(0),
            mav_type: Some(2),
            autopilot: Some(0),
            base_mode: Some(0),
            system_status: Some(0),
            mavlink_version: Some(0),
        };
        let frame = encode_frame(MavVersion::V2, &header(1), &MavMessage::Heartbeat(hb)).unwrap();
        assert_eq!(frame[1], 5, "payload truncated after mav_type");

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.message, MavMessage::Heartbeat(hb));
    }

    #[test]
    fn test_decode_frame_crc_error() {
        let mut frame = encode_frame(MavVersion::V1, &header(1), &hud(1.0, 2.0, 3)).unwrap();
        frame[10] ^= 0xFF;

        assert!(matches!(
            decode_frame(&frame),
            Err(GatewayError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_message_id() {
        // SYS_STATUS (id 1) is not decoded by the gateway
        let mut frame = vec![MAVLINK_STX_V1, 2, 0, 1, 1, 1, 0xAA, 0xBB];
        frame.extend_from_slice(&[0x00, 0x00]);
        assert!(matches!(decode_frame(&frame), Err(GatewayError::UnknownMessage(1))));
    }

    #[test]
    fn test_decode_vfr_hud_skips_non_finite_fields() {
        let mut payload = encode_payload(&hud(50.0, 3.0, 90));
        payload[4..8].copy_from_slice(&f32::NAN.to_le_bytes());
        payload[8..12].copy_from_slice(&f32::INFINITY.to_le_bytes());

        let decoded = decode_vfr_hud(&payload);
        assert_eq!(decoded.groundspeed, None);
        assert_eq!(decoded.alt, None);
        assert_eq!(decoded.heading, Some(90));
        assert_eq!(decoded.airspeed, Some(14.0));
    }

    #[test]
    fn test_decode_short_v1_vfr_hud_keeps_present_fields() {
        let payload = encode_payload(&hud(33.0, 4.0, 180));
        let decoded = decode_vfr_hud(&payload[..12]);

        assert_eq!(decoded.alt, Some(33.0));
        assert_eq!(decoded.groundspeed, Some(4.0));
        assert_eq!(decoded.heading, None);
        assert_eq!(decoded.throttle, None);
    }

    #[test]
    fn test_decode_request_data_stream_too_short() {
        assert!(decode_request_data_stream(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_parser_handles_split_frames() {
        let frame = encode_frame(MavVersion::V2, &header(1), &hud(10.0, 1.0, 45)).unwrap();
        let mut parser = FrameParser::new();

        parser.push(&frame[..5]);
        assert!(parser.next_frame().is_none());

        parser.push(&frame[5..]);
        let decoded = parser.next_frame().unwrap().unwrap();
        assert_eq!(decoded.message.name(), "VFR_HUD");
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_parser_skips_leading_garbage_and_reads_packed_frames() {
        let first = encode_frame(MavVersion::V1, &header(1), &MavMessage::Heartbeat(Heartbeat::gcs())).unwrap();
        let second = encode_frame(MavVersion::V2, &header(1), &hud(5.0, 2.0, 10)).unwrap();

        let mut parser = FrameParser::new();
        parser.push(&[0x00, 0x13, 0x37]);
        parser.push(&first);
        parser.push(&second);

        assert_eq!(parser.next_frame().unwrap().unwrap().message.name(), "HEARTBEAT");
        assert_eq!(parser.next_frame().unwrap().unwrap().message.name(), "VFR_HUD");
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_parser_resyncs_after_corrupt_frame() {
        // Well-formed HEARTBEAT layout with a zeroed checksum
        let corrupt = vec![
            MAVLINK_STX_V1, 9, 0, 1, 1, 0, 0, 0, 0, 0, 2, 3, 0, 4, 3, 0x00, 0x00,
        ];
        let good = encode_frame(MavVersion::V1, &header(1), &MavMessage::Heartbeat(Heartbeat::gcs())).unwrap();

        let mut parser = FrameParser::new();
        parser.push(&corrupt);
        parser.push(&good);

        let mut frames = Vec::new();
        let mut errors = 0;
        while let Some(result) = parser.next_frame() {
            match result {
                Ok(frame) => frames.push(frame),
                Err(_) => errors += 1,
            }
        }

        assert!(errors >= 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message.name(), "HEARTBEAT");
    }

    #[test]
    fn test_parser_resync_ignores_false_unknown_frame() {
        // Corrupt HEARTBEAT whose payload holds a marker for an unknown id
        // long enough to reach into the next frame
        let corrupt = vec![
            MAVLINK_STX_V1, 9, 0, 1, 1, 0, MAVLINK_STX_V1, 10, 0, 1, 1, 200, 0, 0, 0, 0x00, 0x00,
        ];
        let good = encode_frame(MavVersion::V1, &header(1), &MavMessage::Heartbeat(Heartbeat::gcs())).unwrap();

        let mut parser = FrameParser::new();
        parser.push(&corrupt);
        parser.push(&good);

        assert!(matches!(parser.next_frame(), Some(Err(GatewayError::CrcMismatch { .. }))));
        assert!(matches!(parser.next_frame(), Some(Err(GatewayError::UnknownMessage(200)))));

        let frame = parser.next_frame().unwrap().unwrap();
        assert!(matches!(frame.message, MavMessage::Heartbeat(hb) if hb.is_gcs()));
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_parser_skips_unknown_message_whole() {
        let mut unknown = vec![MAVLINK_STX_V1, 2, 0, 1, 1, 1, 0xAA, 0xBB, 0x00, 0x00];
        let good = encode_frame(MavVersion::V1, &header(1), &MavMessage::Heartbeat(Heartbeat::gcs())).unwrap();
        unknown.extend_from_slice(&good);

        let mut parser = FrameParser::new();
        parser.push(&unknown);

        assert!(matches!(parser.next_frame(), Some(Err(GatewayError::UnknownMessage(1)))));
        assert_eq!(parser.next_frame().unwrap().unwrap().message.name(), "HEARTBEAT");
    }
}
