//! # MAVLink Frame Encoder
//!
//! Serializes messages into complete v1 or v2 frames.

use super::crc::frame_crc;
use super::protocol::*;
use crate::error::{GatewayError, Result};

/// Encode a message payload in wire order (largest fields first)
///
/// The payload is always the full, untruncated length for the message.
pub fn encode_payload(message: &MavMessage) -> Vec<u8> {
    match message {
        MavMessage::Heartbeat(hb) => {
            let mut payload = Vec::with_capacity(HEARTBEAT_PAYLOAD_SIZE);
            payload.extend_from_slice(&hb.custom_mode.unwrap_or(0).to_le_bytes());
            payload.push(hb.mav_type.unwrap_or(0));
            payload.push(hb.autopilot.unwrap_or(0));
            payload.push(hb.base_mode.unwrap_or(0));
            payload.push(hb.system_status.unwrap_or(0));
            payload.push(hb.mavlink_version.unwrap_or(0));
            payload
        }
        MavMessage::RequestDataStream(req) => {
            let mut payload = Vec::with_capacity(REQUEST_DATA_STREAM_PAYLOAD_SIZE);
            payload.extend_from_slice(&req.req_message_rate.to_le_bytes());
            payload.push(req.target_system);
            payload.push(req.target_component);
            payload.push(req.req_stream_id);
            payload.push(req.start_stop);
            payload
        }
        MavMessage::VfrHud(hud) => {
            let mut payload = Vec::with_capacity(VFR_HUD_PAYLOAD_SIZE);
            payload.extend_from_slice(&hud.airspeed.unwrap_or(0.0).to_le_bytes());
            payload.extend_from_slice(&hud.groundspeed.unwrap_or(0.0).to_le_bytes());
            payload.extend_from_slice(&hud.alt.unwrap_or(0.0).to_le_bytes());
            payload.extend_from_slice(&hud.climb.unwrap_or(0.0).to_le_bytes());
            payload.extend_from_slice(&hud.heading.unwrap_or(0).to_le_bytes());
            payload.extend_from_slice(&hud.throttle.unwrap_or(0).to_le_bytes());
            payload
        }
    }
}

/// Encode a complete frame
///
/// # Arguments
///
/// * `version` - Wire version to emit
/// * `header` - Sender ids and sequence number
/// * `message` - Message to serialize
///
/// # Returns
///
/// * `Result<Vec<u8>>` - Frame bytes from start marker through checksum
///
/// # Examples
///
/// ```
/// use mav_telemetry_gateway::mavlink::encoder::encode_frame;
/// use mav_telemetry_gateway::mavlink::protocol::*;
///
/// let header = MavHeader { system_id: 255, component_id: 190, sequence: 0 };
/// let frame = encode_frame(MavVersion::V1, &header, &MavMessage::Heartbeat(Heartbeat::gcs())).unwrap();
/// assert_eq!(frame[0], MAVLINK_STX_V1);
/// assert_eq!(frame.len(), 6 + 9 + 2);
/// ```
pub fn encode_frame(version: MavVersion, header: &MavHeader, message: &MavMessage) -> Result<Vec<u8>> {
    let msg_id = message.id();
    let extra = crc_extra(msg_id).ok_or(GatewayError::UnknownMessage(msg_id))?;
    let mut payload = encode_payload(message);

    let mut frame = match version {
        MavVersion::V1 => {
            let mut frame = Vec::with_capacity(MAVLINK_V1_HEADER_LEN + payload.len() + MAVLINK_CHECKSUM_LEN);
            frame.push(MAVLINK_STX_V1);
            frame.push(payload.len() as u8);
            frame.push(header.sequence);
            frame.push(header.system_id);
            frame.push(header.component_id);
            frame.push(msg_id as u8);
            frame
        }
        MavVersion::V2 => {
            // v2 senders drop trailing zero bytes, keeping at least one
            while payload.len() > 1 && payload.last() == Some(&0) {
                payload.pop();
            }
            let mut frame = Vec::with_capacity(MAVLINK_V2_HEADER_LEN + payload.len() + MAVLINK_CHECKSUM_LEN);
            frame.push(MAVLINK_STX_V2);
            frame.push(payload.len() as u8);
            frame.push(0); // incompat flags
            frame.push(0); // compat flags
            frame.push(header.sequence);
            frame.push(header.system_id);
            frame.push(header.component_id);
            frame.extend_from_slice(&msg_id.to_le_bytes()[..3]);
            frame
        }
    };

    frame.extend_from_slice(&payload);
    let crc = frame_crc(&frame[1..], extra);
    frame.extend_from_slice(&crc.to_le_bytes());

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mavlink::crc::frame_crc;

    fn header() -> MavHeader {
        MavHeader {
            system_id: 255,
            component_id: 190,
            sequence: 7,
        }
    }

    #[test]
    fn test_heartbeat_payload_layout() {
        let hb = Heartbeat {
            custom_mode: Some(0x0403_0201),
            mav_type: Some(2),
            autopilot: Some(MAV_AUTOPILOT_ARDUPILOTMEGA),
            base_mode: Some(0x81),
            system_status: Some(MAV_STATE_ACTIVE),
            mavlink_version: Some(3),
        };
        let payload = encode_payload(&MavMessage::Heartbeat(hb));
        assert_eq!(payload, vec![0x01, 0x02, 0x03, 0x04, 2, 3, 0x81, 4, 3]);
    }

    #[test]
    fn test_request_data_stream_payload_layout() {
        let req = RequestDataStream {
            req_message_rate: 10,
            target_system: 1,
            target_component: 1,
            req_stream_id: MAV_DATA_STREAM_EXTRA1,
            start_stop: 1,
        };
        let payload = encode_payload(&MavMessage::RequestDataStream(req));
        assert_eq!(payload, vec![10, 0, 1, 1, 10, 1]);
    }

    #[test]
    fn test_v1_frame_structure() {
        let frame = encode_frame(MavVersion::V1, &header(), &MavMessage::Heartbeat(Heartbeat::gcs())).unwrap();

        assert_eq!(frame.len(), MAVLINK_V1_HEADER_LEN + HEARTBEAT_PAYLOAD_SIZE + MAVLINK_CHECKSUM_LEN);
        assert_eq!(frame[0], MAVLINK_STX_V1);
        assert_eq!(frame[1], HEARTBEAT_PAYLOAD_SIZE as u8);
        assert_eq!(frame[2], 7, "sequence");
        assert_eq!(frame[3], 255, "system id");
        assert_eq!(frame[4], 190, "component id");
        assert_eq!(frame[5], 0, "HEARTBEAT id");

        let body_end = frame.len() - MAVLINK_CHECKSUM_LEN;
        let expected = frame_crc(&frame[1..body_end], 50);
        assert_eq!(u16::from_le_bytes([frame[body_end], frame[body_end + 1]]), expected);
    }

    #[test]
    fn test_v2_frame_truncates_trailing_zeros() {
        let req = RequestDataStream {
            req_message_rate: 2,
            target_system: 1,
            target_component: 0,
            req_stream_id: 0,
            start_stop: 0,
        };
        let frame = encode_frame(MavVersion::V2, &header(), &MavMessage::RequestDataStream(req)).unwrap();

        assert_eq!(frame[0], MAVLINK_STX_V2);
        // rate(2 bytes) + target_system; the three trailing zeros are dropped
        assert_eq!(frame[1], 3);
        assert_eq!(&frame[7..10], &[66, 0, 0], "24-bit message id");
        assert_eq!(frame.len(), MAVLINK_V2_HEADER_LEN + 3 + MAVLINK_CHECKSUM_LEN);
    }

    #[test]
    fn test_v2_all_zero_payload_keeps_one_byte() {
        let hb = Heartbeat {
            custom_mode: Some(0),
            mav_type: Some(0),
            autopilot: Some(0),
            base_mode: Some(0),
            system_status: Some(0),
            mavlink_version: Some(0),
        };
        let frame = encode_frame(MavVersion::V2, &header(), &MavMessage::Heartbeat(hb)).unwrap();
        assert_eq!(frame[1], 1);
    }
}
