//! # MAVLink Protocol Constants and Types
//!
//! Core protocol definitions for MAVLink v1/v2 communication.

use crate::error::{GatewayError, Result};

/// MAVLink v1 start-of-frame marker
pub const MAVLINK_STX_V1: u8 = 0xFE;

/// MAVLink v2 start-of-frame marker
pub const MAVLINK_STX_V2: u8 = 0xFD;

/// v1 header: stx, len, seq, sysid, compid, msgid
pub const MAVLINK_V1_HEADER_LEN: usize = 6;

/// v2 header: stx, len, incompat, compat, seq, sysid, compid, msgid(3)
pub const MAVLINK_V2_HEADER_LEN: usize = 10;

/// Checksum length (both versions)
pub const MAVLINK_CHECKSUM_LEN: usize = 2;

/// v2 signature block appended when the signed flag is set
pub const MAVLINK_SIGNATURE_LEN: usize = 13;

/// v2 incompat flag: frame carries a signature
pub const MAVLINK_IFLAG_SIGNED: u8 = 0x01;

/// Maximum payload size (length field is one byte)
pub const MAVLINK_MAX_PAYLOAD_SIZE: usize = 255;

/// HEARTBEAT message id
pub const MSG_ID_HEARTBEAT: u32 = 0;

/// REQUEST_DATA_STREAM message id
pub const MSG_ID_REQUEST_DATA_STREAM: u32 = 66;

/// VFR_HUD message id
pub const MSG_ID_VFR_HUD: u32 = 74;

/// HEARTBEAT payload size
pub const HEARTBEAT_PAYLOAD_SIZE: usize = 9;

/// REQUEST_DATA_STREAM payload size
pub const REQUEST_DATA_STREAM_PAYLOAD_SIZE: usize = 6;

/// VFR_HUD payload size
pub const VFR_HUD_PAYLOAD_SIZE: usize = 20;

/// MAV_TYPE_FIXED_WING
pub const MAV_TYPE_FIXED_WING: u8 = 1;

/// MAV_TYPE_ANTENNA_TRACKER
pub const MAV_TYPE_ANTENNA_TRACKER: u8 = 5;

/// MAV_TYPE_GCS
pub const MAV_TYPE_GCS: u8 = 6;

/// MAV_TYPE_GROUND_ROVER
pub const MAV_TYPE_GROUND_ROVER: u8 = 10;

/// MAV_TYPE_SURFACE_BOAT
pub const MAV_TYPE_SURFACE_BOAT: u8 = 11;

/// MAV_TYPE_SUBMARINE
pub const MAV_TYPE_SUBMARINE: u8 = 12;

/// MAV_TYPE_ONBOARD_CONTROLLER (companion computer)
pub const MAV_TYPE_ONBOARD_CONTROLLER: u8 = 18;

/// MAV_TYPE_VTOL_TAILSITTER_DUOROTOR through MAV_TYPE_VTOL_RESERVED5
pub const MAV_TYPE_VTOL: std::ops::RangeInclusive<u8> = 19..=25;

/// MAV_TYPE_GIMBAL
pub const MAV_TYPE_GIMBAL: u8 = 26;

/// MAV_TYPE_ADSB
pub const MAV_TYPE_ADSB: u8 = 27;

/// MAV_COMP_ID_GIMBAL
pub const MAV_COMP_ID_GIMBAL: u8 = 154;

/// MAV_AUTOPILOT_ARDUPILOTMEGA
pub const MAV_AUTOPILOT_ARDUPILOTMEGA: u8 = 3;

/// MAV_AUTOPILOT_INVALID
pub const MAV_AUTOPILOT_INVALID: u8 = 8;

/// MAV_AUTOPILOT_PX4
pub const MAV_AUTOPILOT_PX4: u8 = 12;

/// MAV_STATE_ACTIVE
pub const MAV_STATE_ACTIVE: u8 = 4;

/// MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
pub const MAV_MODE_FLAG_CUSTOM_MODE_ENABLED: u8 = 0x01;

/// MAV_MODE_FLAG_SAFETY_ARMED
pub const MAV_MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

/// MAV_DATA_STREAM_ALL
pub const MAV_DATA_STREAM_ALL: u8 = 0;

/// MAV_DATA_STREAM_EXTENDED_STATUS
pub const MAV_DATA_STREAM_EXTENDED_STATUS: u8 = 2;

/// MAV_DATA_STREAM_EXTRA1 (attitude, VFR_HUD on ArduPilot)
pub const MAV_DATA_STREAM_EXTRA1: u8 = 10;

/// Wire protocol version of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MavVersion {
    V1,
    V2,
}

impl MavVersion {
    /// Map the configured numeric version (1 or 2)
    pub fn from_number(version: u8) -> Result<Self> {
        match version {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(GatewayError::Protocol(format!(
                "Unsupported MAVLink version {}",
                other
            ))),
        }
    }
}

/// CRC_EXTRA seed for a message id, `None` when the id is not known here
pub fn crc_extra(msg_id: u32) -> Option<u8> {
    match msg_id {
        MSG_ID_HEARTBEAT => Some(50),
        MSG_ID_REQUEST_DATA_STREAM => Some(148),
        MSG_ID_VFR_HUD => Some(20),
        _ => None,
    }
}

/// Routing fields of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MavHeader {
    /// Sender system id
    pub system_id: u8,

    /// Sender component id
    pub component_id: u8,

    /// Packet sequence number
    pub sequence: u8,
}

/// HEARTBEAT contents
///
/// Fields are `None` when a v1 payload was too short to carry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    pub custom_mode: Option<u32>,
    pub mav_type: Option<u8>,
    pub autopilot: Option<u8>,
    pub base_mode: Option<u8>,
    pub system_status: Option<u8>,
    pub mavlink_version: Option<u8>,
}

impl Heartbeat {
    /// Heartbeat a ground control station emits to announce itself
    pub fn gcs() -> Self {
        Self {
            custom_mode: Some(0),
            mav_type: Some(MAV_TYPE_GCS),
            autopilot: Some(MAV_AUTOPILOT_INVALID),
            base_mode: Some(0),
            system_status: Some(MAV_STATE_ACTIVE),
            mavlink_version: Some(3),
        }
    }

    /// Whether this heartbeat was sent by a ground station rather than a vehicle
    pub fn is_gcs(&self) -> bool {
        self.mav_type == Some(MAV_TYPE_GCS)
    }

    /// Whether this heartbeat, sent by `source_component`, comes from the
    /// vehicle's autopilot rather than a ground station or a peripheral
    /// (companion computer, gimbal, ADS-B receiver) sharing its system id
    pub fn is_vehicle(&self, source_component: u8) -> bool {
        if source_component == MAV_COMP_ID_GIMBAL {
            return false;
        }
        !matches!(
            self.mav_type,
            Some(MAV_TYPE_GCS | MAV_TYPE_ONBOARD_CONTROLLER | MAV_TYPE_GIMBAL | MAV_TYPE_ADSB)
        )
    }

    /// Armed state from the base mode flags
    pub fn armed(&self) -> Option<bool> {
        self.base_mode
            .map(|mode| mode & MAV_MODE_FLAG_SAFETY_ARMED != 0)
    }
}

/// VFR_HUD contents
///
/// Each field is `None` when missing from the payload or not a finite number.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VfrHud {
    /// Airspeed in m/s
    pub airspeed: Option<f32>,

    /// Ground speed in m/s
    pub groundspeed: Option<f32>,

    /// Altitude (MSL) in meters
    pub alt: Option<f32>,

    /// Climb rate in m/s
    pub climb: Option<f32>,

    /// Heading in degrees (0..360)
    pub heading: Option<i16>,

    /// Throttle percentage
    pub throttle: Option<u16>,
}

/// REQUEST_DATA_STREAM contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDataStream {
    pub req_message_rate: u16,
    pub target_system: u8,
    pub target_component: u8,
    pub req_stream_id: u8,
    pub start_stop: u8,
}

/// Messages the gateway understands
#[derive(Debug, Clone, PartialEq)]
pub enum MavMessage {
    Heartbeat(Heartbeat),
    RequestDataStream(RequestDataStream),
    VfrHud(VfrHud),
}

impl MavMessage {
    /// Message id on the wire
    pub fn id(&self) -> u32 {
        match self {
            Self::Heartbeat(_) => MSG_ID_HEARTBEAT,
            Self::RequestDataStream(_) => MSG_ID_REQUEST_DATA_STREAM,
            Self::VfrHud(_) => MSG_ID_VFR_HUD,
        }
    }

    /// Message name as it appears in the MAVLink XML definitions
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => "HEARTBEAT",
            Self::RequestDataStream(_) => "REQUEST_DATA_STREAM",
            Self::VfrHud(_) => "VFR_HUD",
        }
    }
}

/// A validated frame with its decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct MavFrame {
    pub version: MavVersion,
    pub header: MavHeader,
    pub message: MavMessage,
}
