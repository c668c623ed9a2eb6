//! # Flight Mode Names
//!
//! Turns HEARTBEAT `custom_mode` values into the mode names ground stations
//! display. ArduPilot numbers its modes per vehicle family; PX4 packs a main
//! and sub mode into the upper bytes.

use super::protocol::*;

const COPTER_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (8, "POSITION"),
    (9, "LAND"),
    (10, "OF_LOITER"),
    (11, "DRIFT"),
    (13, "SPORT"),
    (14, "FLIP"),
    (15, "AUTOTUNE"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (18, "THROW"),
    (19, "AVOID_ADSB"),
    (20, "GUIDED_NOGPS"),
    (21, "SMART_RTL"),
    (22, "FLOWHOLD"),
    (23, "FOLLOW"),
    (24, "ZIGZAG"),
    (25, "SYSTEMID"),
    (26, "AUTOROTATE"),
    (27, "AUTO_RTL"),
];

const PLANE_MODES: &[(u32, &str)] = &[
    (0, "MANUAL"),
    (1, "CIRCLE"),
    (2, "STABILIZE"),
    (3, "TRAINING"),
    (4, "ACRO"),
    (5, "FBWA"),
    (6, "FBWB"),
    (7, "CRUISE"),
    (8, "AUTOTUNE"),
    (10, "AUTO"),
    (11, "RTL"),
    (12, "LOITER"),
    (13, "TAKEOFF"),
    (14, "AVOID_ADSB"),
    (15, "GUIDED"),
    (16, "INITIALISING"),
    (17, "QSTABILIZE"),
    (18, "QHOVER"),
    (19, "QLOITER"),
    (20, "QLAND"),
    (21, "QRTL"),
    (22, "QAUTOTUNE"),
    (23, "QACRO"),
    (24, "THERMAL"),
    (25, "LOITERALTQLAND"),
];

const ROVER_MODES: &[(u32, &str)] = &[
    (0, "MANUAL"),
    (1, "ACRO"),
    (3, "STEERING"),
    (4, "HOLD"),
    (5, "LOITER"),
    (6, "FOLLOW"),
    (7, "SIMPLE"),
    (8, "DOCK"),
    (10, "AUTO"),
    (11, "RTL"),
    (12, "SMART_RTL"),
    (15, "GUIDED"),
    (16, "INITIALISING"),
];

const SUB_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (7, "CIRCLE"),
    (9, "SURFACE"),
    (16, "POSHOLD"),
    (19, "MANUAL"),
];

const TRACKER_MODES: &[(u32, &str)] = &[
    (0, "MANUAL"),
    (1, "STOP"),
    (2, "SCAN"),
    (3, "SERVO_TEST"),
    (10, "AUTO"),
    (16, "INITIALISING"),
];

fn lookup(table: &[(u32, &'static str)], mode: u32) -> Option<&'static str> {
    table
        .iter()
        .find(|(number, _)| *number == mode)
        .map(|(_, name)| *name)
}

fn ardupilot_mode(mav_type: u8, custom_mode: u32) -> Option<&'static str> {
    let table = match mav_type {
        MAV_TYPE_FIXED_WING => PLANE_MODES,
        vtol if MAV_TYPE_VTOL.contains(&vtol) => PLANE_MODES,
        MAV_TYPE_ANTENNA_TRACKER => TRACKER_MODES,
        MAV_TYPE_GROUND_ROVER | MAV_TYPE_SURFACE_BOAT => ROVER_MODES,
        MAV_TYPE_SUBMARINE => SUB_MODES,
        _ => COPTER_MODES,
    };
    lookup(table, custom_mode)
}

fn px4_mode(custom_mode: u32) -> Option<&'static str> {
    let main_mode = (custom_mode >> 16) & 0xFF;
    let sub_mode = (custom_mode >> 24) & 0xFF;

    match main_mode {
        1 => Some("MANUAL"),
        2 => Some("ALTCTL"),
        3 => Some("POSCTL"),
        4 => match sub_mode {
            1 => Some("READY"),
            2 => Some("TAKEOFF"),
            3 => Some("LOITER"),
            4 => Some("MISSION"),
            5 => Some("RTL"),
            6 => Some("LAND"),
            8 => Some("FOLLOWME"),
            9 => Some("PRECLAND"),
            _ => Some("AUTO"),
        },
        5 => Some("ACRO"),
        6 => Some("OFFBOARD"),
        7 => Some("STABILIZED"),
        8 => Some("RATTITUDE"),
        _ => None,
    }
}

/// Mode name for a heartbeat
///
/// Returns `None` when the heartbeat lacks the fields needed to tell.
/// Unmapped modes fall back to a hex rendering of the raw value.
///
/// # Examples
///
/// ```
/// use mav_telemetry_gateway::mavlink::modes::mode_name;
/// use mav_telemetry_gateway::mavlink::protocol::*;
///
/// let hb = Heartbeat {
///     custom_mode: Some(4),
///     mav_type: Some(2),
///     autopilot: Some(MAV_AUTOPILOT_ARDUPILOTMEGA),
///     base_mode: Some(MAV_MODE_FLAG_CUSTOM_MODE_ENABLED),
///     system_status: Some(MAV_STATE_ACTIVE),
///     mavlink_version: Some(3),
/// };
/// assert_eq!(mode_name(&hb).as_deref(), Some("GUIDED"));
/// ```
pub fn mode_name(heartbeat: &Heartbeat) -> Option<String> {
    let base_mode = heartbeat.base_mode?;
    if base_mode & MAV_MODE_FLAG_CUSTOM_MODE_ENABLED == 0 {
        return Some(format!("Mode(0x{:08x})", base_mode));
    }

    let custom_mode = heartbeat.custom_mode?;
    let name = match heartbeat.autopilot? {
        MAV_AUTOPILOT_ARDUPILOTMEGA => ardupilot_mode(heartbeat.mav_type?, custom_mode),
        MAV_AUTOPILOT_PX4 => px4_mode(custom_mode),
        _ => None,
    };

    Some(
        name.map(str::to_string)
            .unwrap_or_else(|| format!("Mode(0x{:08x})", custom_mode)),
    )
}
