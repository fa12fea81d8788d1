//! Pose packet wire format shared by recordings, network streams and the
//! live sensor's HID reports.

use crate::types::{CoordinateSystem, DevicePose, Quaternion, TrackingState, Vector3};
use crate::{BridgeError, Result};

// -- Source header --
pub const SOURCE_MAGIC: [u8; 4] = *b"PTRK";
pub const SOURCE_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 16;

// -- Pose packet geometry --
pub const PACKET_SIZE: usize = 48;
pub const PACKET_HEADER: [u8; 3] = [0x01, 0x5A, 0x46];

// -- HID geometry --
pub const REPORT_SIZE: usize = 63;
pub const PREFIX_HOST_TO_DEVICE: u8 = 0x02;
pub const PREFIX_DEVICE_TO_HOST: u8 = 0x01;

// -- HID command bytes (after the 0x02 prefix) --
pub const CMD_DESCRIBE: &[u8] = &[0x5A, 0x10];
pub const CMD_TRACKING: &[u8] = &[0x5A, 0x20];

// -- Tracking command flags --
pub const TRACKING_FLAG_FLOOR_AS_ORIGIN: u8 = 1 << 0;
pub const TRACKING_FLAG_POSE_SMOOTHING: u8 = 1 << 1;

/// Describes a packet source: sent once at the start of a recording file, a
/// network stream, or in answer to the HID describe command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceHeader {
    pub coordinate_system: CoordinateSystem,
    pub fps: u16,
    pub serial_number: u32,
    /// Number of packets following the header; 0 for unbounded sources.
    pub frame_count: u32,
}

impl SourceHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&SOURCE_MAGIC);
        buf[4] = SOURCE_VERSION;
        buf[5] = self.coordinate_system.id();
        buf[6..8].copy_from_slice(&self.fps.to_le_bytes());
        buf[8..12].copy_from_slice(&self.serial_number.to_le_bytes());
        buf[12..16].copy_from_slice(&self.frame_count.to_le_bytes());
        buf
    }

    pub fn parse(data: &[u8]) -> Result<SourceHeader> {
        if data.len() < HEADER_SIZE || data[0..4] != SOURCE_MAGIC {
            return Err(BridgeError::InvalidHeader);
        }
        if data[4] != SOURCE_VERSION {
            return Err(BridgeError::UnsupportedVersion(data[4]));
        }
        let coordinate_system =
            CoordinateSystem::from_id(data[5]).ok_or(BridgeError::InvalidHeader)?;
        Ok(SourceHeader {
            coordinate_system,
            fps: u16::from_le_bytes([data[6], data[7]]),
            serial_number: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            frame_count: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
        })
    }
}

/// One decoded pose packet. Translation is in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosePacket {
    pub frame_index: u32,
    pub pose: DevicePose,
}

fn f32_at(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Encode a pose packet.
///
/// Layout:
/// - `[0..3]`: 0x01, 0x5A, 0x46 header
/// - `[3..7]`: u32 LE frame index
/// - `[7..15]`: u64 LE capture timestamp (ns)
/// - `[15..27]`: 3x f32 LE translation (m)
/// - `[27..43]`: 4x f32 LE quaternion [x, y, z, w]
/// - `[43]`: tracking state
/// - `[44..48]`: f32 LE confidence
pub fn encode_pose_packet(packet: &PosePacket) -> [u8; PACKET_SIZE] {
    let p = &packet.pose;
    let mut buf = [0u8; PACKET_SIZE];
    buf[0..3].copy_from_slice(&PACKET_HEADER);
    buf[3..7].copy_from_slice(&packet.frame_index.to_le_bytes());
    buf[7..15].copy_from_slice(&p.timestamp_ns.to_le_bytes());
    let floats = [
        p.translation.x,
        p.translation.y,
        p.translation.z,
        p.rotation.x,
        p.rotation.y,
        p.rotation.z,
        p.rotation.w,
    ];
    for (i, v) in floats.iter().enumerate() {
        let at = 15 + i * 4;
        buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }
    buf[43] = match p.tracking_state {
        TrackingState::Off => 0,
        TrackingState::Ok => 1,
        TrackingState::Searching => 2,
    };
    buf[44..48].copy_from_slice(&p.confidence.to_le_bytes());
    buf
}

/// Decode a pose packet. Returns `None` for short buffers, a wrong header or
/// non-finite values.
pub fn parse_pose_packet(data: &[u8]) -> Option<PosePacket> {
    if data.len() < PACKET_SIZE || data[0..3] != PACKET_HEADER {
        return None;
    }

    let frame_index = u32::from_le_bytes([data[3], data[4], data[5], data[6]]);
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&data[7..15]);
    let timestamp_ns = u64::from_le_bytes(ts);

    let translation = Vector3::new(f32_at(data, 15), f32_at(data, 19), f32_at(data, 23));
    let rotation = Quaternion::new(
        f32_at(data, 27),
        f32_at(data, 31),
        f32_at(data, 35),
        f32_at(data, 39),
    );
    let values = [
        translation.x,
        translation.y,
        translation.z,
        rotation.x,
        rotation.y,
        rotation.z,
        rotation.w,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(PosePacket {
        frame_index,
        pose: DevicePose {
            translation,
            rotation,
            timestamp_ns,
            tracking_state: TrackingState::from_u8(data[43]),
            confidence: f32_at(data, 44).clamp(0.0, 1.0),
        },
    })
}

/// Build a 63-byte HID command buffer.
/// Format: [0x02, cmd_bytes..., 0x00 padding...]
pub fn build_command(cmd: &[u8]) -> [u8; REPORT_SIZE] {
    let mut buf = [0u8; REPORT_SIZE];
    buf[0] = PREFIX_HOST_TO_DEVICE;
    let len = cmd.len().min(REPORT_SIZE - 1);
    buf[1..1 + len].copy_from_slice(&cmd[..len]);
    buf
}

/// Build the tracking enable/disable command.
/// Enable:  [0x5A, 0x20, 0x01, flags]
/// Disable: [0x5A, 0x20, 0x00, 0x00]
pub fn build_tracking_cmd(enable: bool, floor_as_origin: bool, pose_smoothing: bool) -> Vec<u8> {
    let mut flags = 0u8;
    if enable && floor_as_origin {
        flags |= TRACKING_FLAG_FLOOR_AS_ORIGIN;
    }
    if enable && pose_smoothing {
        flags |= TRACKING_FLAG_POSE_SMOOTHING;
    }
    let mut cmd = CMD_TRACKING.to_vec();
    cmd.push(if enable { 1 } else { 0 });
    cmd.push(flags);
    cmd
}

/// Check the response prefix and command echo and return the payload offset.
/// Response format: [0x01, cmd_echo..., payload...]
pub fn validate_response(response: &[u8], expected_cmd: &[u8]) -> Result<usize> {
    if response.is_empty() || response[0] != PREFIX_DEVICE_TO_HOST {
        return Err(BridgeError::InvalidResponse(
            response.first().copied().unwrap_or(0),
        ));
    }
    let cmd_len = expected_cmd.len();
    if response.len() < 1 + cmd_len || &response[1..1 + cmd_len] != expected_cmd {
        return Err(BridgeError::CommandMismatch);
    }
    Ok(1 + cmd_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> PosePacket {
        PosePacket {
            frame_index: 42,
            pose: DevicePose {
                translation: Vector3::new(1.5, -0.25, 0.75),
                rotation: Quaternion::new(0.1, 0.2, 0.3, 0.927_362),
                timestamp_ns: 1_700_000_000_123,
                tracking_state: TrackingState::Ok,
                confidence: 0.9,
            },
        }
    }

    #[test]
    fn test_pose_packet_layout() {
        let buf = encode_pose_packet(&sample_packet());
        assert_eq!(&buf[0..3], &PACKET_HEADER);
        assert_eq!(u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]), 42);
        assert_eq!(f32_at(&buf, 15), 1.5);
        assert_eq!(f32_at(&buf, 39), 0.927_362);
        assert_eq!(buf[43], 1);
    }

    #[test]
    fn test_parse_pose_packet() {
        let buf = encode_pose_packet(&sample_packet());
        let parsed = parse_pose_packet(&buf).unwrap();
        assert_eq!(parsed, sample_packet());
    }

    #[test]
    fn test_parse_rejects_bad_header_and_short_buffer() {
        let mut buf = encode_pose_packet(&sample_packet());
        assert!(parse_pose_packet(&buf[..PACKET_SIZE - 1]).is_none());
        buf[1] = 0x00;
        assert!(parse_pose_packet(&buf).is_none());
    }

    #[test]
    fn test_parse_rejects_nan() {
        let mut buf = encode_pose_packet(&sample_packet());
        buf[15..19].copy_from_slice(&f32::NAN.to_le_bytes());
        assert!(parse_pose_packet(&buf).is_none());
    }

    #[test]
    fn test_source_header() {
        let header = SourceHeader {
            coordinate_system: CoordinateSystem::LeftHandedZUp,
            fps: 30,
            serial_number: 28_491_365,
            frame_count: 120,
        };
        let buf = header.encode();
        assert_eq!(&buf[0..4], b"PTRK");
        assert_eq!(SourceHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_source_header_rejects_garbage() {
        assert!(matches!(
            SourceHeader::parse(b"not a recording!"),
            Err(BridgeError::InvalidHeader)
        ));
        let mut buf = SourceHeader {
            coordinate_system: CoordinateSystem::Image,
            fps: 15,
            serial_number: 1,
            frame_count: 0,
        }
        .encode();
        buf[4] = 9;
        assert!(matches!(
            SourceHeader::parse(&buf),
            Err(BridgeError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_build_command() {
        let buf = build_command(CMD_DESCRIBE);
        assert_eq!(buf[0], 0x02);
        assert_eq!(&buf[1..3], CMD_DESCRIBE);
        assert_eq!(buf[3], 0);
    }

    #[test]
    fn test_build_tracking_cmd() {
        assert_eq!(build_tracking_cmd(true, true, true), vec![0x5A, 0x20, 0x01, 0x03]);
        assert_eq!(build_tracking_cmd(true, false, true), vec![0x5A, 0x20, 0x01, 0x02]);
        assert_eq!(build_tracking_cmd(false, true, true), vec![0x5A, 0x20, 0x00, 0x00]);
    }

    #[test]
    fn test_validate_response() {
        let mut resp = [0u8; REPORT_SIZE];
        resp[0] = PREFIX_DEVICE_TO_HOST;
        resp[1..3].copy_from_slice(CMD_DESCRIBE);
        assert_eq!(validate_response(&resp, CMD_DESCRIBE).unwrap(), 3);
        assert!(matches!(
            validate_response(&resp, CMD_TRACKING),
            Err(BridgeError::CommandMismatch)
        ));
        resp[0] = 0x07;
        assert!(matches!(
            validate_response(&resp, CMD_DESCRIBE),
            Err(BridgeError::InvalidResponse(0x07))
        ));
    }
}
