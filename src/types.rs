use crate::error::ErrorCode;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Translation as reported by the camera, in the configured unit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn sub(self, other: Vector3) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Orientation quaternion [x, y, z, w] as reported by the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Inverse rotation for a unit quaternion.
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Hamilton product `self * rhs`.
    pub fn mul(self, rhs: Quaternion) -> Self {
        let (a, b) = (self, rhs);
        Self::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }

    /// Rotate a vector by this (unit) quaternion.
    pub fn rotate(self, v: Vector3) -> Vector3 {
        let p = Quaternion::new(v.x, v.y, v.z, 0.0);
        let r = self.mul(p).mul(self.conjugate());
        Vector3::new(r.x, r.y, r.z)
    }
}

/// Positional tracking status attached to each pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    Off,
    Ok,
    Searching,
}

impl TrackingState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => TrackingState::Ok,
            2 => TrackingState::Searching,
            _ => TrackingState::Off,
        }
    }
}

/// A tracked camera pose in the device's coordinate system and unit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DevicePose {
    pub translation: Vector3,
    pub rotation: Quaternion,
    /// Device capture timestamp in nanoseconds.
    pub timestamp_ns: u64,
    pub tracking_state: TrackingState,
    /// Tracking confidence [0..1].
    pub confidence: f32,
}

/// Frame a pose is expressed relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceFrame {
    /// Relative to the tracking origin.
    #[default]
    World,
    /// Motion since the previous grabbed frame.
    Camera,
}

/// Camera output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    Hd2k,
    #[default]
    Hd1080,
    Hd720,
    Vga,
}

impl Resolution {
    /// Frame rates the sensor supports at this resolution, ascending.
    pub fn supported_fps(&self) -> &'static [u32] {
        match self {
            Resolution::Hd2k => &[15],
            Resolution::Hd1080 => &[15, 30],
            Resolution::Hd720 => &[15, 30, 60],
            Resolution::Vga => &[15, 30, 60, 100],
        }
    }

    /// Image size (width, height) of one eye.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Hd2k => (2208, 1242),
            Resolution::Hd1080 => (1920, 1080),
            Resolution::Hd720 => (1280, 720),
            Resolution::Vga => (672, 376),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::Hd2k => "HD2K",
            Resolution::Hd1080 => "HD1080",
            Resolution::Hd720 => "HD720",
            Resolution::Vga => "VGA",
        };
        f.write_str(name)
    }
}

/// Depth computation quality requested from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthMode {
    None,
    Performance,
    Quality,
    #[default]
    Ultra,
    Neural,
}

/// Axis convention poses are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateSystem {
    Image,
    LeftHandedYUp,
    RightHandedYUp,
    RightHandedZUp,
    #[default]
    LeftHandedZUp,
    RightHandedZUpXForward,
}

impl CoordinateSystem {
    pub fn id(&self) -> u8 {
        match self {
            CoordinateSystem::Image => 0,
            CoordinateSystem::LeftHandedYUp => 1,
            CoordinateSystem::RightHandedYUp => 2,
            CoordinateSystem::RightHandedZUp => 3,
            CoordinateSystem::LeftHandedZUp => 4,
            CoordinateSystem::RightHandedZUpXForward => 5,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CoordinateSystem::Image),
            1 => Some(CoordinateSystem::LeftHandedYUp),
            2 => Some(CoordinateSystem::RightHandedYUp),
            3 => Some(CoordinateSystem::RightHandedZUp),
            4 => Some(CoordinateSystem::LeftHandedZUp),
            5 => Some(CoordinateSystem::RightHandedZUpXForward),
            _ => None,
        }
    }
}

/// Length unit for translations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    Millimeter,
    #[default]
    Centimeter,
    Meter,
    Inch,
    Foot,
}

impl Unit {
    /// Multiplier converting meters into this unit.
    pub fn per_meter(&self) -> f32 {
        match self {
            Unit::Millimeter => 1000.0,
            Unit::Centimeter => 100.0,
            Unit::Meter => 1.0,
            Unit::Inch => 39.370_08,
            Unit::Foot => 3.280_84,
        }
    }
}

/// Where camera frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputSource {
    /// First attached sensor.
    #[default]
    Live,
    /// Pose recording on disk.
    Recording(PathBuf),
    /// Remote sender streaming packets over TCP.
    Stream { ip: String, port: u16 },
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Live => f.write_str("live sensor"),
            InputSource::Recording(path) => write!(f, "recording {}", path.display()),
            InputSource::Stream { ip, port } => write!(f, "stream {}:{}", ip, port),
        }
    }
}

/// Result of one grab cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabOutcome {
    NewFrame,
    EndOfRecording,
    Failed(ErrorCode),
}

/// Name under which a camera's data is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubjectName(String);

impl SubjectName {
    pub fn from_serial(serial: u32) -> Self {
        Self(serial.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target-side 3-vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };
}

/// Target-side rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Transform in the consumer's representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    #[default]
    Perspective,
    Orthographic,
}

bitflags::bitflags! {
    /// Camera properties a subject declares to subscribers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CameraCapabilities: u32 {
        const FIELD_OF_VIEW   = 1 << 0;
        const ASPECT_RATIO    = 1 << 1;
        const FOCAL_LENGTH    = 1 << 2;
        const FOCUS_DISTANCE  = 1 << 3;
        const PROJECTION_MODE = 1 << 4;
    }
}

impl Default for CameraCapabilities {
    fn default() -> Self {
        CameraCapabilities::FIELD_OF_VIEW
            | CameraCapabilities::ASPECT_RATIO
            | CameraCapabilities::PROJECTION_MODE
    }
}

/// One-time capability declaration for a camera subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StaticDescriptor {
    pub is_field_of_view_supported: bool,
    pub is_aspect_ratio_supported: bool,
    pub is_focal_length_supported: bool,
    pub is_focus_distance_supported: bool,
    pub is_projection_mode_supported: bool,
}

impl From<CameraCapabilities> for StaticDescriptor {
    fn from(caps: CameraCapabilities) -> Self {
        Self {
            is_field_of_view_supported: caps.contains(CameraCapabilities::FIELD_OF_VIEW),
            is_aspect_ratio_supported: caps.contains(CameraCapabilities::ASPECT_RATIO),
            is_focal_length_supported: caps.contains(CameraCapabilities::FOCAL_LENGTH),
            is_focus_distance_supported: caps.contains(CameraCapabilities::FOCUS_DISTANCE),
            is_projection_mode_supported: caps.contains(CameraCapabilities::PROJECTION_MODE),
        }
    }
}

/// Per-frame camera payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameSample {
    pub transform: Transform,
    pub aspect_ratio: f64,
    pub projection_mode: ProjectionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_of_view: Option<f32>,
    /// Host steady-clock time in seconds.
    pub world_time: f64,
    /// Device capture timestamp in nanoseconds.
    pub capture_timestamp_ns: u64,
}
