//! Camera, tracking and publishing parameters.

use crate::types::{
    CameraCapabilities, CoordinateSystem, DepthMode, InputSource, ProjectionMode, ReferenceFrame,
    Resolution, Unit,
};
use std::path::PathBuf;
use std::time::Duration;

/// Port used when a stream source is given as a bare IP.
pub const DEFAULT_STREAM_PORT: u16 = 30000;

/// Parameters applied when opening the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct InitParameters {
    pub input: InputSource,
    pub resolution: Resolution,
    pub camera_fps: u32,
    pub depth_mode: DepthMode,
    pub coordinate_system: CoordinateSystem,
    pub coordinate_unit: Unit,
    /// Play recordings back at their recorded rate instead of `camera_fps`.
    pub svo_real_time_mode: bool,
    /// How long a network source may take to accept the connection and send
    /// its header.
    pub open_timeout: Duration,
}

impl Default for InitParameters {
    fn default() -> Self {
        Self {
            input: InputSource::Live,
            resolution: Resolution::Hd1080,
            camera_fps: 30,
            depth_mode: DepthMode::Ultra,
            coordinate_system: CoordinateSystem::LeftHandedZUp,
            coordinate_unit: Unit::Centimeter,
            svo_real_time_mode: false,
            open_timeout: Duration::from_secs(2),
        }
    }
}

impl InitParameters {
    /// Build parameters from the process arguments (program name excluded).
    /// Only the first argument is considered.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut params = InitParameters::default();
        if let Some(arg) = args.first() {
            params.apply_input_argument(arg.as_ref());
        }
        params
    }

    /// Interpret one command line token as an input source or resolution
    /// override. Unrecognized tokens leave the parameters untouched.
    pub fn apply_input_argument(&mut self, arg: &str) {
        if arg.contains(".svo") {
            self.input = InputSource::Recording(PathBuf::from(arg));
            log::info!("Using SVO file input: {}", arg);
            return;
        }

        if let Some((ip, port)) = parse_stream_address(arg) {
            log::info!("Using stream input, IP: {}, port: {}", ip, port);
            self.input = InputSource::Stream { ip, port };
            return;
        }

        let resolution = [
            ("HD2K", Resolution::Hd2k),
            ("HD1080", Resolution::Hd1080),
            ("HD720", Resolution::Hd720),
            ("VGA", Resolution::Vga),
        ]
        .into_iter()
        .find(|(token, _)| arg.contains(token))
        .map(|(_, r)| r);

        match resolution {
            Some(r) => {
                log::info!("Using camera in resolution {}", r);
                self.resolution = r;
            }
            None => log::debug!("Ignoring unrecognized argument '{}'", arg),
        }
    }

    /// Time between two frames at the configured rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.camera_fps.max(1) as f64)
    }
}

/// Parse `a.b.c.d` or `a.b.c.d:port`. A missing or malformed port falls back
/// to [`DEFAULT_STREAM_PORT`].
fn parse_stream_address(arg: &str) -> Option<(String, u16)> {
    let (host, port) = match arg.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (arg, None),
    };

    let octets: Vec<u8> = host
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            part.parse::<u8>().ok()
        })
        .collect::<Option<Vec<_>>>()?;
    if octets.len() != 4 {
        return None;
    }

    let ip = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
    let port = match port.map(str::parse::<u16>) {
        Some(Ok(p)) => p,
        Some(Err(_)) => {
            log::warn!("Invalid stream port in '{}', using {}", arg, DEFAULT_STREAM_PORT);
            DEFAULT_STREAM_PORT
        }
        None => DEFAULT_STREAM_PORT,
    };
    Some((ip, port))
}

/// Positional tracking options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingParameters {
    pub set_floor_as_origin: bool,
    pub enable_pose_smoothing: bool,
}

impl Default for TrackingParameters {
    fn default() -> Self {
        Self {
            set_floor_as_origin: true,
            enable_pose_smoothing: true,
        }
    }
}

/// Per-grab options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeParameters {
    pub reference_frame: ReferenceFrame,
}

/// Values stamped onto every published subject and frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub capabilities: CameraCapabilities,
    pub aspect_ratio: f64,
    pub projection_mode: ProjectionMode,
    /// Horizontal field of view in degrees, if known.
    pub field_of_view: Option<f32>,
    /// Sleep between connection polls while no subscriber is attached.
    pub idle_poll_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            capabilities: CameraCapabilities::default(),
            aspect_ratio: 16.0 / 9.0,
            projection_mode: ProjectionMode::Perspective,
            field_of_view: None,
            idle_poll_interval: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_gives_defaults() {
        let params = InitParameters::from_args::<&str>(&[]);
        assert_eq!(params.input, InputSource::Live);
        assert_eq!(params.resolution, Resolution::Hd1080);
        assert_eq!(params.camera_fps, 30);
        assert_eq!(params.depth_mode, DepthMode::Ultra);
        assert_eq!(params.coordinate_system, CoordinateSystem::LeftHandedZUp);
        assert_eq!(params.coordinate_unit, Unit::Centimeter);
    }

    #[test]
    fn test_stream_address_with_port() {
        let params = InitParameters::from_args(&["10.0.0.5:30000"]);
        assert_eq!(
            params.input,
            InputSource::Stream {
                ip: "10.0.0.5".into(),
                port: 30000
            }
        );
        assert_eq!(params.resolution, Resolution::Hd1080);
    }

    #[test]
    fn test_stream_address_without_port() {
        let params = InitParameters::from_args(&["192.168.1.20"]);
        assert_eq!(
            params.input,
            InputSource::Stream {
                ip: "192.168.1.20".into(),
                port: DEFAULT_STREAM_PORT
            }
        );
    }

    #[test]
    fn test_stream_address_is_normalized() {
        let params = InitParameters::from_args(&["010.000.000.005:4000"]);
        assert_eq!(
            params.input,
            InputSource::Stream {
                ip: "10.0.0.5".into(),
                port: 4000
            }
        );
    }

    #[test]
    fn test_recording_path() {
        let params = InitParameters::from_args(&["capture.svo"]);
        assert_eq!(params.input, InputSource::Recording(PathBuf::from("capture.svo")));
        assert_eq!(params.resolution, Resolution::Hd1080);
    }

    #[test]
    fn test_resolution_override() {
        let params = InitParameters::from_args(&["HD720"]);
        assert_eq!(params.resolution, Resolution::Hd720);
        assert_eq!(params.input, InputSource::Live);

        assert_eq!(InitParameters::from_args(&["HD2K"]).resolution, Resolution::Hd2k);
        assert_eq!(InitParameters::from_args(&["VGA"]).resolution, Resolution::Vga);
    }

    #[test]
    fn test_unrecognized_argument_is_ignored() {
        assert_eq!(InitParameters::from_args(&["--verbose"]), InitParameters::default());
        assert_eq!(InitParameters::from_args(&["1.2.3"]), InitParameters::default());
        assert_eq!(InitParameters::from_args(&["300.1.1.1"]), InitParameters::default());
    }

    #[test]
    fn test_only_first_argument_is_consumed() {
        let params = InitParameters::from_args(&["HD720", "capture.svo"]);
        assert_eq!(params.resolution, Resolution::Hd720);
        assert_eq!(params.input, InputSource::Live);
    }

    #[test]
    fn test_frame_period() {
        let params = InitParameters::default();
        let period = params.frame_period();
        assert!((period.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }
}
