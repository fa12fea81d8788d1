use crate::config::{InitParameters, RuntimeParameters, TrackingParameters};
use crate::error::ErrorCode;
use crate::hid::{self, HidSource};
use crate::protocol::PosePacket;
use crate::source::{PacketSource, RecordingSource, StreamSource};
use crate::types::{DevicePose, GrabOutcome, InputSource, Quaternion, ReferenceFrame, SubjectName};
use std::time::{Duration, Instant};

/// Outcome of a camera call: success or a device status code.
pub type DeviceResult<T> = std::result::Result<T, ErrorCode>;

/// The camera SDK surface the bridge depends on.
pub trait Camera {
    fn open(&mut self, params: &InitParameters) -> DeviceResult<()>;
    fn serial_number(&self) -> u32;
    fn enable_tracking(&mut self, params: &TrackingParameters) -> DeviceResult<()>;
    /// Block until the next frame is available, at most one frame period.
    fn grab(&mut self, params: &RuntimeParameters) -> DeviceResult<()>;
    /// Latest tracked pose of the last grabbed frame.
    fn position(&self, reference_frame: ReferenceFrame) -> DevicePose;
    fn set_playback_position(&mut self, frame: u32);
    fn disable_tracking(&mut self);
    fn close(&mut self);
}

/// Camera fed by pose packets from a live sensor, a recording or a stream.
pub struct PacketCamera {
    live_vid: u16,
    live_pid: u16,
    source: Option<Box<dyn PacketSource>>,
    unit_scale: f32,
    frame_period: Duration,
    playback_period: Option<Duration>,
    last_grab: Option<Instant>,
    tracking: Option<TrackingParameters>,
    current: Option<PosePacket>,
    previous: Option<PosePacket>,
}

impl Default for PacketCamera {
    fn default() -> Self {
        Self::new(hid::DEFAULT_VID, hid::DEFAULT_PID)
    }
}

impl PacketCamera {
    /// Create an unopened camera. `vid`/`pid` select the live sensor.
    pub fn new(live_vid: u16, live_pid: u16) -> Self {
        Self {
            live_vid,
            live_pid,
            source: None,
            unit_scale: 1.0,
            frame_period: Duration::from_secs(1) / 30,
            playback_period: None,
            last_grab: None,
            tracking: None,
            current: None,
            previous: None,
        }
    }

    /// Open a camera on an already constructed packet source.
    pub fn with_source(source: Box<dyn PacketSource>) -> Self {
        let mut camera = Self::default();
        camera.source = Some(source);
        camera
    }

    fn open_source(&self, params: &InitParameters) -> DeviceResult<Box<dyn PacketSource>> {
        let source: Box<dyn PacketSource> = match &params.input {
            InputSource::Live => Box::new(
                HidSource::open_first(self.live_vid, self.live_pid).map_err(|e| {
                    log::warn!("Live sensor: {}", e);
                    e.code()
                })?,
            ),
            InputSource::Recording(path) => Box::new(RecordingSource::open(path).map_err(|e| {
                log::warn!("Recording {}: {}", path.display(), e);
                ErrorCode::InvalidSvoFile
            })?),
            InputSource::Stream { ip, port } => Box::new(
                StreamSource::connect(ip, *port, params.open_timeout).map_err(|e| {
                    log::warn!("Stream {}:{}: {}", ip, port, e);
                    e.code()
                })?,
            ),
        };
        Ok(source)
    }

    /// Hold recording playback to one frame per `period`.
    fn pace(&mut self, period: Duration) {
        if let Some(last) = self.last_grab {
            sleep_remaining(last, period);
        }
        self.last_grab = Some(Instant::now());
    }
}

fn sleep_remaining(since: Instant, period: Duration) {
    let elapsed = since.elapsed();
    if elapsed < period {
        std::thread::sleep(period - elapsed);
    }
}

/// Recordings play back at the configured rate, or at the rate they were
/// captured at in real-time mode.
fn playback_period(
    params: &InitParameters,
    source: &dyn PacketSource,
    fps: u32,
) -> Option<Duration> {
    if !source.is_recording() {
        return None;
    }
    let recorded = source.header().fps;
    let rate = if params.svo_real_time_mode && recorded > 0 {
        recorded as u32
    } else {
        fps
    };
    Some(Duration::from_secs_f64(1.0 / rate as f64))
}

/// Pick the requested rate if the resolution supports it, otherwise the
/// fastest supported rate.
fn effective_fps(params: &InitParameters) -> DeviceResult<u32> {
    if params.camera_fps == 0 {
        return Err(ErrorCode::InvalidFunctionParameters);
    }
    let supported = params.resolution.supported_fps();
    if supported.contains(&params.camera_fps) {
        return Ok(params.camera_fps);
    }
    let fallback = supported.last().copied().unwrap_or(15);
    log::warn!(
        "{} fps is not available in {}, using {} fps",
        params.camera_fps,
        params.resolution,
        fallback
    );
    Ok(fallback)
}

impl Camera for PacketCamera {
    fn open(&mut self, params: &InitParameters) -> DeviceResult<()> {
        let fps = effective_fps(params)?;

        let source = match self.source.take() {
            Some(source) => source,
            None => self.open_source(params)?,
        };

        let header = source.header();
        if header.coordinate_system != params.coordinate_system {
            log::warn!(
                "Source reports {:?}, requested {:?}",
                header.coordinate_system,
                params.coordinate_system
            );
            return Err(ErrorCode::InvalidCoordinateSystem);
        }

        let (w, h) = params.resolution.dimensions();
        log::debug!(
            "Camera configured: {}x{} @ {} fps, depth {:?}, unit {:?}",
            w,
            h,
            fps,
            params.depth_mode,
            params.coordinate_unit
        );

        self.playback_period = playback_period(params, source.as_ref(), fps);
        self.unit_scale = params.coordinate_unit.per_meter();
        self.frame_period = Duration::from_secs_f64(1.0 / fps as f64);
        self.source = Some(source);
        self.current = None;
        self.previous = None;
        self.last_grab = None;
        Ok(())
    }

    fn serial_number(&self) -> u32 {
        self.source
            .as_ref()
            .map(|s| s.header().serial_number)
            .unwrap_or(0)
    }

    fn enable_tracking(&mut self, params: &TrackingParameters) -> DeviceResult<()> {
        let source = self.source.as_mut().ok_or(ErrorCode::CameraNotInitialized)?;
        source.set_tracking(Some(params)).map_err(|e| {
            log::warn!("Enable tracking: {}", e);
            e.code()
        })?;
        self.tracking = Some(*params);
        Ok(())
    }

    fn grab(&mut self, _params: &RuntimeParameters) -> DeviceResult<()> {
        if self.source.is_none() {
            return Err(ErrorCode::CameraNotInitialized);
        }
        if let Some(period) = self.playback_period {
            self.pace(period);
        }

        let started = Instant::now();
        let timeout = self.frame_period;
        let source = self.source.as_mut().ok_or(ErrorCode::CameraNotInitialized)?;
        match source.next_packet(timeout) {
            Ok(Some(mut packet)) => {
                packet.pose.translation = packet.pose.translation.scale(self.unit_scale);
                self.previous = self.current.replace(packet);
                Ok(())
            }
            Ok(None) => Err(ErrorCode::EndOfSvoFileReached),
            Err(e) => {
                // A dead source fails instantly; keep failures at frame rate.
                sleep_remaining(started, timeout);
                Err(e.code())
            }
        }
    }

    fn position(&self, reference_frame: ReferenceFrame) -> DevicePose {
        let current = match (&self.tracking, &self.current) {
            (Some(_), Some(packet)) => packet.pose,
            _ => return DevicePose::default(),
        };

        match (reference_frame, &self.previous) {
            (ReferenceFrame::World, _) => current,
            (ReferenceFrame::Camera, Some(prev)) => {
                let inverse = prev.pose.rotation.conjugate();
                DevicePose {
                    translation: inverse.rotate(current.translation.sub(prev.pose.translation)),
                    rotation: inverse.mul(current.rotation),
                    ..current
                }
            }
            (ReferenceFrame::Camera, None) => DevicePose {
                translation: Default::default(),
                rotation: Quaternion::IDENTITY,
                ..current
            },
        }
    }

    fn set_playback_position(&mut self, frame: u32) {
        if let Some(source) = self.source.as_mut() {
            if let Err(e) = source.seek(frame) {
                log::warn!("Seek to frame {} failed: {}", frame, e);
            }
        }
        self.previous = None;
        self.last_grab = None;
    }

    fn disable_tracking(&mut self) {
        if self.tracking.take().is_some() {
            if let Some(source) = self.source.as_mut() {
                if let Err(e) = source.set_tracking(None) {
                    log::warn!("Disable tracking: {}", e);
                }
            }
        }
    }

    fn close(&mut self) {
        self.source = None;
        self.current = None;
        self.previous = None;
    }
}

/// One open camera with its subject name.
///
/// Closing (explicitly or on drop) disables tracking and releases the
/// device; it is safe to call any number of times.
pub struct DeviceSession<C: Camera> {
    camera: C,
    subject: SubjectName,
    input: InputSource,
    tracking_enabled: bool,
    closed: bool,
}

impl<C: Camera> DeviceSession<C> {
    pub fn open(mut camera: C, params: &InitParameters) -> DeviceResult<Self> {
        camera.open(params)?;
        let subject = SubjectName::from_serial(camera.serial_number());
        log::info!("Camera {} opened from {}", subject, params.input);
        Ok(Self {
            camera,
            subject,
            input: params.input.clone(),
            tracking_enabled: false,
            closed: false,
        })
    }

    pub fn enable_tracking(&mut self, params: &TrackingParameters) -> DeviceResult<()> {
        self.camera.enable_tracking(params)?;
        self.tracking_enabled = true;
        Ok(())
    }

    /// One grab cycle against the world frame.
    pub fn grab(&mut self) -> GrabOutcome {
        let params = RuntimeParameters {
            reference_frame: ReferenceFrame::World,
        };
        match self.camera.grab(&params) {
            Ok(()) => GrabOutcome::NewFrame,
            Err(ErrorCode::EndOfSvoFileReached) => GrabOutcome::EndOfRecording,
            Err(code) => GrabOutcome::Failed(code),
        }
    }

    pub fn pose(&self, reference_frame: ReferenceFrame) -> DevicePose {
        self.camera.position(reference_frame)
    }

    /// Restart playback from the first frame.
    pub fn rewind(&mut self) {
        self.camera.set_playback_position(0);
    }

    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    pub fn input(&self) -> &InputSource {
        &self.input
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking_enabled
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.tracking_enabled {
            self.camera.disable_tracking();
            self.tracking_enabled = false;
        }
        self.camera.close();
        self.closed = true;
        log::info!("Camera {} closed", self.subject);
    }
}

impl<C: Camera> Drop for DeviceSession<C> {
    fn drop(&mut self) {
        self.close();
    }
}
