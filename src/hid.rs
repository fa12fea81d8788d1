//! Live sensor access over USB HID.
//!
//! The sensor speaks the packet protocol of [`crate::protocol`] over two
//! channels. Commands go out as 63-byte output reports prefixed `0x02` and
//! are answered through input report `0x01` as `[0x01, cmd echo, payload]`.
//! Pose packets arrive unsolicited as interrupt IN reports.
//!
//! | Command  | Bytes                    | Answer payload        |
//! |----------|--------------------------|-----------------------|
//! | describe | `5A 10`                  | 16-byte source header |
//! | tracking | `5A 20 <enable> <flags>` | none                  |

use crate::config::TrackingParameters;
use crate::protocol::{self, PosePacket, SourceHeader, HEADER_SIZE, PREFIX_DEVICE_TO_HOST, REPORT_SIZE};
use crate::reader::{PacketReader, PacketStream};
use crate::source::PacketSource;
use crate::{BridgeError, Result};
use hidapi::{HidApi, HidDevice};
use std::time::Duration;

/// USB vendor ID of the tracking module.
pub const DEFAULT_VID: u16 = 0x2B03;
/// USB product ID of the tracking module's HID interface.
pub const DEFAULT_PID: u16 = 0xF881;

/// Time the sensor needs between a command and its answer.
const COMMAND_SETTLE: Duration = Duration::from_millis(20);
const READ_TIMEOUT_MS: i32 = 100;

/// Report-level access to the sensor's HID interface.
pub trait ReportDevice: Send + 'static {
    fn write_report(&self, data: &[u8]) -> Result<()>;
    /// GET_REPORT for the input report whose ID is in `buf[0]`.
    fn get_report(&self, buf: &mut [u8]) -> Result<usize>;
    /// Interrupt IN read. Returns 0 when nothing arrived in time.
    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;
}

impl ReportDevice for HidDevice {
    fn write_report(&self, data: &[u8]) -> Result<()> {
        self.write(data)
            .map(drop)
            .map_err(|e| BridgeError::HidCommand(format!("write failed: {}", e)))
    }

    fn get_report(&self, buf: &mut [u8]) -> Result<usize> {
        self.get_input_report(buf)
            .map_err(|e| BridgeError::HidCommand(format!("get_input_report failed: {}", e)))
    }

    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        Ok(self.read_timeout(buf, timeout_ms)?)
    }
}

/// Command channel to the sensor.
pub struct HidTransport<D = HidDevice> {
    device: D,
}

impl<D: ReportDevice> HidTransport<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Send `cmd` and return the answer payload following `echo`.
    fn command(&self, cmd: &[u8], echo: &[u8]) -> Result<Vec<u8>> {
        self.device.write_report(&protocol::build_command(cmd))?;
        std::thread::sleep(COMMAND_SETTLE);

        let mut report = [0u8; REPORT_SIZE + 1];
        report[0] = PREFIX_DEVICE_TO_HOST;
        let len = self.device.get_report(&mut report)?.min(report.len());
        let offset = protocol::validate_response(&report[..len], echo)?;
        Ok(report[offset..len].to_vec())
    }

    /// Read the source header (serial, coordinate system, rate).
    pub fn describe(&self) -> Result<SourceHeader> {
        let payload = self.command(protocol::CMD_DESCRIBE, protocol::CMD_DESCRIBE)?;
        if payload.len() < HEADER_SIZE {
            return Err(BridgeError::InvalidHeader);
        }
        SourceHeader::parse(&payload[..HEADER_SIZE])
    }

    /// Enable (with options) or disable on-device positional tracking.
    pub fn set_tracking(&self, params: Option<&TrackingParameters>) -> Result<()> {
        let cmd = match params {
            Some(p) => protocol::build_tracking_cmd(true, p.set_floor_as_origin, p.enable_pose_smoothing),
            None => protocol::build_tracking_cmd(false, false, false),
        };
        self.command(&cmd, protocol::CMD_TRACKING).map(drop)
    }
}

/// Pulls pose packets off the interrupt endpoint.
struct HidPacketReader<D> {
    device: D,
    buf: [u8; 64],
}

impl<D: ReportDevice> PacketReader for HidPacketReader<D> {
    fn read_packet(&mut self) -> Result<Option<PosePacket>> {
        let len = self.device.read_report(&mut self.buf, READ_TIMEOUT_MS)?;
        // Command answers share the endpoint and do not decode as packets.
        Ok(protocol::parse_pose_packet(&self.buf[..len]))
    }
}

/// The first attached tracking sensor.
pub struct HidSource {
    // Keeps the hidapi context alive for both handles.
    _api: HidApi,
    transport: HidTransport,
    header: SourceHeader,
    stream: PacketStream,
}

impl HidSource {
    pub fn open_first(vid: u16, pid: u16) -> Result<Self> {
        let api = HidApi::new()?;

        let info = api
            .device_list()
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(BridgeError::DeviceNotFound { vid, pid })?;
        let path = info.path().to_owned();

        let transport = HidTransport::new(api.open_path(&path)?);
        let header = transport.describe()?;

        // Second handle for the reader thread.
        let reader = HidPacketReader {
            device: api.open_path(&path)?,
            buf: [0u8; 64],
        };
        let stream = PacketStream::start("hid-reader", reader)?;

        log::info!(
            "Opened live sensor {:04X}:{:04X} (serial {}, {} fps)",
            vid,
            pid,
            header.serial_number,
            header.fps
        );

        Ok(Self {
            _api: api,
            transport,
            header,
            stream,
        })
    }
}

impl PacketSource for HidSource {
    fn header(&self) -> &SourceHeader {
        &self.header
    }

    fn next_packet(&mut self, timeout: Duration) -> Result<Option<PosePacket>> {
        self.stream.recv_latest(timeout).map(Some)
    }

    fn set_tracking(&mut self, params: Option<&TrackingParameters>) -> Result<()> {
        self.transport.set_tracking(params)
    }
}
