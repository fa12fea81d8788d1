//! Packet sources backing the camera: recordings on disk and network streams.
//! The live sensor source lives in [`crate::hid`].

use crate::config::TrackingParameters;
use crate::error::ErrorCode;
use crate::protocol::{self, PosePacket, SourceHeader, HEADER_SIZE, PACKET_SIZE};
use crate::reader::{PacketReader, PacketStream};
use crate::{BridgeError, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

/// Where a camera pulls pose packets from.
pub trait PacketSource {
    fn header(&self) -> &SourceHeader;

    /// Wait up to `timeout` for the next packet. `Ok(None)` means the source
    /// is exhausted (end of a recording).
    fn next_packet(&mut self, timeout: Duration) -> Result<Option<PosePacket>>;

    /// Move playback to `frame`. Only recordings can seek.
    fn seek(&mut self, frame: u32) -> Result<()> {
        let _ = frame;
        Err(BridgeError::Device(ErrorCode::InvalidFunctionParameters))
    }

    /// Forward tracking options to the source. Recorded and streamed poses
    /// were tracked by the sender, so the default accepts them as-is.
    fn set_tracking(&mut self, params: Option<&TrackingParameters>) -> Result<()> {
        let _ = params;
        Ok(())
    }

    /// Whether this source replays captured data (and can be paced).
    fn is_recording(&self) -> bool {
        false
    }
}

/// Pose recording: a [`SourceHeader`] followed by fixed-size packets.
pub struct RecordingSource<R> {
    reader: R,
    header: SourceHeader,
    position: u32,
}

impl RecordingSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let source = Self::from_reader(BufReader::new(file))?;
        log::info!(
            "Opened recording {} (serial {}, {} fps, {} frames)",
            path.display(),
            source.header.serial_number,
            source.header.fps,
            source.frame_count()
        );
        Ok(source)
    }
}

impl<R: Read + Seek> RecordingSource<R> {
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => BridgeError::InvalidHeader,
            _ => BridgeError::Io(e),
        })?;
        let mut header = SourceHeader::parse(&buf)?;

        // Writers that could not seek back leave the count at 0.
        if header.frame_count == 0 {
            let end = reader.seek(SeekFrom::End(0))?;
            let body = end.saturating_sub(HEADER_SIZE as u64);
            header.frame_count = (body / PACKET_SIZE as u64) as u32;
            reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        }
        if header.frame_count == 0 {
            return Err(BridgeError::Device(ErrorCode::InvalidSvoFile));
        }

        Ok(Self {
            reader,
            header,
            position: 0,
        })
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    /// Index of the next packet to be read.
    pub fn position(&self) -> u32 {
        self.position
    }
}

impl<R: Read + Seek> PacketSource for RecordingSource<R> {
    fn header(&self) -> &SourceHeader {
        &self.header
    }

    fn next_packet(&mut self, _timeout: Duration) -> Result<Option<PosePacket>> {
        if self.position >= self.header.frame_count {
            return Ok(None);
        }

        let mut buf = [0u8; PACKET_SIZE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        self.position += 1;

        protocol::parse_pose_packet(&buf)
            .map(Some)
            .ok_or(BridgeError::Device(ErrorCode::CorruptedFrame))
    }

    fn seek(&mut self, frame: u32) -> Result<()> {
        let frame = frame.min(self.header.frame_count);
        let offset = HEADER_SIZE as u64 + frame as u64 * PACKET_SIZE as u64;
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = frame;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        true
    }
}

/// Writes pose recordings readable by [`RecordingSource`].
pub struct RecordingWriter<W: Write + Seek> {
    writer: W,
    header: SourceHeader,
}

impl<W: Write + Seek> RecordingWriter<W> {
    pub fn new(mut writer: W, mut header: SourceHeader) -> Result<Self> {
        header.frame_count = 0;
        writer.write_all(&header.encode())?;
        Ok(Self { writer, header })
    }

    pub fn write_packet(&mut self, packet: &PosePacket) -> Result<()> {
        self.writer.write_all(&protocol::encode_pose_packet(packet))?;
        self.header.frame_count += 1;
        Ok(())
    }

    /// Patch the frame count into the header and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.seek(SeekFrom::Start(0))?;
        self.writer.write_all(&self.header.encode())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads packets off a TCP connection, resynchronizing on the packet header
/// after garbage or a partial write.
struct TcpPacketReader {
    stream: TcpStream,
    buf: [u8; PACKET_SIZE],
    filled: usize,
}

impl PacketReader for TcpPacketReader {
    fn read_packet(&mut self) -> Result<Option<PosePacket>> {
        match self.stream.read(&mut self.buf[self.filled..]) {
            Ok(0) => return Err(BridgeError::StreamStopped),
            Ok(n) => self.filled += n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None)
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        if self.filled < PACKET_SIZE {
            return Ok(None);
        }
        self.filled = 0;

        match protocol::parse_pose_packet(&self.buf) {
            Some(packet) => Ok(Some(packet)),
            None => {
                // Drop bytes up to the next candidate header.
                let skip = self.buf[1..]
                    .iter()
                    .position(|&b| b == protocol::PACKET_HEADER[0])
                    .map(|i| i + 1)
                    .unwrap_or(PACKET_SIZE);
                self.buf.copy_within(skip.., 0);
                self.filled = PACKET_SIZE - skip;
                log::trace!("stream resync, skipped {} bytes", skip);
                Ok(None)
            }
        }
    }
}

/// Poses streamed by a remote sender over TCP.
pub struct StreamSource {
    header: SourceHeader,
    stream: PacketStream,
}

impl StreamSource {
    pub fn connect(ip: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", ip, port)
            .parse()
            .map_err(|_| BridgeError::Device(ErrorCode::InvalidFunctionParameters))?;

        let mut tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            log::warn!("Stream connect to {} failed: {}", addr, e);
            BridgeError::Device(ErrorCode::ConnectionTimeout)
        })?;
        tcp.set_nodelay(true).ok();
        tcp.set_read_timeout(Some(timeout))?;

        let mut buf = [0u8; HEADER_SIZE];
        tcp.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                BridgeError::Device(ErrorCode::ConnectionTimeout)
            }
            _ => BridgeError::Io(e),
        })?;
        let header = SourceHeader::parse(&buf)?;

        // Short timeout so the reader thread notices its stop flag.
        tcp.set_read_timeout(Some(Duration::from_millis(100)))?;
        let reader = TcpPacketReader {
            stream: tcp,
            buf: [0u8; PACKET_SIZE],
            filled: 0,
        };
        let stream = PacketStream::start("stream-reader", reader)?;

        log::info!(
            "Connected to stream {} (serial {}, {} fps)",
            addr,
            header.serial_number,
            header.fps
        );
        Ok(Self { header, stream })
    }
}

impl PacketSource for StreamSource {
    fn header(&self) -> &SourceHeader {
        &self.header
    }

    fn next_packet(&mut self, timeout: Duration) -> Result<Option<PosePacket>> {
        self.stream.recv_latest(timeout).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, DevicePose, Quaternion, TrackingState, Vector3};
    use std::io::Cursor;
    use std::net::TcpListener;

    fn header() -> SourceHeader {
        SourceHeader {
            coordinate_system: CoordinateSystem::LeftHandedZUp,
            fps: 30,
            serial_number: 1234,
            frame_count: 0,
        }
    }

    fn packet(i: u32) -> PosePacket {
        PosePacket {
            frame_index: i,
            pose: DevicePose {
                translation: Vector3::new(i as f32, 0.5, -1.0),
                rotation: Quaternion::IDENTITY,
                timestamp_ns: 1_000_000 * i as u64,
                tracking_state: TrackingState::Ok,
                confidence: 1.0,
            },
        }
    }

    fn recording(frames: u32) -> Cursor<Vec<u8>> {
        let mut writer = RecordingWriter::new(Cursor::new(Vec::new()), header()).unwrap();
        for i in 0..frames {
            writer.write_packet(&packet(i)).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn test_recording_reads_all_frames_then_ends() {
        let mut source = RecordingSource::from_reader(recording(3)).unwrap();
        assert_eq!(source.frame_count(), 3);
        for i in 0..3 {
            let p = source.next_packet(Duration::ZERO).unwrap().unwrap();
            assert_eq!(p.frame_index, i);
        }
        assert!(source.next_packet(Duration::ZERO).unwrap().is_none());
        assert!(source.next_packet(Duration::ZERO).unwrap().is_none());
    }

    #[test]
    fn test_recording_seek_to_start() {
        let mut source = RecordingSource::from_reader(recording(2)).unwrap();
        source.next_packet(Duration::ZERO).unwrap();
        source.next_packet(Duration::ZERO).unwrap();
        assert!(source.next_packet(Duration::ZERO).unwrap().is_none());

        source.seek(0).unwrap();
        assert_eq!(source.position(), 0);
        let p = source.next_packet(Duration::ZERO).unwrap().unwrap();
        assert_eq!(p, packet(0));
    }

    #[test]
    fn test_recording_without_count_is_measured() {
        // Header claims 0 frames, as written by a non-seeking recorder.
        let mut bytes = header().encode().to_vec();
        bytes.extend_from_slice(&protocol::encode_pose_packet(&packet(0)));
        bytes.extend_from_slice(&protocol::encode_pose_packet(&packet(1)));
        let source = RecordingSource::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(source.frame_count(), 2);
    }

    #[test]
    fn test_recording_corrupted_packet() {
        let mut bytes = recording(2).into_inner();
        bytes[HEADER_SIZE] = 0xFF;
        let mut source = RecordingSource::from_reader(Cursor::new(bytes)).unwrap();
        let err = source.next_packet(Duration::ZERO).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CorruptedFrame);
        // The bad packet is skipped, not retried.
        assert_eq!(source.next_packet(Duration::ZERO).unwrap().unwrap().frame_index, 1);
    }

    #[test]
    fn test_recording_rejects_non_recording() {
        let err = RecordingSource::from_reader(Cursor::new(b"hello".to_vec())).err().unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidSvoFile);
    }

    #[test]
    fn test_empty_recording_is_rejected() {
        let err = RecordingSource::from_reader(recording(0)).err().unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidSvoFile);
    }

    #[test]
    fn test_stream_source_receives_packets() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let sender = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&header().encode()).unwrap();
            // Leading garbage must be skipped.
            conn.write_all(&[0xAB, 0xCD]).unwrap();
            conn.write_all(&protocol::encode_pose_packet(&packet(7))).unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });

        let mut source = StreamSource::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        assert_eq!(source.header().serial_number, 1234);
        let p = source
            .next_packet(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert_eq!(p, packet(7));
        sender.join().unwrap();
    }

    #[test]
    fn test_stream_source_bad_address() {
        let err = StreamSource::connect("not-an-ip", 1, Duration::from_millis(10)).err().unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidFunctionParameters);
    }
}
