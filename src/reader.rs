use crate::protocol::PosePacket;
use crate::{BridgeError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Blocking packet producer driven by a [`PacketStream`] reader thread.
///
/// `read_packet` should return within ~100 ms so the thread can observe its
/// stop flag. `Ok(None)` means nothing arrived yet; `Err` ends the stream.
pub trait PacketReader: Send + 'static {
    fn read_packet(&mut self) -> Result<Option<PosePacket>>;
}

/// Handle to packets produced by a background reader thread.
pub struct PacketStream {
    receiver: Receiver<PosePacket>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PacketStream {
    /// Spawn the reader thread. The thread owns `reader` until the stream is
    /// stopped or the reader reports an error.
    pub fn start<R: PacketReader>(name: &str, reader: R) -> Result<PacketStream> {
        let (sender, receiver) = crossbeam_channel::bounded(256);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                reader_loop(reader, sender, stop_clone);
            })
            .map_err(BridgeError::Io)?;

        Ok(PacketStream {
            receiver,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Wait up to `timeout` for a packet, then skip ahead to the newest one
    /// already queued so a slow consumer never works on stale poses.
    pub fn recv_latest(&self, timeout: Duration) -> Result<PosePacket> {
        let first = self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => BridgeError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => BridgeError::StreamStopped,
        })?;
        Ok(self.receiver.try_iter().last().unwrap_or(first))
    }

    /// Check if the reader thread is still producing.
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

}

impl Drop for PacketStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn reader_loop<R: PacketReader>(
    mut reader: R,
    sender: Sender<PosePacket>,
    stop_flag: Arc<AtomicBool>,
) {
    log::debug!("packet reader started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::debug!("packet reader stopping (stop flag set)");
            break;
        }

        let packet = match reader.read_packet() {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("packet reader stopped: {}", e);
                break;
            }
        };

        if let Err(e) = sender.try_send(packet) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("packet channel full, dropping frame");
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::debug!("packet channel disconnected, stopping reader");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DevicePose;

    struct CountingReader {
        next: u32,
        limit: u32,
    }

    impl PacketReader for CountingReader {
        fn read_packet(&mut self) -> Result<Option<PosePacket>> {
            if self.next >= self.limit {
                return Err(BridgeError::StreamStopped);
            }
            self.next += 1;
            Ok(Some(PosePacket {
                frame_index: self.next - 1,
                pose: DevicePose::default(),
            }))
        }
    }

    #[test]
    fn test_recv_latest_skips_to_newest() {
        let stream = PacketStream::start("test-reader", CountingReader { next: 0, limit: 5 }).unwrap();
        // Wait for the reader to drain its input and exit.
        while stream.is_active() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let packet = stream.recv_latest(Duration::from_millis(100)).unwrap();
        assert_eq!(packet.frame_index, 4);
    }

    #[test]
    fn test_disconnected_after_reader_error() {
        let stream = PacketStream::start("test-reader", CountingReader { next: 0, limit: 0 }).unwrap();
        let err = stream.recv_latest(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BridgeError::StreamStopped));
    }
}
