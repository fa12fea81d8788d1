//! The acquisition loop: connection gating, grab cycles and publishing.

use crate::adapter;
use crate::config::StreamSettings;
use crate::device::{Camera, DeviceSession};
use crate::error::ErrorCode;
use crate::publisher::Publisher;
use crate::types::{FrameSample, GrabOutcome, ReferenceFrame, StaticDescriptor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No subscriber; nothing grabbed.
    Idle,
    /// A frame was grabbed and published.
    Published,
    /// The recording ended and playback restarted at frame 0.
    Rewound,
    /// The grab failed; nothing published.
    GrabFailed(ErrorCode),
}

/// Counters kept across the loop's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub frames_published: u64,
    pub grab_failures: u64,
    pub rewinds: u64,
    pub connections: u64,
}

/// Drives one camera session and one publisher.
pub struct AcquisitionLoop<C: Camera, P: Publisher> {
    session: DeviceSession<C>,
    publisher: P,
    settings: StreamSettings,
    connected: bool,
    started: bool,
    last_failure: Option<ErrorCode>,
    epoch: Instant,
    stats: LoopStats,
}

impl<C: Camera, P: Publisher> AcquisitionLoop<C, P> {
    /// Wrap an open, tracking session.
    pub fn new(session: DeviceSession<C>, publisher: P, settings: StreamSettings) -> Self {
        Self {
            session,
            publisher,
            settings,
            connected: false,
            started: false,
            last_failure: None,
            epoch: Instant::now(),
            stats: LoopStats::default(),
        }
    }

    /// Publish the subject's static data. Only the first call sends anything;
    /// the transport is responsible for late subscribers.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        let descriptor = StaticDescriptor::from(self.settings.capabilities);
        self.publisher
            .publish_static(self.session.subject(), &descriptor);
        self.started = true;
        log::info!("Waiting for connection...");
    }

    /// One poll of the connection followed, when connected, by one grab cycle.
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;

        if !self.publisher.has_connection() {
            if self.connected {
                self.connected = false;
                log::info!("Source {} removed", self.session.subject());
            }
            return TickOutcome::Idle;
        }

        if !self.connected {
            self.connected = true;
            self.stats.connections += 1;
            log::info!("Connected, camera {} added", self.session.subject());
        }

        let outcome = self.session.grab();
        if !matches!(outcome, GrabOutcome::Failed(_)) {
            if let Some(code) = self.last_failure.take() {
                log::info!("Grab recovered after {}", code);
            }
        }

        match outcome {
            GrabOutcome::NewFrame => {
                let sample = self.build_sample();
                self.publisher
                    .publish_frame(self.session.subject(), &sample);
                self.stats.frames_published += 1;
                TickOutcome::Published
            }
            GrabOutcome::EndOfRecording => {
                log::info!("End of recording reached, looping");
                self.session.rewind();
                self.stats.rewinds += 1;
                TickOutcome::Rewound
            }
            GrabOutcome::Failed(code) => {
                if self.last_failure.replace(code) == Some(code) {
                    log::debug!("Grab failed: {}", code);
                } else {
                    log::warn!("Grab failed: {}", code);
                }
                self.stats.grab_failures += 1;
                TickOutcome::GrabFailed(code)
            }
        }
    }

    fn build_sample(&self) -> FrameSample {
        let pose = self.session.pose(ReferenceFrame::World);
        FrameSample {
            transform: adapter::to_target_transform(&pose),
            aspect_ratio: self.settings.aspect_ratio,
            projection_mode: self.settings.projection_mode,
            field_of_view: self.settings.field_of_view,
            world_time: self.epoch.elapsed().as_secs_f64(),
            capture_timestamp_ns: pose.timestamp_ns,
        }
    }

    /// Tick until `cancel` is set. Grabs pace the loop while connected; while
    /// idle it sleeps for the configured poll interval.
    pub fn run(&mut self, cancel: &AtomicBool) {
        self.start();
        while !cancel.load(Ordering::Relaxed) {
            if self.tick() == TickOutcome::Idle && !self.settings.idle_poll_interval.is_zero() {
                std::thread::sleep(self.settings.idle_poll_interval);
            }
        }
        log::info!(
            "Stopping after {} ticks, {} frames published",
            self.stats.ticks,
            self.stats.frames_published
        );
    }

    /// Close the camera and hand back the publisher.
    pub fn shutdown(mut self) -> P {
        self.session.close();
        self.publisher
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}
