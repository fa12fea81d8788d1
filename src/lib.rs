//! # zed-livelink - stream depth camera tracking to real-time subscribers
//!
//! Opens a positional-tracking camera (live sensor, pose recording or network
//! stream), converts each tracked pose into the subscriber's transform and
//! publishes it over WebSocket:
//! - one static capability message per camera subject
//! - one frame message per grabbed frame while a subscriber is attached
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use zed_livelink::{AcquisitionLoop, DeviceSession, InitParameters, PacketCamera};
//! use zed_livelink::{StreamSettings, TrackingParameters, WsProvider};
//!
//! let params = InitParameters::from_args(&["capture.svo"]);
//! let mut session = DeviceSession::open(PacketCamera::default(), &params).unwrap();
//! session.enable_tracking(&TrackingParameters::default()).unwrap();
//!
//! let provider = WsProvider::bind("0.0.0.0:54321", "ZED").unwrap();
//! let mut bridge = AcquisitionLoop::new(session, provider, StreamSettings::default());
//! bridge.run(&AtomicBool::new(false));
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod protocol;
pub mod reader;
pub mod source;
pub mod hid;
pub mod device;
pub mod adapter;
pub mod publisher;
pub mod bridge;

pub use bridge::{AcquisitionLoop, LoopStats, TickOutcome};
pub use config::{InitParameters, RuntimeParameters, StreamSettings, TrackingParameters};
pub use device::{Camera, DeviceSession, PacketCamera};
pub use error::{BridgeError, ErrorCode};
pub use publisher::{Publisher, WsProvider};
pub use types::*;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
