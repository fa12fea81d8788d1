//! Bridge a tracking camera to WebSocket subscribers.
//!
//! Usage:
//!   zed-livelink                   first attached sensor, HD1080
//!   zed-livelink capture.svo       loop a pose recording
//!   zed-livelink 10.0.0.5:30000    network stream
//!   zed-livelink HD720             live sensor at 720p
//!
//! Press Ctrl+C to stop.

use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zed_livelink::{
    AcquisitionLoop, DeviceSession, InitParameters, PacketCamera, StreamSettings,
    TrackingParameters, WsProvider,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream depth camera tracking to real-time subscribers")]
struct Args {
    /// Recording path (*.svo), stream address (a.b.c.d[:port]) or resolution
    /// (HD2K, HD1080, HD720, VGA). Unrecognized values are ignored.
    #[arg(allow_hyphen_values = true)]
    input: Option<String>,

    /// Further arguments, flags included, are accepted and ignored. Known
    /// flags must come before the input.
    #[arg(hide = true, allow_hyphen_values = true, trailing_var_arg = true)]
    ignored: Vec<String>,

    /// Address subscribers connect to.
    #[arg(long, default_value = "0.0.0.0:54321")]
    bind: String,

    /// Provider name announced to subscribers.
    #[arg(long, default_value = "ZED")]
    provider: String,

    /// Aspect ratio stamped on every frame.
    #[arg(long, default_value_t = 16.0 / 9.0)]
    aspect_ratio: f64,

    /// Horizontal field of view in degrees.
    #[arg(long)]
    fov: Option<f32>,

    /// Replay recordings at their recorded rate instead of the camera fps.
    #[arg(long)]
    real_time: bool,

    /// Live sensor USB vendor ID.
    #[arg(long, default_value = "0x2B03", value_parser = parse_hex_u16)]
    hid_vid: u16,

    /// Live sensor USB product ID.
    #[arg(long, default_value = "0xF881", value_parser = parse_hex_u16)]
    hid_pid: u16,

    /// Sleep between connection polls while nobody is subscribed, in ms.
    #[arg(long, default_value_t = 10)]
    idle_poll_ms: u64,
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB id '{}': {}", s, e))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let args = Args::parse();
    log::info!("Starting zed-livelink");

    let mut params = InitParameters::from_args(args.input.as_slice());
    params.svo_real_time_mode = args.real_time;

    let settings = StreamSettings {
        aspect_ratio: args.aspect_ratio,
        field_of_view: args.fov,
        idle_poll_interval: Duration::from_millis(args.idle_poll_ms),
        ..StreamSettings::default()
    };

    let provider = match WsProvider::bind(&args.bind, &args.provider) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to start provider on {}: {}", args.bind, e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("Opening camera...");
    let camera = PacketCamera::new(args.hid_vid, args.hid_pid);
    let mut session = match DeviceSession::open(camera, &params) {
        Ok(s) => s,
        Err(code) => {
            log::error!("Error {} opening camera, exit program.", code);
            return ExitCode::FAILURE;
        }
    };

    if let Err(code) = session.enable_tracking(&TrackingParameters::default()) {
        log::error!("Error {} enabling tracking, exit program.", code);
        return ExitCode::FAILURE;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || stop_handler.store(true, Ordering::Relaxed)) {
        log::warn!("Ctrl-C handler not installed: {}", e);
    }

    let mut bridge = AcquisitionLoop::new(session, provider, settings);
    bridge.run(&stop);
    drop(bridge.shutdown());

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_flags_are_ignored() {
        let args = Args::try_parse_from(["zed-livelink", "--verbose"]).unwrap();
        assert_eq!(args.input.as_deref(), Some("--verbose"));

        let args = Args::try_parse_from(["zed-livelink", "-x"]).unwrap();
        assert_eq!(args.input.as_deref(), Some("-x"));
    }

    #[test]
    fn test_input_kept_ahead_of_trailing_junk() {
        let args =
            Args::try_parse_from(["zed-livelink", "HD720", "--verbose", "-x", "extra"]).unwrap();
        assert_eq!(args.input.as_deref(), Some("HD720"));
        assert_eq!(args.ignored, vec!["--verbose", "-x", "extra"]);
    }

    #[test]
    fn test_known_flags_still_parse() {
        let args = Args::try_parse_from([
            "zed-livelink",
            "--bind",
            "127.0.0.1:9000",
            "--real-time",
            "capture.svo",
        ])
        .unwrap();
        assert_eq!(args.bind, "127.0.0.1:9000");
        assert!(args.real_time);
        assert_eq!(args.input.as_deref(), Some("capture.svo"));
        assert_eq!(args.hid_vid, 0x2B03);
    }

    #[test]
    fn test_flag_as_input_selects_nothing() {
        let params = InitParameters::from_args(&["--verbose"]);
        assert_eq!(params, InitParameters::default());
    }
}
