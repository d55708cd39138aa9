use clap::Parser;
use guidance_lib::autopilot::Autopilot;
use guidance_lib::cli::Cli;
use guidance_lib::error::{GuidanceError, Result};
use guidance_lib::frame::{FrameSource, SharedFrameBuffer};
use guidance_lib::io::datagram::{DatagramLink, EventListener};
use guidance_lib::io::mode::ModeRouter;
use guidance_lib::io::video::VideoDecoder;
use guidance_lib::io::{StickSink, TargetSink};
use guidance_lib::tracker::IncrementalTracker;
use log::{error, info, warn};
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(err) = run(&cli) {
        error!("guidance failed: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.resolve_config()?;
    let (width, height) = config.link.resolution;

    // Frame path: decoder process -> shared buffer -> tracker
    let frames = Arc::new(SharedFrameBuffer::new(width, height));
    let mut decoder = VideoDecoder::spawn(&config.link.stream_url, Arc::clone(&frames))?;

    // One datagram link carries both stick events and overlay updates
    let link = Arc::new(DatagramLink::connect(&config.link.simulator_addr)?);

    let autopilot = Arc::new(Autopilot::new(
        config.autopilot,
        (width, height),
        link.clone() as Arc<dyn StickSink>,
    ));
    let autopilot_handle = autopilot.spawn();

    let tracker = Arc::new(IncrementalTracker::new(
        config.tracker.clone(),
        Arc::clone(&frames) as Arc<dyn FrameSource>,
        vec![
            link.clone() as Arc<dyn TargetSink>,
            autopilot.clone() as Arc<dyn TargetSink>,
        ],
    ));
    let tracker_handle = tracker.spawn();

    let listener = EventListener::bind(&config.link.listen_addr)?;
    let mut router = ModeRouter::new(
        Arc::clone(&tracker),
        Arc::clone(&autopilot),
        link.clone() as Arc<dyn StickSink>,
        link.clone() as Arc<dyn TargetSink>,
        config.link.reticle_divisor,
    );

    info!(
        "guidance ready: stream {} ({}x{}), simulator {}, listening on {}",
        config.link.stream_url, width, height, config.link.simulator_addr, config.link.listen_addr
    );

    loop {
        match listener.recv() {
            Ok(event) => router.handle(event),
            Err(GuidanceError::Link(message)) => warn!("dropping event: {}", message),
            Err(err) => {
                error!("event listener failed: {}", err);
                break;
            }
        }
    }

    tracker.stop();
    autopilot.stop();
    decoder.stop();

    let _ = tracker_handle.join();
    let _ = autopilot_handle.join();

    Ok(())
}
