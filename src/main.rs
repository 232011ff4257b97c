//! xr-bridge CLI: run a simulated session or inspect the effective config

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use xr_bridge::display::{OrientationBackend, OrientationFeed, OrientationReading};
use xr_bridge::reality::LocalRealityBackend;
use xr_bridge::session::{SessionEvent, SessionEventKind};
use xr_bridge::{
    CoordinateSystemType, Display, ManualScheduler, Reality, SessionParameters, XrConfig,
};

#[derive(Parser)]
#[command(name = "xr-bridge")]
#[command(about = "Backend-independent XR session runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive an augmentation session from a synthetic orientation sensor
    Simulate {
        /// Number of frames to run
        #[arg(long, default_value = "600")]
        ticks: u32,

        /// Frame duration in milliseconds
        #[arg(long, default_value = "16.0")]
        frame_ms: f64,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            ticks,
            frame_ms,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            init_logging(&config);
            simulate(&config, ticks, frame_ms).await
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            let rendered = config
                .to_toml_string()
                .context("Failed to render configuration")?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<XrConfig> {
    match path {
        Some(path) => XrConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => XrConfig::load().context("Failed to load configuration"),
    }
}

fn init_logging(config: &XrConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Phone held upright facing `alpha` degrees
fn upright(alpha: f32) -> OrientationReading {
    OrientationReading {
        alpha: alpha.rem_euclid(360.0),
        beta: 90.0,
        gamma: 0.0,
        screen_orientation: 0.0,
    }
}

struct SimulationTally {
    frames: AtomicUsize,
    minted: AtomicUsize,
    evicted: AtomicUsize,
    failed: AtomicUsize,
}

async fn simulate(config: &XrConfig, ticks: u32, frame_ms: f64) -> Result<()> {
    let scheduler = Arc::new(ManualScheduler::new());
    let feed = OrientationFeed::default();
    feed.push(upright(0.0));

    let reality = Arc::new(Reality::camera(
        "simulated-camera",
        Arc::new(LocalRealityBackend::new()),
    ));
    let display = Display::new(
        "simulated-orientation",
        Box::new(OrientationBackend::with_feed(feed.clone())),
        scheduler.clone(),
        reality,
        config.display_config(),
    );

    let session = display
        .request_session(SessionParameters::augmentation(), config.session_config())
        .await
        .context("Failed to start augmentation session")?;
    tracing::info!(session = %session.id(), ticks, frame_ms, "Simulation started");

    let tally = Arc::new(SimulationTally {
        frames: AtomicUsize::new(0),
        minted: AtomicUsize::new(0),
        evicted: AtomicUsize::new(0),
        failed: AtomicUsize::new(0),
    });

    let minted = tally.clone();
    session
        .events()
        .subscribe(SessionEventKind::CameraAnchorMinted, move |event| {
            if let SessionEvent::CameraAnchorMinted(id) = event {
                minted.minted.fetch_add(1, Ordering::Relaxed);
                tracing::info!(anchor = %id, "Camera anchor minted");
            }
        });
    let evicted = tally.clone();
    session
        .events()
        .subscribe(SessionEventKind::CameraAnchorEvicted, move |event| {
            if let SessionEvent::CameraAnchorEvicted(id) = event {
                evicted.evicted.fetch_add(1, Ordering::Relaxed);
                tracing::info!(anchor = %id, "Camera anchor evicted");
            }
        });
    let failed = tally.clone();
    session
        .events()
        .subscribe(SessionEventKind::FrameLoopFailed, move |event| {
            if let SessionEvent::FrameLoopFailed { reason, .. } = event {
                failed.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%reason, "Frame loop stopped");
            }
        });

    // One full turn over the run
    let degrees_per_tick = 360.0 / ticks.max(1) as f32;
    let frames = tally.clone();
    let sweep = feed.clone();
    session
        .request_frame(move |frame| {
            let index = frames.frames.fetch_add(1, Ordering::Relaxed);
            let stage = frame.coordinate_system(&[
                CoordinateSystemType::Stage,
                CoordinateSystemType::EyeLevel,
            ])?;
            if let Some(head) = frame.get_pose(&stage) {
                let position = head.position();
                tracing::trace!(
                    timestamp = frame.timestamp(),
                    x = position.x,
                    y = position.y,
                    z = position.z,
                    "Head pose"
                );
            }
            sweep.push(upright((index + 1) as f32 * degrees_per_tick));
            Ok(())
        })
        .context("Session ended before the first frame")?;

    for tick in 0..ticks {
        scheduler.run_frame(f64::from(tick) * frame_ms);
    }

    let anchor_count = display.reality().anchor_count();
    tracing::info!(
        frames = tally.frames.load(Ordering::Relaxed),
        camera_anchors = session.camera_anchors().len(),
        minted = tally.minted.load(Ordering::Relaxed),
        evicted = tally.evicted.load(Ordering::Relaxed),
        failed_loops = tally.failed.load(Ordering::Relaxed),
        anchors = anchor_count,
        "Simulation finished"
    );

    session.end();
    Ok(())
}
