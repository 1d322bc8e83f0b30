use anyhow::{Context, Result};
use rollcall_core::anomaly::train_anomaly_detector;
use rollcall_core::QrDecoder;
use rollcall_hw::{Camera, FrameSource};
use rollcall_store::Database;
use tracing_subscriber::EnvFilter;

mod config;
mod overlay;
mod session;
mod stop;

use config::Config;
use overlay::Overlay;
use session::Session;
use stop::StopSignal;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        device = %config.camera_device,
        db = %config.db_path.display(),
        "rollcall-scanner starting"
    );

    let db = Database::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    if config.train_on_start {
        report_anomaly_model(&db);
    }

    let overlay = config
        .snapshot_dir
        .as_deref()
        .map(|dir| Overlay::new(dir, config.font_path.as_deref()))
        .transpose()?;

    let stop = StopSignal::new();
    stop.install().context("failed to install stop handler")?;

    // Every return below drops the stream and then the camera, releasing
    // the device on both the clean and the fatal paths.
    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)
        .with_context(|| format!("could not open camera {}", config.camera_device))?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let mut stream = camera.stream().context("could not start capture")?;

    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        for _ in 0..config.warmup_frames {
            stream.next_frame().context("failed to capture frame")?;
        }
    }

    println!("Scanning. Type q and press Enter (or Ctrl-C) to stop.");

    let mut session = Session::new(QrDecoder, &db, overlay.as_ref());
    let summary = session
        .run(&mut stream, &stop)
        .context("scan session aborted")?;

    println!(
        "Session ended: {} scans logged ({} present, {} invalid) over {} frames.",
        summary.logged, summary.present, summary.invalid, summary.frames
    );
    Ok(())
}

/// Fit the anomaly model over past Present scans and log what came out.
/// Purely informational; classification does not use it.
fn report_anomaly_model(db: &Database) {
    let history = match db.present_scans() {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(error = %e, "could not read scan history for anomaly model");
            return;
        }
    };

    match train_anomaly_detector(&history) {
        Some(model) => tracing::info!(
            events = model.training_size(),
            trees = model.n_trees(),
            threshold = model.threshold(),
            "anomaly model trained"
        ),
        None => tracing::info!(events = history.len(), "anomaly model skipped: not enough history"),
    }
}
