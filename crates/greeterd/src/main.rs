use anyhow::{Context, Result};
use greeter_core::{
    ArcFaceEmbedder, FrameProcessor, GalleryBuilder, Gate, LoopSummary,
    Notifier, RecognitionLoop, ScrfdDetector,
};
use greeter_hw::{Camera, CommandSpeaker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

mod config;
mod preview;

use config::Config;
use preview::{Headless, TerminalPreview};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STARTUP_ANNOUNCEMENT: &str = "starting facial recognition software";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "greeterd starting");

    let mut detector = ScrfdDetector::load(&config.detector_model_path(), config.detector_options())
        .context("failed to load face detector")?;
    let mut embedder = ArcFaceEmbedder::load(&config.embedder_model_path())
        .context("failed to load face recognizer")?;

    // The cache is reused only while it still matches the images and the model.
    let gallery = GalleryBuilder::new(&mut detector, &mut embedder)
        .load_or_build(&config.gallery_dir, &config.gallery_cache)
        .with_context(|| {
            format!("failed to build gallery from {}", config.gallery_dir.display())
        })?;
    tracing::info!(identities = gallery.len(), "gallery ready");

    let speaker = CommandSpeaker::from_command_line(&config.speech_command).unwrap_or_default();
    let notifier = Notifier::spawn(Box::new(speaker), Gate::new())
        .context("failed to start notifier thread")?;
    notifier.announce(STARTUP_ANNOUNCEMENT);

    let processor = FrameProcessor::new(
        Box::new(detector),
        Box::new(embedder),
        config.processor_settings(),
    );
    let recognition = RecognitionLoop::new(
        processor,
        Arc::new(gallery),
        notifier,
        config.loop_settings(),
    );
    let stop = recognition.stop_handle();

    let (done_tx, mut done_rx) = oneshot::channel();
    let capture_stop = Arc::clone(&stop);
    std::thread::Builder::new()
        .name("greeter-capture".into())
        .spawn(move || {
            let result = run_capture(&config, recognition, capture_stop);
            let _ = done_tx.send(result);
        })
        .context("failed to spawn capture thread")?;

    tracing::info!("greeterd ready");

    let finished = tokio::select! {
        result = &mut done_rx => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
    };
    let result = match finished {
        Some(result) => result,
        None => {
            tracing::info!("interrupt received, stopping");
            stop.store(true, Ordering::Relaxed);
            done_rx.await
        }
    };

    let summary = result.context("capture thread exited without reporting")??;
    tracing::info!(
        frames = summary.frames,
        greetings = summary.dispatched,
        reason = ?summary.reason,
        "greeterd shutting down"
    );

    Ok(())
}

fn run_capture(
    config: &Config,
    recognition: RecognitionLoop,
    stop: Arc<AtomicBool>,
) -> Result<LoopSummary> {
    let camera = Camera::open(&config.camera_device, CAPTURE_WIDTH, CAPTURE_HEIGHT)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    let mut session = camera.stream().context("failed to start capture stream")?;

    if config.preview {
        let mut display = TerminalPreview::new(stop).context("failed to set up terminal preview")?;
        Ok(recognition.run(&mut session, &mut display))
    } else {
        Ok(recognition.run(&mut session, &mut Headless))
    }
}
