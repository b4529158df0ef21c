//! The identification loop: capture, conditionally process, dispatch, display.

use crate::gallery::Gallery;
use crate::notifier::Notifier;
use crate::processor::{FaceMatch, FrameProcessor};
use image::GrayImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Key code that ends the loop by default (ESC).
pub const DEFAULT_EXIT_KEY: u32 = 27;
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_READ_ERRORS: u32 = 30;

/// Where frames come from. `Ok(None)` marks end of stream.
pub trait FrameSource {
    type Error: std::error::Error;

    fn read(&mut self) -> Result<Option<GrayImage>, Self::Error>;
}

/// Where frames go, and where key presses come from.
pub trait FrameDisplay {
    /// Present a frame. `faces` is empty when the frame was passed through raw.
    fn show(&mut self, frame: &GrayImage, faces: &[FaceMatch]) -> std::io::Result<()>;

    /// Wait up to `timeout` for a key press and return its code.
    fn wait_key(&mut self, timeout: Duration) -> Option<u32>;
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Fixed wait between frames, spent polling for the exit key.
    pub frame_interval: Duration,
    pub exit_key: u32,
    /// Consecutive failed reads tolerated before giving up on the source.
    pub max_read_errors: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            exit_key: DEFAULT_EXIT_KEY,
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ExitKey,
    EndOfStream,
    Stopped,
    SourceFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    /// Frames that went through detection while the gate was open.
    pub processed: u64,
    /// Frames dropped because processing failed.
    pub skipped: u64,
    pub dispatched: u64,
    pub reason: StopReason,
}

pub struct RecognitionLoop {
    processor: FrameProcessor,
    gallery: Arc<Gallery>,
    notifier: Notifier,
    settings: LoopSettings,
    stop: Arc<AtomicBool>,
    frames: u64,
    processed: u64,
    skipped: u64,
    dispatched: u64,
}

impl RecognitionLoop {
    pub fn new(
        processor: FrameProcessor,
        gallery: Arc<Gallery>,
        notifier: Notifier,
        settings: LoopSettings,
    ) -> Self {
        Self {
            processor,
            gallery,
            notifier,
            settings,
            stop: Arc::new(AtomicBool::new(false)),
            frames: 0,
            processed: 0,
            skipped: 0,
            dispatched: 0,
        }
    }

    /// Flag that ends the loop at the next iteration boundary when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Handle one frame. Returns the frame to display and the faces found in it.
    ///
    /// While the gate is closed the frame passes through untouched.
    pub fn step(&mut self, frame: GrayImage) -> (GrayImage, Vec<FaceMatch>) {
        self.frames += 1;

        if !self.notifier.gate().is_open() {
            return (frame, Vec::new());
        }

        self.processed += 1;
        match self.processor.process(&frame, &self.gallery) {
            Ok(outcome) => {
                if self.notifier.dispatch(&outcome.identities) {
                    self.dispatched += 1;
                    tracing::info!(identities = ?outcome.identities, "recognized");
                }
                (outcome.annotated, outcome.faces)
            }
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(error = %e, frame = self.frames, "frame processing failed; skipping");
                (frame, Vec::new())
            }
        }
    }

    /// Run until the exit key, end of stream, the stop flag, or a dead source.
    ///
    /// Waits for an in-flight greeting to finish before returning.
    pub fn run<S, D>(mut self, source: &mut S, display: &mut D) -> LoopSummary
    where
        S: FrameSource,
        D: FrameDisplay,
    {
        let mut read_errors = 0u32;

        let reason = loop {
            if self.stop.load(Ordering::Relaxed) {
                break StopReason::Stopped;
            }

            let frame = match source.read() {
                Ok(Some(frame)) => {
                    read_errors = 0;
                    frame
                }
                Ok(None) => break StopReason::EndOfStream,
                Err(e) => {
                    read_errors += 1;
                    tracing::warn!(error = %e, consecutive = read_errors, "frame read failed");
                    if read_errors >= self.settings.max_read_errors {
                        break StopReason::SourceFailed;
                    }
                    if self.exit_pressed(display) {
                        break StopReason::ExitKey;
                    }
                    continue;
                }
            };

            let (shown, faces) = self.step(frame);
            if let Err(e) = display.show(&shown, &faces) {
                tracing::warn!(error = %e, "display failed");
            }

            if self.exit_pressed(display) {
                break StopReason::ExitKey;
            }
        };

        let summary = LoopSummary {
            frames: self.frames,
            processed: self.processed,
            skipped: self.skipped,
            dispatched: self.dispatched,
            reason,
        };
        tracing::info!(?summary, "recognition loop finished");

        self.notifier.shutdown();
        summary
    }

    fn exit_pressed<D: FrameDisplay>(&self, display: &mut D) -> bool {
        display.wait_key(self.settings.frame_interval) == Some(self.settings.exit_key)
    }
}
