//! greeter-core: face identification and the welcome gate.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime, behind the [`FaceDetector`] and [`Embedder`]
//! traits so the identification loop can run against any implementation.

pub mod detector;
pub mod gallery;
pub mod gate;
pub mod matcher;
pub mod notifier;
pub mod processor;
pub mod recognizer;
pub mod session;
pub mod types;

use std::path::PathBuf;

pub use detector::{DetectorOptions, FaceDetector, ScrfdDetector};
pub use gallery::{Gallery, GalleryBuilder, GalleryError, Staleness};
pub use gate::{Gate, GatePermit, GateState};
pub use matcher::{match_identity, EuclideanMatcher, Matcher};
pub use notifier::{welcome_message, Notifier, Speaker, SpeakerError};
pub use processor::{FaceMatch, FrameOutcome, FrameProcessor, ProcessError, ProcessorSettings};
pub use recognizer::{ArcFaceEmbedder, Embedder};
pub use session::{FrameDisplay, FrameSource, LoopSettings, LoopSummary, RecognitionLoop, StopReason};
pub use types::{CropRegion, Embedding, FaceBox, GalleryEntry, RecognitionResult};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const EMBEDDER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Per-user data directory: `$XDG_DATA_HOME/greeter`, else `~/.local/share/greeter`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("greeter")
}

/// Default location of the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}
