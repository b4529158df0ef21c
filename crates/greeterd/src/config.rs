use greeter_core::detector::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NMS_THRESHOLD};
use greeter_core::matcher::DEFAULT_MATCH_THRESHOLD;
use greeter_core::processor::DEFAULT_PADDING;
use greeter_core::session::{DEFAULT_EXIT_KEY, DEFAULT_FRAME_INTERVAL};
use greeter_core::{DetectorOptions, LoopSettings, ProcessorSettings};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of labeled face images, one person per file.
    pub gallery_dir: PathBuf,
    /// JSON cache of gallery embeddings.
    pub gallery_cache: PathBuf,
    pub detection_confidence: f32,
    pub detection_nms: f32,
    /// Pixels of padding around each detected face before embedding.
    pub padding: u32,
    /// Largest Euclidean distance accepted as a match.
    pub match_threshold: f32,
    pub frame_interval: Duration,
    pub exit_key: u32,
    /// Speech program plus fixed arguments; the text is appended.
    pub speech_command: String,
    /// Render frames to the terminal.
    pub preview: bool,
}

impl Config {
    /// Load configuration from `GREETER_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = var("GREETER_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(greeter_core::default_model_dir);

        let gallery_cache = var("GREETER_GALLERY_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|| greeter_core::data_dir().join("gallery.json"));

        let frame_interval_ms = parse_or(
            var("GREETER_FRAME_INTERVAL_MS"),
            DEFAULT_FRAME_INTERVAL.as_millis() as u64,
        );

        Self {
            camera_device: var("GREETER_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir,
            gallery_dir: var("GREETER_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("images")),
            gallery_cache,
            detection_confidence: parse_or(
                var("GREETER_DETECTION_CONFIDENCE"),
                DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            detection_nms: parse_or(var("GREETER_DETECTION_NMS"), DEFAULT_NMS_THRESHOLD),
            padding: parse_or(var("GREETER_PADDING"), DEFAULT_PADDING),
            match_threshold: parse_or(var("GREETER_MATCH_THRESHOLD"), DEFAULT_MATCH_THRESHOLD),
            frame_interval: Duration::from_millis(frame_interval_ms),
            exit_key: parse_or(var("GREETER_EXIT_KEY"), DEFAULT_EXIT_KEY),
            speech_command: var("GREETER_SPEECH_COMMAND")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| greeter_hw::speaker::DEFAULT_SPEECH_PROGRAM.to_string()),
            preview: var("GREETER_PREVIEW").map(|v| v != "0").unwrap_or(true),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(greeter_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join(greeter_core::EMBEDDER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            confidence_threshold: self.detection_confidence,
            nms_threshold: self.detection_nms,
        }
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            padding: self.padding,
            threshold: self.match_threshold,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            frame_interval: self.frame_interval,
            exit_key: self.exit_key,
            ..LoopSettings::default()
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
