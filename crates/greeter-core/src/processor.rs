//! Per-frame pipeline: detect, pad and clamp, crop, embed, match.

use crate::detector::{DetectorError, FaceDetector};
use crate::gallery::Gallery;
use crate::matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::recognizer::{Embedder, RecognizerError};
use crate::types::{CropRegion, FaceBox, RecognitionResult};
use image::{imageops, GrayImage, Luma};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use thiserror::Error;

/// Padding around detector boxes; the detector frames the face, not the head.
pub const DEFAULT_PADDING: u32 = 50;

const BOX_COLOR: Luma<u8> = Luma([255]);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedding failed: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Tunables for [`FrameProcessor`].
#[derive(Debug, Clone, Copy)]
pub struct ProcessorSettings {
    /// Pixels added on every side of a detected box before cropping.
    pub padding: u32,
    /// Largest Euclidean distance accepted as a match.
    pub threshold: f32,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// One detected face and what it matched.
#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub face: FaceBox,
    /// The padded, clamped region that was embedded.
    pub region: CropRegion,
    pub result: RecognitionResult,
}

/// Everything learned from one frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Copy of the input with a rectangle drawn around each face.
    pub annotated: GrayImage,
    pub faces: Vec<FaceMatch>,
    /// Recognized names in detection order.
    pub identities: Vec<String>,
}

pub struct FrameProcessor {
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn Embedder>,
    matcher: EuclideanMatcher,
    settings: ProcessorSettings,
}

impl FrameProcessor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn Embedder>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            detector,
            embedder,
            matcher: EuclideanMatcher,
            settings,
        }
    }

    pub fn settings(&self) -> ProcessorSettings {
        self.settings
    }

    /// Run the full pipeline on one frame. Never touches audio or disk.
    pub fn process(&mut self, frame: &GrayImage, gallery: &Gallery) -> Result<FrameOutcome, ProcessError> {
        let faces = self.detector.detect(frame)?;
        let (width, height) = frame.dimensions();

        let mut annotated = frame.clone();
        let mut matches = Vec::with_capacity(faces.len());
        let mut identities = Vec::new();

        for face in faces {
            let Some(region) = face.padded_region(self.settings.padding, width, height) else {
                tracing::debug!(?face, "face box outside frame; skipping");
                continue;
            };

            draw_region(&mut annotated, &region);

            let crop = imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image();
            let embedding = self.embedder.embed(&crop)?;
            let result = self.matcher.find(&embedding, gallery, self.settings.threshold);

            tracing::debug!(
                name = result.name.as_deref().unwrap_or("<unknown>"),
                distance = result.distance,
                confidence = face.confidence,
                "face matched"
            );

            if let Some(name) = &result.name {
                identities.push(name.clone());
            }
            matches.push(FaceMatch { face, region, result });
        }

        Ok(FrameOutcome {
            annotated,
            faces: matches,
            identities,
        })
    }
}

/// Draw a 2-pixel hollow rectangle on the inside edge of `region`.
fn draw_region(image: &mut GrayImage, region: &CropRegion) {
    let outer = Rect::at(region.x as i32, region.y as i32).of_size(region.width, region.height);
    draw_hollow_rect_mut(image, outer, BOX_COLOR);
    if region.width > 2 && region.height > 2 {
        let inner = Rect::at(region.x as i32 + 1, region.y as i32 + 1)
            .of_size(region.width - 2, region.height - 2);
        draw_hollow_rect_mut(image, inner, BOX_COLOR);
    }
}
