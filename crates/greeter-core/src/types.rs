use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Grow the box by `padding` pixels on every side and clamp it to a
    /// `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn padded_region(
        &self,
        padding: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<CropRegion> {
        let pad = padding as f32;
        let x1 = (self.x - pad).floor().max(0.0);
        let y1 = (self.y - pad).floor().max(0.0);
        let x2 = (self.x + self.width + pad).ceil().min(frame_width as f32);
        let y2 = (self.y + self.height + pad).ceil().min(frame_height as f32);

        if !(x2 > x1 && y2 > y1) {
            return None;
        }

        Some(CropRegion {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// Integer pixel rectangle guaranteed to lie inside the frame it was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimension are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.dim() != other.dim() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// One named identity in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// Outcome of matching a single face against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// Best-matching identity, or `None` when the best distance exceeds the threshold.
    pub name: Option<String>,
    /// Euclidean distance to the nearest gallery entry (`INFINITY` for an empty gallery).
    pub distance: f32,
}

impl RecognitionResult {
    pub fn is_match(&self) -> bool {
        self.name.is_some()
    }
}
