//! Face embedding.
//!
//! [`Embedder`] turns a face crop into a fixed-length vector. The shipped
//! implementation runs the ArcFace w600k_r50 model through ONNX Runtime.

use crate::types::Embedding;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric normalization, not 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty face crop")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that maps a face crop to an embedding where Euclidean distance
/// tracks identity similarity.
pub trait Embedder: Send {
    fn embed(&mut self, face: &GrayImage) -> Result<Embedding, RecognizerError>;

    /// Tag stamped on produced embeddings, used to spot caches from another model.
    fn model_version(&self) -> Option<&str> {
        None
    }
}

/// ArcFace-based embedder.
pub struct ArcFaceEmbedder {
    session: Session,
}

impl ArcFaceEmbedder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Resize a crop to 112x112 and convert it to a NCHW float tensor.
    fn preprocess(face: &GrayImage) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE;
        let resized = imageops::resize(face, size as u32, size as u32, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let normalized = (pixel[0] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            let (x, y) = (x as usize, y as usize);
            // Grayscale → 3-channel: replicate Y → [R=Y, G=Y, B=Y]
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }

        tensor
    }
}

impl Embedder for ArcFaceEmbedder {
    fn model_version(&self) -> Option<&str> {
        Some(ARCFACE_MODEL_VERSION)
    }

    fn embed(&mut self, face: &GrayImage) -> Result<Embedding, RecognizerError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(RecognizerError::EmptyCrop);
        }

        let input = Self::preprocess(face);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw_data.to_vec()),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Scale a vector to unit length; the zero vector is returned unchanged.
pub fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}
