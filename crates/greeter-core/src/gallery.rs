//! Identity gallery: name → embedding, built once from a directory of
//! labeled face images and read-only afterwards.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{Embedder, RecognizerError};
use crate::types::{Embedding, FaceBox, GalleryEntry};
use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const GALLERY_FILE_VERSION: u32 = 1;
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("no gallery images in {}", .0.display())]
    Empty(PathBuf),
    #[error("no face detected in gallery image {}", .0.display())]
    NoFace(PathBuf),
    #[error("detected face lies outside gallery image {}", .0.display())]
    FaceOutsideImage(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("detector failed on {}: {source}", .path.display())]
    Detector {
        path: PathBuf,
        #[source]
        source: DetectorError,
    },
    #[error("embedding failed on {}: {source}", .path.display())]
    Recognizer {
        path: PathBuf,
        #[source]
        source: RecognizerError,
    },
    #[error("invalid gallery cache {}: {source}", .path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported gallery cache version {found}")]
    CacheVersion { found: u32 },
    #[error("embedding for {name} has {found} dimensions, gallery holds {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Why a cached gallery no longer describes its image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// A gallery image was modified after the cache was written.
    ImageNewer(PathBuf),
    /// The identities on disk differ from the cached ones.
    NamesChanged,
    /// The cache was produced by a different embedding model.
    ModelChanged {
        cached: Option<String>,
        current: String,
    },
}

/// Ordered name → embedding map.
///
/// Iteration order is insertion order, which makes matcher tie-breaking
/// deterministic. Re-inserting a name replaces its vector in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

#[derive(Serialize, Deserialize)]
struct GalleryFile {
    version: u32,
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an identity. Returns the previous embedding, if any.
    ///
    /// Every embedding in a gallery has the same dimension; the first entry
    /// fixes it.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        embedding: Embedding,
    ) -> Result<Option<Embedding>, GalleryError> {
        let name = name.into();
        if let Some(expected) = self.dim() {
            if embedding.dim() != expected {
                return Err(GalleryError::DimensionMismatch {
                    name,
                    expected,
                    found: embedding.dim(),
                });
            }
        }
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => Ok(Some(std::mem::replace(&mut existing.embedding, embedding))),
            None => {
                self.entries.push(GalleryEntry { name, embedding });
                Ok(None)
            }
        }
    }

    /// Embedding dimension, or `None` while the gallery is empty.
    pub fn dim(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.dim())
    }

    /// Model tag of the stored embeddings, taken from the first entry.
    pub fn model_version(&self) -> Option<&str> {
        self.entries.first().and_then(|e| e.embedding.model_version.as_deref())
    }

    pub fn get(&self, name: &str) -> Option<&Embedding> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.embedding)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the gallery as JSON name/vector pairs.
    pub fn save(&self, path: &Path) -> Result<(), GalleryError> {
        let io_err = |source| GalleryError::Io { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = GalleryFile {
            version: GALLERY_FILE_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| GalleryError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)?;

        tracing::info!(path = %path.display(), identities = self.len(), "gallery cache written");
        Ok(())
    }

    /// Read a gallery previously written by [`Gallery::save`].
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let contents = fs::read_to_string(path).map_err(|source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: GalleryFile = serde_json::from_str(&contents).map_err(|source| GalleryError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
        if file.version != GALLERY_FILE_VERSION {
            return Err(GalleryError::CacheVersion { found: file.version });
        }

        let mut gallery = Gallery::new();
        for entry in file.entries {
            gallery.insert(entry.name, entry.embedding)?;
        }

        tracing::info!(path = %path.display(), identities = gallery.len(), "gallery cache loaded");
        Ok(gallery)
    }
}

/// Builds a [`Gallery`] from a directory holding one face image per identity.
///
/// The filename stem is the identity name. When an image contains several
/// faces, the largest box wins. An image without a face aborts the build.
pub struct GalleryBuilder<'a> {
    detector: &'a mut dyn FaceDetector,
    embedder: &'a mut dyn Embedder,
}

impl<'a> GalleryBuilder<'a> {
    pub fn new(detector: &'a mut dyn FaceDetector, embedder: &'a mut dyn Embedder) -> Self {
        Self { detector, embedder }
    }

    pub fn build(&mut self, dir: &Path) -> Result<Gallery, GalleryError> {
        let files = list_images(dir)?;
        if files.is_empty() {
            return Err(GalleryError::Empty(dir.to_path_buf()));
        }

        let mut gallery = Gallery::new();
        for path in files {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                tracing::warn!(path = %path.display(), "skipping gallery file without a UTF-8 name");
                continue;
            };

            let image = image::open(&path)
                .map_err(|source| GalleryError::Image { path: path.clone(), source })?
                .to_luma8();
            let embedding = self.embed_image(&path, &image)?;

            if gallery.insert(name.clone(), embedding)?.is_some() {
                tracing::warn!(name = %name, path = %path.display(), "duplicate identity; later image wins");
            }
            tracing::debug!(name = %name, "gallery identity added");
        }

        tracing::info!(dir = %dir.display(), identities = gallery.len(), "gallery built");
        Ok(gallery)
    }

    /// Use the cache at `cache` when it still describes `dir`, otherwise
    /// rebuild from the images and rewrite the cache.
    ///
    /// A cache that cannot be read or written is only logged; build errors
    /// are returned.
    pub fn load_or_build(&mut self, dir: &Path, cache: &Path) -> Result<Gallery, GalleryError> {
        if cache.exists() {
            match Gallery::load(cache) {
                Ok(gallery) => {
                    let current = self.embedder.model_version();
                    match staleness(&gallery, cache, dir, current)? {
                        None => return Ok(gallery),
                        Some(reason) => {
                            tracing::info!(?reason, cache = %cache.display(), "gallery cache is stale, rebuilding")
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "gallery cache unusable, rebuilding"),
            }
        }

        let gallery = self.build(dir)?;
        if let Err(e) = gallery.save(cache) {
            tracing::warn!(error = %e, "failed to write gallery cache");
        }
        Ok(gallery)
    }

    fn embed_image(&mut self, path: &Path, image: &GrayImage) -> Result<Embedding, GalleryError> {
        let faces = self.detector.detect(image).map_err(|source| GalleryError::Detector {
            path: path.to_path_buf(),
            source,
        })?;

        let face = largest_face(&faces).ok_or_else(|| GalleryError::NoFace(path.to_path_buf()))?;
        if faces.len() > 1 {
            tracing::warn!(
                path = %path.display(),
                faces = faces.len(),
                "multiple faces in gallery image; using the largest"
            );
        }

        let region = face
            .padded_region(0, image.width(), image.height())
            .ok_or_else(|| GalleryError::FaceOutsideImage(path.to_path_buf()))?;
        let crop = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();

        self.embedder.embed(&crop).map_err(|source| GalleryError::Recognizer {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Check a loaded cache against the image directory it was built from.
///
/// `model_version` is the tag of the embedder that would rebuild the
/// gallery; `None` skips the model comparison.
pub fn staleness(
    gallery: &Gallery,
    cache: &Path,
    dir: &Path,
    model_version: Option<&str>,
) -> Result<Option<Staleness>, GalleryError> {
    if let Some(current) = model_version {
        if gallery.model_version() != Some(current) {
            return Ok(Some(Staleness::ModelChanged {
                cached: gallery.model_version().map(str::to_owned),
                current: current.to_owned(),
            }));
        }
    }

    let files = list_images(dir)?;
    let on_disk: BTreeSet<&str> = files
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
        .collect();
    let cached: BTreeSet<&str> = gallery.names().collect();
    if on_disk != cached {
        return Ok(Some(Staleness::NamesChanged));
    }

    let cache_time = modified(cache)?;
    for path in files {
        if modified(&path)? > cache_time {
            return Ok(Some(Staleness::ImageNewer(path)));
        }
    }
    Ok(None)
}

fn modified(path: &Path) -> Result<std::time::SystemTime, GalleryError> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Largest box by area; earlier boxes win ties.
pub fn largest_face(faces: &[FaceBox]) -> Option<&FaceBox> {
    faces.iter().fold(None, |best: Option<&FaceBox>, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(face),
    })
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    if !dir.is_dir() {
        return Err(GalleryError::DirectoryNotFound(dir.to_path_buf()));
    }

    let read_dir = fs::read_dir(dir).map_err(|source| GalleryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in read_dir {
        let path = entry
            .map_err(|source| GalleryError::Io { path: dir.to_path_buf(), source })?
            .path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Detector that reports a fixed set of boxes for every image.
    struct FixedDetector(Vec<FaceBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _image: &GrayImage) -> Result<Vec<FaceBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    /// Embeds a crop as [width, height, mean brightness].
    struct ShapeEmbedder;

    impl Embedder for ShapeEmbedder {
        fn embed(&mut self, face: &GrayImage) -> Result<Embedding, RecognizerError> {
            let sum: f32 = face.pixels().map(|p| p[0] as f32).sum();
            let mean = sum / (face.width() * face.height()) as f32;
            Ok(Embedding::new(vec![face.width() as f32, face.height() as f32, mean]))
        }
    }

    fn face(x: f32, y: f32, w: f32, h: f32) -> FaceBox {
        FaceBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    fn write_image(dir: &Path, file: &str, value: u8) {
        GrayImage::from_pixel(64, 48, Luma([value]))
            .save(dir.join(file))
            .unwrap();
    }

    #[test]
    fn test_insert_last_write_wins_keeps_position() {
        let mut g = Gallery::new();
        g.insert("alice", Embedding::new(vec![1.0])).unwrap();
        g.insert("bob", Embedding::new(vec![2.0])).unwrap();
        let prev = g.insert("alice", Embedding::new(vec![3.0])).unwrap();

        assert_eq!(prev, Some(Embedding::new(vec![1.0])));
        assert_eq!(g.len(), 2);
        assert_eq!(g.names().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(g.get("alice").unwrap().values, vec![3.0]);
    }

    #[test]
    fn test_largest_face_policy() {
        let faces = vec![face(0.0, 0.0, 10.0, 10.0), face(5.0, 5.0, 30.0, 20.0), face(1.0, 1.0, 20.0, 20.0)];
        assert_eq!(largest_face(&faces), Some(&faces[1]));
        assert_eq!(largest_face(&[]), None);
    }

    #[test]
    fn test_largest_face_tie_prefers_first() {
        let faces = vec![face(0.0, 0.0, 10.0, 10.0), face(20.0, 20.0, 10.0, 10.0)];
        assert_eq!(largest_face(&faces), Some(&faces[0]));
    }

    #[test]
    fn test_build_names_from_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "bob.png", 200);
        write_image(dir.path(), "alice.png", 100);
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut detector = FixedDetector(vec![face(10.0, 10.0, 20.0, 16.0)]);
        let mut embedder = ShapeEmbedder;
        let gallery = GalleryBuilder::new(&mut detector, &mut embedder)
            .build(dir.path())
            .unwrap();

        assert_eq!(gallery.names().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(gallery.get("alice").unwrap().values, vec![20.0, 16.0, 100.0]);
        assert_eq!(gallery.get("bob").unwrap().values, vec![20.0, 16.0, 200.0]);
    }

    #[test]
    fn test_build_uses_largest_face() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "carol.png", 50);

        let mut detector = FixedDetector(vec![face(0.0, 0.0, 8.0, 8.0), face(20.0, 10.0, 30.0, 24.0)]);
        let mut embedder = ShapeEmbedder;
        let gallery = GalleryBuilder::new(&mut detector, &mut embedder)
            .build(dir.path())
            .unwrap();

        assert_eq!(gallery.get("carol").unwrap().values[..2], [30.0, 24.0]);
    }

    #[test]
    fn test_build_clamps_face_to_image() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "dave.png", 50);

        let mut detector = FixedDetector(vec![face(50.0, 40.0, 40.0, 40.0)]);
        let mut embedder = ShapeEmbedder;
        let gallery = GalleryBuilder::new(&mut detector, &mut embedder)
            .build(dir.path())
            .unwrap();

        assert_eq!(gallery.get("dave").unwrap().values[..2], [14.0, 8.0]);
    }

    #[test]
    fn test_build_fails_without_face() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "alice.png", 100);
        write_image(dir.path(), "nobody.png", 100);

        let mut detector = FixedDetector(vec![]);
        let mut embedder = ShapeEmbedder;
        let err = GalleryBuilder::new(&mut detector, &mut embedder)
            .build(dir.path())
            .unwrap_err();

        match err {
            GalleryError::NoFace(path) => assert!(path.ends_with("alice.png")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_missing_directory() {
        let mut detector = FixedDetector(vec![]);
        let mut embedder = ShapeEmbedder;
        let err = GalleryBuilder::new(&mut detector, &mut embedder)
            .build(Path::new("/nonexistent/greeter/gallery"))
            .unwrap_err();
        assert!(matches!(err, GalleryError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_build_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = FixedDetector(vec![]);
        let mut embedder = ShapeEmbedder;
        let err = GalleryBuilder::new(&mut detector, &mut embedder)
            .build(dir.path())
            .unwrap_err();
        assert!(matches!(err, GalleryError::Empty(_)));
    }

    #[test]
    fn test_cache_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("gallery.json");

        let mut g = Gallery::new();
        g.insert("bob", Embedding::new(vec![0.25, -0.5])).unwrap();
        g.insert("alice", Embedding::new(vec![1.0, 0.0])).unwrap();
        g.save(&path).unwrap();

        let loaded = Gallery::load(&path).unwrap();
        assert_eq!(loaded, g);
    }

    #[test]
    fn test_cache_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(&path, r#"{"version": 99, "entries": []}"#).unwrap();
        assert!(matches!(Gallery::load(&path), Err(GalleryError::CacheVersion { found: 99 })));
    }

    #[test]
    fn test_cache_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(Gallery::load(&path), Err(GalleryError::Cache { .. })));
    }

    #[test]
    fn test_insert_rejects_mixed_dimensions() {
        let mut g = Gallery::new();
        g.insert("alice", Embedding::new(vec![0.1, 0.2])).unwrap();
        let err = g
            .insert("bob", Embedding::new(vec![0.1, 0.2, 0.9, -0.9]))
            .unwrap_err();

        assert!(matches!(
            err,
            GalleryError::DimensionMismatch { expected: 2, found: 4, .. }
        ));
        assert_eq!(g.len(), 1);
        assert_eq!(g.dim(), Some(2));
    }

    #[test]
    fn test_cache_rejects_mixed_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(
            &path,
            r#"{"version": 1, "entries": [
                {"name": "alice", "embedding": {"values": [0.1, 0.2]}},
                {"name": "bob", "embedding": {"values": [0.1, 0.2, 0.3]}}
            ]}"#,
        )
        .unwrap();
        assert!(matches!(
            Gallery::load(&path),
            Err(GalleryError::DimensionMismatch { .. })
        ));
    }

    /// Counts embed calls so tests can tell a cache hit from a rebuild.
    struct CountingEmbedder {
        calls: usize,
        version: Option<&'static str>,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&mut self, face: &GrayImage) -> Result<Embedding, RecognizerError> {
            self.calls += 1;
            let mut embedding = ShapeEmbedder.embed(face)?;
            embedding.model_version = self.version.map(str::to_owned);
            Ok(embedding)
        }

        fn model_version(&self) -> Option<&str> {
            self.version
        }
    }

    fn touch_later(path: &Path) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(60))
            .unwrap();
    }

    #[test]
    fn test_load_or_build_reuses_fresh_cache() {
        let images = tempfile::tempdir().unwrap();
        let cache = images.path().join("cache").join("gallery.json");
        write_image(images.path(), "alice.png", 100);

        let mut detector = FixedDetector(vec![face(10.0, 10.0, 20.0, 16.0)]);
        let mut embedder = CountingEmbedder { calls: 0, version: Some("v1") };
        let first = GalleryBuilder::new(&mut detector, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap();
        let second = GalleryBuilder::new(&mut detector, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls, 1);
    }

    #[test]
    fn test_load_or_build_rebuilds_when_image_is_newer() {
        let images = tempfile::tempdir().unwrap();
        let cache = images.path().join("cache").join("gallery.json");
        write_image(images.path(), "alice.png", 100);

        let mut detector = FixedDetector(vec![face(10.0, 10.0, 20.0, 16.0)]);
        let mut embedder = ShapeEmbedder;
        GalleryBuilder::new(&mut detector, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap();

        write_image(images.path(), "alice.png", 200);
        touch_later(&images.path().join("alice.png"));
        let cached = Gallery::load(&cache).unwrap();
        assert_eq!(
            staleness(&cached, &cache, images.path(), None).unwrap(),
            Some(Staleness::ImageNewer(images.path().join("alice.png")))
        );

        let gallery = GalleryBuilder::new(&mut detector, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap();
        assert_eq!(gallery.get("alice").unwrap().values[2], 200.0);
        assert_eq!(Gallery::load(&cache).unwrap(), gallery);
    }

    #[test]
    fn test_load_or_build_picks_up_new_identity() {
        let images = tempfile::tempdir().unwrap();
        let cache = images.path().join("cache").join("gallery.json");
        write_image(images.path(), "alice.png", 100);
        write_image(images.path(), "bob.png", 150);

        let mut detector = FixedDetector(vec![face(10.0, 10.0, 20.0, 16.0)]);
        let mut embedder = ShapeEmbedder;
        GalleryBuilder::new(&mut detector, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap();

        write_image(images.path(), "carol.png", 50);
        let gallery = GalleryBuilder::new(&mut detector, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap();
        assert_eq!(gallery.names().collect::<Vec<_>>(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_load_or_build_surfaces_no_face_in_new_image() {
        let images = tempfile::tempdir().unwrap();
        let cache = images.path().join("gallery.json");
        write_image(images.path(), "alice.png", 100);

        let mut embedder = ShapeEmbedder;
        let mut detector = FixedDetector(vec![face(10.0, 10.0, 20.0, 16.0)]);
        GalleryBuilder::new(&mut detector, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap();

        write_image(images.path(), "nobody.png", 100);
        let mut blind = FixedDetector(vec![]);
        let err = GalleryBuilder::new(&mut blind, &mut embedder)
            .load_or_build(images.path(), &cache)
            .unwrap_err();
        assert!(matches!(err, GalleryError::NoFace(_)));
    }

    #[test]
    fn test_staleness_on_model_change() {
        let images = tempfile::tempdir().unwrap();
        let cache = images.path().join("gallery.json");
        write_image(images.path(), "alice.png", 100);

        let mut detector = FixedDetector(vec![face(10.0, 10.0, 20.0, 16.0)]);
        let mut old = CountingEmbedder { calls: 0, version: Some("v1") };
        GalleryBuilder::new(&mut detector, &mut old)
            .load_or_build(images.path(), &cache)
            .unwrap();

        let cached = Gallery::load(&cache).unwrap();
        assert_eq!(cached.model_version(), Some("v1"));
        assert_eq!(
            staleness(&cached, &cache, images.path(), Some("v2")).unwrap(),
            Some(Staleness::ModelChanged {
                cached: Some("v1".into()),
                current: "v2".into(),
            })
        );

        let mut new = CountingEmbedder { calls: 0, version: Some("v2") };
        let gallery = GalleryBuilder::new(&mut detector, &mut new)
            .load_or_build(images.path(), &cache)
            .unwrap();
        assert_eq!(new.calls, 1);
        assert_eq!(gallery.model_version(), Some("v2"));
    }
}
