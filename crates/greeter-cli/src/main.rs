use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use greeter_core::{
    welcome_message, ArcFaceEmbedder, DetectorOptions, FrameProcessor, Gallery, GalleryBuilder,
    ProcessorSettings, ScrfdDetector, Speaker,
};
use greeter_hw::{Camera, CommandSpeaker};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "greeter", about = "Greeter face gallery and diagnostics CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed every face image in a directory and write the gallery cache
    Build {
        /// Directory of labeled face images (file stem is the name)
        #[arg(long, env = "GREETER_GALLERY_DIR", default_value = "images")]
        dir: PathBuf,
        #[command(flatten)]
        models: ModelArgs,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// List identities in the gallery cache
    List {
        #[command(flatten)]
        cache: CacheArgs,
        /// Print the cache as JSON
        #[arg(long)]
        json: bool,
    },
    /// Identify the faces in a still image against the gallery cache
    Identify {
        /// Image file to examine
        image: PathBuf,
        /// Write the image with face boxes drawn to this path
        #[arg(long)]
        annotate: Option<PathBuf>,
        #[arg(long, env = "GREETER_MATCH_THRESHOLD", default_value_t = greeter_core::matcher::DEFAULT_MATCH_THRESHOLD)]
        threshold: f32,
        #[arg(long, env = "GREETER_PADDING", default_value_t = greeter_core::processor::DEFAULT_PADDING)]
        padding: u32,
        #[command(flatten)]
        models: ModelArgs,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// List V4L2 capture devices
    Devices,
    /// Speak a phrase through the configured speech program
    Say {
        /// Words to speak, or names to welcome with --welcome
        #[arg(required = true)]
        words: Vec<String>,
        /// Treat the words as names and speak the welcome greeting
        #[arg(long)]
        welcome: bool,
        #[arg(long, env = "GREETER_SPEECH_COMMAND", default_value = greeter_hw::speaker::DEFAULT_SPEECH_PROGRAM)]
        speech_command: String,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "GREETER_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    #[arg(long, env = "GREETER_DETECTION_CONFIDENCE", default_value_t = greeter_core::detector::DEFAULT_CONFIDENCE_THRESHOLD)]
    confidence: f32,
    #[arg(long, env = "GREETER_DETECTION_NMS", default_value_t = greeter_core::detector::DEFAULT_NMS_THRESHOLD)]
    nms: f32,
}

impl ModelArgs {
    fn load(&self) -> Result<(ScrfdDetector, ArcFaceEmbedder)> {
        let dir = self
            .model_dir
            .clone()
            .unwrap_or_else(greeter_core::default_model_dir);
        let options = DetectorOptions {
            confidence_threshold: self.confidence,
            nms_threshold: self.nms,
        };
        let detector = ScrfdDetector::load(&model_path(&dir, greeter_core::DETECTOR_MODEL_FILE), options)
            .context("failed to load face detector")?;
        let embedder = ArcFaceEmbedder::load(&model_path(&dir, greeter_core::EMBEDDER_MODEL_FILE))
            .context("failed to load face recognizer")?;
        Ok((detector, embedder))
    }
}

#[derive(Args)]
struct CacheArgs {
    /// Gallery cache file
    #[arg(long = "cache", env = "GREETER_GALLERY_CACHE")]
    path: Option<PathBuf>,
}

impl CacheArgs {
    fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| greeter_core::data_dir().join("gallery.json"))
    }

    fn load(&self) -> Result<Gallery> {
        let path = self.path();
        if !path.exists() {
            bail!(
                "no gallery cache at {}; run `greeter build` first",
                path.display()
            );
        }
        Ok(Gallery::load(&path)?)
    }
}

fn model_path(dir: &Path, file: &str) -> String {
    dir.join(file).to_string_lossy().into_owned()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { dir, models, cache } => {
            let (mut detector, mut embedder) = models.load()?;
            let gallery = GalleryBuilder::new(&mut detector, &mut embedder)
                .build(&dir)
                .with_context(|| format!("failed to build gallery from {}", dir.display()))?;
            let path = cache.path();
            gallery.save(&path)?;
            println!(
                "Wrote {} identities to {}",
                gallery.len(),
                path.display()
            );
        }
        Commands::List { cache, json } => {
            let gallery = cache.load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(gallery.entries())?);
            } else if gallery.is_empty() {
                println!("Gallery is empty");
            } else {
                for entry in gallery.entries() {
                    println!("{:<24} dim={}", entry.name, entry.embedding.dim());
                }
            }
        }
        Commands::Identify {
            image: image_path,
            annotate,
            threshold,
            padding,
            models,
            cache,
        } => {
            let gallery = cache.load()?;
            let (detector, embedder) = models.load()?;
            let frame = image::open(&image_path)
                .with_context(|| format!("failed to open {}", image_path.display()))?
                .to_luma8();

            let mut processor = FrameProcessor::new(
                Box::new(detector),
                Box::new(embedder),
                ProcessorSettings { padding, threshold },
            );
            let outcome = processor.process(&frame, &gallery)?;

            if outcome.faces.is_empty() {
                println!("No faces found");
            }
            for (i, face) in outcome.faces.iter().enumerate() {
                let name = face.result.name.as_deref().unwrap_or("unknown");
                println!(
                    "face {i}: {name:<16} distance={:.3} box=({}, {}, {}x{})",
                    face.result.distance,
                    face.region.x,
                    face.region.y,
                    face.region.width,
                    face.region.height
                );
            }
            if !outcome.identities.is_empty() {
                println!("{}", welcome_message(&outcome.identities));
            }

            if let Some(out) = annotate {
                outcome
                    .annotated
                    .save(&out)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                println!("Annotated image written to {}", out.display());
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Say {
            words,
            welcome,
            speech_command,
        } => {
            let text = if welcome {
                welcome_message(&words)
            } else {
                words.join(" ")
            };
            let mut speaker = CommandSpeaker::from_command_line(&speech_command).unwrap_or_default();
            speaker
                .say(&text)
                .with_context(|| format!("failed to speak through {}", speaker.program()))?;
            println!("{text}");
        }
    }

    Ok(())
}
