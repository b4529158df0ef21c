//! greeter-hw: hardware abstraction for frame capture and speech output.
//!
//! Provides V4L2-based camera access as a [`greeter_core::FrameSource`] and a
//! command-line text-to-speech [`greeter_core::Speaker`].

pub mod camera;
pub mod frame;
pub mod speaker;

pub use camera::{Camera, CameraError, CaptureSession, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use speaker::CommandSpeaker;
