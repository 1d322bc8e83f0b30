//! rollcall-hw — Hardware abstraction for the attendance scanner camera.
//!
//! Provides V4L2-based camera access, a persistent frame stream for the
//! scanning loop, and grayscale frame helpers.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FrameSource, FrameStream, PixelFormat};
pub use frame::Frame;
