//! Camera module: stream acquisition and release
//!
//! `CameraSession` owns the live stream exclusively while it is open and
//! stops every track when it closes.

mod replay;
mod session;

pub use replay::DirectoryCamera;
pub use session::{
    CameraDevice, CameraError, CameraSession, FacingMode, Frame, MediaStream, StreamConstraints,
    READY_TIMEOUT,
};
