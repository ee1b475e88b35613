pub mod admission;
pub mod controller;
mod loop_worker;
pub mod source;
pub mod uploader;

pub use admission::{UploadGate, UploadPermit};
pub use controller::{CaptureState, FrameCaptureController, StartOutcome, TickOutcome};
pub use source::{encode_jpeg, StillImageSource, VideoSource};
pub use uploader::Uploader;
