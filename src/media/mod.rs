//! Media handling
//!
//! This module provides:
//! - Frame and encoded result types
//! - The bounded drop-oldest hand-off buffer
//! - The per-frame transform contract and the bundled JPEG annotator

pub mod buffer;
pub mod frame;
pub mod transform;

pub use buffer::{FrameBuffer, PushOutcome};
pub use frame::{EncodedResult, Frame};
pub use transform::{
    AnnotatingTransform, Detection, Detector, NoopDetector, Transform, TransformConfig,
};
