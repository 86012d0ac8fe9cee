//! Inference collaborator.
//!
//! The intake core only hands `ProcessedFrame`s and `Batch`es to a
//! `Classifier`; model loading and execution live behind the trait.

mod backend;
mod backends;
mod result;

pub use backend::Classifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use result::{softmax, top1, Prediction, IMAGENET_MEAN, IMAGENET_STD};
