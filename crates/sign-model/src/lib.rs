//! # Sign-Model
//!
//! Gesture classifier training, artifact persistence and inference.
//!
//! ## Pipeline
//!
//! 1. [`dataset`] validates samples and builds the label vocabulary, with a
//!    synthetic "no gesture" class appended last
//! 2. [`negatives`] synthesizes examples of that class from the positives
//! 3. [`trainer`] standardizes features and fits a [`GestureClassifier`]
//! 4. [`store`] persists the resulting [`TrainedArtifact`]
//! 5. [`inference`] loads and caches artifacts and applies [`rejection`]
//!    rules to every prediction

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod inference;
pub mod negatives;
pub mod rejection;
pub mod report;
pub mod scaler;
pub mod store;
pub mod trainer;
pub mod validator;

pub use artifact::*;
pub use classifier::*;
pub use dataset::*;
pub use inference::*;
pub use negatives::*;
pub use rejection::*;
pub use report::*;
pub use scaler::*;
pub use store::*;
pub use trainer::*;
pub use validator::*;
