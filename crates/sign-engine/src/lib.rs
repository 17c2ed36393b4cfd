//! # Sign-Engine
//!
//! Public facade of the gesture recognition and adaptive learning engine.
//!
//! [`SignEngine`] owns the long-lived registries (artifact cache, training
//! jobs, practice sessions) and exposes:
//!
//! - sample validation and training, awaited or as a pollable background job
//! - live prediction with out-of-distribution rejection
//! - practice comparisons, session statistics and per-label performance
//!
//! Storage of samples and artifacts is pluggable through
//! [`sign_learning::SampleStore`] and [`sign_model::ArtifactStore`].

pub mod config;
pub mod engine;
pub mod jobs;
pub mod validation;

pub use config::*;
pub use engine::*;
pub use jobs::*;
pub use validation::*;
