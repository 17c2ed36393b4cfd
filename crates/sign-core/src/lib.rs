//! # Sign-Core
//!
//! Core types and utilities for the hand-sign gesture recognition and
//! adaptive learning engine.
//!
//! A hand pose arrives as 21 tracked landmarks (wrist first, then four
//! joints per finger). Everything downstream works on the fixed-width
//! [`FeatureVector`] produced by [`FeatureExtractor`].

pub mod error;
pub mod features;
pub mod geometry;
pub mod preprocessing;
pub mod types;

pub use error::{Error, Result};
pub use features::*;
pub use geometry::*;
pub use preprocessing::*;
pub use types::*;
