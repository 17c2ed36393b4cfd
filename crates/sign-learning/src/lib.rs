//! # Sign-Learning
//!
//! The practice loop built on top of trained gesture classifiers.
//!
//! A learner performs a target sign; [`LearningService::compare_to_target`]
//! classifies the attempt, scores it against stored reference poses and
//! records the result. [`SessionStatsAggregator`] keeps running statistics
//! per model and learner, including per-label difficulty and
//! recommendations.

pub mod feedback;
pub mod history;
pub mod reference;
pub mod samples;
pub mod service;
pub mod session;
pub mod similarity;

pub use feedback::*;
pub use history::*;
pub use reference::*;
pub use samples::*;
pub use service::*;
pub use session::*;
pub use similarity::*;
