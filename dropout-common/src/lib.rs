//! # Dropout Common Library
//!
//! Shared code for the student dropout dashboard:
//! - Dataset loading, normalization and descriptive analytics
//! - Feature engineering for manually entered student records
//! - Schema alignment against a model's expected features
//! - Tree-ensemble model artifact, inference and explainer
//! - Attribution normalization for single-instance explanations
//! - Configuration loading

pub mod attribution;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod schema;
pub mod time;

pub use error::{Error, Result};
