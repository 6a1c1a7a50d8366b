//! Common error types for the dropout dashboard

use thiserror::Error;

use crate::features::FeatureError;
use crate::model::ModelError;
use crate::schema::SchemaError;

/// Common result type for dashboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors of the prediction path and configuration loading
#[derive(Error, Debug)]
pub enum Error {
    /// Form record could not be turned into a feature vector
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    /// Feature vector does not match the model's expected schema
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Model loading or invocation error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
