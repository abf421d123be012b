//! Placement error types.

use thiserror::Error;

/// Errors raised while configuring or querying storage classes.
#[derive(Debug, Error, PartialEq)]
pub enum PlacementError {
    #[error("class configuration mismatch: classifier uses {existing}, caller requested {requested}")]
    ConfigMismatch { existing: String, requested: String },

    #[error("invalid class borders: {0}")]
    InvalidBorders(String),

    #[error("unknown storage class {class} (classifier has {class_count})")]
    UnknownClass { class: usize, class_count: usize },
}

pub type PlacementResult<T> = Result<T, PlacementError>;
