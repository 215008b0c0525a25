//! Error types for the mapper

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapperError>;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("DANGER: you must pass `DELETE ALL DATA` to confirm you want to delete all data in the database")]
    ConfirmationRequired,

    #[error("Entity not found: {id}")]
    NotFound { id: String },

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown vertex shape: {0}")]
    UnknownShape(String),

    #[error("Vertex shape {shape} has no relation {relation}")]
    UnknownRelation { shape: String, relation: String },

    #[error("Relation {relation} is declared ONE but {found} edges exist")]
    AmbiguousRelation { relation: String, found: usize },

    #[error("Relation {relation} targets {expected}, got {actual}")]
    TargetMismatch {
        relation: String,
        expected: String,
        actual: String,
    },

    #[error("Missing column in result row: {0}")]
    MissingColumn(String),

    #[error("Unexpected cell in column {column}: expected {expected}")]
    UnexpectedCell { column: String, expected: &'static str },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid value for property {property}: expected {expected}")]
    Validation { property: String, expected: String },

    #[error("Session pool is closed")]
    PoolClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MapperError {
    pub fn not_found(id: impl Into<String>) -> Self {
        MapperError::NotFound { id: id.into() }
    }

    pub fn driver(message: impl std::fmt::Display) -> Self {
        MapperError::Driver(message.to_string())
    }
}
