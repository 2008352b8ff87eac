//! Error types for arrayctx

use crate::array::ContextId;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ArrayCtxError {
    #[error("Container type {type_name} is already registered")]
    DuplicateRegistration { type_name: &'static str },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error(
        "Context mismatch: array belongs to context {got}, \
         but the operation is scoped to context {expected} (backend {backend})"
    )]
    ContextMismatch {
        expected: ContextId,
        got: ContextId,
        backend: &'static str,
    },

    #[error("Backend error in {backend}::{op}: {message}")]
    Backend {
        backend: &'static str,
        op: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ArrayCtxError>;
