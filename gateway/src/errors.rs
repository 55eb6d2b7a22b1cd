use crate::config::ValidationError;
use std::io;
use tenancy::{ContextError, NotFoundError};

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid gateway configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("request does not identify a tenant")]
    MissingTenant,

    #[error("tenant header is not valid UTF-8")]
    InvalidTenantHeader,

    #[error("task `{0}` carries no tenant metadata")]
    MissingTaskTenant(String),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("tenant context error: {0}")]
    Context(#[from] ContextError),
}
