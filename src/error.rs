use thiserror::Error;

use crate::ai::AiError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    #[error("Admin only: {0}")]
    Unauthorized(String),

    #[error("Usage: {0}")]
    Usage(String),
}
