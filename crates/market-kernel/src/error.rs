//! Error taxonomy for the market kernel.
//!
//! Only configuration and identity problems are errors. Stock shortfalls,
//! saturation and unreachable sellers are ordinary protocol outcomes.

use crate::trade::Identity;

/// Convenience alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors surfaced to the immediate caller of a kernel operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("Invalid identity {id}: {reason}")]
    InvalidIdentity { id: Identity, reason: &'static str },

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Product already exists: {0}")]
    AlreadyExists(String),

    #[error("Insufficient stock of {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: u32,
        available: u32,
    },

    #[error("Invalid configuration for {product}: {reason}")]
    InvalidConfig { product: String, reason: String },
}

impl MarketError {
    pub(crate) fn config(product: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            product: product.to_string(),
            reason: reason.into(),
        }
    }
}
