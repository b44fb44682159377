mod model;
mod store;

use thiserror::Error;

pub use model::{SubscriptionStatus, User};
pub use store::{SubscriptionUpdate, UserStore};

/// Failures of the in-process stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("user already exists")]
    AlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hash(String),
}
