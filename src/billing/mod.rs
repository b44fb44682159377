//! Subscription billing against Stripe.

pub mod handlers;
mod service;
mod stripe;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub use service::{cancel_remote_subscription, checkout_url_for};
pub use stripe::StripeClient;

/// Checkout flavour chosen at registration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Trial,
    Immediate,
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("payment provider unreachable: {0}")]
    Transport(String),

    #[error("payment provider error {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected payment provider response: {0}")]
    Decode(String),
}

impl BillingError {
    pub fn is_resource_missing(&self) -> bool {
        matches!(self, BillingError::Api { code: Some(code), .. } if code == "resource_missing")
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::Transport(e.to_string())
    }
}

/// A field Stripe returns either as an id or as the expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(T),
}

impl<T: HasId> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id(),
        }
    }

    pub fn object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }
}

pub trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
}

impl HasId for Customer {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub customer: Option<Expandable<Customer>>,
}

impl HasId for Subscription {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Subscription {
    pub fn trial_ends_at(&self) -> Option<OffsetDateTime> {
        self.trial_end
            .filter(|t| *t > 0)
            .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub customer: Option<Expandable<Customer>>,
    #[serde(default)]
    pub subscription: Option<Expandable<Subscription>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub customer: Option<Expandable<Customer>>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Returns the new customer id.
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: Uuid,
    ) -> Result<String, BillingError>;

    /// Returns the hosted checkout URL.
    async fn create_checkout(
        &self,
        customer_id: &str,
        user_id: Uuid,
        plan: Plan,
    ) -> Result<String, BillingError>;

    /// Fetches a checkout session with its subscription expanded.
    async fn get_checkout(&self, session_id: &str) -> Result<CheckoutSession, BillingError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError>;

    /// Returns the customer portal URL.
    async fn create_portal(&self, customer_id: &str) -> Result<String, BillingError>;
}
