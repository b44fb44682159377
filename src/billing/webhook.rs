use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Customer, Expandable, HasId, Invoice, Subscription};
use crate::users::{SubscriptionStatus, SubscriptionUpdate, User, UserStore};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header malformed")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("no matching signature")]
    Mismatch,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// HMAC-SHA256 of `"<t>.<payload>"`.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Applies a verified event to the user store. Returns whether a user was
/// updated; events for unknown users or of unhandled types are ignored.
pub fn apply_event(users: &UserStore, event: &WebhookEvent) -> bool {
    let object = &event.data.object;
    match event.kind.as_str() {
        "checkout.session.completed" => {
            let Some(session) = parse::<super::CheckoutSession>(object, &event.kind) else {
                return false;
            };
            let Some(user_id) = session
                .client_reference_id
                .as_deref()
                .and_then(|id| id.parse().ok())
            else {
                return false;
            };
            let Some(subscription) = session.subscription.as_ref() else {
                return false;
            };
            let expanded = subscription.object();
            let update = SubscriptionUpdate {
                customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
                subscription_id: Some(subscription.id().to_string()),
                status: expanded.map(|s| SubscriptionStatus::from_provider(&s.status)),
                trial_ends_at: expanded.and_then(Subscription::trial_ends_at),
            };
            users.update_subscription(user_id, update).is_ok()
        }

        "customer.subscription.updated" => {
            let Some(sub) = parse::<Subscription>(object, &event.kind) else {
                return false;
            };
            let Some(user) = user_for_customer(users, sub.customer.as_ref()) else {
                return false;
            };
            let update = SubscriptionUpdate {
                subscription_id: Some(sub.id.clone()),
                status: Some(SubscriptionStatus::from_provider(&sub.status)),
                trial_ends_at: sub.trial_ends_at(),
                ..Default::default()
            };
            users.update_subscription(user.id, update).is_ok()
        }

        "customer.subscription.deleted" => {
            let Some(sub) = parse::<Subscription>(object, &event.kind) else {
                return false;
            };
            let Some(user) = user_for_customer(users, sub.customer.as_ref()) else {
                return false;
            };
            // A manual suspension outranks the provider's cancellation.
            if user.subscription_status == SubscriptionStatus::Suspended {
                debug!(user_id = %user.id, "ignoring deletion for suspended user");
                return false;
            }
            let update = SubscriptionUpdate {
                subscription_id: Some(sub.id.clone()),
                status: Some(SubscriptionStatus::Cancelled),
                trial_ends_at: sub.trial_ends_at(),
                ..Default::default()
            };
            users.update_subscription(user.id, update).is_ok()
        }

        "invoice.payment_failed" => {
            let Some(invoice) = parse::<Invoice>(object, &event.kind) else {
                return false;
            };
            let Some(user) = user_for_customer(users, invoice.customer.as_ref()) else {
                return false;
            };
            set_status(users, &user, SubscriptionStatus::PastDue)
        }

        "invoice.payment_succeeded" => {
            let Some(invoice) = parse::<Invoice>(object, &event.kind) else {
                return false;
            };
            let Some(user) = user_for_customer(users, invoice.customer.as_ref()) else {
                return false;
            };
            user.subscription_status == SubscriptionStatus::PastDue
                && set_status(users, &user, SubscriptionStatus::Active)
        }

        other => {
            debug!(event = other, "unhandled webhook event");
            false
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(object: &serde_json::Value, kind: &str) -> Option<T> {
    match serde_json::from_value(object.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(event = kind, error = %e, "webhook object did not parse");
            None
        }
    }
}

fn user_for_customer(users: &UserStore, customer: Option<&Expandable<Customer>>) -> Option<User> {
    let customer_id = customer?.id();
    match users.get_by_stripe_customer(customer_id) {
        Ok(user) => Some(user),
        Err(_) => {
            debug!(customer_id, "webhook for unknown customer");
            None
        }
    }
}

fn set_status(users: &UserStore, user: &User, status: SubscriptionStatus) -> bool {
    info!(user_id = %user.id, status = status.as_str(), "subscription status from webhook");
    users
        .update_subscription(
            user.id,
            SubscriptionUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
        .is_ok()
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
