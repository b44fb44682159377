use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::{
    cancel_remote_subscription, checkout_url_for,
    webhook::{apply_event, verify_signature, WebhookEvent},
    Plan, Subscription,
};
use crate::{
    auth::{handlers::issue_session, jwt::AuthUser},
    error::{AppError, Result},
    state::AppState,
    users::{SubscriptionStatus, SubscriptionUpdate},
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/billing/status", get(status))
        .route("/billing/checkout", post(checkout))
        .route("/billing/verify-checkout", get(verify_checkout))
        .route("/billing/cancel", post(cancel))
        .route("/billing/portal", post(portal))
        .route("/billing/webhook", post(webhook))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub subscription_status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    pub has_full_access: bool,
    pub has_conversation_access: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub plan: Plan,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub session_id: String,
}

#[instrument(skip(state))]
pub async fn status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<StatusResponse>> {
    let user = state.users.get_by_id(user_id)?;
    Ok(Json(StatusResponse {
        subscription_status: user.subscription_status,
        trial_ends_at: user.trial_ends_at,
        has_full_access: user.has_full_access(),
        has_conversation_access: user.has_conversation_access(),
    }))
}

/// Opens a new checkout for a user who abandoned or lost their subscription.
/// An unreadable body falls back to the trial plan.
#[instrument(skip(state, payload))]
pub async fn checkout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Option<Json<CheckoutRequest>>,
) -> Result<Json<serde_json::Value>> {
    let user = state.users.get_by_id(user_id)?;
    let plan = payload.map(|Json(req)| req.plan).unwrap_or_default();

    let checkout_url = checkout_url_for(&state, &user, plan).await.map_err(|e| {
        error!(%user_id, error = %e, "checkout creation failed");
        AppError::UpstreamUnavailable("failed to create checkout session".into())
    })?;
    Ok(Json(serde_json::json!({ "checkout_url": checkout_url })))
}

/// Landing call after the hosted checkout redirects back. The checkout
/// session id stands in for credentials; a token is issued on success.
#[instrument(skip(state, query))]
pub async fn verify_checkout(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response> {
    if query.session_id.is_empty() {
        return Err(AppError::BadRequest("missing session_id".into()));
    }

    let session = state
        .payments
        .get_checkout(&query.session_id)
        .await
        .map_err(|e| {
            warn!(error = %e, "checkout session lookup failed");
            AppError::BadRequest("invalid checkout session".into())
        })?;

    let user_id = session
        .client_reference_id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| AppError::BadRequest("no user associated with session".into()))?;
    let subscription = session
        .subscription
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("no subscription in session".into()))?;
    let expanded = subscription.object();

    let user = state.users.update_subscription(
        user_id,
        SubscriptionUpdate {
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            subscription_id: Some(subscription.id().to_string()),
            status: expanded.map(|s| SubscriptionStatus::from_provider(&s.status)),
            trial_ends_at: expanded.and_then(Subscription::trial_ends_at),
        },
    )?;
    info!(%user_id, status = user.subscription_status.as_str(), "checkout verified");

    issue_session(&state, &user, StatusCode::OK)
}

/// Cancels the paid subscription. Any trial end is kept, so a user who
/// cancels during the trial keeps access until it runs out.
#[instrument(skip(state))]
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>> {
    let user = state.users.get_by_id(user_id)?;
    cancel_remote_subscription(&state, &user).await.map_err(|e| {
        error!(%user_id, error = %e, "subscription cancel failed");
        AppError::UpstreamUnavailable("failed to cancel subscription".into())
    })?;

    state.users.update_subscription(
        user_id,
        SubscriptionUpdate {
            status: Some(SubscriptionStatus::Cancelled),
            ..Default::default()
        },
    )?;
    info!(%user_id, "subscription cancelled");
    Ok(Json(
        serde_json::json!({ "status": SubscriptionStatus::Cancelled.as_str() }),
    ))
}

#[instrument(skip(state))]
pub async fn portal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>> {
    let customer_id = state
        .users
        .get_by_id(user_id)
        .ok()
        .and_then(|u| u.stripe_customer_id)
        .ok_or_else(|| AppError::BadRequest("no billing account found".into()))?;

    let portal_url = state
        .payments
        .create_portal(&customer_id)
        .await
        .map_err(|e| {
            error!(%user_id, error = %e, "portal session failed");
            AppError::UpstreamUnavailable("failed to create billing portal session".into())
        })?;
    Ok(Json(serde_json::json!({ "portal_url": portal_url })))
}

/// Payment provider notifications, authenticated by signature only.
#[instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing signature".into()))?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    if let Err(e) = verify_signature(&state.config.stripe.webhook_secret, &body, signature, now) {
        warn!(error = %e, "webhook signature rejected");
        return Err(AppError::BadRequest("invalid signature".into()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid event: {e}")))?;
    let applied = apply_event(&state.users, &event);
    info!(event = %event.kind, applied, "webhook processed");
    Ok(StatusCode::OK)
}
