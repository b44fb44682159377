use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    billing::cancel_remote_subscription,
    error::{AppError, Result},
    state::AppState,
    users::{SubscriptionStatus, User},
};

const ADMIN_TRIAL_DAYS: i64 = 7;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/subscription", patch(set_subscription))
}

#[derive(Debug, Serialize)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_admin: bool,
    pub subscription_status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for AdminUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            is_admin: u.is_admin,
            subscription_status: u.subscription_status,
            trial_ends_at: u.trial_ends_at,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetSubscriptionRequest {
    #[serde(default)]
    pub status: String,
}

/// Statuses an admin may assign, with the trial end each one implies.
fn assignable(status: &str) -> Option<(SubscriptionStatus, Option<OffsetDateTime>)> {
    let status = match status {
        "free" => SubscriptionStatus::Free,
        "active" => SubscriptionStatus::Active,
        "suspended" => SubscriptionStatus::Suspended,
        "cancelled" => SubscriptionStatus::Cancelled,
        "trialing" => {
            let ends = OffsetDateTime::now_utc() + Duration::days(ADMIN_TRIAL_DAYS);
            return Some((SubscriptionStatus::Trialing, Some(ends)));
        }
        _ => return None,
    };
    Some((status, None))
}

fn require_admin(state: &AppState, user_id: Uuid) -> Result<User> {
    match state.users.get_by_id(user_id) {
        Ok(user) if user.is_admin => Ok(user),
        _ => {
            warn!(%user_id, "admin route refused");
            Err(AppError::Forbidden("forbidden".into()))
        }
    }
}

/// Admins first, then by email.
fn sort_for_listing(users: &mut [User]) {
    users.sort_by(|a, b| b.is_admin.cmp(&a.is_admin).then_with(|| a.email.cmp(&b.email)));
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>> {
    require_admin(&state, user_id)?;
    let mut users = state.users.list_all();
    sort_for_listing(&mut users);
    let users: Vec<AdminUser> = users.into_iter().map(AdminUser::from).collect();
    Ok(Json(serde_json::json!({ "users": users })))
}

#[instrument(skip(state, payload))]
pub async fn set_subscription(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(target_id): Path<Uuid>,
    Json(payload): Json<SetSubscriptionRequest>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&state, user_id)?;
    if target_id == user_id {
        return Err(AppError::BadRequest(
            "cannot change your own subscription status".into(),
        ));
    }

    let (status, trial_ends_at) = assignable(&payload.status)
        .ok_or_else(|| AppError::BadRequest("invalid status".into()))?;

    let target = state.users.get_by_id(target_id)?;
    if status == SubscriptionStatus::Suspended {
        // The local suspension applies even if the remote cancel fails.
        if let Err(e) = cancel_remote_subscription(&state, &target).await {
            warn!(%target_id, error = %e, "remote cancel failed while suspending");
        }
    }

    state
        .users
        .set_subscription_status(target_id, status, trial_ends_at)?;
    info!(admin_id = %user_id, %target_id, status = status.as_str(), "subscription set by admin");
    Ok(Json(serde_json::json!({ "status": status })))
}
