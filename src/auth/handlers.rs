use axum::{
    extract::{FromRef, State},
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AccessDenied, AuthResponse, CheckoutResponse, LoginRequest, PublicUser,
            RefreshRequest, RegisterRequest,
        },
        jwt::{AuthUser, JwtKeys, TOKEN_COOKIE},
    },
    billing::{self, Plan},
    error::{AppError, Result},
    state::AppState,
    users::{SubscriptionStatus, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_me))
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Signs an access/refresh pair for `user`, sets the token cookie and
/// renders the auth response with `status`.
pub(crate) fn issue_session(state: &AppState, user: &User, status: StatusCode) -> Result<Response> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_access(user.id).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        AppError::Internal(e.to_string())
    })?;
    let refresh_token = keys.sign_refresh(user.id).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        AppError::Internal(e.to_string())
    })?;

    let cookie = format!(
        "{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        keys.access_ttl.as_secs()
    );
    let body = AuthResponse {
        token,
        refresh_token,
        user: PublicUser::from(user),
    };
    Ok((status, AppendHeaders([(header::SET_COOKIE, cookie)]), Json(body)).into_response())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Response> {
    payload.email = payload.email.trim().to_string();
    payload.username = payload.username.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::BadRequest("invalid email".into()));
    }
    if payload.username.is_empty() {
        return Err(AppError::BadRequest("username is required".into()));
    }
    if payload.password.chars().count() < 8 {
        warn!("password too short");
        return Err(AppError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }

    let user = state
        .users
        .create(&payload.email, &payload.username, &payload.password)
        .map_err(|e| {
            warn!(email = %payload.email, error = %e, "registration rejected");
            AppError::from(e)
        })?;
    info!(user_id = %user.id, is_admin = user.is_admin, "user registered");

    if user.is_admin {
        return issue_session(&state, &user, StatusCode::CREATED);
    }

    match billing::checkout_url_for(&state, &user, payload.plan).await {
        Ok(checkout_url) => {
            Ok((StatusCode::CREATED, Json(CheckoutResponse { checkout_url })).into_response())
        }
        Err(e) => {
            error!(user_id = %user.id, error = %e, "checkout failed; rolling back registration");
            if let Err(e) = state.users.delete(user.id) {
                error!(user_id = %user.id, error = %e, "rollback failed");
            }
            Err(AppError::UpstreamUnavailable(
                "payment service unavailable".into(),
            ))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    let email = payload.email.trim();
    let user = state.users.authenticate(email, &payload.password).map_err(|e| {
        warn!(email = %email, "login failed");
        AppError::from(e)
    })?;

    if !user.has_any_access() {
        warn!(user_id = %user.id, status = user.subscription_status.as_str(), "login without access");
        // Only accounts that never finished checkout are sent back to one.
        let (message, checkout_url) = match user.subscription_status {
            SubscriptionStatus::None => {
                let checkout_url = billing::checkout_url_for(&state, &user, Plan::Trial)
                    .await
                    .map_err(|e| warn!(user_id = %user.id, error = %e, "no checkout for denied login"))
                    .ok();
                ("Please complete your subscription setup to sign in.", checkout_url)
            }
            SubscriptionStatus::Suspended => {
                ("Your account has been suspended. Please contact support.", None)
            }
            SubscriptionStatus::Cancelled => (
                "Your subscription has been cancelled. Please resubscribe to continue.",
                None,
            ),
            _ => ("Account access denied.", None),
        };
        let body = AccessDenied {
            error: message.into(),
            status: user.subscription_status,
            checkout_url,
        };
        return Ok((StatusCode::FORBIDDEN, Json(body)).into_response());
    }

    info!(user_id = %user.id, "user logged in");
    issue_session(&state, &user, StatusCode::OK)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Response> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let user = state
        .users
        .get_by_id(claims.sub)
        .map_err(|_| AppError::Unauthorized("user not found".into()))?;
    issue_session(&state, &user, StatusCode::OK)
}

pub async fn logout() -> impl IntoResponse {
    let cookie = format!("{TOKEN_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(serde_json::json!({ "status": "logged out" })),
    )
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>> {
    let user = state.users.get_by_id(user_id).map_err(|e| {
        error!(error = %e, user_id = %user_id, "user not found");
        AppError::Unauthorized("user not found".into())
    })?;
    Ok(Json(PublicUser::from(&user)))
}
