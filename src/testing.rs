//! In-process fakes for the outbound clients.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use uuid::Uuid;

use crate::billing::{BillingError, CheckoutSession, PaymentProvider, Plan};
use crate::llm::{ChatClient, ChatRequest, DeltaStream, LlmError};
use crate::tts::{AudioStream, SpeechClient, TtsError};

/// Replays scripted deltas and records every request it receives.
#[derive(Default)]
pub struct FakeChat {
    pub deltas: Vec<String>,
    /// Emit an error after the scripted deltas instead of ending cleanly.
    pub fail_mid_stream: bool,
    /// Refuse the request before streaming starts.
    pub unavailable: bool,
    pub completion: String,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    pub fn replying(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        if self.unavailable {
            return Err(LlmError::Transport("connection refused".into()));
        }
        let mut items: Vec<Result<String, LlmError>> =
            self.deltas.iter().cloned().map(Ok).collect();
        if self.fail_mid_stream {
            items.push(Err(LlmError::Malformed("truncated event".into())));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request);
        if self.unavailable {
            return Err(LlmError::Transport("connection refused".into()));
        }
        Ok(self.completion.clone())
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    pub unavailable: bool,
    pub calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SpeechClient for FakeSpeech {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioStream, TtsError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), language.to_string()));
        if self.unavailable {
            return Err(TtsError::Status {
                status: 503,
                body: "busy".into(),
            });
        }
        let chunks: Vec<Result<Bytes, TtsError>> = vec![
            Ok(Bytes::from_static(b"ID3")),
            Ok(Bytes::from_static(b"-audio")),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Payment provider that hands out predictable ids and URLs.
#[derive(Default)]
pub struct FakePayments {
    pub fail_checkout: bool,
    pub cancel_missing: bool,
    /// Returned by `get_checkout`; `None` behaves like an unknown session.
    pub checkout_session: Option<CheckoutSession>,
    pub customers: Mutex<usize>,
    pub cancellations: Mutex<Vec<String>>,
}

impl FakePayments {
    pub fn customers_created(&self) -> usize {
        *self.customers.lock().unwrap()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancellations.lock().unwrap().clone()
    }
}

fn missing(what: &str) -> BillingError {
    BillingError::Api {
        status: 404,
        code: Some("resource_missing".into()),
        message: format!("No such {what}"),
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_customer(
        &self,
        _email: &str,
        _name: &str,
        _user_id: Uuid,
    ) -> Result<String, BillingError> {
        let mut count = self.customers.lock().unwrap();
        *count += 1;
        Ok(format!("cus_fake_{count}"))
    }

    async fn create_checkout(
        &self,
        customer_id: &str,
        user_id: Uuid,
        plan: Plan,
    ) -> Result<String, BillingError> {
        if self.fail_checkout {
            return Err(BillingError::Transport("payment provider down".into()));
        }
        Ok(format!(
            "https://checkout.test/{customer_id}/{user_id}?plan={}",
            match plan {
                Plan::Trial => "trial",
                Plan::Immediate => "immediate",
            }
        ))
    }

    async fn get_checkout(&self, _session_id: &str) -> Result<CheckoutSession, BillingError> {
        self.checkout_session
            .clone()
            .ok_or_else(|| missing("checkout session"))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        if self.cancel_missing {
            return Err(missing("subscription"));
        }
        self.cancellations
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(())
    }

    async fn create_portal(&self, customer_id: &str) -> Result<String, BillingError> {
        Ok(format!("https://portal.test/{customer_id}"))
    }
}

/// Request helpers for router-level tests.
pub mod http {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::jwt::JwtKeys;
    use crate::state::AppState;
    use crate::users::{SubscriptionStatus, User};

    pub fn token_for(state: &AppState, user_id: Uuid) -> String {
        JwtKeys::from_config(&state.config.jwt)
            .sign_access(user_id)
            .unwrap()
    }

    /// Creates a user with the given status and returns it with an access token.
    pub fn user_with_status(
        state: &AppState,
        email: &str,
        status: SubscriptionStatus,
    ) -> (User, String) {
        let user = state.users.create(email, "tester", "password123").unwrap();
        let user = state
            .users
            .set_subscription_status(user.id, status, None)
            .unwrap();
        let token = token_for(state, user.id);
        (user, token)
    }

    pub fn request(
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn send_raw(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    /// Sends a request and decodes the JSON body (`Null` when empty).
    pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = send_raw(app, req).await;
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }
}
