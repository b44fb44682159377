use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use super::{BillingError, CheckoutSession, PaymentProvider, Plan};
use crate::config::StripeConfig;

const TRIAL_DAYS: &str = "7";

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// Minimal Stripe REST client (form-encoded requests, JSON responses).
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
    app_base_url: String,
}

impl StripeClient {
    pub fn new(config: StripeConfig, app_base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            config,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, BillingError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .query(query)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BillingError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(env) => (env.error.code, env.error.message.unwrap_or_default()),
            Err(_) => (None, body),
        };
        error!(status = status.as_u16(), code = ?code, %message, "stripe api error");
        return Err(BillingError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }
    serde_json::from_str(&body).map_err(|e| BillingError::Decode(e.to_string()))
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: Uuid,
    ) -> Result<String, BillingError> {
        let created: Created = self
            .post_form(
                "customers",
                &[
                    ("email", email.to_string()),
                    ("name", name.to_string()),
                    ("metadata[user_id]", user_id.to_string()),
                ],
            )
            .await?;
        debug!(customer_id = %created.id, %user_id, "stripe customer created");
        Ok(created.id)
    }

    async fn create_checkout(
        &self,
        customer_id: &str,
        user_id: Uuid,
        plan: Plan,
    ) -> Result<String, BillingError> {
        let mut form = vec![
            ("customer", customer_id.to_string()),
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", self.config.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("client_reference_id", user_id.to_string()),
            (
                "success_url",
                format!(
                    "{}/checkout-complete.html?session_id={{CHECKOUT_SESSION_ID}}",
                    self.app_base_url
                ),
            ),
            ("cancel_url", format!("{}/?checkout=cancelled", self.app_base_url)),
        ];
        if plan == Plan::Trial {
            form.push(("subscription_data[trial_period_days]", TRIAL_DAYS.to_string()));
        }

        let created: Created = self.post_form("checkout/sessions", &form).await?;
        created
            .url
            .ok_or_else(|| BillingError::Decode("checkout session without url".into()))
    }

    async fn get_checkout(&self, session_id: &str) -> Result<CheckoutSession, BillingError> {
        self.get_json(
            &format!("checkout/sessions/{session_id}"),
            &[("expand[]", "subscription")],
        )
        .await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        let response = self
            .http
            .delete(self.url(&format!("subscriptions/{subscription_id}")))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        let _: serde_json::Value = decode(response).await?;
        Ok(())
    }

    async fn create_portal(&self, customer_id: &str) -> Result<String, BillingError> {
        let created: Created = self
            .post_form(
                "billing_portal/sessions",
                &[
                    ("customer", customer_id.to_string()),
                    ("return_url", format!("{}/profile.html", self.app_base_url)),
                ],
            )
            .await?;
        created
            .url
            .ok_or_else(|| BillingError::Decode("portal session without url".into()))
    }
}
