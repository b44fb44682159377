use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Voice id per language code.
    pub voices: HashMap<String, String>,
}

impl TtsConfig {
    /// Falls back to the Italian voice for languages without one.
    pub fn voice_for(&self, language: &str) -> &str {
        self.voices
            .get(language)
            .or_else(|| self.voices.get("it"))
            .map(String::as_str)
            .unwrap_or(DEFAULT_VOICE)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub stripe: StripeConfig,
    pub app_base_url: String,
    pub users_file: PathBuf,
    pub admin_email: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "linguachat"),
            audience: env_or("JWT_AUDIENCE", "linguachat-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24 * 7),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 30),
        };

        let llm = LlmConfig {
            api_key: required("LLM_API_KEY")?,
            base_url: env_or("LLM_BASE_URL", "https://openai.inference.de-txl.ionos.com/v1"),
            model: env_or("LLM_MODEL", "mistral-small-24b"),
        };

        let voices = crate::conversation::catalog::LANGUAGES
            .iter()
            .map(|l| {
                let key = format!("ELEVENLABS_VOICE_{}", l.code.to_uppercase());
                (l.code.to_string(), env_or(&key, DEFAULT_VOICE))
            })
            .collect();
        let tts = TtsConfig {
            api_key: required("ELEVENLABS_API_KEY")?,
            base_url: env_or("ELEVENLABS_BASE_URL", "https://api.elevenlabs.io/v1"),
            model: env_or("ELEVENLABS_MODEL", "eleven_multilingual_v2"),
            voices,
        };

        let stripe = StripeConfig {
            secret_key: env_or("STRIPE_SECRET_KEY", ""),
            webhook_secret: env_or("STRIPE_WEBHOOK_SECRET", ""),
            price_id: env_or("STRIPE_PRICE_ID", ""),
            api_base: env_or("STRIPE_API_BASE", "https://api.stripe.com/v1"),
        };

        Ok(Self {
            jwt,
            llm,
            tts,
            stripe,
            app_base_url: env_or("APP_BASE_URL", "http://localhost:8080"),
            users_file: PathBuf::from(env_or("USERS_FILE", "data/users.json")),
            admin_email: std::env::var("ADMIN_EMAIL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("required environment variable {key} is not set"))
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn env_parse(key: &str, fallback: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(fallback)
}
