use std::sync::Arc;

use crate::billing::{PaymentProvider, StripeClient};
use crate::config::AppConfig;
use crate::llm::{ChatClient, OpenAiClient};
use crate::sessions::{ContextStore, SessionStore};
use crate::tts::{ElevenLabsClient, SpeechClient};
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserStore>,
    pub sessions: Arc<SessionStore>,
    pub contexts: Arc<ContextStore>,
    pub chat: Arc<dyn ChatClient>,
    pub speech: Arc<dyn SpeechClient>,
    pub payments: Arc<dyn PaymentProvider>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let users = Arc::new(UserStore::open(
            config.users_file.clone(),
            config.admin_email.clone(),
        ));

        let chat = Arc::new(OpenAiClient::new(&config.llm)?) as Arc<dyn ChatClient>;
        let speech = Arc::new(ElevenLabsClient::new(config.tts.clone())?) as Arc<dyn SpeechClient>;
        let payments = Arc::new(StripeClient::new(
            config.stripe.clone(),
            &config.app_base_url,
        )?) as Arc<dyn PaymentProvider>;

        Ok(Self::from_parts(config, users, chat, speech, payments))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<UserStore>,
        chat: Arc<dyn ChatClient>,
        speech: Arc<dyn SpeechClient>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            config,
            users,
            sessions: Arc::new(SessionStore::new()),
            contexts: Arc::new(ContextStore::new()),
            chat,
            speech,
            payments,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State backed by a throwaway users file and fake outbound clients.
    pub fn fake() -> Self {
        use crate::config::{JwtConfig, LlmConfig, StripeConfig, TtsConfig};
        use crate::testing::{FakeChat, FakePayments, FakeSpeech};

        let users_file = std::env::temp_dir()
            .join(format!("linguachat-test-{}", uuid::Uuid::new_v4()))
            .join("users.json");

        let config = Arc::new(AppConfig {
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            llm: LlmConfig {
                api_key: "fake".into(),
                base_url: "http://llm.invalid".into(),
                model: "fake-model".into(),
            },
            tts: TtsConfig {
                api_key: "fake".into(),
                base_url: "http://tts.invalid".into(),
                model: "fake-voice-model".into(),
                voices: Default::default(),
            },
            stripe: StripeConfig {
                secret_key: "sk_test".into(),
                webhook_secret: "whsec_test".into(),
                price_id: "price_test".into(),
                api_base: "http://stripe.invalid".into(),
            },
            app_base_url: "http://localhost:8080".into(),
            users_file: users_file.clone(),
            admin_email: Some("admin@example.com".into()),
        });

        let users = Arc::new(UserStore::open(users_file, config.admin_email.clone()));
        Self::from_parts(
            config,
            users,
            Arc::new(FakeChat::default()),
            Arc::new(FakeSpeech::default()),
            Arc::new(FakePayments::default()),
        )
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatClient>) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechClient>) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_payments(mut self, payments: Arc<dyn PaymentProvider>) -> Self {
        self.payments = payments;
        self
    }
}
