use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Billing state of an account, mirrored from the payment provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Registered but never completed checkout.
    #[default]
    #[serde(alias = "")]
    None,
    Trialing,
    Active,
    PastDue,
    #[serde(alias = "canceled")]
    Cancelled,
    Suspended,
    /// Complimentary access granted by an admin.
    Free,
    /// Any other provider state (unpaid, incomplete, paused). Grants nothing.
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    /// Maps a payment provider subscription status onto ours. Statuses we
    /// do not recognise revoke access.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Inactive,
        }
    }
}

/// Account record, persisted as part of the users snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String, // argon2 PHC string
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
}

impl User {
    /// Unlocks every conversation level.
    pub fn has_full_access(&self) -> bool {
        self.is_admin
            || matches!(
                self.subscription_status,
                SubscriptionStatus::Active | SubscriptionStatus::Free | SubscriptionStatus::PastDue
            )
    }

    pub fn has_conversation_access(&self) -> bool {
        self.has_conversation_access_at(OffsetDateTime::now_utc())
    }

    /// Full access, or a trial that has not yet ended. A cancelled trial keeps
    /// access until its end date.
    pub fn has_conversation_access_at(&self, now: OffsetDateTime) -> bool {
        if self.has_full_access() {
            return true;
        }
        match self.subscription_status {
            SubscriptionStatus::Trialing => self.trial_ends_at.map_or(true, |end| end > now),
            SubscriptionStatus::Cancelled => self.trial_ends_at.is_some_and(|end| end > now),
            _ => false,
        }
    }

    /// Gate applied at login.
    pub fn has_any_access(&self) -> bool {
        self.has_conversation_access()
    }

    /// Levels 4 and 5 need a full subscription.
    pub fn can_use_level(&self, level: u8) -> bool {
        level <= 3 || self.has_full_access()
    }
}
