use tracing::{info, warn};

use super::{BillingError, Plan};
use crate::state::AppState;
use crate::users::{SubscriptionUpdate, User};

/// Ensures the user has a payment customer, then opens a checkout for them.
pub async fn checkout_url_for(
    state: &AppState,
    user: &User,
    plan: Plan,
) -> Result<String, BillingError> {
    let customer_id = match user.stripe_customer_id.clone() {
        Some(id) => id,
        None => {
            let id = state
                .payments
                .create_customer(&user.email, &user.username, user.id)
                .await?;
            // Stored right away so webhooks can find the user by customer id.
            if let Err(e) = state.users.update_subscription(
                user.id,
                SubscriptionUpdate {
                    customer_id: Some(id.clone()),
                    ..Default::default()
                },
            ) {
                warn!(user_id = %user.id, error = %e, "could not record customer id");
            }
            id
        }
    };

    let url = state
        .payments
        .create_checkout(&customer_id, user.id, plan)
        .await?;
    info!(user_id = %user.id, plan = ?plan, "checkout session created");
    Ok(url)
}

/// Cancels the remote subscription, if any. A subscription the provider no
/// longer knows about counts as cancelled.
pub async fn cancel_remote_subscription(state: &AppState, user: &User) -> Result<(), BillingError> {
    let Some(subscription_id) = user.stripe_subscription_id.as_deref() else {
        return Ok(());
    };
    match state.payments.cancel_subscription(subscription_id).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_resource_missing() => {
            warn!(user_id = %user.id, subscription_id, "subscription already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
