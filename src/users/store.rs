use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{SubscriptionStatus, User};
use super::StoreError;
use crate::auth::password::{hash_password, verify_dummy, verify_password};

#[derive(Default)]
struct Indices {
    by_id: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

impl Indices {
    fn insert(&mut self, user: User) {
        self.by_email.insert(user.email.clone(), user.id);
        self.by_id.insert(user.id, user);
    }

    fn remove(&mut self, id: Uuid) -> Option<User> {
        let user = self.by_id.remove(&id)?;
        self.by_email.remove(&user.email);
        Some(user)
    }
}

/// Fields to change on a subscription update. `None` leaves the field as is.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionUpdate {
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub trial_ends_at: Option<OffsetDateTime>,
}

/// Accounts indexed by id and by email, snapshotted to a JSON file on every
/// mutation.
pub struct UserStore {
    inner: RwLock<Indices>,
    path: PathBuf,
    admin_email: Option<String>,
}

impl UserStore {
    /// Loads the snapshot at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>, admin_email: Option<String>) -> Self {
        let path = path.into();
        let mut indices = Indices::default();
        match load_snapshot(&path) {
            Ok(users) => {
                for user in users {
                    indices.insert(user);
                }
                info!(path = %path.display(), count = indices.by_id.len(), "users loaded");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "users file unavailable; starting empty");
            }
        }
        Self {
            inner: RwLock::new(indices),
            path,
            admin_email,
        }
    }

    pub fn create(&self, email: &str, username: &str, password: &str) -> Result<User, StoreError> {
        // Hash before taking the lock; argon2 is deliberately slow.
        let password_hash =
            hash_password(password).map_err(|e| StoreError::Hash(e.to_string()))?;

        let mut inner = self.write();
        if inner.by_email.contains_key(email) {
            return Err(StoreError::AlreadyExists);
        }

        let is_admin = self
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email));
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
            created_at: OffsetDateTime::now_utc(),
            is_admin,
            subscription_status: if is_admin {
                SubscriptionStatus::Free
            } else {
                SubscriptionStatus::None
            },
            trial_ends_at: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
        };
        inner.insert(user.clone());
        self.persist(&inner);
        debug!(user_id = %user.id, is_admin, "user created");
        Ok(user)
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let found = {
            let inner = self.read();
            inner
                .by_email
                .get(email)
                .and_then(|id| inner.by_id.get(id))
                .cloned()
        };

        let Some(user) = found else {
            verify_dummy(password);
            return Err(StoreError::InvalidCredentials);
        };

        match verify_password(password, &user.password_hash) {
            Ok(true) => Ok(user),
            Ok(false) => Err(StoreError::InvalidCredentials),
            Err(e) => {
                error!(user_id = %user.id, error = %e, "stored password hash unreadable");
                Err(StoreError::InvalidCredentials)
            }
        }
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        self.read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    pub fn get_by_stripe_customer(&self, customer_id: &str) -> Result<User, StoreError> {
        self.read()
            .by_id
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    pub fn list_all(&self) -> Vec<User> {
        self.read().by_id.values().cloned().collect()
    }

    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.remove(id).ok_or(StoreError::NotFound("user"))?;
        self.persist(&inner);
        Ok(())
    }

    pub fn update_subscription(
        &self,
        id: Uuid,
        update: SubscriptionUpdate,
    ) -> Result<User, StoreError> {
        self.mutate(id, |user| {
            if let Some(customer_id) = update.customer_id.filter(|c| !c.is_empty()) {
                user.stripe_customer_id = Some(customer_id);
            }
            if let Some(subscription_id) = update.subscription_id.filter(|s| !s.is_empty()) {
                user.stripe_subscription_id = Some(subscription_id);
            }
            if let Some(status) = update.status {
                user.subscription_status = status;
            }
            if update.trial_ends_at.is_some() {
                user.trial_ends_at = update.trial_ends_at;
            }
        })
    }

    /// Sets status and trial end exactly as given.
    pub fn set_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        trial_ends_at: Option<OffsetDateTime>,
    ) -> Result<User, StoreError> {
        self.mutate(id, |user| {
            user.subscription_status = status;
            user.trial_ends_at = trial_ends_at;
        })
    }

    fn mutate(&self, id: Uuid, f: impl FnOnce(&mut User)) -> Result<User, StoreError> {
        let mut inner = self.write();
        let user = inner.by_id.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        f(user);
        let updated = user.clone();
        self.persist(&inner);
        Ok(updated)
    }

    fn read(&self) -> RwLockReadGuard<'_, Indices> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indices> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Best effort: failures are logged, never returned.
    fn persist(&self, inner: &Indices) {
        let mut users: Vec<&User> = inner.by_id.values().collect();
        users.sort_by_key(|u| u.created_at);
        if let Err(e) = write_snapshot(&self.path, &users) {
            error!(path = %self.path.display(), error = %e, "failed to persist users");
        }
    }
}

fn load_snapshot(path: &Path) -> anyhow::Result<Vec<User>> {
    let data = std::fs::read(path).context("read users file")?;
    serde_json::from_slice(&data).context("parse users file")
}

fn write_snapshot(path: &Path, users: &[&User]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).context("create data dir")?;
    }
    let data = serde_json::to_vec_pretty(users).context("serialize users")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).context("write temp users file")?;
    std::fs::rename(&tmp, path).context("replace users file")?;
    Ok(())
}
