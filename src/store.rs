//! Defines the provider profile store and the synchronization of a
//! single user's profile.

use crate::profile::{decide, Decision, UserRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument};

/// The collection of provider profiles, keyed by user id. Both
/// operations must be idempotent.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create or replace the profile of a user.
    async fn set(&self, user_id: &str, profile: &UserRecord) -> Result<()>;

    /// Remove the profile of a user. Removing a profile that doesn't
    /// exist is not an error.
    async fn delete(&self, user_id: &str) -> Result<()>;
}

/// The effect a synchronization had on the profile store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Upserted,
    Removed,
    Skipped,
}

/// Bring the provider profile of a user in line with the post-write
/// state of their record (`None` if the record was deleted). Performs
/// at most one write to the store.
#[instrument(skip(record, store))]
pub async fn on_user_write(
    user_id: &str,
    record: Option<UserRecord>,
    store: &dyn ProfileStore,
) -> Result<SyncOutcome> {
    match decide(record) {
        Decision::Upsert(profile) => {
            store.set(user_id, &profile).await.with_context(|| {
                format!("Failed to store provider profile for user {}", user_id)
            })?;
            Ok(SyncOutcome::Upserted)
        }
        Decision::Remove => {
            store.delete(user_id).await.with_context(|| {
                format!("Failed to remove provider profile for user {}", user_id)
            })?;
            Ok(SyncOutcome::Removed)
        }
        Decision::Skip { missing } => {
            info!(?missing, "Missing required fields for user {}", user_id);
            Ok(SyncOutcome::Skipped)
        }
    }
}
