//! Persistence boundary for invitation keys and quota records.

mod memory;
mod postgres;
pub mod schema;

pub use memory::MemoryInvitationStore;
pub use postgres::PgInvitationStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    invitation_keys::{InvitationKey, InvitationKeyId},
    invitation_users::InvitationUser,
    users::UserId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Repo Error: {0}")]
    RepoError(String),

    #[error("Invitation key {0} already exists")]
    DuplicateKey(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::RepoError(e.to_string())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::RepoError(e.to_string())
    }
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    // ───────────────────────────── Invitation keys ─────────────────────────────

    /// Exact-match lookup by token.
    async fn find_key_by_token(&self, token: &str) -> Result<Option<InvitationKey>, StoreError>;

    /// Plain insert that leaves every quota untouched.
    async fn insert_key(&self, key: &InvitationKey) -> Result<(), StoreError>;

    async fn find_all_keys(&self) -> Result<Vec<InvitationKey>, StoreError>;

    async fn delete_key(&self, id: InvitationKeyId) -> Result<bool, StoreError>;

    /// Delete every key already expired at `now`, returning how many went.
    async fn delete_expired_keys(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn find_registrants(&self, id: InvitationKeyId) -> Result<Vec<UserId>, StoreError>;

    /// Consume one use of a key and record the registrant, only if the key
    /// still has uses left and is not expired at `now`. Check and decrement
    /// happen as one step. Returns the uses left afterwards, or `None` when
    /// the key was not redeemable.
    async fn redeem_key(
        &self,
        id: InvitationKeyId,
        registrant: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, StoreError>;

    // ───────────────────────────── Quota records ─────────────────────────────

    /// Fetch the quota record of `inviter`, inserting one seeded with
    /// `default_quota` when none exists. Never creates a second record.
    async fn get_or_create_invitation_user(
        &self,
        inviter: UserId,
        default_quota: i32,
    ) -> Result<InvitationUser, StoreError>;

    async fn find_invitation_user(
        &self,
        inviter: UserId,
    ) -> Result<Option<InvitationUser>, StoreError>;

    /// Insert `key` and take one invitation from its issuer's counter as a
    /// single step. Returns the issuer's remaining count, or `None` without
    /// inserting anything when the issuer has no quota record.
    async fn insert_key_charged(&self, key: &InvitationKey) -> Result<Option<i32>, StoreError>;
}
