use std::future::Future;

use tracing::{debug, error};

use crate::models::{
    invitation_keys::InvitationKey, invitation_users::InvitationUser, users::UserId,
};
use crate::store::StoreError;

use super::InvitationError;

/// Remaining invitations of `user`, creating the quota record seeded with
/// `default_quota` on first access.
pub async fn remaining_invitations_for<FA>(
    get_or_create: impl FnOnce(UserId, i32) -> FA,
    user: UserId,
    default_quota: i32,
) -> Result<i32, InvitationError>
where
    FA: Future<Output = Result<InvitationUser, StoreError>>,
{
    let invitation_user = get_or_create(user, default_quota).await?;
    Ok(invitation_user.invitations_remaining)
}

/// Hook for the account-creation path. Idempotent.
pub async fn on_user_created<FA>(
    get_or_create: impl FnOnce(UserId, i32) -> FA,
    user: UserId,
    default_quota: i32,
) -> Result<InvitationUser, InvitationError>
where
    FA: Future<Output = Result<InvitationUser, StoreError>>,
{
    let invitation_user = get_or_create(user, default_quota).await?;
    debug!(user = %user, remaining = invitation_user.invitations_remaining, "Quota record ready");
    Ok(invitation_user)
}

/// Store `key` and charge one invitation to its issuer in the same step. A
/// missing quota record means the account-creation hook never ran; it is
/// reported, and the key is not stored.
pub async fn charge_for_key<FA>(
    insert_charged: impl FnOnce(InvitationKey) -> FA,
    key: InvitationKey,
) -> Result<i32, InvitationError>
where
    FA: Future<Output = Result<Option<i32>, StoreError>>,
{
    let issuer = key.from_user;
    match insert_charged(key).await? {
        Some(remaining) => Ok(remaining),
        None => {
            error!(user = %issuer, "Invitation key requested by user without quota record");
            Err(InvitationError::QuotaRecordMissing(issuer))
        }
    }
}
