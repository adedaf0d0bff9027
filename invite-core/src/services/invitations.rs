use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::mail::Mailer;
use crate::models::{
    invitation_keys::{InvitationKey, InvitationKeyId, KeyState},
    users::UserId,
};
use crate::store::StoreError;
use crate::templates::{
    EmailContext, TemplateRenderer, INVITATION_EMAIL_BODY, INVITATION_EMAIL_SUBJECT,
};

use super::{quota::charge_for_key, tokens::generate_token, InvitationError};

/// Settings that shape a freshly created key.
#[derive(Debug, Clone, Copy)]
pub struct KeyDefaults {
    pub duration_days: i32,
    pub now: DateTime<Utc>,
}

pub async fn get_key<FA>(
    find_key: impl FnOnce(String) -> FA,
    token: &str,
) -> Result<Option<InvitationKey>, InvitationError>
where
    FA: Future<Output = Result<Option<InvitationKey>, StoreError>>,
{
    Ok(find_key(token.to_string()).await?)
}

pub async fn is_key_valid<FA>(
    find_key: impl FnOnce(String) -> FA,
    token: &str,
    now: DateTime<Utc>,
) -> Result<bool, InvitationError>
where
    FA: Future<Output = Result<Option<InvitationKey>, StoreError>>,
{
    let key = get_key(find_key, token).await?;
    Ok(key.map(|k| k.is_usable(now)).unwrap_or(false))
}

async fn persist_key<FA>(
    insert_charged: impl FnOnce(InvitationKey) -> FA,
    key: InvitationKey,
) -> Result<InvitationKey, InvitationError>
where
    FA: Future<Output = Result<Option<i32>, StoreError>>,
{
    let remaining = charge_for_key(insert_charged, key.clone()).await?;
    info!(
        issuer = %key.from_user,
        key_id = %key.id,
        uses = key.uses_left,
        remaining,
        "Created invitation key"
    );
    Ok(key)
}

/// Create a single-use key for `issuer` and charge it to their quota. Nothing
/// is stored when the issuer has no quota record.
pub async fn create_invitation<FA>(
    insert_charged: impl FnOnce(InvitationKey) -> FA,
    issuer: UserId,
    defaults: KeyDefaults,
) -> Result<InvitationKey, InvitationError>
where
    FA: Future<Output = Result<Option<i32>, StoreError>>,
{
    let key = InvitationKey::new(
        generate_token(),
        issuer,
        1,
        defaults.duration_days,
        defaults.now,
    );
    persist_key(insert_charged, key).await
}

/// Create a shareable key with an explicit token and use count.
pub async fn create_bulk_invitation<FA>(
    insert_charged: impl FnOnce(InvitationKey) -> FA,
    issuer: UserId,
    token: &str,
    uses: i32,
    defaults: KeyDefaults,
) -> Result<InvitationKey, InvitationError>
where
    FA: Future<Output = Result<Option<i32>, StoreError>>,
{
    let token = token.trim();
    if token.is_empty() {
        return Err(InvitationError::InvalidBulkInvitation(
            "token must not be empty".to_string(),
        ));
    }
    if uses < 1 {
        return Err(InvitationError::InvalidBulkInvitation(format!(
            "uses must be at least 1, got {}",
            uses
        )));
    }
    let key = InvitationKey::new(
        token.to_string(),
        issuer,
        uses,
        defaults.duration_days,
        defaults.now,
    );
    persist_key(insert_charged, key).await
}

/// Redeem one use of `key` for `registrant`. The store re-checks usability
/// while decrementing; when it refuses, the key is re-read to report why.
pub async fn mark_used<FA, FB>(
    redeem: impl FnOnce(InvitationKeyId, UserId, DateTime<Utc>) -> FA,
    find_key: impl FnOnce(String) -> FB,
    key: &InvitationKey,
    registrant: UserId,
    now: DateTime<Utc>,
) -> Result<i32, InvitationError>
where
    FA: Future<Output = Result<Option<i32>, StoreError>>,
    FB: Future<Output = Result<Option<InvitationKey>, StoreError>>,
{
    if let Some(uses_left) = redeem(key.id, registrant, now).await? {
        info!(key_id = %key.id, registrant = %registrant, uses_left, "Invitation key redeemed");
        return Ok(uses_left);
    }

    let current = find_key(key.key.clone()).await?;
    let err = match current.map(|k| k.state(now)) {
        None => InvitationError::KeyNotFound,
        Some(KeyState::Expired) => InvitationError::KeyExpired(key.key.clone()),
        Some(KeyState::Exhausted) | Some(KeyState::Usable) => {
            InvitationError::KeyExhausted(key.key.clone())
        }
    };
    warn!(key_id = %key.id, registrant = %registrant, error = %err, "Redemption rejected");
    Err(err)
}

/// Render the subject and body for `context`. Line breaks are stripped from
/// the subject since mail headers cannot carry them.
pub fn render_invitation_email(
    renderer: &dyn TemplateRenderer,
    context: &EmailContext,
) -> Result<(String, String), InvitationError> {
    let subject = renderer
        .render(INVITATION_EMAIL_SUBJECT, context)?
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>();
    let body = renderer.render(INVITATION_EMAIL_BODY, context)?;
    Ok((subject, body))
}

/// Email the invitation in `context` to `email`. Transport failures are
/// returned to the caller untouched.
pub async fn send_invitation(
    renderer: &dyn TemplateRenderer,
    mailer: &dyn Mailer,
    context: &EmailContext,
    from_email: &str,
    email: &str,
) -> Result<(), InvitationError> {
    let (subject, body) = render_invitation_email(renderer, context)?;
    mailer
        .send(&subject, &body, from_email, &[email.to_string()])
        .await?;
    info!(to = email, from_user = %context.from_user, "Invitation sent");
    Ok(())
}

pub async fn delete_expired_keys<FA>(
    delete_expired: impl FnOnce(DateTime<Utc>) -> FA,
    now: DateTime<Utc>,
) -> Result<u64, InvitationError>
where
    FA: Future<Output = Result<u64, StoreError>>,
{
    let deleted = delete_expired(now).await?;
    info!(deleted, "Swept expired invitation keys");
    Ok(deleted)
}
