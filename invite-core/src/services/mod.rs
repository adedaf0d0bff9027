//! Invitation service: key lifecycle and quota bookkeeping.
//!
//! The functions in [`invitations`] and [`quota`] take their storage
//! operations as closures. [`InvitationService`] binds them to an
//! [`InvitationStore`] and the configured mail and template boundaries.

pub mod invitations;
pub mod quota;
pub mod tokens;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::InvitationConfig;
use crate::mail::{MailError, Mailer};
use crate::models::{invitation_keys::InvitationKey, users::Inviter, users::UserId};
use crate::store::{InvitationStore, StoreError};
use crate::templates::{EmailContext, RenderError, Site, TemplateRenderer, INVITATION_EMAIL_BODY};

use self::invitations::KeyDefaults;

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("Invitation key not found")]
    KeyNotFound,

    #[error("Invitation key {0} has no uses left")]
    KeyExhausted(String),

    #[error("Invitation key {0} has expired")]
    KeyExpired(String),

    #[error("No invitation quota record for user {0}")]
    QuotaRecordMissing(UserId),

    #[error("Invalid bulk invitation: {0}")]
    InvalidBulkInvitation(String),

    #[error("Repo Error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail Error: {0}")]
    Mail(#[from] MailError),

    #[error("Template Error: {0}")]
    Template(#[from] RenderError),
}

pub type Clock = fn() -> DateTime<Utc>;

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn InvitationStore>,
    mailer: Arc<dyn Mailer>,
    templates: Arc<dyn TemplateRenderer>,
    config: InvitationConfig,
    clock: Clock,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn InvitationStore>,
        mailer: Arc<dyn Mailer>,
        templates: Arc<dyn TemplateRenderer>,
        config: InvitationConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            templates,
            config,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &InvitationConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn InvitationStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn key_defaults(&self) -> KeyDefaults {
        KeyDefaults {
            duration_days: self.config.account_invitation_days,
            now: self.now(),
        }
    }

    fn site(&self) -> Site {
        Site {
            name: self.config.site_name.clone(),
            domain: self.config.site_domain.clone(),
        }
    }

    fn email_context(&self, key: Option<&InvitationKey>, from_user: &Inviter) -> EmailContext {
        EmailContext {
            invitation_key: key.map(|k| k.key.clone()),
            expiration_days: self.config.account_invitation_days,
            from_user: from_user.username.clone(),
            site: self.site(),
        }
    }

    pub async fn get_key(&self, token: &str) -> Result<Option<InvitationKey>, InvitationError> {
        let store = self.store();
        invitations::get_key(
            move |t: String| async move { store.find_key_by_token(&t).await },
            token,
        )
        .await
    }

    pub async fn is_key_valid(&self, token: &str) -> Result<bool, InvitationError> {
        let store = self.store();
        invitations::is_key_valid(
            move |t: String| async move { store.find_key_by_token(&t).await },
            token,
            self.now(),
        )
        .await
    }

    pub async fn create_invitation(
        &self,
        issuer: UserId,
    ) -> Result<InvitationKey, InvitationError> {
        let store = self.store();
        invitations::create_invitation(
            move |key: InvitationKey| async move { store.insert_key_charged(&key).await },
            issuer,
            self.key_defaults(),
        )
        .await
    }

    pub async fn create_bulk_invitation(
        &self,
        issuer: UserId,
        token: &str,
        uses: i32,
    ) -> Result<InvitationKey, InvitationError> {
        let store = self.store();
        invitations::create_bulk_invitation(
            move |key: InvitationKey| async move { store.insert_key_charged(&key).await },
            issuer,
            token,
            uses,
            self.key_defaults(),
        )
        .await
    }

    /// Redeem one use of `key`. Returns the uses left afterwards.
    pub async fn mark_used(
        &self,
        key: &InvitationKey,
        registrant: UserId,
    ) -> Result<i32, InvitationError> {
        let store = self.store();
        invitations::mark_used(
            move |id, user, now| async move { store.redeem_key(id, user, now).await },
            move |t: String| async move { store.find_key_by_token(&t).await },
            key,
            registrant,
            self.now(),
        )
        .await
    }

    pub async fn list_keys(&self) -> Result<Vec<InvitationKey>, InvitationError> {
        Ok(self.store.find_all_keys().await?)
    }

    /// Delete the key `token` along with its redemption records. Returns
    /// whether a key was removed.
    pub async fn revoke_key(&self, token: &str) -> Result<bool, InvitationError> {
        let key = match self.get_key(token).await? {
            Some(key) => key,
            None => return Ok(false),
        };
        let deleted = self.store.delete_key(key.id).await?;
        info!(key_id = %key.id, deleted, "Invitation key revoked");
        Ok(deleted)
    }

    pub async fn registrants(&self, key: &InvitationKey) -> Result<Vec<UserId>, InvitationError> {
        Ok(self.store.find_registrants(key.id).await?)
    }

    pub async fn send_invitation(
        &self,
        key: &InvitationKey,
        from_user: &Inviter,
        email: &str,
    ) -> Result<(), InvitationError> {
        let context = self.email_context(Some(key), from_user);
        invitations::send_invitation(
            self.templates.as_ref(),
            self.mailer.as_ref(),
            &context,
            &self.config.default_from_email,
            email,
        )
        .await
    }

    /// Body of the invitation email as `from_user` would send it, with no
    /// key filled in.
    pub fn render_email_preview(&self, from_user: &Inviter) -> Result<String, InvitationError> {
        let context = self.email_context(None, from_user);
        Ok(self.templates.render(INVITATION_EMAIL_BODY, &context)?)
    }

    pub async fn delete_expired_keys(&self) -> Result<u64, InvitationError> {
        let store = self.store();
        invitations::delete_expired_keys(
            move |now| async move { store.delete_expired_keys(now).await },
            self.now(),
        )
        .await
    }

    pub async fn remaining_invitations_for(&self, user: UserId) -> Result<i32, InvitationError> {
        let store = self.store();
        quota::remaining_invitations_for(
            move |u, quota| async move { store.get_or_create_invitation_user(u, quota).await },
            user,
            self.config.invitations_per_user,
        )
        .await
    }

    /// Account-creation hook: seed the quota record of a new user.
    pub async fn on_user_created(&self, user: UserId) -> Result<(), InvitationError> {
        let store = self.store();
        quota::on_user_created(
            move |u, quota| async move { store.get_or_create_invitation_user(u, quota).await },
            user,
            self.config.invitations_per_user,
        )
        .await?;
        Ok(())
    }
}
