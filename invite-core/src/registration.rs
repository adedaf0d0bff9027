//! Registration backends.
//!
//! The account system is external. A [`RegistrationBackend`] validates the
//! signup form it owns, asks the [`AccountCreator`] for the account, then
//! runs the invitation side effects: seeding the new user's quota and
//! redeeming the invitation key that let them in.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::InvitationConfig;
use crate::forms::{validate_registration_form, validate_social_signup_form, SignupForm};
use crate::models::users::UserId;
use crate::services::{InvitationError, InvitationService};

pub const REGISTRATION_TEMPLATE: &str = "registration/registration_form.html";
pub const SOCIAL_SIGNUP_TEMPLATE: &str = "accounts/signup.html";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Username {0} is already taken")]
    UsernameTaken(String),

    #[error("Account system error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Account Error: {0}")]
    Account(AccountError),

    #[error("Invitation Error: {0}")]
    Invitation(#[from] InvitationError),
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
}

#[async_trait]
pub trait AccountCreator: Send + Sync {
    async fn create_account(&self, account: NewAccount) -> Result<UserId, AccountError>;

    /// Undo [`AccountCreator::create_account`] for an account whose
    /// invitation could not be redeemed.
    async fn delete_account(&self, user: UserId) -> Result<(), AccountError>;
}

async fn redeem_for(
    service: &InvitationService,
    token: &str,
    user: UserId,
) -> Result<i32, InvitationError> {
    let key = service
        .get_key(token)
        .await?
        .ok_or(InvitationError::KeyNotFound)?;
    service.mark_used(&key, user).await
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered(UserId),
    Invalid(HashMap<String, String>),
}

#[async_trait]
pub trait RegistrationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn signup_template(&self) -> &'static str;

    fn validate(&self, form: &SignupForm) -> Result<(), HashMap<String, String>>;

    fn accounts(&self) -> &dyn AccountCreator;

    fn new_account(&self, form: &SignupForm) -> NewAccount;

    /// Register the account described by `form`. With `invitation_key` set,
    /// one use of that key is redeemed for the new user; if that fails the
    /// account is deleted again and the redemption error returned.
    async fn register(
        &self,
        service: &InvitationService,
        form: &SignupForm,
        invitation_key: Option<&str>,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        if let Err(errors) = self.validate(form) {
            return Ok(RegistrationOutcome::Invalid(errors));
        }

        let user = match self.accounts().create_account(self.new_account(form)).await {
            Ok(user) => user,
            Err(AccountError::UsernameTaken(username)) => {
                let mut errors = HashMap::new();
                errors.insert(
                    "username".to_string(),
                    format!("A user with username {} already exists.", username),
                );
                return Ok(RegistrationOutcome::Invalid(errors));
            }
            Err(e) => return Err(RegistrationError::Account(e)),
        };
        info!(backend = self.name(), user = %user, "Account created");

        if let Some(token) = invitation_key {
            if let Err(e) = redeem_for(service, token, user).await {
                warn!(
                    user = %user,
                    error = %e,
                    "Invitation not redeemed, removing the new account"
                );
                self.accounts()
                    .delete_account(user)
                    .await
                    .map_err(RegistrationError::Account)?;
                return Err(e.into());
            }
        }

        service.on_user_created(user).await?;

        Ok(RegistrationOutcome::Registered(user))
    }
}

/// Username, email, two passwords and a terms-of-service checkbox.
pub struct RegistrationFormBackend {
    accounts: Arc<dyn AccountCreator>,
}

impl RegistrationFormBackend {
    pub fn new(accounts: Arc<dyn AccountCreator>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl RegistrationBackend for RegistrationFormBackend {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn signup_template(&self) -> &'static str {
        REGISTRATION_TEMPLATE
    }

    fn validate(&self, form: &SignupForm) -> Result<(), HashMap<String, String>> {
        validate_registration_form(form)
    }

    fn accounts(&self) -> &dyn AccountCreator {
        self.accounts.as_ref()
    }

    fn new_account(&self, form: &SignupForm) -> NewAccount {
        NewAccount {
            username: form.username.clone(),
            email: form.email.clone(),
            password: form.password1.clone(),
        }
    }
}

/// Username and email only; credentials live with the social provider.
pub struct SocialSignupBackend {
    accounts: Arc<dyn AccountCreator>,
}

impl SocialSignupBackend {
    pub fn new(accounts: Arc<dyn AccountCreator>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl RegistrationBackend for SocialSignupBackend {
    fn name(&self) -> &'static str {
        "social"
    }

    fn signup_template(&self) -> &'static str {
        SOCIAL_SIGNUP_TEMPLATE
    }

    fn validate(&self, form: &SignupForm) -> Result<(), HashMap<String, String>> {
        validate_social_signup_form(form)
    }

    fn accounts(&self) -> &dyn AccountCreator {
        self.accounts.as_ref()
    }

    fn new_account(&self, form: &SignupForm) -> NewAccount {
        NewAccount {
            username: form.username.clone(),
            email: form.email.clone(),
            password: None,
        }
    }
}

pub fn backend_from_config(
    config: &InvitationConfig,
    accounts: Arc<dyn AccountCreator>,
) -> Arc<dyn RegistrationBackend> {
    if config.use_social_signup {
        Arc::new(SocialSignupBackend::new(accounts))
    } else {
        Arc::new(RegistrationFormBackend::new(accounts))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use crate::mail::LogMailer;
    use crate::models::invitation_keys::InvitationKey;
    use crate::store::{InvitationStore, MemoryInvitationStore};
    use crate::templates::BuiltinTemplates;

    use super::*;

    #[derive(Default)]
    struct FakeAccounts {
        created: Mutex<Vec<NewAccount>>,
    }

    #[async_trait]
    impl AccountCreator for FakeAccounts {
        async fn create_account(&self, account: NewAccount) -> Result<UserId, AccountError> {
            let mut created = self.created.lock().unwrap();
            if created.iter().any(|a| a.username == account.username) {
                return Err(AccountError::UsernameTaken(account.username));
            }
            created.push(account);
            Ok(UserId::new())
        }

        async fn delete_account(&self, _: UserId) -> Result<(), AccountError> {
            self.created.lock().unwrap().pop();
            Ok(())
        }
    }

    fn service(store: Arc<MemoryInvitationStore>) -> InvitationService {
        InvitationService::new(
            store,
            Arc::new(LogMailer),
            Arc::new(BuiltinTemplates),
            InvitationConfig::default(),
        )
    }

    fn form() -> SignupForm {
        SignupForm {
            username: "bob".to_string(),
            email: "bob@example.org".to_string(),
            password1: Some("!Q2w3e4r5t".to_string()),
            password2: Some("!Q2w3e4r5t".to_string()),
            tos: true,
        }
    }

    #[test]
    fn config_switch_picks_backend() {
        let accounts: Arc<dyn AccountCreator> = Arc::new(FakeAccounts::default());
        let plain = backend_from_config(&InvitationConfig::default(), accounts.clone());
        assert_eq!(REGISTRATION_TEMPLATE, plain.signup_template());
        let social = backend_from_config(
            &InvitationConfig {
                use_social_signup: true,
                ..InvitationConfig::default()
            },
            accounts,
        );
        assert_eq!(SOCIAL_SIGNUP_TEMPLATE, social.signup_template());
    }

    #[tokio::test]
    async fn register_seeds_quota_and_redeems_key() {
        let store = Arc::new(MemoryInvitationStore::new());
        let service = service(store.clone());
        let inviter = UserId::new();
        service.on_user_created(inviter).await.unwrap();
        let key = service.create_invitation(inviter).await.unwrap();

        let accounts = Arc::new(FakeAccounts::default());
        let backend = RegistrationFormBackend::new(accounts.clone());
        let outcome = backend
            .register(&service, &form(), Some(&key.key))
            .await
            .unwrap();

        let user = match outcome {
            RegistrationOutcome::Registered(user) => user,
            other => panic!("expected registration, got {:?}", other),
        };
        assert_eq!(1, accounts.created.lock().unwrap().len());
        assert_eq!(3, service.remaining_invitations_for(user).await.unwrap());
        let stored = service.get_key(&key.key).await.unwrap().unwrap();
        assert_eq!(0, stored.uses_left);
        assert_eq!(vec![user], service.registrants(&stored).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_form_creates_nothing() {
        let store = Arc::new(MemoryInvitationStore::new());
        let service = service(store.clone());
        let accounts = Arc::new(FakeAccounts::default());
        let backend = RegistrationFormBackend::new(accounts.clone());
        let bad = SignupForm {
            tos: false,
            ..form()
        };
        let outcome = backend.register(&service, &bad, None).await.unwrap();
        assert!(
            matches!(outcome, RegistrationOutcome::Invalid(errors) if errors.contains_key("tos"))
        );
        assert!(accounts.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn taken_username_is_a_form_error() {
        let store = Arc::new(MemoryInvitationStore::new());
        let service = service(store);
        let accounts = Arc::new(FakeAccounts::default());
        let backend = SocialSignupBackend::new(accounts);
        backend.register(&service, &form(), None).await.unwrap();
        let outcome = backend.register(&service, &form(), None).await.unwrap();
        assert!(
            matches!(outcome, RegistrationOutcome::Invalid(errors)
                if errors["username"].contains("already exists"))
        );
    }

    #[tokio::test]
    async fn exhausted_key_removes_the_new_account() {
        let store = Arc::new(MemoryInvitationStore::new());
        let service = service(store.clone());
        let inviter = UserId::new();
        service.on_user_created(inviter).await.unwrap();
        let key = service.create_invitation(inviter).await.unwrap();
        store
            .redeem_key(key.id, UserId::new(), service.now())
            .await
            .unwrap();

        let accounts = Arc::new(FakeAccounts::default());
        let backend = SocialSignupBackend::new(accounts.clone());
        let res = backend.register(&service, &form(), Some(&key.key)).await;
        assert!(matches!(
            res,
            Err(RegistrationError::Invitation(InvitationError::KeyExhausted(_)))
        ));
        assert!(accounts.created.lock().unwrap().is_empty());
    }

    /// Spends the last use of `key` on someone else while the account is
    /// being created, like a concurrent signup with the same link would.
    struct RacingAccounts {
        store: Arc<MemoryInvitationStore>,
        key: InvitationKey,
        live: Mutex<Vec<UserId>>,
    }

    #[async_trait]
    impl AccountCreator for RacingAccounts {
        async fn create_account(&self, _: NewAccount) -> Result<UserId, AccountError> {
            self.store
                .redeem_key(self.key.id, UserId::new(), Utc::now())
                .await
                .unwrap();
            let user = UserId::new();
            self.live.lock().unwrap().push(user);
            Ok(user)
        }

        async fn delete_account(&self, user: UserId) -> Result<(), AccountError> {
            self.live.lock().unwrap().retain(|u| *u != user);
            Ok(())
        }
    }

    #[tokio::test]
    async fn losing_the_last_use_mid_signup_leaves_no_account() {
        let store = Arc::new(MemoryInvitationStore::new());
        let service = service(store.clone());
        let inviter = UserId::new();
        service.on_user_created(inviter).await.unwrap();
        let key = service.create_invitation(inviter).await.unwrap();

        let accounts = Arc::new(RacingAccounts {
            store: store.clone(),
            key: key.clone(),
            live: Mutex::new(vec![]),
        });
        let backend = RegistrationFormBackend::new(accounts.clone());
        let res = backend.register(&service, &form(), Some(&key.key)).await;

        assert!(matches!(
            res,
            Err(RegistrationError::Invitation(InvitationError::KeyExhausted(_)))
        ));
        assert!(accounts.live.lock().unwrap().is_empty());
        assert_eq!(1, service.registrants(&key).await.unwrap().len());
        assert_eq!(1, store.find_all_keys().await.unwrap().len());
    }
}
