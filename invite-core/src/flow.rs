//! Request flows for invitation-gated registration.
//!
//! Handlers here are independent of the web framework. Each returns a
//! [`FlowResponse`] naming the template to render (with a typed context) or
//! the location to redirect to. User-facing problems travel as flags in the
//! context; only infrastructure failures come back as [`FlowError`].

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::forms::{validate_invitation_form, InvitationForm, SignupForm};
use crate::models::{invitation_keys::KeyState, users::Inviter};
use crate::registration::{RegistrationBackend, RegistrationError, RegistrationOutcome};
use crate::services::{InvitationError, InvitationService};
use crate::session::Session;
use crate::templates::{
    INVITATION_COMPLETE_TEMPLATE, INVITATION_FORM_TEMPLATE, INVITED_TEMPLATE, WRONG_KEY_TEMPLATE,
};

pub const INVITE_URL: &str = "/invite/";
pub const INVITE_COMPLETE_URL: &str = "/invite/complete/";
pub const REGISTER_URL: &str = "/register/";
pub const REGISTER_COMPLETE_URL: &str = "/register/complete/";
pub const LOGIN_URL: &str = "/accounts/login/";

pub fn invited_url(token: &str) -> String {
    format!("/invited/{}/", token)
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error(transparent)]
    Registration(RegistrationError),
}

impl From<RegistrationError> for FlowError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::Invitation(e) => FlowError::Invitation(e),
            other => FlowError::Registration(other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageContext {
    pub invitation_key: Option<String>,
    pub no_key: bool,
    pub invalid_key: bool,
    pub expired_key: bool,
    pub no_uses_left_key: bool,
    pub remaining_invitations: Option<i32>,
    pub email_preview: Option<String>,
    pub form_errors: HashMap<String, String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub template: &'static str,
    pub context: PageContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResponse {
    Render(Page),
    Redirect(String),
}

impl FlowResponse {
    fn render(template: &'static str, context: PageContext) -> Self {
        FlowResponse::Render(Page { template, context })
    }
}

/// A hit on the registration page.
#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    /// Token supplied with the request, from the query string or form.
    pub invitation_key: Option<String>,
    /// Submitted signup form; `None` when the page is only displayed.
    pub form: Option<SignupForm>,
}

#[derive(Clone)]
pub struct FlowController {
    service: InvitationService,
    backend: Arc<dyn RegistrationBackend>,
}

fn supplied(token: Option<&str>) -> Option<&str> {
    token.map(str::trim).filter(|t| !t.is_empty())
}

impl FlowController {
    pub fn new(service: InvitationService, backend: Arc<dyn RegistrationBackend>) -> Self {
        Self { service, backend }
    }

    pub fn service(&self) -> &InvitationService {
        &self.service
    }

    /// Landing page of an invitation link.
    pub async fn invited(
        &self,
        session: &mut dyn Session,
        invitation_key: Option<&str>,
    ) -> Result<FlowResponse, FlowError> {
        if !self.service.config().invite_mode {
            return Ok(FlowResponse::Redirect(REGISTER_URL.to_string()));
        }

        let token = supplied(invitation_key);
        let mut context = PageContext {
            invitation_key: token.map(|t| t.to_string()),
            ..PageContext::default()
        };

        let template = match token {
            None => {
                context.no_key = true;
                WRONG_KEY_TEMPLATE
            }
            Some(token) => match self.service.get_key(token).await? {
                None => {
                    context.invalid_key = true;
                    WRONG_KEY_TEMPLATE
                }
                Some(key) => match key.state(self.service.now()) {
                    KeyState::Usable => INVITED_TEMPLATE,
                    KeyState::Expired => {
                        context.expired_key = true;
                        WRONG_KEY_TEMPLATE
                    }
                    KeyState::Exhausted => {
                        context.no_uses_left_key = true;
                        WRONG_KEY_TEMPLATE
                    }
                },
            },
        };

        session.set_invitation_key(token);
        debug!(template, "Invited page");
        Ok(FlowResponse::render(template, context))
    }

    /// Registration page. With invite mode on, nothing reaches the backend
    /// without a valid key.
    pub async fn register(&self, request: RegistrationRequest) -> Result<FlowResponse, FlowError> {
        if !self.service.config().invite_mode {
            return self.delegate(request.form, None).await;
        }

        let token = match supplied(request.invitation_key.as_deref()) {
            Some(token) => token.to_string(),
            None => {
                let context = PageContext {
                    no_key: true,
                    ..PageContext::default()
                };
                return Ok(FlowResponse::render(WRONG_KEY_TEMPLATE, context));
            }
        };

        if !self.service.is_key_valid(&token).await? {
            return Ok(self.wrong_key(token));
        }

        match self.delegate(request.form, Some(token.clone())).await {
            Err(FlowError::Invitation(
                InvitationError::KeyExhausted(_)
                | InvitationError::KeyExpired(_)
                | InvitationError::KeyNotFound,
            )) => Ok(self.wrong_key(token)),
            other => other,
        }
    }

    fn wrong_key(&self, token: String) -> FlowResponse {
        let context = PageContext {
            invitation_key: Some(token),
            invalid_key: true,
            ..PageContext::default()
        };
        FlowResponse::render(WRONG_KEY_TEMPLATE, context)
    }

    async fn delegate(
        &self,
        form: Option<SignupForm>,
        invitation_key: Option<String>,
    ) -> Result<FlowResponse, FlowError> {
        let mut context = PageContext {
            invitation_key: invitation_key.clone(),
            ..PageContext::default()
        };
        let form = match form {
            Some(form) => form,
            None => return Ok(FlowResponse::render(self.backend.signup_template(), context)),
        };

        let outcome = self
            .backend
            .register(&self.service, &form, invitation_key.as_deref())
            .await?;
        match outcome {
            RegistrationOutcome::Registered(_) => {
                Ok(FlowResponse::Redirect(REGISTER_COMPLETE_URL.to_string()))
            }
            RegistrationOutcome::Invalid(errors) => {
                context.form_errors = errors;
                context.email = Some(form.email);
                Ok(FlowResponse::render(self.backend.signup_template(), context))
            }
        }
    }

    /// Invite-send page for the signed-in `user`.
    pub async fn invite(
        &self,
        user: Option<&Inviter>,
        form: Option<InvitationForm>,
    ) -> Result<FlowResponse, FlowError> {
        let user = match user {
            Some(user) => user,
            None => {
                return Ok(FlowResponse::Redirect(format!(
                    "{}?next={}",
                    LOGIN_URL, INVITE_URL
                )))
            }
        };

        let remaining = self.service.remaining_invitations_for(user.id).await?;
        let mut context = PageContext::default();

        if let Some(form) = form {
            match validate_invitation_form(&form, remaining, &user.email) {
                Ok(()) => {
                    let key = self.service.create_invitation(user.id).await?;
                    self.service
                        .send_invitation(&key, user, form.email.trim())
                        .await?;
                    return Ok(FlowResponse::Redirect(INVITE_COMPLETE_URL.to_string()));
                }
                Err(errors) => {
                    context.form_errors = errors;
                    context.email = Some(form.email);
                }
            }
        }

        context.remaining_invitations = Some(remaining);
        context.email_preview = Some(self.service.render_email_preview(user)?);
        Ok(FlowResponse::render(INVITATION_FORM_TEMPLATE, context))
    }

    pub fn invitation_complete(&self) -> FlowResponse {
        FlowResponse::render(INVITATION_COMPLETE_TEMPLATE, PageContext::default())
    }
}
