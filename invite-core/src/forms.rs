//! Submitted forms and their validation.

use std::collections::HashMap;

use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crate::common::{add_field_error, hash_map_from_validation_errors};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct InvitationForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

/// Validate an invite-send form for an inviter with `remaining_invitations`
/// left whose own address is `user_email`.
pub fn validate_invitation_form(
    form: &InvitationForm,
    remaining_invitations: i32,
    user_email: &str,
) -> Result<(), HashMap<String, String>> {
    let mut errors = form.validate().err().unwrap_or_else(ValidationErrors::new);
    if remaining_invitations <= 0 {
        add_field_error(
            &mut errors,
            "email",
            "no_invitations_left",
            "Sorry, you don't have any invitations left.",
        );
    }
    if form.email.trim().eq_ignore_ascii_case(user_email.trim()) {
        add_field_error(
            &mut errors,
            "email",
            "self_invitation",
            "You can't send an invitation to yourself.",
        );
    }
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(hash_map_from_validation_errors(&errors))
    }
}

/// Every field either registration backend may read. Each backend checks
/// only the fields it uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password1: Option<String>,
    pub password2: Option<String>,
    #[serde(default)]
    pub tos: bool,
}

#[derive(Debug, Validate)]
struct RegistrationFields {
    #[validate(length(min = 1, max = 30, message = "username_between_1_and_30_chars"))]
    username: String,
    #[validate(email(message = "Enter a valid email address."))]
    email: String,
    #[validate(length(min = 8, message = "password_at_least_8_chars"))]
    password1: String,
}

#[derive(Debug, Validate)]
struct SocialSignupFields {
    #[validate(length(min = 1, max = 30, message = "username_between_1_and_30_chars"))]
    username: String,
    #[validate(email(message = "Enter a valid email address."))]
    email: String,
}

/// Checks for the plain registration form: username, email, matching
/// passwords and accepted terms of service.
pub fn validate_registration_form(form: &SignupForm) -> Result<(), HashMap<String, String>> {
    let password1 = form.password1.clone().unwrap_or_default();
    let fields = RegistrationFields {
        username: form.username.clone(),
        email: form.email.clone(),
        password1,
    };
    let mut errors = fields.validate().err().unwrap_or_else(ValidationErrors::new);
    if form.password2.as_deref().unwrap_or("") != fields.password1 {
        add_field_error(
            &mut errors,
            "password2",
            "password_mismatch",
            "The two password fields didn't match.",
        );
    }
    if !form.tos {
        add_field_error(
            &mut errors,
            "tos",
            "tos_required",
            "You must agree to the terms to register.",
        );
    }
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(hash_map_from_validation_errors(&errors))
    }
}

/// Checks for the social signup form: username and email only.
pub fn validate_social_signup_form(form: &SignupForm) -> Result<(), HashMap<String, String>> {
    let fields = SocialSignupFields {
        username: form.username.clone(),
        email: form.email.clone(),
    };
    fields
        .validate()
        .map_err(|e| hash_map_from_validation_errors(&e))
}
