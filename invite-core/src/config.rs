//! Settings recognized by the invitation flow.
//!
//! Values come from the process environment, e.g. `INVITE_MODE=true`.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::common::{add_field_error, hash_map_from_validation_errors, hash_map_to_string};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {}", hash_map_to_string(.0))]
    Invalid(HashMap<String, String>),
}

/// Longest key lifetime accepted from configuration, about a century.
pub const MAX_INVITATION_DAYS: i32 = 36500;

fn default_invitation_days() -> i32 {
    7
}

fn default_invitations_per_user() -> i32 {
    3
}

fn default_from_email() -> String {
    "webmaster@localhost".to_string()
}

fn default_site() -> String {
    "example.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvitationConfig {
    /// Lifetime of new keys in days, `-1` for keys that never expire.
    #[serde(default = "default_invitation_days")]
    pub account_invitation_days: i32,

    /// Quota seeded into a user's record on first use.
    #[serde(default = "default_invitations_per_user")]
    pub invitations_per_user: i32,

    /// Require a valid invitation key to register.
    #[serde(default)]
    pub invite_mode: bool,

    /// Register through the social signup backend instead of the plain
    /// registration form.
    #[serde(default)]
    pub use_social_signup: bool,

    #[serde(default = "default_from_email")]
    pub default_from_email: String,

    #[serde(default = "default_site")]
    pub site_name: String,

    #[serde(default = "default_site")]
    pub site_domain: String,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        InvitationConfig {
            account_invitation_days: default_invitation_days(),
            invitations_per_user: default_invitations_per_user(),
            invite_mode: false,
            use_social_signup: false,
            default_from_email: default_from_email(),
            site_name: default_site(),
            site_domain: default_site(),
        }
    }
}

impl InvitationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::checked(envy::from_env::<InvitationConfig>()?)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::checked(envy::from_iter::<_, InvitationConfig>(vars)?)
    }

    fn checked(config: InvitationConfig) -> Result<Self, ConfigError> {
        let mut errors = ValidationErrors::new();
        if config.account_invitation_days < -1 {
            add_field_error(
                &mut errors,
                "account_invitation_days",
                "range",
                "must be -1 (never expires) or a number of days",
            );
        } else if config.account_invitation_days > MAX_INVITATION_DAYS {
            add_field_error(
                &mut errors,
                "account_invitation_days",
                "range",
                "must not exceed 36500 days",
            );
        }
        if config.invitations_per_user < 0 {
            add_field_error(
                &mut errors,
                "invitations_per_user",
                "range",
                "must not be negative",
            );
        }
        if errors.errors().is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(hash_map_from_validation_errors(&errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = InvitationConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(7, config.account_invitation_days);
        assert_eq!(3, config.invitations_per_user);
        assert!(!config.invite_mode);
        assert!(!config.use_social_signup);
        assert_eq!("webmaster@localhost", config.default_from_email);
    }

    #[test]
    fn reads_switches_and_numbers() {
        let config = InvitationConfig::from_vars(vars(&[
            ("INVITE_MODE", "true"),
            ("USE_SOCIAL_SIGNUP", "true"),
            ("ACCOUNT_INVITATION_DAYS", "-1"),
            ("INVITATIONS_PER_USER", "10"),
            ("SITE_NAME", "Example Wiki"),
        ]))
        .unwrap();
        assert!(config.invite_mode);
        assert!(config.use_social_signup);
        assert_eq!(-1, config.account_invitation_days);
        assert_eq!(10, config.invitations_per_user);
        assert_eq!("Example Wiki", config.site_name);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let res = InvitationConfig::from_vars(vars(&[
            ("ACCOUNT_INVITATION_DAYS", "-2"),
            ("INVITATIONS_PER_USER", "-1"),
        ]));
        match res {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors.contains_key("account_invitation_days"));
                assert!(errors.contains_key("invitations_per_user"));
            }
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn caps_key_lifetime() {
        let days = MAX_INVITATION_DAYS.to_string();
        let config =
            InvitationConfig::from_vars(vars(&[("ACCOUNT_INVITATION_DAYS", days.as_str())]))
                .unwrap();
        assert_eq!(MAX_INVITATION_DAYS, config.account_invitation_days);

        let res = InvitationConfig::from_vars(vars(&[("ACCOUNT_INVITATION_DAYS", "2147483647")]));
        match res {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors["account_invitation_days"].contains("36500"))
            }
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let res = InvitationConfig::from_vars(vars(&[("INVITATIONS_PER_USER", "lots")]));
        assert!(matches!(res, Err(ConfigError::Env(_))));
    }
}
