//! Template names and the built-in invitation email templates.

use serde::Serialize;
use thiserror::Error;

pub const INVITATION_EMAIL_SUBJECT: &str = "invitation/invitation_email_subject.txt";
pub const INVITATION_EMAIL_BODY: &str = "invitation/invitation_email.txt";

pub const INVITED_TEMPLATE: &str = "invitation/invited.html";
pub const WRONG_KEY_TEMPLATE: &str = "invitation/wrong_invitation_key.html";
pub const INVITATION_FORM_TEMPLATE: &str = "invitation/invitation_form.html";
pub const INVITATION_COMPLETE_TEMPLATE: &str = "invitation/invitation_complete.html";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Failed to render {0}: {1}")]
    Failed(String, String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Site {
    pub name: String,
    pub domain: String,
}

/// Context handed to the invitation email templates. `invitation_key` is
/// `None` when rendering the preview shown on the invite form.
#[derive(Debug, Clone, Serialize)]
pub struct EmailContext {
    pub invitation_key: Option<String>,
    pub expiration_days: i32,
    pub from_user: String,
    pub site: Site,
}

impl EmailContext {
    pub fn invitation_url(&self) -> String {
        match &self.invitation_key {
            Some(key) => format!("http://{}/invited/{}/", self.site.domain, key),
            None => format!("http://{}/invited/<invitation key>/", self.site.domain),
        }
    }
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, context: &EmailContext) -> Result<String, RenderError>;
}

/// Plain-text templates compiled into the crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    fn subject(context: &EmailContext) -> String {
        format!(
            "[{}] {} has invited you\n",
            context.site.name, context.from_user
        )
    }

    fn body(context: &EmailContext) -> String {
        let validity = if context.expiration_days < 0 {
            "This invitation does not expire.".to_string()
        } else {
            format!(
                "This invitation is valid for {} days.",
                context.expiration_days
            )
        };
        format!(
            r#"Hello,

{from_user} has invited you to join {site}.

To create your account, visit:

{url}

{validity}

--
The {site} team
"#,
            from_user = context.from_user,
            site = context.site.name,
            url = context.invitation_url(),
            validity = validity,
        )
    }
}

impl TemplateRenderer for BuiltinTemplates {
    fn render(&self, name: &str, context: &EmailContext) -> Result<String, RenderError> {
        match name {
            INVITATION_EMAIL_SUBJECT => Ok(Self::subject(context)),
            INVITATION_EMAIL_BODY => Ok(Self::body(context)),
            other => Err(RenderError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(key: Option<&str>, days: i32) -> EmailContext {
        EmailContext {
            invitation_key: key.map(|k| k.to_string()),
            expiration_days: days,
            from_user: "alice".to_string(),
            site: Site {
                name: "Example".to_string(),
                domain: "example.org".to_string(),
            },
        }
    }

    #[test]
    fn body_links_to_the_key() {
        let body = BuiltinTemplates
            .render(INVITATION_EMAIL_BODY, &context(Some("abc123"), 7))
            .unwrap();
        assert!(body.contains("http://example.org/invited/abc123/"));
        assert!(body.contains("alice has invited you to join Example."));
        assert!(body.contains("valid for 7 days"));
    }

    #[test]
    fn preview_body_has_placeholder_link() {
        let body = BuiltinTemplates
            .render(INVITATION_EMAIL_BODY, &context(None, -1))
            .unwrap();
        assert!(body.contains("/invited/<invitation key>/"));
        assert!(body.contains("does not expire"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        let res = BuiltinTemplates.render("invitation/missing.txt", &context(None, 7));
        assert!(
            matches!(res, Err(RenderError::NotFound(name)) if name == "invitation/missing.txt")
        );
    }
}
