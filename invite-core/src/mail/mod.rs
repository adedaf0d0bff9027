//! Mail transport boundary.

mod log;
mod smtp;

pub use self::log::LogMailer;
pub use self::smtp::{SmtpMailer, SmtpSettings};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Header contains a line break: {0}")]
    BadHeader(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        from: &str,
        to: &[String],
    ) -> Result<(), MailError>;
}

/// Reject subjects that would smuggle extra headers into the message.
pub(crate) fn check_header(value: &str) -> Result<(), MailError> {
    if value.contains('\n') || value.contains('\r') {
        Err(MailError::BadHeader(value.to_string()))
    } else {
        Ok(())
    }
}
