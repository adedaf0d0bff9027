use async_trait::async_trait;
use tracing::info;

use super::{check_header, MailError, Mailer};

/// Writes outgoing mail to the log instead of delivering it. Meant for
/// development setups without an SMTP relay.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        from: &str,
        to: &[String],
    ) -> Result<(), MailError> {
        check_header(subject)?;
        if to.is_empty() {
            return Err(MailError::InvalidAddress("no recipients".to_string()));
        }
        info!(from, to = %to.join(", "), subject, "Outgoing mail\n{}", body);
        Ok(())
    }
}
