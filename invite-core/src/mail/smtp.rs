use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{check_header, MailError, Mailer};

fn default_smtp_port() -> u16 {
    587
}

/// Relay settings, read from `SMTP_*` variables by the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        let SmtpSettings {
            host,
            port,
            username,
            password,
            tls,
        } = settings;

        let mut builder = if tls {
            let tls_params = TlsParameters::new(host.clone()).map_err(|e| {
                MailError::InvalidConfig(format!("TLS configuration error: {}", e))
            })?;

            // 465 is implicit TLS, anything else negotiates STARTTLS
            if port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                    .map_err(|e| MailError::InvalidConfig(format!("SMTP relay error: {}", e)))?
                    .port(port)
                    .tls(Tls::Wrapper(tls_params))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                    .map_err(|e| MailError::InvalidConfig(format!("SMTP relay error: {}", e)))?
                    .port(port)
                    .tls(Tls::Required(tls_params))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host).port(port)
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
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

        let sender: Mailbox = from
            .parse()
            .map_err(|_| MailError::InvalidAddress(from.to_string()))?;
        let mut builder = Message::builder()
            .from(sender)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|_| MailError::InvalidAddress(recipient.clone()))?;
            builder = builder.to(mailbox);
        }
        let message = builder
            .body(body.to_string())
            .map_err(|e| MailError::SendFailed(format!("Failed to build message: {}", e)))?;

        match self.transport.send(message).await {
            Ok(_) => {
                debug!(to = %to.join(", "), "Mail sent");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "SMTP delivery failed");
                Err(MailError::SendFailed(e.to_string()))
            }
        }
    }
}
