//! SMTP delivery of lending reminders

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    models::{LoanNotice, OverdueItem, ReminderKind},
};

use super::{
    notifier::{Notifier, NotifyError},
    templates::{self, RenderedEmail},
};

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("SMTP credentials missing, reminder emails will not be sent");
        }
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn build_message(&self, to: &str, email: &RenderedEmail) -> Result<Message, NotifyError> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("BookLend");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| NotifyError::InvalidAddress {
                address: self.config.smtp_from.clone(),
                reason: e.to_string(),
            })?;

        let to_mailbox = Mailbox::from_str(to).map_err(|e| NotifyError::InvalidAddress {
            address: to.to_string(),
            reason: e.to_string(),
        })?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )
            .map_err(|e| NotifyError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<SmtpTransport, NotifyError> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| NotifyError::Transport(e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(builder.build())
    }

    async fn send_email(&self, to: &str, email: RenderedEmail) -> Result<(), NotifyError> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured);
        }

        let message = self.build_message(to, &email)?;
        let mailer = self.transport()?;

        // lettre's SmtpTransport blocks on network I/O
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        tracing::info!(to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn send_single(
        &self,
        to: &str,
        kind: ReminderKind,
        notice: &LoanNotice,
    ) -> Result<(), NotifyError> {
        let email = match kind {
            ReminderKind::Upcoming => templates::upcoming_due(notice),
            ReminderKind::Overdue => templates::overdue(notice),
        };
        self.send_email(to, email).await
    }

    async fn send_digest(&self, to: &str, items: &[OverdueItem]) -> Result<(), NotifyError> {
        self.send_email(to, templates::overdue_digest(items)).await
    }
}
