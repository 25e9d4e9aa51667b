//! Outgoing mail
//!
//! [`SmtpMailer`] relays through the configured SMTP server with lettre.
//! [`LogMailer`] writes messages to the log and is used when no SMTP host
//! is configured.

use crate::config::MailConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// A plain-text message
#[derive(Debug, Clone, PartialEq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Something that can deliver a [`Mail`]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<()>;
}

/// Mailer chosen from config: SMTP when a host is set, log otherwise
pub fn mailer_from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match config.smtp_host.as_deref().filter(|h| !h.is_empty()) {
        Some(_) => Arc::new(SmtpMailer::new(config.clone())),
        None => Arc::new(LogMailer),
    }
}

pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_deref()
            .ok_or_else(|| anyhow!("SMTP host not configured"))?;

        let email = Message::builder()
            .from(
                self.config
                    .from
                    .parse()
                    .map_err(|e| anyhow!("Invalid from address: {}", e))?,
            )
            .to(mail.to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(self.config.smtp_port);
        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        builder
            .build()
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        Ok(())
    }
}

/// Logs outgoing mail instead of sending it
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail (not sent, SMTP unconfigured):\n{}", mail.body);
        Ok(())
    }
}

/// Keeps sent mail in memory for assertions
#[cfg(test)]
#[derive(Default)]
pub struct MemoryMailer {
    pub sent: std::sync::Mutex<Vec<Mail>>,
}

#[cfg(test)]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}
