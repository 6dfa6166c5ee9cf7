use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use crate::config::MailConfig;

mod templates;

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Builds and sends the library's notifications. Delivery failures are
/// logged and dropped; callers never see them.
#[derive(Clone)]
pub struct Notifier {
    mailer: std::sync::Arc<dyn Mailer>,
    frontend_url: String,
}

impl Notifier {
    pub fn new(mailer: std::sync::Arc<dyn Mailer>, frontend_url: &str) -> Self {
        Self {
            mailer,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    async fn deliver(&self, email: Email, kind: &'static str) {
        let to = email.to.clone();
        if let Err(e) = self.mailer.send(email).await {
            tracing::warn!(error = %e, %to, kind, "notification not delivered");
        }
    }

    pub async fn send_refund_notice(&self, email: &str, title: &str, amount: f64) {
        self.deliver(templates::refund_notice(email, title, amount), "refund")
            .await;
    }

    pub async fn send_welcome(&self, email: &str, name: &str) {
        self.deliver(templates::welcome(email, name), "welcome").await;
    }

    pub async fn send_password_reset(&self, email: &str, reset_token: &str) {
        let link = format!("{}/forgot_password?token={}", self.frontend_url, reset_token);
        self.deliver(templates::password_reset(email, &link), "password_reset")
            .await;
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .context("smtp relay")?
            .port(cfg.smtp_port);
        if !cfg.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.smtp_username.clone(),
                cfg.smtp_password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("parse from address")?)
            .to(email.to.parse().context("parse recipient")?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .context("build message")?;
        self.transport.send(message).await.context("smtp send")?;
        debug!(to = %email.to, "mail sent");
        Ok(())
    }
}
