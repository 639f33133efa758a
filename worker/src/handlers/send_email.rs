use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::dtos::{ActionMessage, ActionPayload, ActionType, EmailSecret, EmailTemplate};
use db::EventResourceStore;
use lettre::address::{Address, Envelope};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{resolve_email, ActionError, ActionHandler};

const IMPLICIT_TLS_PORT: u16 = 465;

/// A fully rendered RFC 5322 message plus its SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub recipients: Vec<String>,
    pub message: Vec<u8>,
}

/// Renders `template` for `to`. Cc addresses appear in the headers, Bcc
/// addresses only in the envelope.
pub fn compose_email(
    template: &EmailTemplate,
    to: &str,
    smtp_host: &str,
    now: DateTime<Utc>,
) -> OutgoingEmail {
    let reply_to = template
        .reply_to
        .as_deref()
        .filter(|reply_to| !reply_to.trim().is_empty())
        .unwrap_or(&template.from);

    let mut headers = vec![
        format!("Subject: {}", template.subject),
        format!("From: {}", template.from),
        format!("To: {to}"),
    ];

    if !template.cc.is_empty() {
        headers.push(format!("Cc: {}", template.cc.join(", ")));
    }

    headers.push(format!("Reply-To: {reply_to}"));
    headers.push(format!("Date: {}", now.to_rfc2822()));
    headers.push(format!("Message-ID: <{}@{smtp_host}>", Uuid::new_v4()));
    headers.push("MIME-Version: 1.0".to_string());

    let body = if template.is_html {
        headers.push("Content-Type: text/html; charset=\"UTF-8\"".to_string());
        format!("<html><body>{}</body></html>", template.body)
    } else {
        headers.push("Content-Type: text/plain; charset=\"UTF-8\"".to_string());
        template.body.clone()
    };

    let message = format!("{}\r\n\r\n{body}", headers.join("\r\n"));

    let recipients = std::iter::once(to.to_string())
        .chain(template.cc.iter().cloned())
        .chain(template.bcc.iter().cloned())
        .collect();

    OutgoingEmail {
        from: template.from.clone(),
        recipients,
        message: message.into_bytes(),
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, secret: &EmailSecret, email: &OutgoingEmail) -> Result<(), ActionError>;
}

/// Delivers through the event's own SMTP server. Port 465 uses implicit
/// TLS, every other port STARTTLS.
pub struct SmtpMailer;

fn parse_address(raw: &str) -> Result<Address, ActionError> {
    raw.parse::<Mailbox>()
        .map(|mailbox| mailbox.email)
        .map_err(|error| ActionError::InvalidAddress(raw.to_string(), error.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, secret: &EmailSecret, email: &OutgoingEmail) -> Result<(), ActionError> {
        let from = parse_address(&email.from)?;
        let recipients = email
            .recipients
            .iter()
            .map(|recipient| parse_address(recipient))
            .collect::<Result<Vec<_>, _>>()?;
        let envelope = Envelope::new(Some(from), recipients)
            .map_err(|error| ActionError::InvalidAddress(email.from.clone(), error.to_string()))?;

        let builder = if secret.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&secret.smtp_server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&secret.smtp_server)
        };
        let builder = builder.map_err(|error| ActionError::Smtp(error.to_string()))?;

        let transport = builder
            .port(secret.port)
            .credentials(Credentials::new(
                secret.username.clone(),
                secret.password.clone(),
            ))
            .build();

        transport
            .send_raw(&envelope, &email.message)
            .await
            .map_err(|error| ActionError::Smtp(error.to_string()))?;

        Ok(())
    }
}

pub struct SendEmailHandler {
    store: Arc<dyn EventResourceStore>,
    mailer: Arc<dyn Mailer>,
}

impl SendEmailHandler {
    pub fn new(store: Arc<dyn EventResourceStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }
}

#[async_trait]
impl ActionHandler for SendEmailHandler {
    async fn handle_action(&self, action: &ActionMessage) -> Result<(), ActionError> {
        let ActionPayload::SendEmail {
            email_template_id,
            event_id,
            email_field_id,
        } = &action.payload
        else {
            return Err(ActionError::WrongActionType(ActionType::SendEmail));
        };

        let secret = self
            .store
            .get_event_secrets(*event_id)
            .await?
            .and_then(|secrets| secrets.email)
            .ok_or(ActionError::RequiredSecretNotFound)?;

        let template = self
            .store
            .get_email_template(*email_template_id)
            .await?
            .filter(|template| template.event_id == *event_id)
            .ok_or(ActionError::EmailTemplateNotFound)?;

        let to = resolve_email(&action.data, email_field_id)?;
        let email = compose_email(&template, &to, &secret.smtp_server, Utc::now());

        self.mailer.send(&secret, &email).await?;
        info!("Sent email {} to {to} for run {}", template.name, action.pipeline_run_id);

        Ok(())
    }
}
