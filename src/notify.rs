//! Outbound notifications for an accepted contact.
//!
//! Both channels carry the same three-line body. Sends are attempted once:
//! there is no retry, backoff or delivery tracking.

use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{header, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{SmtpConfig, TwilioConfig};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid email address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP send failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("SMS request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SMS provider rejected message ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
}

/// What both channels report about a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub name: String,
    pub external_id: String,
    pub server_ip: String,
}

impl Notification {
    pub fn body(&self) -> String {
        format!(
            "Nombre: {}\nUUID: {}\nIP: {}",
            self.name, self.external_id, self.server_ip
        )
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, note: &Notification) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, note: &Notification) -> Result<(), TransportError>;
}

pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Address,
    subject: String,
}

impl SmtpEmailSender {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        Ok(Self {
            mailer: build_mailer(cfg)?,
            from: parse_address(&cfg.from)?,
            subject: cfg.subject.clone(),
        })
    }

    fn message(&self, to: &str, note: &Notification) -> Result<Message, TransportError> {
        let email = Message::builder()
            .from(Mailbox::new(None, self.from.clone()))
            .to(Mailbox::new(None, parse_address(to)?))
            .subject(self.subject.as_str())
            .header(header::ContentType::TEXT_PLAIN)
            .body(note.body())?;
        Ok(email)
    }
}

fn build_mailer(cfg: &SmtpConfig) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
    // Be tolerant of spaces pasted into the app password
    let creds = Credentials::new(cfg.username.clone(), cfg.password.replace(' ', ""));
    let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.server)?
        .port(cfg.port)
        .credentials(creds)
        .build();
    Ok(mailer)
}

fn parse_address(address: &str) -> Result<Address, TransportError> {
    address.trim().parse().map_err(|source| TransportError::Address {
        address: address.to_string(),
        source,
    })
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, note: &Notification) -> Result<(), TransportError> {
        let email = self.message(to, note)?;
        self.mailer.send(email).await?;
        info!("Email sent to {to} for {}", note.external_id);
        Ok(())
    }
}

/// Sends SMS through the Twilio Messages REST endpoint.
pub struct TwilioSmsSender {
    http: Client,
    cfg: TwilioConfig,
}

impl TwilioSmsSender {
    pub fn new(http: Client, cfg: TwilioConfig) -> Self {
        Self { http, cfg }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send(&self, to: &str, note: &Notification) -> Result<(), TransportError> {
        let body = note.body();
        let resp = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.cfg.account_sid, Some(&self.cfg.auth_token))
            .form(&[
                ("To", to),
                ("From", self.cfg.from_phone.as_str()),
                ("Body", body.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Rejected { status, body });
        }
        debug!("Twilio accepted message ({status})");
        info!("SMS sent to {to} for {}", note.external_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note() -> Notification {
        Notification {
            name: "Ana".into(),
            external_id: "abc-123".into(),
            server_ip: "10.1.2.3".into(),
        }
    }

    fn smtp_cfg() -> SmtpConfig {
        SmtpConfig {
            username: "relay@example.com".into(),
            password: "abcd efgh".into(),
            from: "relay@example.com".into(),
            server: "smtp.example.com".into(),
            port: 587,
            subject: "Notificación de Registro".into(),
        }
    }

    #[test]
    fn body_is_three_lines() {
        assert_eq!(note().body(), "Nombre: Ana\nUUID: abc-123\nIP: 10.1.2.3");
    }

    #[tokio::test]
    async fn email_message_carries_subject_and_body() {
        let sender = SmtpEmailSender::new(&smtp_cfg()).unwrap();
        let msg = sender.message("ana@example.com", &note()).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("To: ana@example.com"));
        assert!(raw.contains("Nombre: Ana"));
        assert!(raw.contains("UUID: abc-123"));
    }

    #[tokio::test]
    async fn bad_recipient_is_an_address_error() {
        let sender = SmtpEmailSender::new(&smtp_cfg()).unwrap();
        let err = sender.message("not an address", &note()).unwrap_err();
        assert!(matches!(err, TransportError::Address { .. }));
    }

    #[test]
    fn messages_url_includes_account() {
        let sender = TwilioSmsSender::new(
            Client::new(),
            TwilioConfig {
                account_sid: "AC123".into(),
                auth_token: "t".into(),
                from_phone: "+15550000000".into(),
                api_base: "https://api.twilio.com/".into(),
            },
        );
        assert_eq!(
            sender.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }
}
