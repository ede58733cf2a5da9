use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::db::{
    ContactStore, NewContact, PersistenceError, CORREO_MAX, NOMBRE_MAX, TELEFONO_MAX, UUID_MAX,
};
use crate::ip::{resolve_server_ip, IpLookup};
use crate::notify::{EmailSender, Notification, SmsSender, TransportError};

pub const SUCCESS_MESSAGE: &str = "Datos procesados exitosamente";

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub contacto: ContactSubmission,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContactSubmission {
    pub uuid: String,
    pub nombre: String,
    pub correo: String,
    pub telefono: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub message: String,
    pub uuid: String,
    pub server_ip: String,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Persistence(#[from] PersistenceError),
    #[error("{source}")]
    Email {
        uuid: String,
        #[source]
        source: TransportError,
    },
    #[error("{source}")]
    Sms {
        uuid: String,
        #[source]
        source: TransportError,
    },
}

impl SubmitError {
    /// Which step of the flow failed.
    pub fn stage(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "validation",
            SubmitError::Persistence(_) => "persistence",
            SubmitError::Email { .. } => "email",
            SubmitError::Sms { .. } => "sms",
        }
    }

    /// Whether the record was committed before the failure.
    pub fn persisted(&self) -> bool {
        matches!(self, SubmitError::Email { .. } | SubmitError::Sms { .. })
    }
}

/// Runs one submission: persist, look up the server IP, email, then SMS.
pub struct SubmissionHandler {
    store: Arc<dyn ContactStore>,
    ip_lookup: Arc<dyn IpLookup>,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
}

impl SubmissionHandler {
    pub fn new(
        store: Arc<dyn ContactStore>,
        ip_lookup: Arc<dyn IpLookup>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self { store, ip_lookup, email, sms }
    }

    pub async fn handle(&self, sub: ContactSubmission) -> Result<SubmissionResponse, SubmitError> {
        validate(&sub)?;

        let record = self
            .store
            .insert(NewContact {
                uuid: sub.uuid.clone(),
                nombre: sub.nombre.clone(),
                correo: sub.correo.clone(),
                telefono: sub.telefono.clone(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .inspect_err(|e| error!("Failed to persist {}: {e}", sub.uuid))?;
        info!("Stored contact {} as row {}", record.uuid, record.id);

        let server_ip = resolve_server_ip(self.ip_lookup.as_ref()).await;
        let note = Notification {
            name: sub.nombre.clone(),
            external_id: sub.uuid.clone(),
            server_ip: server_ip.clone(),
        };

        // SMS is only attempted once the email went out.
        if let Err(source) = self.email.send(&sub.correo, &note).await {
            error!("Email for {} failed after commit: {source}", sub.uuid);
            return Err(SubmitError::Email { uuid: sub.uuid, source });
        }
        if let Err(source) = self.sms.send(&sub.telefono, &note).await {
            error!("SMS for {} failed after commit: {source}", sub.uuid);
            return Err(SubmitError::Sms { uuid: sub.uuid, source });
        }

        info!("Submission {} processed (server ip {server_ip})", sub.uuid);
        Ok(SubmissionResponse {
            message: SUCCESS_MESSAGE.to_string(),
            uuid: sub.uuid,
            server_ip,
        })
    }
}

fn validate(sub: &ContactSubmission) -> Result<(), SubmitError> {
    let fields = [
        ("uuid", &sub.uuid, UUID_MAX),
        ("nombre", &sub.nombre, NOMBRE_MAX),
        ("correo", &sub.correo, CORREO_MAX),
        ("telefono", &sub.telefono, TELEFONO_MAX),
    ];
    for (name, value, max) in fields {
        if value.trim().is_empty() {
            return Err(SubmitError::Validation(format!("{name} cannot be empty")));
        }
        if value.chars().count() > max {
            return Err(SubmitError::Validation(format!(
                "{name} exceeds {max} characters"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub() -> ContactSubmission {
        ContactSubmission {
            uuid: "abc-123".into(),
            nombre: "Ana".into(),
            correo: "ana@example.com".into(),
            telefono: "+15551234567".into(),
        }
    }

    #[test]
    fn valid_submission_passes() {
        assert!(validate(&sub()).is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut s = sub();
        s.nombre = "   ".into();
        let err = validate(&s).unwrap_err();
        assert_eq!(err.to_string(), "nombre cannot be empty");
        assert_eq!(err.stage(), "validation");
        assert!(!err.persisted());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let mut s = sub();
        s.nombre = "ñ".repeat(NOMBRE_MAX);
        assert!(validate(&s).is_ok());
        s.telefono = "5".repeat(TELEFONO_MAX + 1);
        assert!(matches!(validate(&s), Err(SubmitError::Validation(_))));
    }

    #[test]
    fn response_uses_camel_case_server_ip() {
        let resp = SubmissionResponse {
            message: SUCCESS_MESSAGE.into(),
            uuid: "abc-123".into(),
            server_ip: "Unknown".into(),
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["serverIp"], "Unknown");
        assert_eq!(v["message"], "Datos procesados exitosamente");
    }
}
