use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::employee::EmployeeId;
use crate::error::ValidationError;

/// An attached file, carried inline so the incident can be queued as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Base64 of the file bytes.
    pub content: String,
}

impl Evidence {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            content: BASE64.encode(bytes),
        }
    }

    /// The declared content type, which must be a well-formed `type/subtype`.
    pub fn media_type(&self) -> Result<mime::Mime, ValidationError> {
        self.mime_type.trim().parse().map_err(|e| {
            ValidationError::Evidence(format!("{}: bad content type `{}`: {e}", self.name, self.mime_type))
        })
    }

    pub fn bytes(&self) -> Result<Vec<u8>, ValidationError> {
        let payload = match self.content.split_once(";base64,") {
            // tolerate data URLs
            Some((_, data)) => data,
            None => self.content.as_str(),
        };
        BASE64
            .decode(payload.trim())
            .map_err(|e| ValidationError::Evidence(format!("{}: {e}", self.name)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub employee_id: EmployeeId,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub description: String,
    pub incident_date: NaiveDate,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default = "Uuid::new_v4")]
    pub idempotency_key: Uuid,
}

impl IncidentRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.incident_type.trim().is_empty() {
            return Err(ValidationError::MissingField("type"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        for item in &self.evidence {
            if item.name.trim().is_empty() {
                return Err(ValidationError::Evidence("file without a name".into()));
            }
            item.media_type()?;
            item.bytes()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_accepts_data_urls() {
        let mut evidence = Evidence::from_bytes("photo.jpg", "image/jpeg", b"\xff\xd8abc");
        let raw = evidence.content.clone();
        evidence.content = format!("data:image/jpeg;base64,{raw}");
        assert_eq!(evidence.bytes().unwrap(), b"\xff\xd8abc");
        assert_eq!(evidence.size, 5);
    }

    #[test]
    fn malformed_content_type_is_invalid() {
        let mut incident = IncidentRecord {
            employee_id: EmployeeId(3),
            incident_type: "medical".into(),
            description: "clinic".into(),
            incident_date: NaiveDate::from_ymd_opt(2026, 10, 12).unwrap(),
            evidence: vec![Evidence::from_bytes("note.pdf", "not a mime", b"%PDF")],
            idempotency_key: Uuid::new_v4(),
        };
        assert!(matches!(incident.validate(), Err(ValidationError::Evidence(msg)) if msg.contains("note.pdf")));

        incident.evidence[0].mime_type = "application/pdf".into();
        assert_eq!(incident.validate(), Ok(()));
    }

    #[test]
    fn incident_without_description_is_invalid() {
        let incident = IncidentRecord {
            employee_id: EmployeeId(3),
            incident_type: "medical".into(),
            description: "  ".into(),
            incident_date: NaiveDate::from_ymd_opt(2026, 10, 12).unwrap(),
            evidence: vec![],
            idempotency_key: Uuid::new_v4(),
        };
        assert_eq!(
            incident.validate(),
            Err(ValidationError::MissingField("description"))
        );
    }
}
