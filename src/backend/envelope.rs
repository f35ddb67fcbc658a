use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::TransportError;

/// `{"status": "success" | "error", "data": .., "error": ..}`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<Option<T>, TransportError> {
        if self.status == "success" {
            Ok(self.data)
        } else {
            Err(TransportError::Rejected(
                self.error.unwrap_or_else(|| format!("status `{}`", self.status)),
            ))
        }
    }
}

/// Non-2xx and non-success envelopes both become errors.
pub(crate) async fn read_envelope<T: DeserializeOwned>(
    response: Response,
) -> Result<Option<T>, TransportError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or(body);
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str::<Envelope<T>>(&body)
        .map_err(|e| TransportError::Decode(e.to_string()))?
        .into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_is_a_rejection() {
        let envelope: Envelope<u32> =
            serde_json::from_str(r#"{"status":"error","error":"duplicate entry"}"#).unwrap();
        match envelope.into_result() {
            Err(TransportError::Rejected(msg)) => assert_eq!(msg, "duplicate entry"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn success_may_omit_data() {
        let envelope: Envelope<u32> = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap(), None);
    }

    /// Payload types need not implement `Default`.
    #[derive(Debug, Deserialize, PartialEq)]
    struct Body {
        id: u32,
    }

    #[test]
    fn payload_without_default_is_read() {
        let envelope: Envelope<Body> =
            serde_json::from_str(r#"{"status":"success","data":{"id":9}}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap(), Some(Body { id: 9 }));

        let empty: Envelope<Body> = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(empty.into_result().unwrap(), None);
    }
}
