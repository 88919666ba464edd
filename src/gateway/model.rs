use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Responses arrive either bare or wrapped as `{"data": ...}`.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

/// Decode a response body, unwrapping a `data` envelope when present.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str::<Envelope<T>>(body).map(Envelope::into_inner)
}

/// Decode a single record that must carry a non-empty `identity` field,
/// unwrapping a `data` envelope when present. Acknowledgements such as
/// `{"success": true, "message": "..."}` are rejected.
pub fn decode_record<T: DeserializeOwned>(
    body: &str,
    identity: &str,
) -> Result<T, serde_json::Error> {
    let mut value: Value = serde_json::from_str(body)?;
    if let Some(inner) = value.get_mut("data").filter(|v| v.is_object()) {
        value = inner.take();
    }
    let present = match value.get(identity) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    };
    if !present {
        return Err(de::Error::custom(format!(
            "response has no `{}` field",
            identity
        )));
    }
    serde_json::from_value(value)
}

/// Decode a list body. Accepts a bare array, `{"data": [...]}`, or an
/// object keyed by `key` (`{"patients": [...]}`), optionally inside `data`.
/// Anything else is an error, not an empty list.
pub fn decode_list<T: DeserializeOwned>(
    body: &str,
    key: &str,
) -> Result<Vec<T>, serde_json::Error> {
    if let Ok(items) = serde_json::from_str::<Vec<T>>(body) {
        return Ok(items);
    }
    let mut value: Value = serde_json::from_str(body)?;
    if let Some(inner) = value.get_mut("data") {
        value = inner.take();
    }
    match value {
        value @ Value::Array(_) => serde_json::from_value(value),
        Value::Object(mut map) => match map.remove(key) {
            Some(value) => serde_json::from_value(value),
            None => Err(de::Error::custom(format!(
                "response has neither a list nor `{}`",
                key
            ))),
        },
        _ => Err(de::Error::custom(format!(
            "response has neither a list nor `{}`",
            key
        ))),
    }
}

/// Message of a body that reports failure in-band (`"success": false`),
/// even though the HTTP status was a success. Empty when no message is given.
pub fn reported_failure(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("success") {
        Some(Value::Bool(false)) => Some(error_message(body).unwrap_or_default()),
        _ => None,
    }
}

/// Best-effort server error message: `message`, then `error`, then `detail`.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"].iter().find_map(|key| {
        match value.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Object(inner)) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    })
}

#[derive(Serialize, Debug)]
pub struct FollowEventTestRequest<'a> {
    pub flow_id: &'a str,
    pub user_id: &'a str,
    pub display_name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BotSettings, FollowEventFlow, PatientRecord};

    #[test]
    fn decode_unwraps_data_envelope() {
        let bare: PatientRecord = decode(r#"{"line_user_id":"U1"}"#).unwrap();
        let wrapped: PatientRecord = decode(r#"{"data":{"line_user_id":"U1"}}"#).unwrap();
        assert_eq!(bare, wrapped);
    }

    #[test]
    fn decode_list_handles_keyed_and_plain_bodies() {
        let plain: Vec<PatientRecord> =
            decode_list(r#"[{"line_user_id":"U1"}]"#, "patients").unwrap();
        assert_eq!(plain.len(), 1);
        let body = r#"{"data":{"patients":[{"line_user_id":"U1"},{"line_user_id":"U2"}]}}"#;
        let keyed: Vec<PatientRecord> = decode_list(body, "patients").unwrap();
        assert_eq!(keyed[1].line_user_id, "U2");
        let empty: Vec<PatientRecord> = decode_list(r#"{"patients":[]}"#, "patients").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn decode_list_rejects_bodies_without_a_list() {
        assert!(decode_list::<PatientRecord>(r#"{"count":0}"#, "patients").is_err());
        assert!(decode_list::<PatientRecord>(
            r#"{"success":false,"message":"Database unavailable"}"#,
            "patients"
        )
        .is_err());
        assert!(decode_list::<PatientRecord>("null", "patients").is_err());
    }

    #[test]
    fn decode_record_requires_identity() {
        let flow: FollowEventFlow =
            decode_record(r#"{"data":{"id":7,"name":"Default"}}"#, "id").unwrap();
        assert_eq!(flow.id, "7");
        let settings: BotSettings =
            decode_record(r#"{"channel_id":"1657000001"}"#, "channel_id").unwrap();
        assert_eq!(settings.channel_id, "1657000001");

        let ack = r#"{"success":true,"message":"Settings saved"}"#;
        assert!(decode_record::<BotSettings>(ack, "channel_id").is_err());
        assert!(decode_record::<FollowEventFlow>(r#"{"id":"  "}"#, "id").is_err());
    }

    #[test]
    fn reported_failure_reads_in_band_errors() {
        assert_eq!(
            reported_failure(r#"{"success":false,"message":"Invalid channel access token"}"#)
                .as_deref(),
            Some("Invalid channel access token")
        );
        assert_eq!(reported_failure(r#"{"success":false}"#).as_deref(), Some(""));
        assert_eq!(reported_failure(r#"{"success":true,"message":"ok"}"#), None);
        assert_eq!(reported_failure(r#"[{"success":false}]"#), None);
        assert_eq!(reported_failure("not json"), None);
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message(r#"{"error":"bad","message":"Patient not found"}"#).as_deref(),
            Some("Patient not found")
        );
        assert_eq!(
            error_message(r#"{"detail":"Invalid token"}"#).as_deref(),
            Some("Invalid token")
        );
        assert_eq!(
            error_message(r#"{"error":{"message":"LINE API rejected"}}"#).as_deref(),
            Some("LINE API rejected")
        );
        assert_eq!(error_message(r#"{"message":"  "}"#), None);
        assert_eq!(error_message("<html>502</html>"), None);
    }
}
