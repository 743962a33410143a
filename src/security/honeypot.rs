//! Hidden form-field trap.
//!
//! Legitimate clients never fill the configured fields. When one is filled
//! the request gets a fabricated success so the bot learns nothing.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::config::HoneypotConfig;

#[derive(Debug, Clone)]
pub struct Honeypot {
    fields: Vec<String>,
}

impl Honeypot {
    pub fn new(config: &HoneypotConfig) -> Self {
        Self {
            fields: config.fields.clone(),
        }
    }

    /// Name of the first filled trap field, if any.
    pub fn tripped_field(&self, body: &Value) -> Option<&str> {
        let map = body.as_object()?;
        self.fields
            .iter()
            .find(|name| map.get(name.as_str()).is_some_and(is_filled))
            .map(String::as_str)
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// The generic success handed to a tripped request.
pub fn decoy_response() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Thank you, your submission has been received"
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn honeypot() -> Honeypot {
        Honeypot::new(&HoneypotConfig::default())
    }

    #[test]
    fn test_filled_field_trips() {
        let hp = honeypot();
        assert_eq!(
            hp.tripped_field(&json!({"email": "a@b.c", "_gotcha": "http://spam"})),
            Some("_gotcha")
        );
        assert_eq!(hp.tripped_field(&json!({"honeypot": 1})), Some("honeypot"));
    }

    #[test]
    fn test_empty_or_missing_field_passes() {
        let hp = honeypot();
        assert_eq!(hp.tripped_field(&json!({"email": "a@b.c"})), None);
        assert_eq!(hp.tripped_field(&json!({"_gotcha": ""})), None);
        assert_eq!(hp.tripped_field(&json!({"_gotcha": "   ", "honeypot": null})), None);
        assert_eq!(hp.tripped_field(&json!(["_gotcha"])), None);
    }

    #[tokio::test]
    async fn test_decoy_is_plain_success() {
        let response = decoy_response();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert!(body.get("code").is_none());
    }
}
