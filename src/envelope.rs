//! Response envelope normalization.
//!
//! This is the single place that interprets the server's wire envelope:
//!
//! - `{ "success": true, "data": ... }`          → `data`
//! - `{ "success": false, "error": { "message" } }` → `FetchError::Api`
//! - body without a `success` field (legacy)    → the raw body
//! - anything else                              → `FetchError::Malformed`
//!
//! Non-2xx statuses fail before the body is looked at.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FetchError;
use crate::pagination::{Page, PaginationMeta};

/// Message used when a failure envelope carries no `error.message`.
pub const DEFAULT_API_ERROR: &str = "Request failed";

/// Unwrapped payload plus the envelope's top-level `meta`, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub data: Value,
    pub meta: Option<Value>,
}

impl Normalized {
    pub fn new(data: Value) -> Self {
        Self { data, meta: None }
    }

    /// Decode the payload into an endpoint schema. A schema mismatch is a
    /// structural failure, reported as `Malformed`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, FetchError> {
        serde_json::from_value(self.data)
            .map_err(|e| FetchError::malformed(format!("unexpected payload shape: {e}")))
    }

    /// `meta.pagination`, parsed into either of the two known shapes.
    pub fn pagination(&self) -> Result<Option<PaginationMeta>, FetchError> {
        let Some(raw) = self.meta.as_ref().and_then(|m| m.get("pagination")) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| FetchError::malformed(format!("unrecognized pagination meta: {e}")))
    }

    /// Decode a list payload together with its pagination metadata.
    pub fn into_page<T: DeserializeOwned>(self) -> Result<Page<T>, FetchError> {
        let meta = self.pagination()?;
        let items: Vec<T> = self.decode()?;
        Ok(Page::from_meta(items, meta.as_ref()))
    }
}

/// Normalize a raw HTTP response.
pub fn normalize(status: u16, status_text: &str, body: &[u8]) -> Result<Normalized, FetchError> {
    if status == 429 {
        return Err(FetchError::RateLimit {
            status_text: status_text.to_string(),
        });
    }
    if !(200..300).contains(&status) {
        return Err(FetchError::Http {
            status,
            status_text: status_text.to_string(),
        });
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::malformed(format!("body is not JSON: {e}")))?;
    normalize_value(value)
}

/// Normalize an already-parsed 2xx body.
pub fn normalize_value(body: Value) -> Result<Normalized, FetchError> {
    let Value::Object(mut map) = body else {
        // Legacy endpoints may return a bare array or scalar.
        return Ok(Normalized::new(body));
    };

    let meta = map.get("meta").cloned();
    match map.get("success") {
        None => Ok(Normalized {
            data: Value::Object(map),
            meta,
        }),
        Some(Value::Bool(true)) => Ok(Normalized {
            data: map.remove("data").unwrap_or(Value::Null),
            meta,
        }),
        Some(Value::Bool(false)) => {
            let message = map
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_API_ERROR);
            Err(FetchError::Api {
                message: message.to_string(),
            })
        }
        Some(other) => Err(FetchError::malformed(format!(
            "unrecognized `success` value: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn body(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn success_envelope_yields_data() {
        let n = normalize(200, "OK", &body(json!({"success": true, "data": {"x": 1}}))).unwrap();
        assert_eq!(n.data, json!({"x": 1}));
        assert_eq!(n.meta, None);
    }

    #[test]
    fn failure_envelope_yields_api_error() {
        let err = normalize(
            200,
            "OK",
            &body(json!({"success": false, "error": {"message": "boom"}})),
        )
        .unwrap_err();
        assert_eq!(
            err,
            FetchError::Api {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn failure_envelope_without_message_uses_default() {
        let err = normalize_value(json!({"success": false, "error": {}})).unwrap_err();
        assert_eq!(
            err,
            FetchError::Api {
                message: DEFAULT_API_ERROR.into()
            }
        );
    }

    #[test]
    fn bare_failure_envelope_uses_default() {
        let err = normalize(200, "OK", &body(json!({"success": false}))).unwrap_err();
        assert_eq!(
            err,
            FetchError::Api {
                message: DEFAULT_API_ERROR.into()
            }
        );
    }

    #[test]
    fn legacy_body_is_passed_through() {
        let n = normalize(200, "OK", &body(json!({"x": 1}))).unwrap();
        assert_eq!(n.data, json!({"x": 1}));

        let n = normalize(200, "OK", &body(json!([1, 2, 3]))).unwrap();
        assert_eq!(n.data, json!([1, 2, 3]));
    }

    #[test]
    fn unrecognized_success_value_is_malformed() {
        let err = normalize(200, "OK", &body(json!({"success": "nope"}))).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = normalize(200, "OK", b"<html>").unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn http_failures_ignore_body() {
        let err = normalize(
            503,
            "Service Unavailable",
            &body(json!({"success": true, "data": 1})),
        )
        .unwrap_err();
        assert_eq!(
            err,
            FetchError::Http {
                status: 503,
                status_text: "Service Unavailable".into()
            }
        );

        let err = normalize(429, "Too Many Requests", b"").unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[test]
    fn meta_travels_with_data() {
        let n = normalize_value(json!({
            "success": true,
            "data": [1, 2],
            "meta": {"pagination": {"page": 1, "pages": 3}}
        }))
        .unwrap();
        let page: Page<u32> = n.into_page().unwrap();
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.has_more);
    }

    #[test]
    fn decode_mismatch_is_malformed() {
        let n = Normalized::new(json!({"x": "not a number"}));
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct X {
            x: u32,
        }
        let err = n.decode::<X>().unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }
}
