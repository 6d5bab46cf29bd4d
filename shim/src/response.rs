//! Response types

use serde::Serialize;
use std::collections::BTreeMap;

/// Gateway-style result: a status code and a text body.
///
/// Functions fronted by an HTTP gateway return this shape; the body carries the payload
/// already encoded as text (JSON for [`ProxyResponse::json`], base64 for
/// [`ProxyResponse::binary`]).
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    status_code: u16,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    is_base64_encoded: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ProxyResponse {
    /// A response with no body.
    pub fn new(status_code: u16) -> Self {
        ProxyResponse {
            status_code,
            headers: BTreeMap::new(),
            body: None,
            is_base64_encoded: false,
        }
    }

    /// A response whose body is `value` encoded as JSON text.
    pub fn json<T>(status_code: u16, value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_string(value)?;
        Ok(Self::new(status_code)
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    /// A plain text response.
    pub fn text(status_code: u16, body: impl Into<String>) -> Self {
        Self::new(status_code).with_body(body.into())
    }

    /// A binary response, base64 encoded.
    pub fn binary(status_code: u16, body: impl AsRef<[u8]>) -> Self {
        ProxyResponse {
            is_base64_encoded: true,
            ..Self::new(status_code).with_body(base64::encode(body))
        }
    }

    /// Adds a header, replacing any previous value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    fn with_body(self, body: String) -> Self {
        ProxyResponse {
            body: Some(body),
            ..self
        }
    }

    /// The HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Response headers, lowercase names.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// The encoded body.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Whether [`body`](Self::body) is base64.
    pub fn is_base64_encoded(&self) -> bool {
        self.is_base64_encoded
    }
}

#[cfg(test)]
mod tests {
    use super::ProxyResponse;
    use serde_json::{self, json};

    #[test]
    fn serialize_json_body() {
        let resp = ProxyResponse::json(
            200,
            &json!({ "message": "collection completed", "updated": 5 }),
        )
        .expect("json body");
        assert_eq!(
            serde_json::to_string(&resp).expect("failed to serialize response"),
            r#"{"statusCode":200,"headers":{"content-type":"application/json"},"body":"{\"message\":\"collection completed\",\"updated\":5}"}"#
        );
    }

    #[test]
    fn serialize_empty_response() {
        let resp = ProxyResponse::new(204);
        assert_eq!(
            serde_json::to_string(&resp).expect("failed to serialize response"),
            r#"{"statusCode":204}"#
        );
    }

    #[test]
    fn serialize_binary_body() {
        let resp = ProxyResponse::binary(200, b"bytes");
        assert!(resp.is_base64_encoded());
        assert_eq!(
            serde_json::to_string(&resp).expect("failed to serialize response"),
            r#"{"statusCode":200,"body":"Ynl0ZXM=","isBase64Encoded":true}"#
        );
    }

    #[test]
    fn header_names_are_lowercased() {
        let resp = ProxyResponse::text(404, "missing").with_header("X-Request-Id", "abc");
        assert_eq!(resp.headers().get("x-request-id").map(String::as_str), Some("abc"));
    }
}
