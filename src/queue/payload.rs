use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A popped item that cannot be turned into a [`Request`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRequest {
    #[error("payload is not valid UTF-8 after percent-decoding")]
    Encoding,

    #[error("payload is not a JSON request: {0}")]
    Json(String),

    #[error("required field '{0}' is missing or empty")]
    MissingField(&'static str),
}

/// A decoded text-to-SQL request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    pub question: String,
    pub schema: String,
}

#[derive(Deserialize)]
struct RawRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, MalformedRequest> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MalformedRequest::MissingField(field)),
    }
}

/// Percent-decode and parse a popped queue item
pub fn decode_request(raw: &str) -> Result<Request, MalformedRequest> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| MalformedRequest::Encoding)?;

    let parsed: RawRequest =
        serde_json::from_str(&decoded).map_err(|e| MalformedRequest::Json(e.to_string()))?;

    Ok(Request {
        question: required(parsed.question, "question")?,
        schema: required(parsed.schema, "schema")?,
        id: required(parsed.id, "id")?,
    })
}

/// Terminal answer for one request: exactly one of `sql` or `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Sql { sql: String },
    Error { error: String },
}

impl ResultPayload {
    pub fn sql(sql: impl Into<String>) -> Self {
        ResultPayload::Sql { sql: sql.into() }
    }

    pub fn error(error: impl Into<String>) -> Self {
        ResultPayload::Error {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultPayload::Sql { .. })
    }

    pub fn to_json(&self) -> String {
        // Serializing a single-string-field enum cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"unserializable result"}"#.to_string())
    }
}

/// Store key a result is published under
pub fn result_key(prefix: &str, request_id: &str) -> String {
    format!("{}{}", prefix, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_json() {
        let req = decode_request(r#"{"question":"count rows in t","schema":"t(x int)","id":"r1"}"#)
            .unwrap();
        assert_eq!(
            req,
            Request {
                id: "r1".to_string(),
                question: "count rows in t".to_string(),
                schema: "t(x int)".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_percent_encoded_json() {
        let raw = "%7B%22question%22%3A%22how%20many%3F%22%2C%22schema%22%3A%22t(x%20int)%22%2C%22id%22%3A%22r2%22%7D";
        let req = decode_request(raw).unwrap();
        assert_eq!(req.question, "how many?");
        assert_eq!(req.schema, "t(x int)");
        assert_eq!(req.id, "r2");
    }

    #[test]
    fn test_literal_percent_survives() {
        let raw = r#"{"question":"names LIKE 'a%'","schema":"t(name text)","id":"r3"}"#;
        assert_eq!(decode_request(raw).unwrap().question, "names LIKE 'a%'");
    }

    #[test]
    fn test_missing_or_empty_fields() {
        assert_eq!(
            decode_request(r#"{"question":"q","schema":"s"}"#),
            Err(MalformedRequest::MissingField("id"))
        );
        assert_eq!(
            decode_request(r#"{"question":"","schema":"s","id":"r"}"#),
            Err(MalformedRequest::MissingField("question"))
        );
        assert_eq!(
            decode_request(r#"{"question":"q","schema":null,"id":"r"}"#),
            Err(MalformedRequest::MissingField("schema"))
        );
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(decode_request("hello"), Err(MalformedRequest::Json(_))));
        assert!(matches!(decode_request("[1,2]"), Err(MalformedRequest::Json(_))));
    }

    #[test]
    fn test_result_payload_has_exactly_one_field() {
        let ok: serde_json::Value = serde_json::from_str(&ResultPayload::sql("SELECT 1").to_json()).unwrap();
        assert_eq!(ok, serde_json::json!({"sql": "SELECT 1"}));

        let err: serde_json::Value =
            serde_json::from_str(&ResultPayload::error("boom").to_json()).unwrap();
        assert_eq!(err, serde_json::json!({"error": "boom"}));

        let parsed: ResultPayload = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert!(!parsed.is_success());
    }

    #[test]
    fn test_result_key() {
        assert_eq!(result_key("result:", "r1"), "result:r1");
    }
}
