//! Wire format of the validator service's `POST /validate` endpoint.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ContextKey;
use crate::types::OutcomeIssue;

/// One file in `filesToValidate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileToValidate {
    pub file_name: String,
    pub file_content: String,
    pub file_type: String,
}

impl FileToValidate {
    /// `<ResourceType>/<id>.json` carrying the serialized resource.
    pub fn json(resource: &Value) -> serde_json::Result<Self> {
        Ok(Self {
            file_name: format!("{}/{}.json", resource_type(resource), resource_id(resource)),
            file_content: serde_json::to_string(resource)?,
            file_type: "json".to_string(),
        })
    }
}

/// Request body. The context object's key depends on the validator version.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateRequest {
    pub context_key: ContextKey,
    pub context: Map<String, Value>,
    pub files_to_validate: Vec<FileToValidate>,
    pub session_id: Option<String>,
}

impl Serialize for ValidateRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry(self.context_key.as_str(), &self.context)?;
        map.serialize_entry("filesToValidate", &self.files_to_validate)?;
        map.serialize_entry("sessionId", &self.session_id)?;
        map.end()
    }
}

/// Successful response body.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Outcome {
    #[serde(default)]
    pub issues: Vec<OutcomeIssue>,
}

impl ValidateResponse {
    /// Parse a body, dropping control characters the service sometimes
    /// emits inside messages.
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(&strip_non_printable(body))
    }

    /// Issues of the first (and only) validated file.
    pub fn issues(&self) -> &[OutcomeIssue] {
        self.outcomes
            .first()
            .map(|outcome| outcome.issues.as_slice())
            .unwrap_or(&[])
    }
}

/// Remove control characters except CR and LF.
pub fn strip_non_printable(body: &str) -> String {
    body.chars()
        .filter(|c| !c.is_control() || *c == '\r' || *c == '\n')
        .collect()
}

pub fn resource_type(resource: &Value) -> &str {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

pub fn resource_id(resource: &Value) -> &str {
    resource.get("id").and_then(Value::as_str).unwrap_or_default()
}

/// `Patient/123`, or just `Patient` for resources without an id.
pub fn message_prefix(resource: &Value) -> String {
    match resource_id(resource) {
        "" => resource_type(resource).to_string(),
        id => format!("{}/{}", resource_type(resource), id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_uses_context_key() {
        let mut context = Map::new();
        context.insert("sv".to_string(), json!("4.0.1"));
        let request = ValidateRequest {
            context_key: ContextKey::ValidationContext,
            context,
            files_to_validate: vec![FileToValidate::json(&json!({"resourceType": "Patient", "id": "p1"})).unwrap()],
            session_id: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["validationContext"]["sv"], json!("4.0.1"));
        assert_eq!(body["filesToValidate"][0]["fileName"], json!("Patient/p1.json"));
        assert_eq!(body["filesToValidate"][0]["fileType"], json!("json"));
        assert_eq!(body["sessionId"], Value::Null);
    }

    #[test]
    fn test_parse_strips_control_characters() {
        let body = "{\"sessionId\":\"s1\",\"outcomes\":[{\"issues\":[{\"level\":\"ERROR\",\"message\":\"bad\u{0007} value\"}]}]}";
        let response = ValidateResponse::parse(body).unwrap();
        assert_eq!(response.session_id.as_deref(), Some("s1"));
        assert_eq!(response.issues()[0].message, "bad value");
    }

    #[test]
    fn test_message_prefix() {
        assert_eq!(message_prefix(&json!({"resourceType": "Patient", "id": "1"})), "Patient/1");
        assert_eq!(message_prefix(&json!({"resourceType": "Patient"})), "Patient");
    }
}
