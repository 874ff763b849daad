//! Test assertions.
//!
//! Each assertion returns `Err(ConformanceError::AssertionFailed)` (or
//! `Skip`/`Omit`) with a human-readable message; test bodies propagate them
//! with `?` and [`crate::types::TestResult::from_outcome`] turns them into
//! results.

use serde_json::Value;

use crate::error::{ConformanceError, Result};
use crate::must_support::MissingItemReport;
use crate::types::RunContext;
use crate::validator::FhirResourceValidator;

pub fn assert_condition(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(ConformanceError::assertion(message))
    }
}

pub fn skip_if(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Err(ConformanceError::skip(message))
    } else {
        Ok(())
    }
}

pub fn omit_if(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Err(ConformanceError::omit(message))
    } else {
        Ok(())
    }
}

pub fn assert_response_status(actual: u16, expected: &[u16]) -> Result<()> {
    if expected.contains(&actual) {
        return Ok(());
    }
    let expected = expected
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConformanceError::assertion(format!(
        "Unexpected response status: expected {expected}, but received {actual}"
    )))
}

pub fn assert_resource_type(resource: &Value, expected: &str) -> Result<()> {
    let actual = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or("nil");
    assert_condition(
        actual == expected,
        format!("Unexpected resource type: expected {expected}, but received {actual}"),
    )
}

/// Fails when the validator finds unfiltered errors.
pub async fn assert_valid_resource(
    validator: &FhirResourceValidator,
    resource: &Value,
    profile_url: Option<&str>,
    context: &mut RunContext,
) -> Result<()> {
    let valid = validator.is_valid(resource, profile_url, context, true).await?;
    let target = profile_url.map_or_else(
        || "the base FHIR specification".to_string(),
        |url| format!("the profile {url}"),
    );
    assert_condition(valid, format!("Resource does not conform to {target}"))
}

/// Validate bundle entries, optionally only those of the given resource
/// types, each against its mapped profile (base profile when `None`).
pub async fn assert_valid_bundle_entries(
    validator: &FhirResourceValidator,
    bundle: &Value,
    resource_types: &[(&str, Option<&str>)],
    context: &mut RunContext,
) -> Result<()> {
    assert_resource_type(bundle, "Bundle")?;

    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut checked = 0usize;
    let mut invalid = 0usize;

    for resource in entries.iter().filter_map(|entry| entry.get("resource")) {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let profile = if resource_types.is_empty() {
            None
        } else {
            match resource_types.iter().find(|(ty, _)| *ty == resource_type) {
                Some((_, profile)) => *profile,
                None => continue,
            }
        };

        checked += 1;
        if !validator.is_valid(resource, profile, context, true).await? {
            invalid += 1;
        }
    }

    assert_condition(
        invalid == 0,
        format!("{invalid}/{checked} Bundle entries are invalid"),
    )
}

/// Fails with the report's message when anything is missing.
pub fn assert_must_support(report: &MissingItemReport) -> Result<()> {
    assert_condition(report.is_empty(), report.failure_message())
}

/// Map a failure to open a connection to an assertion failure: an endpoint
/// that cannot be reached is a misconfigured system under test. Other HTTP
/// errors pass through unchanged.
pub fn fail_on_connection_error<T>(result: std::result::Result<T, reqwest::Error>) -> Result<T> {
    result.map_err(|error| {
        if error.is_connect() {
            let target = error
                .url()
                .map_or_else(|| "server".to_string(), |url| url.to_string());
            ConformanceError::assertion(format!("Failed to open TCP connection to {target}"))
        } else {
            ConformanceError::Http(error)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_status_message() {
        assert!(assert_response_status(200, &[200, 201]).is_ok());
        let err = assert_response_status(404, &[200]).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected response status: expected 200, but received 404");
        assert!(err.is_assertion());
    }

    #[test]
    fn test_resource_type_message() {
        let err = assert_resource_type(&json!({"resourceType": "Patient"}), "Observation").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unexpected resource type: expected Observation, but received Patient"
        );
    }

    #[test]
    fn test_skip_and_omit() {
        assert!(matches!(skip_if(true, "no data"), Err(ConformanceError::Skip { .. })));
        assert!(skip_if(false, "no data").is_ok());
        assert!(matches!(omit_if(true, "n/a"), Err(ConformanceError::Omit { .. })));
    }

    #[test]
    fn test_assert_must_support_passes_on_empty_report() {
        assert!(assert_must_support(&MissingItemReport::default()).is_ok());
    }
}
