//! Slice membership: does an element instance belong to a named slice?
//!
//! Each [`Discriminator`] variant recognises instances differently. Codes and
//! systems are compared exactly; value discriminators may reach into nested
//! sub-paths and are verified group by group.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::node::Node;
use crate::path_resolver::{PathResolver, split_path};
use crate::types::{BoundCoding, Discriminator, DiscriminatorValue};

/// Whether `node` is an instance of the slice described by `discriminator`.
pub fn matches(resolver: &PathResolver<'_>, node: Node<'_>, discriminator: &Discriminator) -> bool {
    match discriminator {
        Discriminator::PatternCodeableConcept { path, code, system } => resolver
            .find_value_at_matching(node, &coding_path(path), false, |coding| {
                coding_matches(coding, code.as_deref(), system.as_deref())
            })
            .is_some(),
        Discriminator::PatternCoding { path, code, system } => resolver
            .find_value_at_matching(node, path, false, |coding| {
                coding_matches(coding, code.as_deref(), system.as_deref())
            })
            .is_some(),
        Discriminator::PatternIdentifier { path, system } => {
            let system_matches =
                |identifier: &Node<'_>| identifier.str_field("system") == system.as_deref();
            resolver
                .find_value_at_matching(node, path, false, system_matches)
                .is_some()
                || (path.is_empty()
                    && resolver
                        .find_value_at_matching(node, "identifier", false, system_matches)
                        .is_some())
        }
        Discriminator::Value { values } => verify_slice_by_values(resolver, node, values),
        Discriminator::Type { path, code } => {
            let candidates = resolver.resolve_path(&[node], path);
            candidates.iter().any(|candidate| matches_type(candidate, code))
        }
        Discriminator::RequiredBinding { path, values } => resolver
            .find_value_at_matching(node, &coding_path(path), false, |coding| {
                bound_coding_matches(coding, values)
            })
            .is_some(),
    }
}

fn coding_path(path: &str) -> String {
    if path.is_empty() {
        "coding".to_string()
    } else {
        format!("{path}.coding")
    }
}

fn coding_matches(coding: &Node<'_>, code: Option<&str>, system: Option<&str>) -> bool {
    coding.str_field("code") == code && coding.str_field("system") == system
}

fn bound_coding_matches(coding: &Node<'_>, values: &[BoundCoding]) -> bool {
    let code = coding.str_field("code");
    let system = coding.str_field("system");
    values
        .iter()
        .any(|bound| Some(bound.code.as_str()) == code && bound.system.as_deref() == system)
}

/// Verify every `(path, value)` pair of a value discriminator.
///
/// Pairs are grouped by their first path segment. Within a group a single
/// found element must satisfy all leaf values and, recursively, all deeper
/// pairs; this keeps `class.type` and `class.value` on the same `class`.
pub fn verify_slice_by_values(
    resolver: &PathResolver<'_>,
    node: Node<'_>,
    values: &[DiscriminatorValue],
) -> bool {
    let definitions: Vec<(Vec<&str>, &Value)> = values
        .iter()
        .map(|definition| (split_path(&definition.path), &definition.value))
        .collect();
    verify_definitions(resolver, node, &definitions)
}

fn verify_definitions(
    resolver: &PathResolver<'_>,
    node: Node<'_>,
    definitions: &[(Vec<&str>, &Value)],
) -> bool {
    // `$this` pairs compare against the node itself
    let own_values_match = definitions
        .iter()
        .filter(|(segments, _)| segments.is_empty())
        .all(|(_, expected)| node_matches_value(&node, expected));
    if !own_values_match {
        return false;
    }

    let mut prefixes: Vec<&str> = Vec::new();
    for (segments, _) in definitions {
        if let Some(first) = segments.first() {
            if !prefixes.contains(first) {
                prefixes.push(first);
            }
        }
    }

    prefixes.into_iter().all(|prefix| {
        let group: Vec<(Vec<&str>, &Value)> = definitions
            .iter()
            .filter(|(segments, _)| segments.first() == Some(&prefix))
            .map(|(segments, value)| (segments[1..].to_vec(), *value))
            .collect();

        resolver
            .find_value_at_matching(node, prefix, false, |found| {
                verify_definitions(resolver, *found, &group)
            })
            .is_some()
    })
}

/// Exact equality for primitives, partial structural match for complex values.
fn node_matches_value(node: &Node<'_>, expected: &Value) -> bool {
    match node.value() {
        Some(actual) if expected.is_object() || expected.is_array() => {
            deep_partial_match(actual, expected)
        }
        Some(actual) => actual == expected,
        None => false,
    }
}

/// Pattern matching in the sense of `pattern[x]`: every key of the pattern
/// must be present with a matching value; arrays match by containment.
pub fn deep_partial_match(item: &Value, pattern: &Value) -> bool {
    match pattern {
        Value::Null => true,
        Value::Object(pattern_map) => {
            let Some(item_map) = item.as_object() else {
                return false;
            };
            pattern_map.iter().all(|(key, pattern_value)| {
                item_map
                    .get(key)
                    .is_some_and(|item_value| deep_partial_match(item_value, pattern_value))
            })
        }
        Value::Array(pattern_items) => {
            let Some(items) = item.as_array() else {
                return false;
            };
            pattern_items.iter().all(|pattern_item| {
                items.iter().any(|item| deep_partial_match(item, pattern_item))
            })
        }
        primitive => item == primitive,
    }
}

/// Whether `node` is of FHIR type `code`.
///
/// `Date`, `DateTime` and `String` are checked against the value itself.
/// Other codes match a choice-key type hint, a resource type (directly or
/// via a bundle entry's `resource`), or the shape of the value.
pub fn matches_type(node: &Node<'_>, code: &str) -> bool {
    match code {
        "Date" => node.as_str().is_some_and(is_fhir_date),
        "DateTime" => node.as_str().is_some_and(is_fhir_date_time),
        "String" => node.value().is_some_and(Value::is_string),
        _ => {
            if node
                .type_hint()
                .is_some_and(|hint| hint.eq_ignore_ascii_case(code))
            {
                return true;
            }
            if let Some(resource_type) = node.resource_type() {
                return resource_type == code;
            }
            if let Some(entry_resource) = node.field("resource").first() {
                if let Some(resource_type) = entry_resource.resource_type() {
                    return resource_type == code;
                }
            }
            node.value()
                .and_then(infer_data_type)
                .is_some_and(|inferred| inferred == code)
        }
    }
}

/// FHIR `date`: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
pub fn is_fhir_date(value: &str) -> bool {
    match value.len() {
        4 => value.chars().all(|c| c.is_ascii_digit()),
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").is_ok(),
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        _ => false,
    }
}

/// FHIR `dateTime`: any date form, or a full timestamp with or without zone.
pub fn is_fhir_date_time(value: &str) -> bool {
    is_fhir_date(value)
        || DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
}

const CONTACT_POINT_SYSTEMS: &[&str] = &["phone", "fax", "email", "pager", "url", "sms", "other"];

/// Guess the FHIR data type of an untyped JSON value from its shape.
pub fn infer_data_type(value: &Value) -> Option<&'static str> {
    let object = match value {
        Value::Bool(_) => return Some("Boolean"),
        Value::Number(n) if n.is_i64() || n.is_u64() => return Some("Integer"),
        Value::Number(_) => return Some("Decimal"),
        Value::Object(object) => object,
        _ => return None,
    };
    let has = |key: &str| object.contains_key(key);

    if has("resourceType") {
        return None;
    }
    if has("coding") {
        return Some("CodeableConcept");
    }
    if has("numerator") || has("denominator") {
        return Some("Ratio");
    }
    if has("low") || has("high") {
        return Some("Range");
    }
    if object.get("value").is_some_and(Value::is_number)
        && (has("unit") || has("code") || has("system") || has("comparator"))
    {
        return Some("Quantity");
    }
    if has("start") || has("end") {
        return Some("Period");
    }
    if has("family") || has("given") {
        return Some("HumanName");
    }
    if has("line") || has("city") || has("postalCode") || has("state") || has("country") {
        return Some("Address");
    }
    if has("contentType") || has("data") {
        return Some("Attachment");
    }
    if has("reference") {
        return Some("Reference");
    }
    if has("system") && object.get("value").is_some_and(Value::is_string) {
        let system = object.get("system").and_then(Value::as_str).unwrap_or_default();
        return if CONTACT_POINT_SYSTEMS.contains(&system) {
            Some("ContactPoint")
        } else {
            Some("Identifier")
        };
    }
    if has("code") && (has("system") || has("display")) {
        return Some("Coding");
    }
    if has("display") || has("identifier") {
        return Some("Reference");
    }
    if has("text") && object.len() == 1 {
        return Some("CodeableConcept");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_forms() {
        assert!(is_fhir_date("2020"));
        assert!(is_fhir_date("2020-02"));
        assert!(is_fhir_date("2020-02-29"));
        assert!(!is_fhir_date("2021-02-29"));
        assert!(!is_fhir_date("2020-13"));
        assert!(!is_fhir_date("2020-01-01T10:00:00Z"));
    }

    #[test]
    fn test_date_time_forms() {
        assert!(is_fhir_date_time("2020-01-01"));
        assert!(is_fhir_date_time("2020-01-01T10:00:00Z"));
        assert!(is_fhir_date_time("2020-01-01T10:00:00.123+05:00"));
        assert!(is_fhir_date_time("2020-01-01T10:00:00"));
        assert!(!is_fhir_date_time("yesterday"));
    }

    #[test]
    fn test_infer_data_type() {
        assert_eq!(infer_data_type(&json!({"value": 5, "unit": "mg"})), Some("Quantity"));
        assert_eq!(infer_data_type(&json!({"coding": []})), Some("CodeableConcept"));
        assert_eq!(infer_data_type(&json!({"system": "phone", "value": "555"})), Some("ContactPoint"));
        assert_eq!(
            infer_data_type(&json!({"system": "http://example.org/mrn", "value": "1"})),
            Some("Identifier")
        );
        assert_eq!(infer_data_type(&json!({"reference": "Patient/1"})), Some("Reference"));
        assert_eq!(infer_data_type(&json!(true)), Some("Boolean"));
        assert_eq!(infer_data_type(&json!("text")), None);
    }

    #[test]
    fn test_deep_partial_match() {
        let item = json!({"coding": [{"system": "s", "code": "a"}, {"system": "s", "code": "b"}], "text": "t"});
        assert!(deep_partial_match(&item, &json!({"coding": [{"code": "b"}]})));
        assert!(!deep_partial_match(&item, &json!({"coding": [{"code": "c"}]})));
        assert!(deep_partial_match(&json!("x"), &json!("x")));
    }

    #[test]
    fn test_type_matches_bundle_entry_resource() {
        let entry = json!({"resource": {"resourceType": "Patient", "id": "1"}});
        assert!(matches_type(&Node::root(&entry), "Patient"));
        assert!(!matches_type(&Node::root(&entry), "Observation"));
    }
}
