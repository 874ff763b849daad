//! StructureDefinition types consumed by the metadata extractor.
//!
//! Profiles are read once from an IG package and never mutated afterwards.
//! Only the parts of `ElementDefinition` that must-support extraction looks at
//! are modelled explicitly; `fixed[x]` and `pattern[x]` values are captured
//! dynamically through a flattened map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension flagging a single type of an element as must-support.
pub const TYPE_MUST_SUPPORT_EXTENSION_URL: &str =
    "http://hl7.org/fhir/StructureDefinition/elementdefinition-type-must-support";

/// Prefix shared by base FHIR specification profiles.
pub const BASE_DEFINITION_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition";

/// A FHIR StructureDefinition (profile or extension definition).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructureDefinition {
    #[serde(rename = "resourceType", default = "structure_definition_type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Canonical URL
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// resource | complex-type | primitive-type | logical
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Type constrained by this profile (e.g. "Patient", "Extension")
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "baseDefinition", skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,
    /// specialization | constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ElementList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differential: Option<ElementList>,
}

fn structure_definition_type() -> String {
    "StructureDefinition".to_string()
}

impl StructureDefinition {
    /// Snapshot elements, falling back to the differential when no snapshot
    /// was published.
    pub fn elements(&self) -> &[ElementDefinition] {
        self.snapshot
            .as_ref()
            .or(self.differential.as_ref())
            .map(|list| list.element.as_slice())
            .unwrap_or(&[])
    }

    /// `url|version` when a version is known.
    pub fn versioned_url(&self) -> String {
        match &self.version {
            Some(version) => format!("{}|{}", self.url, version),
            None => self.url.clone(),
        }
    }
}

/// Snapshot or differential element list.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ElementList {
    #[serde(default)]
    pub element: Vec<ElementDefinition>,
}

/// Element definition as published in a profile snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ElementDefinition {
    /// Element ID (path with slice names, e.g. "Coverage.class:plan.value")
    #[serde(default)]
    pub id: String,
    /// Element path (e.g. "Coverage.class.value")
    pub path: String,
    #[serde(rename = "sliceName", skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slicing: Option<ElementSlicing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<ElementType>,
    #[serde(rename = "mustSupport", skip_serializing_if = "Option::is_none")]
    pub must_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<ElementBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,

    /// `fixed[x]` and `pattern[x]` values, plus anything else not modelled
    #[serde(flatten)]
    pub pattern_fields: Map<String, Value>,
}

impl ElementDefinition {
    pub fn is_must_support(&self) -> bool {
        self.must_support == Some(true)
    }

    pub fn has_extension(&self, url: &str) -> bool {
        self.extension.iter().any(|ext| ext.url == url)
    }

    pub fn first_type_code(&self) -> Option<&str> {
        self.types.first().map(|t| t.code.as_str())
    }

    pub fn discriminators(&self) -> &[SlicingDiscriminator] {
        self.slicing
            .as_ref()
            .map(|s| s.discriminator.as_slice())
            .unwrap_or(&[])
    }

    fn string_field(&self, key: &str) -> Option<&str> {
        self.pattern_fields.get(key).and_then(Value::as_str)
    }

    pub fn fixed_uri(&self) -> Option<&str> {
        self.string_field("fixedUri")
    }

    pub fn fixed_code(&self) -> Option<&str> {
        self.string_field("fixedCode")
    }

    pub fn pattern_codeable_concept(&self) -> Option<&Value> {
        self.pattern_fields.get("patternCodeableConcept")
    }

    pub fn pattern_coding(&self) -> Option<&Value> {
        self.pattern_fields.get("patternCoding")
    }

    pub fn pattern_identifier(&self) -> Option<&Value> {
        self.pattern_fields.get("patternIdentifier")
    }

    /// First `coding` entry of `patternCodeableConcept` as (system, code).
    pub fn pattern_codeable_concept_coding(&self) -> Option<(Option<&str>, Option<&str>)> {
        let coding = self
            .pattern_codeable_concept()?
            .get("coding")?
            .as_array()?
            .first()?;
        Some((
            coding.get("system").and_then(Value::as_str),
            coding.get("code").and_then(Value::as_str),
        ))
    }

    /// The value of the first `fixed*` key, else the first `pattern*` key.
    pub fn fixed_or_pattern_value(&self) -> Option<&Value> {
        let by_prefix = |prefix: &str| {
            self.pattern_fields
                .iter()
                .find(|(key, _)| {
                    key.strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()))
                })
                .map(|(_, value)| value)
        };
        by_prefix("fixed").or_else(|| by_prefix("pattern"))
    }

    pub fn has_required_binding(&self) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|b| b.strength == "required" && b.value_set.is_some())
    }
}

/// Type information within an element definition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ElementType {
    /// FHIR type code
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,
    /// Target profile URLs for Reference types
    #[serde(rename = "targetProfile", default, skip_serializing_if = "Vec::is_empty")]
    pub target_profile: Vec<String>,
    /// Primitive extensions parallel to `targetProfile`
    #[serde(rename = "_targetProfile", default, skip_serializing_if = "Vec::is_empty")]
    pub target_profile_extensions: Vec<Option<PrimitiveExtensions>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

impl ElementType {
    /// Whether this type carries the type-level must-support extension set to true.
    pub fn is_type_must_support(&self) -> bool {
        has_type_must_support(&self.extension)
    }

    /// Target profiles flagged as must-support. A single target profile is
    /// always considered supported.
    pub fn must_support_target_profiles(&self) -> Vec<String> {
        if self.target_profile.len() == 1 {
            return self.target_profile.clone();
        }
        self.target_profile_extensions
            .iter()
            .enumerate()
            .filter_map(|(index, ext)| {
                let ext = ext.as_ref()?;
                if has_type_must_support(&ext.extension) {
                    self.target_profile.get(index).cloned()
                } else {
                    None
                }
            })
            .collect()
    }
}

fn has_type_must_support(extensions: &[Extension]) -> bool {
    extensions
        .iter()
        .any(|ext| ext.url == TYPE_MUST_SUPPORT_EXTENSION_URL && ext.value_boolean == Some(true))
}

/// The `_field` companion object of a primitive.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrimitiveExtensions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

/// Value set binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementBinding {
    /// required | extensible | preferred | example
    pub strength: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "valueSet", skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,
}

/// Slicing definition on a slice-defining element.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ElementSlicing {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discriminator: Vec<SlicingDiscriminator>,
    /// closed | open | openAtEnd
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,
}

/// Slicing discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicingDiscriminator {
    /// value | exists | pattern | type | profile
    #[serde(rename = "type")]
    pub type_name: String,
    pub path: String,
}

impl SlicingDiscriminator {
    /// Discriminator path relative to the slice, with `$this` removed.
    pub fn relative_path(&self) -> &str {
        if self.path == "$this" {
            ""
        } else if let Some(rest) = self.path.strip_prefix("$this.") {
            rest
        } else {
            &self.path
        }
    }
}

/// Extension on a definition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Extension {
    pub url: String,
    #[serde(rename = "valueBoolean", skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,
    #[serde(rename = "valueString", skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(rename = "valueCode", skip_serializing_if = "Option::is_none")]
    pub value_code: Option<String>,
    #[serde(rename = "valueCanonical", skip_serializing_if = "Option::is_none")]
    pub value_canonical: Option<String>,
    #[serde(rename = "valueUrl", skip_serializing_if = "Option::is_none")]
    pub value_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_definition_captures_pattern_fields() {
        let element: ElementDefinition = serde_json::from_value(json!({
            "id": "Coverage.class:plan.type",
            "path": "Coverage.class.type",
            "mustSupport": true,
            "patternCodeableConcept": {
                "coding": [{
                    "system": "http://terminology.hl7.org/CodeSystem/coverage-class",
                    "code": "plan"
                }]
            }
        }))
        .unwrap();

        assert!(element.is_must_support());
        assert_eq!(
            element.pattern_codeable_concept_coding(),
            Some((
                Some("http://terminology.hl7.org/CodeSystem/coverage-class"),
                Some("plan")
            ))
        );
        assert!(element.fixed_uri().is_none());
    }

    #[test]
    fn test_fixed_value_preferred_over_pattern() {
        let element: ElementDefinition = serde_json::from_value(json!({
            "path": "Observation.code",
            "patternCode": "b",
            "fixedCode": "a"
        }))
        .unwrap();
        assert_eq!(element.fixed_or_pattern_value(), Some(&json!("a")));
    }

    #[test]
    fn test_discriminator_relative_path() {
        let this = SlicingDiscriminator {
            type_name: "pattern".to_string(),
            path: "$this".to_string(),
        };
        let nested = SlicingDiscriminator {
            type_name: "value".to_string(),
            path: "$this.code".to_string(),
        };
        assert_eq!(this.relative_path(), "");
        assert_eq!(nested.relative_path(), "code");
    }

    #[test]
    fn test_must_support_target_profiles_filters_by_extension() {
        let element_type: ElementType = serde_json::from_value(json!({
            "code": "Reference",
            "targetProfile": [
                "http://example.org/StructureDefinition/a",
                "http://example.org/StructureDefinition/b"
            ],
            "_targetProfile": [
                {"extension": [{"url": TYPE_MUST_SUPPORT_EXTENSION_URL, "valueBoolean": true}]},
                null
            ]
        }))
        .unwrap();

        assert_eq!(
            element_type.must_support_target_profiles(),
            vec!["http://example.org/StructureDefinition/a".to_string()]
        );
    }
}
