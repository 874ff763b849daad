//! Must-support metadata: the normalized view of what a profile requires.
//!
//! Built once per profile by [`crate::metadata_extractor`]. Callers may
//! adjust it (add elements, declare choice groups) before handing it to the
//! assessor; after that it is treated as read-only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything a profile flags as must-support, grouped by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MustSupportMetadata {
    pub profile_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_version: Option<String>,
    pub resource_type: String,
    #[serde(default)]
    pub elements: Vec<MustSupportElement>,
    #[serde(default)]
    pub extensions: Vec<MustSupportExtension>,
    #[serde(default)]
    pub slices: Vec<MustSupportSlice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceGroup>,
}

impl MustSupportMetadata {
    pub fn new(profile_url: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            profile_url: profile_url.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn add_element(&mut self, element: MustSupportElement) -> &mut Self {
        self.elements.push(element);
        self
    }

    /// Remove every element entry at `path`. Returns how many were removed.
    pub fn remove_element(&mut self, path: &str) -> usize {
        let before = self.elements.len();
        self.elements.retain(|element| element.path != path);
        before - self.elements.len()
    }

    pub fn add_choice(&mut self, choice: ChoiceGroup) -> &mut Self {
        self.choices.push(choice);
        self
    }

    /// Declare that the type-level must-support alternatives rewritten from
    /// `original_path` (e.g. `value[x]`) only need one of them populated.
    ///
    /// Returns false when fewer than two alternatives exist for that path.
    pub fn add_type_choice(&mut self, original_path: &str) -> bool {
        let paths: Vec<String> = self
            .elements
            .iter()
            .filter(|element| element.original_path.as_deref() == Some(original_path))
            .map(|element| element.path.clone())
            .collect();
        if paths.len() < 2 {
            return false;
        }
        self.choices.push(ChoiceGroup::from_paths(paths));
        true
    }

    pub fn slice_by_name(&self, slice_name: &str) -> Option<&MustSupportSlice> {
        self.slices.iter().find(|slice| slice.slice_name == slice_name)
    }

    /// The slice `slice_name` defined on field `field` (`class`, or `value`
    /// for `value[x]`). Slice names are only unique per sliced element.
    pub fn slice_at(&self, field: &str, slice_name: &str) -> Option<&MustSupportSlice> {
        let field = field.strip_suffix("[x]").unwrap_or(field);
        self.slices.iter().find(|slice| {
            let last = slice.path.rsplit('.').next().unwrap_or(&slice.path);
            slice.slice_name == slice_name && last.strip_suffix("[x]").unwrap_or(last) == field
        })
    }

    pub fn element_by_path(&self, path: &str) -> Option<&MustSupportElement> {
        self.elements.iter().find(|element| element.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.extensions.is_empty() && self.slices.is_empty()
    }
}

/// A plain (non-sliced, non-extension) must-support element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MustSupportElement {
    /// Path relative to the resource root, choice types already rewritten
    pub path: String,
    /// Path before a type-level rewrite (`value[x]` for `valueQuantity`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uscdi_only: bool,
    /// Type codes worth remembering (currently `Reference`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Must-support target profiles for Reference elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_profiles: Vec<String>,
}

impl MustSupportElement {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_fixed_value(mut self, value: impl Into<Value>) -> Self {
        self.fixed_value = Some(value.into());
        self
    }

    /// `path`, or `path:fixed_value` when a fixed value is required.
    pub fn display_string(&self) -> String {
        match &self.fixed_value {
            Some(value) => format!("{}:{}", self.path, display_value(value)),
            None => self.path.clone(),
        }
    }
}

/// A must-support extension identified by canonical URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MustSupportExtension {
    /// Element id in the profile (e.g. "Patient.extension:race")
    pub id: String,
    /// Path relative to the resource root (e.g. "extension")
    pub path: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uscdi_only: bool,
}

/// A must-support named slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MustSupportSlice {
    /// Element id in the profile (e.g. "Coverage.class:plan")
    pub slice_id: String,
    pub slice_name: String,
    /// Path relative to the resource root (e.g. "class")
    pub path: String,
    pub discriminator: Discriminator,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uscdi_only: bool,
}

/// How instances of a slice are recognised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Discriminator {
    PatternCodeableConcept {
        #[serde(default)]
        path: String,
        code: Option<String>,
        system: Option<String>,
    },
    PatternCoding {
        #[serde(default)]
        path: String,
        code: Option<String>,
        system: Option<String>,
    },
    PatternIdentifier {
        #[serde(default)]
        path: String,
        system: Option<String>,
    },
    Value {
        values: Vec<DiscriminatorValue>,
    },
    Type {
        #[serde(default)]
        path: String,
        code: String,
    },
    RequiredBinding {
        #[serde(default)]
        path: String,
        values: Vec<BoundCoding>,
    },
}

impl Discriminator {
    pub fn kind(&self) -> &'static str {
        match self {
            Discriminator::PatternCodeableConcept { .. } => "patternCodeableConcept",
            Discriminator::PatternCoding { .. } => "patternCoding",
            Discriminator::PatternIdentifier { .. } => "patternIdentifier",
            Discriminator::Value { .. } => "value",
            Discriminator::Type { .. } => "type",
            Discriminator::RequiredBinding { .. } => "requiredBinding",
        }
    }
}

/// One `(sub-path, expected value)` pair of a value discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscriminatorValue {
    pub path: String,
    pub value: Value,
}

/// A `(system, code)` pair allowed by a binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BoundCoding {
    pub system: Option<String>,
    pub code: String,
}

impl BoundCoding {
    pub fn new(system: Option<&str>, code: impl Into<String>) -> Self {
        Self {
            system: system.map(str::to_string),
            code: code.into(),
        }
    }
}

/// Alternatives of which supporting any one satisfies all of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChoiceGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slice_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ChoiceElement>,
}

impl ChoiceGroup {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_extension_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extension_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_slice_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slice_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_element(mut self, path: impl Into<String>, fixed_value: Option<Value>) -> Self {
        self.elements.push(ChoiceElement {
            path: path.into(),
            fixed_value,
        });
        self
    }

    pub fn contains_element(&self, element: &MustSupportElement) -> bool {
        self.paths.iter().any(|path| *path == element.path)
            || self.elements.iter().any(|choice| {
                choice.path == element.path && choice.fixed_value == element.fixed_value
            })
    }
}

/// A `(path, fixed_value)` member of a choice group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceElement {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<Value>,
}

/// Render a JSON value for messages: strings without quotes.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discriminator_serializes_with_type_tag() {
        let discriminator = Discriminator::PatternCodeableConcept {
            path: "type".to_string(),
            code: Some("plan".to_string()),
            system: Some("http://terminology.hl7.org/CodeSystem/coverage-class".to_string()),
        };
        let value = serde_json::to_value(&discriminator).unwrap();
        assert_eq!(value["type"], json!("patternCodeableConcept"));
        assert_eq!(value["code"], json!("plan"));

        let back: Discriminator = serde_json::from_value(value).unwrap();
        assert_eq!(back, discriminator);
    }

    #[test]
    fn test_display_string_with_fixed_value() {
        let element = MustSupportElement::new("category.coding.code").with_fixed_value("vital-signs");
        assert_eq!(element.display_string(), "category.coding.code:vital-signs");
        assert_eq!(MustSupportElement::new("status").display_string(), "status");
    }

    #[test]
    fn test_add_type_choice_requires_alternatives() {
        let mut metadata = MustSupportMetadata::new("http://example.org/p", "Observation");
        metadata.add_element(MustSupportElement {
            path: "valueQuantity".to_string(),
            original_path: Some("value[x]".to_string()),
            ..Default::default()
        });
        assert!(!metadata.add_type_choice("value[x]"));

        metadata.add_element(MustSupportElement {
            path: "valueCodeableConcept".to_string(),
            original_path: Some("value[x]".to_string()),
            ..Default::default()
        });
        assert!(metadata.add_type_choice("value[x]"));
        assert_eq!(
            metadata.choices[0].paths,
            vec!["valueQuantity".to_string(), "valueCodeableConcept".to_string()]
        );
    }

    #[test]
    fn test_slice_at_scopes_name_to_field() {
        let slice = |path: &str, code: &str| MustSupportSlice {
            slice_id: format!("Observation.{path}:primary"),
            slice_name: "primary".to_string(),
            path: path.to_string(),
            discriminator: Discriminator::Type {
                path: String::new(),
                code: code.to_string(),
            },
            uscdi_only: false,
        };
        let mut metadata = MustSupportMetadata::new("http://example.org/p", "Observation");
        metadata.slices.push(slice("category", "CodeableConcept"));
        metadata.slices.push(slice("component.value[x]", "Quantity"));

        let category = metadata.slice_at("category", "primary").unwrap();
        assert_eq!(category.path, "category");
        let value = metadata.slice_at("value", "primary").unwrap();
        assert_eq!(value.path, "component.value[x]");
        assert_eq!(metadata.slice_at("value[x]", "primary").unwrap().path, "component.value[x]");
        assert!(metadata.slice_at("code", "primary").is_none());
    }
}
