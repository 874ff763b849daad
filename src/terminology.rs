//! Code materialization from bindings, patterns and base FHIR metadata.
//!
//! [`ValueExtractor`] answers "which codes may appear here?" for an element of
//! a profile. It prefers the value set's definition (`compose.include`), then
//! its pre-computed expansion, and finally a small table of required bindings
//! from the base R4 specification.

use std::collections::HashSet;

use serde_json::Value;

use crate::package::IgPackage;
use crate::types::{BoundCoding, CodeSystem, ElementDefinition, ValueSet, ValueSetInclude};

/// Where the codes of one `compose.include` entry come from.
#[derive(Debug, Clone, Copy)]
pub enum BoundSystem<'a> {
    /// An include entry enumerating its concepts
    Include(&'a ValueSetInclude),
    /// A whole code system included without filters
    CodeSystem(&'a CodeSystem),
}

impl BoundSystem<'_> {
    fn codings(&self) -> Vec<BoundCoding> {
        match self {
            BoundSystem::Include(include) => include
                .concept
                .iter()
                .map(|concept| BoundCoding::new(include.system.as_deref(), concept.code.clone()))
                .collect(),
            BoundSystem::CodeSystem(code_system) => code_system
                .all_codes()
                .into_iter()
                .map(|code| BoundCoding::new(Some(&code_system.url), code))
                .collect(),
        }
    }
}

/// Extracts allowed codes for elements of one profile.
#[derive(Debug, Clone, Copy)]
pub struct ValueExtractor<'a> {
    ig: &'a IgPackage,
    resource_type: &'a str,
    profile_elements: &'a [ElementDefinition],
}

impl<'a> ValueExtractor<'a> {
    pub fn new(
        ig: &'a IgPackage,
        resource_type: &'a str,
        profile_elements: &'a [ElementDefinition],
    ) -> Self {
        Self {
            ig,
            resource_type,
            profile_elements,
        }
    }

    /// Codes allowed by the element's value set binding.
    pub fn values_from_value_set_binding(&self, element: &ElementDefinition) -> Vec<String> {
        self.codings_from_value_set_binding(element)
            .into_iter()
            .map(|coding| coding.code)
            .collect()
    }

    /// `(system, code)` pairs allowed by the element's value set binding.
    ///
    /// Empty when the value set is unknown or only defined by filters and
    /// has no expansion.
    pub fn codings_from_value_set_binding(&self, element: &ElementDefinition) -> Vec<BoundCoding> {
        let Some(url) = element
            .binding
            .as_ref()
            .and_then(|binding| binding.value_set.as_deref())
        else {
            return Vec::new();
        };
        self.codings_from_value_set_url(url)
    }

    pub fn codings_from_value_set_url(&self, url: &str) -> Vec<BoundCoding> {
        let Some(value_set) = self.ig.value_set_by_url(url) else {
            tracing::debug!("Value set {} not found in package", url);
            return Vec::new();
        };

        let systems = self.bound_systems(value_set);
        let codings: Vec<BoundCoding> = if !systems.is_empty() {
            systems.iter().flat_map(BoundSystem::codings).collect()
        } else if let Some(expansion) = &value_set.expansion {
            expansion
                .flattened()
                .into_iter()
                .filter_map(|entry| {
                    entry
                        .code
                        .as_ref()
                        .map(|code| BoundCoding::new(entry.system.as_deref(), code.clone()))
                })
                .collect()
        } else {
            Vec::new()
        };
        unique(codings)
    }

    /// Include entries with explicit concepts, and unfiltered whole-system
    /// includes resolved through the package. Nested `valueSet` references
    /// are followed; filtered includes are skipped.
    pub fn bound_systems(&self, value_set: &'a ValueSet) -> Vec<BoundSystem<'a>> {
        let mut visited = HashSet::new();
        self.collect_bound_systems(value_set, &mut visited)
    }

    fn collect_bound_systems(
        &self,
        value_set: &'a ValueSet,
        visited: &mut HashSet<&'a str>,
    ) -> Vec<BoundSystem<'a>> {
        if !visited.insert(value_set.url.as_str()) {
            return Vec::new();
        }
        let Some(compose) = &value_set.compose else {
            return Vec::new();
        };

        let mut systems = Vec::new();
        for include in &compose.include {
            if !include.concept.is_empty() {
                systems.push(BoundSystem::Include(include));
            } else if let (Some(system), true) = (&include.system, include.filter.is_empty()) {
                match self.ig.code_system_by_url(system) {
                    Some(code_system) => systems.push(BoundSystem::CodeSystem(code_system)),
                    None => tracing::debug!("Code system {} not found in package", system),
                }
            }

            for nested_url in &include.value_set {
                if let Some(nested) = self.ig.value_set_by_url(nested_url) {
                    systems.extend(self.collect_bound_systems(nested, visited));
                }
            }
        }
        systems
    }

    /// The single fixed or pattern code of an element, by FHIR type.
    pub fn values_from_fixed_codes(&self, element: &ElementDefinition, type_code: &str) -> Vec<String> {
        match type_code {
            "CodeableConcept" => self.values_from_pattern_codeable_concept(element),
            "Coding" => self.values_from_pattern_coding(element),
            "code" | "string" | "uri" => ["fixedCode", "patternCode", "fixedString", "fixedUri"]
                .iter()
                .find_map(|key| element.pattern_fields.get(*key).and_then(Value::as_str))
                .map(|code| vec![code.to_string()])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn values_from_pattern_coding(&self, element: &ElementDefinition) -> Vec<String> {
        ["patternCoding", "fixedCoding"]
            .iter()
            .find_map(|key| element.pattern_fields.get(*key))
            .and_then(|coding| coding.get("code"))
            .and_then(Value::as_str)
            .map(|code| vec![code.to_string()])
            .unwrap_or_default()
    }

    pub fn values_from_pattern_codeable_concept(&self, element: &ElementDefinition) -> Vec<String> {
        ["patternCodeableConcept", "fixedCodeableConcept"]
            .iter()
            .find_map(|key| element.pattern_fields.get(*key))
            .and_then(|concept| concept.get("coding"))
            .and_then(Value::as_array)
            .map(|codings| {
                codings
                    .iter()
                    .filter_map(|coding| coding.get("code").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Codes for `paths` from the profile's own bindings, falling back to the
    /// required bindings of the base specification.
    pub fn values_from_resource_metadata(&self, paths: &[&str]) -> Vec<BoundCoding> {
        let mut codings = Vec::new();
        for path in paths {
            let relative = self.relative_path(path);
            let full_path = format!("{}.{}", self.resource_type, relative);

            let from_profile = self
                .profile_elements
                .iter()
                .find(|element| element.path == full_path && element.has_required_binding())
                .map(|element| self.codings_from_value_set_binding(element))
                .unwrap_or_default();

            if !from_profile.is_empty() {
                codings.extend(from_profile);
            } else {
                codings.extend(base_required_binding(self.resource_type, relative));
            }
        }
        unique(codings)
    }

    fn relative_path<'p>(&self, path: &'p str) -> &'p str {
        path.strip_prefix(self.resource_type)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(path)
    }
}

fn unique(codings: Vec<BoundCoding>) -> Vec<BoundCoding> {
    let mut seen = HashSet::new();
    codings
        .into_iter()
        .filter(|coding| seen.insert(coding.clone()))
        .collect()
}

struct BaseBinding {
    resource_type: &'static str,
    path: &'static str,
    system: &'static str,
    codes: &'static [&'static str],
}

/// Required bindings of the base FHIR R4 specification.
static BASE_REQUIRED_BINDINGS: &[BaseBinding] = &[
    BaseBinding {
        resource_type: "AllergyIntolerance",
        path: "clinicalStatus",
        system: "http://terminology.hl7.org/CodeSystem/allergyintolerance-clinical",
        codes: &["active", "inactive", "resolved"],
    },
    BaseBinding {
        resource_type: "AllergyIntolerance",
        path: "verificationStatus",
        system: "http://terminology.hl7.org/CodeSystem/allergyintolerance-verification",
        codes: &["unconfirmed", "confirmed", "refuted", "entered-in-error"],
    },
    BaseBinding {
        resource_type: "AllergyIntolerance",
        path: "type",
        system: "http://hl7.org/fhir/allergy-intolerance-type",
        codes: &["allergy", "intolerance"],
    },
    BaseBinding {
        resource_type: "AllergyIntolerance",
        path: "category",
        system: "http://hl7.org/fhir/allergy-intolerance-category",
        codes: &["food", "medication", "environment", "biologic"],
    },
    BaseBinding {
        resource_type: "AllergyIntolerance",
        path: "criticality",
        system: "http://hl7.org/fhir/allergy-intolerance-criticality",
        codes: &["low", "high", "unable-to-assess"],
    },
    BaseBinding {
        resource_type: "CarePlan",
        path: "status",
        system: "http://hl7.org/fhir/request-status",
        codes: &["draft", "active", "on-hold", "revoked", "completed", "entered-in-error", "unknown"],
    },
    BaseBinding {
        resource_type: "CarePlan",
        path: "intent",
        system: "http://hl7.org/fhir/request-intent",
        codes: &["proposal", "plan", "order", "option"],
    },
    BaseBinding {
        resource_type: "CareTeam",
        path: "status",
        system: "http://hl7.org/fhir/care-team-status",
        codes: &["proposed", "active", "suspended", "inactive", "entered-in-error"],
    },
    BaseBinding {
        resource_type: "Condition",
        path: "clinicalStatus",
        system: "http://terminology.hl7.org/CodeSystem/condition-clinical",
        codes: &["active", "recurrence", "relapse", "inactive", "remission", "resolved"],
    },
    BaseBinding {
        resource_type: "Condition",
        path: "verificationStatus",
        system: "http://terminology.hl7.org/CodeSystem/condition-ver-status",
        codes: &["unconfirmed", "provisional", "differential", "confirmed", "refuted", "entered-in-error"],
    },
    BaseBinding {
        resource_type: "Coverage",
        path: "status",
        system: "http://hl7.org/fhir/fm-status",
        codes: &["active", "cancelled", "draft", "entered-in-error"],
    },
    BaseBinding {
        resource_type: "DiagnosticReport",
        path: "status",
        system: "http://hl7.org/fhir/diagnostic-report-status",
        codes: &[
            "registered", "partial", "preliminary", "final", "amended", "corrected", "appended",
            "cancelled", "entered-in-error", "unknown",
        ],
    },
    BaseBinding {
        resource_type: "DocumentReference",
        path: "status",
        system: "http://hl7.org/fhir/document-reference-status",
        codes: &["current", "superseded", "entered-in-error"],
    },
    BaseBinding {
        resource_type: "DocumentReference",
        path: "docStatus",
        system: "http://hl7.org/fhir/composition-status",
        codes: &["preliminary", "final", "amended", "entered-in-error"],
    },
    BaseBinding {
        resource_type: "Encounter",
        path: "status",
        system: "http://hl7.org/fhir/encounter-status",
        codes: &[
            "planned", "arrived", "triaged", "in-progress", "onleave", "finished", "cancelled",
            "entered-in-error", "unknown",
        ],
    },
    BaseBinding {
        resource_type: "Goal",
        path: "lifecycleStatus",
        system: "http://hl7.org/fhir/goal-status",
        codes: &[
            "proposed", "planned", "accepted", "active", "on-hold", "completed", "cancelled",
            "entered-in-error", "rejected",
        ],
    },
    BaseBinding {
        resource_type: "Immunization",
        path: "status",
        system: "http://hl7.org/fhir/event-status",
        codes: &["completed", "entered-in-error", "not-done"],
    },
    BaseBinding {
        resource_type: "Location",
        path: "status",
        system: "http://hl7.org/fhir/location-status",
        codes: &["active", "suspended", "inactive"],
    },
    BaseBinding {
        resource_type: "MedicationRequest",
        path: "status",
        system: "http://hl7.org/fhir/CodeSystem/medicationrequest-status",
        codes: &[
            "active", "on-hold", "cancelled", "completed", "entered-in-error", "stopped", "draft",
            "unknown",
        ],
    },
    BaseBinding {
        resource_type: "MedicationRequest",
        path: "intent",
        system: "http://hl7.org/fhir/CodeSystem/medicationrequest-intent",
        codes: &[
            "proposal", "plan", "order", "original-order", "reflex-order", "filler-order",
            "instance-order", "option",
        ],
    },
    BaseBinding {
        resource_type: "Observation",
        path: "status",
        system: "http://hl7.org/fhir/observation-status",
        codes: &[
            "registered", "preliminary", "final", "amended", "corrected", "cancelled",
            "entered-in-error", "unknown",
        ],
    },
    BaseBinding {
        resource_type: "Patient",
        path: "gender",
        system: "http://hl7.org/fhir/administrative-gender",
        codes: &["male", "female", "other", "unknown"],
    },
    BaseBinding {
        resource_type: "Procedure",
        path: "status",
        system: "http://hl7.org/fhir/event-status",
        codes: &[
            "preparation", "in-progress", "not-done", "on-hold", "stopped", "completed",
            "entered-in-error", "unknown",
        ],
    },
    BaseBinding {
        resource_type: "QuestionnaireResponse",
        path: "status",
        system: "http://hl7.org/fhir/questionnaire-answers-status",
        codes: &["in-progress", "completed", "amended", "entered-in-error", "stopped"],
    },
    BaseBinding {
        resource_type: "ServiceRequest",
        path: "status",
        system: "http://hl7.org/fhir/request-status",
        codes: &["draft", "active", "on-hold", "revoked", "completed", "entered-in-error", "unknown"],
    },
    BaseBinding {
        resource_type: "ServiceRequest",
        path: "intent",
        system: "http://hl7.org/fhir/request-intent",
        codes: &[
            "proposal", "plan", "directive", "order", "original-order", "reflex-order",
            "filler-order", "instance-order", "option",
        ],
    },
    BaseBinding {
        resource_type: "Specimen",
        path: "status",
        system: "http://hl7.org/fhir/specimen-status",
        codes: &["available", "unavailable", "unsatisfactory", "entered-in-error"],
    },
];

/// Codes of a base-specification required binding at `path`.
pub fn base_required_binding(resource_type: &str, path: &str) -> Vec<BoundCoding> {
    BASE_REQUIRED_BINDINGS
        .iter()
        .filter(|binding| binding.resource_type == resource_type && binding.path == path)
        .flat_map(|binding| {
            binding
                .codes
                .iter()
                .map(|code| BoundCoding::new(Some(binding.system), *code))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn package() -> IgPackage {
        let mut ig = IgPackage::new();
        ig.add_resource(
            json!({
                "resourceType": "ValueSet",
                "url": "http://example.org/ValueSet/outer",
                "compose": {"include": [
                    {"system": "http://example.org/cs/a", "concept": [{"code": "a1"}, {"code": "a2"}]},
                    {"system": "http://example.org/cs/b"},
                    {"system": "http://snomed.info/sct", "filter": [{"property": "concept", "op": "is-a", "value": "1"}]},
                    {"valueSet": ["http://example.org/ValueSet/inner"]}
                ]}
            }),
            false,
        );
        ig.add_resource(
            json!({
                "resourceType": "ValueSet",
                "url": "http://example.org/ValueSet/inner",
                "compose": {"include": [
                    {"system": "http://example.org/cs/c", "concept": [{"code": "c1"}]}
                ]}
            }),
            false,
        );
        ig.add_resource(
            json!({
                "resourceType": "ValueSet",
                "url": "http://example.org/ValueSet/expanded",
                "expansion": {"contains": [
                    {"system": "http://example.org/cs/e", "code": "e1",
                     "contains": [{"system": "http://example.org/cs/e", "code": "e2"}]}
                ]}
            }),
            false,
        );
        ig.add_resource(
            json!({
                "resourceType": "CodeSystem",
                "url": "http://example.org/cs/b",
                "content": "complete",
                "concept": [{"code": "b1", "concept": [{"code": "b2"}]}]
            }),
            false,
        );
        ig
    }

    fn bound_element(value_set: &str) -> ElementDefinition {
        serde_json::from_value(json!({
            "id": "Observation.code",
            "path": "Observation.code",
            "binding": {"strength": "required", "valueSet": value_set}
        }))
        .unwrap()
    }

    #[test]
    fn test_codings_from_compose() {
        let ig = package();
        let extractor = ValueExtractor::new(&ig, "Observation", &[]);
        let codes = extractor.values_from_value_set_binding(&bound_element("http://example.org/ValueSet/outer"));
        assert_eq!(codes, vec!["a1", "a2", "b1", "b2", "c1"]);
    }

    #[test]
    fn test_codings_from_expansion() {
        let ig = package();
        let extractor = ValueExtractor::new(&ig, "Observation", &[]);
        let codings =
            extractor.codings_from_value_set_binding(&bound_element("http://example.org/ValueSet/expanded|1.0"));
        assert_eq!(
            codings,
            vec![
                BoundCoding::new(Some("http://example.org/cs/e"), "e1"),
                BoundCoding::new(Some("http://example.org/cs/e"), "e2"),
            ]
        );
    }

    #[test]
    fn test_unknown_value_set_yields_nothing() {
        let ig = package();
        let extractor = ValueExtractor::new(&ig, "Observation", &[]);
        assert!(extractor
            .codings_from_value_set_binding(&bound_element("http://example.org/ValueSet/missing"))
            .is_empty());
    }

    #[test]
    fn test_base_metadata_fallback() {
        let ig = IgPackage::new();
        let extractor = ValueExtractor::new(&ig, "Patient", &[]);
        let codings = extractor.values_from_resource_metadata(&["Patient.gender"]);
        let codes: Vec<_> = codings.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["male", "female", "other", "unknown"]);
        assert!(extractor.values_from_resource_metadata(&["name"]).is_empty());
    }

    #[test]
    fn test_values_from_patterns() {
        let ig = IgPackage::new();
        let extractor = ValueExtractor::new(&ig, "Observation", &[]);
        let element: ElementDefinition = serde_json::from_value(json!({
            "path": "Observation.category",
            "patternCodeableConcept": {"coding": [{"system": "s", "code": "vital-signs"}]}
        }))
        .unwrap();
        assert_eq!(
            extractor.values_from_fixed_codes(&element, "CodeableConcept"),
            vec!["vital-signs"]
        );
    }
}
