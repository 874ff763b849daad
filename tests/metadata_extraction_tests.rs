mod common;

use common::*;
use octofhir_conformance::*;
use pretty_assertions::assert_eq;
use serde_json::json;

const LOINC: &str = "http://loinc.org";
const US_CORE_PATIENT: &str = "http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient";

fn paths(metadata: &MustSupportMetadata) -> Vec<String> {
    metadata.elements.iter().map(MustSupportElement::display_string).collect()
}

#[test]
fn test_coverage_slices_and_elements() {
    let metadata = extract_metadata(&coverage_profile(), &IgPackage::new()).unwrap();

    assert_eq!(metadata.profile_url, COVERAGE_PROFILE_URL);
    assert_eq!(metadata.profile_version.as_deref(), Some("1.0.0"));
    assert_eq!(metadata.resource_type, "Coverage");
    assert_eq!(
        paths(&metadata),
        vec!["status", "class", "class:plan.value", "class:group.value"]
    );

    let plan = metadata.slice_by_name("plan").unwrap();
    assert_eq!(plan.slice_id, "Coverage.class:plan");
    assert_eq!(plan.path, "class");
    assert_eq!(
        plan.discriminator,
        Discriminator::PatternCodeableConcept {
            path: "type".to_string(),
            code: Some("plan".to_string()),
            system: Some(COVERAGE_CLASS_SYSTEM.to_string()),
        }
    );
    assert!(metadata.slice_by_name("group").is_some());
}

#[test]
fn test_extraction_is_deterministic() {
    let profile = coverage_profile();
    let ig = IgPackage::new();
    assert_eq!(
        extract_metadata(&profile, &ig).unwrap(),
        extract_metadata(&profile, &ig).unwrap()
    );
}

#[test]
fn test_type_level_must_support() {
    let metadata = extract_metadata(&observation_profile(), &IgPackage::new()).unwrap();
    assert_eq!(paths(&metadata), vec!["status", "valueQuantity", "valueCodeableConcept"]);

    let quantity = metadata.element_by_path("valueQuantity").unwrap();
    assert_eq!(quantity.original_path.as_deref(), Some("value[x]"));
}

#[test]
fn test_type_level_reference_target_profiles() {
    let type_ms = json!([{"url": TYPE_MUST_SUPPORT_EXTENSION_URL, "valueBoolean": true}]);
    let profile = profile(
        "http://example.org/fhir/StructureDefinition/test-procedure",
        "Procedure",
        vec![json!({
            "id": "Procedure.performed[x]",
            "path": "Procedure.performed[x]",
            "mustSupport": true,
            "type": [
                {"code": "dateTime", "extension": type_ms},
                {"code": "Period"}
            ]
        }), json!({
            "id": "Procedure.recorder",
            "path": "Procedure.recorder",
            "mustSupport": true,
            "type": [{"code": "Reference", "targetProfile": [US_CORE_PATIENT]}]
        })],
    );
    let metadata = extract_metadata(&profile, &IgPackage::new()).unwrap();

    assert_eq!(paths(&metadata), vec!["performedDateTime", "recorder"]);
    let recorder = metadata.element_by_path("recorder").unwrap();
    assert_eq!(recorder.types, vec!["Reference"]);
    assert_eq!(recorder.target_profiles, vec![US_CORE_PATIENT]);
}

#[test]
fn test_base_target_profiles_are_dropped_for_plain_references() {
    let profile = profile(
        "http://example.org/fhir/StructureDefinition/test-encounter",
        "Encounter",
        vec![
            json!({
                "id": "Encounter.subject",
                "path": "Encounter.subject",
                "mustSupport": true,
                "type": [{
                    "code": "Reference",
                    "targetProfile": ["http://hl7.org/fhir/StructureDefinition/Patient"]
                }]
            }),
            json!({
                "id": "Encounter.participant.individual",
                "path": "Encounter.participant.individual",
                "mustSupport": true,
                "type": [{"code": "Reference", "targetProfile": [US_CORE_PATIENT]}]
            }),
        ],
    );
    let metadata = extract_metadata(&profile, &IgPackage::new()).unwrap();

    let subject = metadata.element_by_path("subject").unwrap();
    assert_eq!(subject.types, vec!["Reference"]);
    assert!(subject.target_profiles.is_empty());

    let individual = metadata.element_by_path("participant.individual").unwrap();
    assert_eq!(individual.target_profiles, vec![US_CORE_PATIENT]);
}

#[test]
fn test_fixed_and_pattern_values() {
    let profile = profile(
        OBSERVATION_PROFILE_URL,
        "Observation",
        vec![
            json!({
                "id": "Observation.category",
                "path": "Observation.category",
                "mustSupport": true,
                "patternCodeableConcept": {
                    "coding": [{
                        "system": "http://terminology.hl7.org/CodeSystem/observation-category",
                        "code": "vital-signs"
                    }]
                }
            }),
            json!({
                "id": "Observation.code.coding.system",
                "path": "Observation.code.coding.system",
                "mustSupport": true,
                "fixedUri": LOINC
            }),
            json!({
                "id": "Observation.identifier",
                "path": "Observation.identifier",
                "mustSupport": true,
                "patternIdentifier": {"system": "http://example.org/ids"}
            }),
        ],
    );
    let metadata = extract_metadata(&profile, &IgPackage::new()).unwrap();

    assert_eq!(
        paths(&metadata),
        vec![
            "category.coding.code:vital-signs",
            "code.coding.system:http://loinc.org",
            "identifier.system:http://example.org/ids",
        ]
    );
}

#[test]
fn test_extensions() {
    let race = "http://hl7.org/fhir/us/core/StructureDefinition/us-core-race";
    let profile = profile(
        US_CORE_PATIENT,
        "Patient",
        vec![
            json!({"id": "Patient.extension", "path": "Patient.extension"}),
            json!({
                "id": "Patient.extension:race",
                "path": "Patient.extension",
                "sliceName": "race",
                "mustSupport": true,
                "type": [{"code": "Extension", "profile": [race]}]
            }),
            ms("Patient.name"),
        ],
    );
    let metadata = extract_metadata(&profile, &IgPackage::new()).unwrap();

    assert_eq!(
        metadata.extensions,
        vec![MustSupportExtension {
            id: "Patient.extension:race".to_string(),
            path: "extension".to_string(),
            url: race.to_string(),
            uscdi_only: false,
        }]
    );
    assert!(metadata.slices.is_empty());
    assert_eq!(paths(&metadata), vec!["name"]);
}

#[test]
fn test_requirement_only_elements() {
    let requirement = "http://example.org/fhir/StructureDefinition/uscdi-requirement";
    let profile = profile(
        US_CORE_PATIENT,
        "Patient",
        vec![
            ms("Patient.name"),
            json!({
                "id": "Patient.telecom",
                "path": "Patient.telecom",
                "extension": [{"url": requirement, "valueBoolean": true}]
            }),
        ],
    );
    let ig = IgPackage::new();

    let without = extract_metadata(&profile, &ig).unwrap();
    assert_eq!(paths(&without), vec!["name"]);

    let options = ExtractorOptions::default().with_requirement_extension(requirement);
    let with = MetadataExtractor::new(&profile, &ig, &options).extract().unwrap();
    assert_eq!(paths(&with), vec!["name", "telecom"]);
    assert!(!with.element_by_path("name").unwrap().uscdi_only);
    assert!(with.element_by_path("telecom").unwrap().uscdi_only);
}

fn blood_pressure_profile() -> StructureDefinition {
    let component = |name: &str, code: &str| {
        vec![
            json!({
                "id": format!("Observation.component:{name}"),
                "path": "Observation.component",
                "sliceName": name,
                "mustSupport": true
            }),
            json!({
                "id": format!("Observation.component:{name}.code"),
                "path": "Observation.component.code",
                "patternCodeableConcept": {"coding": [{"system": LOINC, "code": code}]}
            }),
            ms(&format!("Observation.component:{name}.value[x]")),
        ]
    };

    let mut elements = vec![json!({
        "id": "Observation.component",
        "path": "Observation.component",
        "slicing": {"discriminator": [{"type": "value", "path": "code"}], "rules": "open"}
    })];
    elements.extend(component("systolic", "8480-6"));
    elements.extend(component("diastolic", "8462-4"));
    profile("http://example.org/fhir/StructureDefinition/test-bp", "Observation", elements)
}

#[test]
fn test_value_slices() {
    let metadata = extract_metadata(&blood_pressure_profile(), &IgPackage::new()).unwrap();

    let systolic = metadata.slice_by_name("systolic").unwrap();
    assert_eq!(systolic.path, "component");
    assert_eq!(
        systolic.discriminator,
        Discriminator::Value {
            values: vec![DiscriminatorValue {
                path: "code".to_string(),
                value: json!({"coding": [{"system": LOINC, "code": "8480-6"}]}),
            }]
        }
    );
    assert_eq!(
        paths(&metadata),
        vec!["component:systolic.value[x]", "component:diastolic.value[x]"]
    );

    let resources = vec![json!({
        "resourceType": "Observation",
        "component": [{
            "code": {"coding": [{"system": LOINC, "code": "8480-6", "display": "Systolic"}]},
            "valueQuantity": {"value": 120, "unit": "mm[Hg]"}
        }]
    })];
    let report = assess(&resources, &metadata);
    assert_eq!(
        report.to_strings(),
        vec!["component:diastolic.value[x]", "Observation.component:diastolic"]
    );
}

#[test]
fn test_type_slices() {
    let profile = profile(
        "http://example.org/fhir/StructureDefinition/test-obs-typed",
        "Observation",
        vec![
            json!({
                "id": "Observation.value[x]",
                "path": "Observation.value[x]",
                "slicing": {"discriminator": [{"type": "type", "path": "$this"}], "rules": "open"}
            }),
            json!({
                "id": "Observation.value[x]:valueQuantity",
                "path": "Observation.value[x]",
                "sliceName": "valueQuantity",
                "mustSupport": true,
                "type": [{"code": "Quantity"}]
            }),
        ],
    );
    let metadata = extract_metadata(&profile, &IgPackage::new()).unwrap();

    let slice = metadata.slice_by_name("valueQuantity").unwrap();
    assert_eq!(
        slice.discriminator,
        Discriminator::Type {
            path: String::new(),
            code: "Quantity".to_string()
        }
    );

    let quantity = vec![json!({"resourceType": "Observation", "valueQuantity": {"value": 1}})];
    assert!(assess(&quantity, &metadata).is_empty());

    let string = vec![json!({"resourceType": "Observation", "valueString": "high"})];
    assert_eq!(
        assess(&string, &metadata).to_strings(),
        vec!["Observation.value[x]:valueQuantity"]
    );
}

#[test]
fn test_required_binding_slice() {
    let category_system = "http://terminology.hl7.org/CodeSystem/condition-category";
    let value_set_url = "http://example.org/fhir/ValueSet/condition-category";

    let mut ig = IgPackage::new();
    ig.add_resource(
        json!({
            "resourceType": "ValueSet",
            "url": value_set_url,
            "compose": {"include": [{
                "system": category_system,
                "concept": [{"code": "problem-list-item"}, {"code": "health-concern"}]
            }]}
        }),
        false,
    );

    let profile = profile(
        "http://example.org/fhir/StructureDefinition/test-condition",
        "Condition",
        vec![
            json!({
                "id": "Condition.category",
                "path": "Condition.category",
                "slicing": {"discriminator": [{"type": "pattern", "path": "$this"}], "rules": "open"}
            }),
            json!({
                "id": "Condition.category:us-core",
                "path": "Condition.category",
                "sliceName": "us-core",
                "mustSupport": true,
                "binding": {"strength": "required", "valueSet": value_set_url}
            }),
        ],
    );
    let metadata = extract_metadata(&profile, &ig).unwrap();

    let slice = metadata.slice_by_name("us-core").unwrap();
    assert_eq!(
        slice.discriminator,
        Discriminator::RequiredBinding {
            path: String::new(),
            values: vec![
                BoundCoding::new(Some(category_system), "problem-list-item"),
                BoundCoding::new(Some(category_system), "health-concern"),
            ],
        }
    );

    let resources = vec![json!({
        "resourceType": "Condition",
        "category": [{"coding": [{"system": category_system, "code": "health-concern"}]}]
    })];
    assert!(assess(&resources, &metadata).is_empty());
}

#[test]
fn test_unsupported_pattern_discriminator() {
    let profile = profile(
        "http://example.org/fhir/StructureDefinition/test-condition",
        "Condition",
        vec![
            json!({
                "id": "Condition.category",
                "path": "Condition.category",
                "slicing": {"discriminator": [{"type": "pattern", "path": "$this"}]}
            }),
            json!({
                "id": "Condition.category:odd",
                "path": "Condition.category",
                "sliceName": "odd",
                "mustSupport": true
            }),
        ],
    );

    let err = extract_metadata(&profile, &IgPackage::new()).unwrap_err();
    assert!(matches!(
        err,
        ConformanceError::UnsupportedDiscriminator { ref slice_id, .. } if slice_id == "Condition.category:odd"
    ));
}

#[test]
fn test_exists_discriminator_is_skipped() {
    let profile = profile(
        "http://example.org/fhir/StructureDefinition/test-patient",
        "Patient",
        vec![
            json!({
                "id": "Patient.identifier",
                "path": "Patient.identifier",
                "slicing": {"discriminator": [{"type": "exists", "path": "system"}]}
            }),
            json!({
                "id": "Patient.identifier:any",
                "path": "Patient.identifier",
                "sliceName": "any",
                "mustSupport": true
            }),
        ],
    );
    let metadata = extract_metadata(&profile, &IgPackage::new()).unwrap();
    assert!(metadata.slices.is_empty());
}
