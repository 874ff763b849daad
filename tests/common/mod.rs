use flate2::Compression;
use flate2::write::GzEncoder;
use octofhir_conformance::*;
use serde_json::{Value, json};

pub const COVERAGE_CLASS_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/coverage-class";
pub const COVERAGE_PROFILE_URL: &str = "http://example.org/fhir/StructureDefinition/test-coverage";
pub const OBSERVATION_PROFILE_URL: &str =
    "http://example.org/fhir/StructureDefinition/test-observation";

#[allow(dead_code)]
pub fn profile(url: &str, resource_type: &str, elements: Vec<Value>) -> StructureDefinition {
    serde_json::from_value(profile_json(url, resource_type, elements)).unwrap()
}

#[allow(dead_code)]
pub fn profile_json(url: &str, resource_type: &str, elements: Vec<Value>) -> Value {
    let mut snapshot = vec![json!({"id": resource_type, "path": resource_type})];
    snapshot.extend(elements);
    json!({
        "resourceType": "StructureDefinition",
        "url": url,
        "version": "1.0.0",
        "name": format!("Test{resource_type}"),
        "kind": "resource",
        "type": resource_type,
        "baseDefinition": format!("http://hl7.org/fhir/StructureDefinition/{resource_type}"),
        "derivation": "constraint",
        "snapshot": {"element": snapshot}
    })
}

#[allow(dead_code)]
pub fn ms(id: &str) -> Value {
    json!({"id": id, "path": strip_slices(id), "mustSupport": true})
}

/// Element path for an element id (slice names removed).
#[allow(dead_code)]
pub fn strip_slices(id: &str) -> String {
    id.split('.')
        .map(|segment| segment.split(':').next().unwrap_or(segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// Coverage profile with `class` sliced by `type` pattern into `plan` and `group`.
#[allow(dead_code)]
pub fn coverage_profile() -> StructureDefinition {
    profile(
        COVERAGE_PROFILE_URL,
        "Coverage",
        vec![
            ms("Coverage.status"),
            json!({
                "id": "Coverage.class",
                "path": "Coverage.class",
                "slicing": {"discriminator": [{"type": "pattern", "path": "type"}], "rules": "open"},
                "mustSupport": true
            }),
            class_slice("plan"),
            class_slice_type("plan"),
            ms("Coverage.class:plan.value"),
            class_slice("group"),
            class_slice_type("group"),
            ms("Coverage.class:group.value"),
        ],
    )
}

fn class_slice(name: &str) -> Value {
    json!({
        "id": format!("Coverage.class:{name}"),
        "path": "Coverage.class",
        "sliceName": name,
        "mustSupport": true
    })
}

fn class_slice_type(name: &str) -> Value {
    json!({
        "id": format!("Coverage.class:{name}.type"),
        "path": "Coverage.class.type",
        "patternCodeableConcept": {"coding": [{"system": COVERAGE_CLASS_SYSTEM, "code": name}]}
    })
}

#[allow(dead_code)]
pub fn coverage_class(code: &str, value: &str) -> Value {
    json!({
        "type": {"coding": [{"system": COVERAGE_CLASS_SYSTEM, "code": code}]},
        "value": value
    })
}

/// Observation profile with type-level must-support on `value[x]`.
#[allow(dead_code)]
pub fn observation_profile() -> StructureDefinition {
    let type_ms = json!([{"url": TYPE_MUST_SUPPORT_EXTENSION_URL, "valueBoolean": true}]);
    profile(
        OBSERVATION_PROFILE_URL,
        "Observation",
        vec![
            ms("Observation.status"),
            json!({
                "id": "Observation.value[x]",
                "path": "Observation.value[x]",
                "mustSupport": true,
                "type": [
                    {"code": "Quantity", "extension": type_ms},
                    {"code": "CodeableConcept", "extension": type_ms},
                    {"code": "string"}
                ]
            }),
        ],
    )
}

#[allow(dead_code)]
pub fn manifest(name: &str, version: &str) -> Value {
    json!({"name": name, "version": version, "canonical": "http://example.org/fhir"})
}

/// A gzipped package tarball holding `package.json` and `files`
/// (paths relative to `package/`).
#[allow(dead_code)]
pub fn package_tgz(manifest: &Value, files: &[(&str, Value)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut append = |path: &str, value: &Value| {
        let data = serde_json::to_vec(value).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("package/{path}"), data.as_slice())
            .unwrap();
    };

    append("package.json", manifest);
    for (path, value) in files {
        append(path, value);
    }

    builder.into_inner().unwrap().finish().unwrap()
}
