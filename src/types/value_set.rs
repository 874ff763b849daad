//! ValueSet and CodeSystem types used to materialize bound codes.

use serde::{Deserialize, Serialize};

/// A FHIR ValueSet, reduced to its definition and expansion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValueSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Content logical definition (the "intension")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose: Option<ValueSetCompose>,
    /// Pre-computed expansion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ValueSetExpansion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValueSetCompose {
    #[serde(default)]
    pub include: Vec<ValueSetInclude>,
}

/// One `compose.include` entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetInclude {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<ValueSetConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<ValueSetFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_set: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSetConcept {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Intensional filter. Value sets using these cannot be resolved locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSetFilter {
    pub property: String,
    pub op: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValueSetExpansion {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<ValueSetExpansionContains>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValueSetExpansionContains {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Codes nested under this entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<ValueSetExpansionContains>,
}

/// A FHIR CodeSystem.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeSystem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// not-present | example | fragment | complete | supplement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<CodeSystemConcept>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSystemConcept {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Child concepts (is-a hierarchy)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<CodeSystemConcept>,
}

impl CodeSystem {
    /// All codes in the system, hierarchy flattened depth-first.
    pub fn all_codes(&self) -> Vec<&str> {
        fn walk<'a>(concepts: &'a [CodeSystemConcept], out: &mut Vec<&'a str>) {
            for concept in concepts {
                out.push(&concept.code);
                walk(&concept.concept, out);
            }
        }
        let mut codes = Vec::new();
        walk(&self.concept, &mut codes);
        codes
    }
}

impl ValueSetExpansion {
    /// All `(system, code)` entries, nested `contains` flattened.
    pub fn flattened(&self) -> Vec<&ValueSetExpansionContains> {
        fn walk<'a>(
            entries: &'a [ValueSetExpansionContains],
            out: &mut Vec<&'a ValueSetExpansionContains>,
        ) {
            for entry in entries {
                out.push(entry);
                walk(&entry.contains, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.contains, &mut out);
        out
    }
}
