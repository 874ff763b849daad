//! Borrowed view over FHIR JSON used by path navigation.
//!
//! A [`Node`] is one value reachable in a resource. Arrays are always
//! flattened into several nodes, so a node never wraps a JSON array. A
//! primitive is paired with its `_field` sibling, which makes the primitive
//! value and its extensions reachable through the same handle:
//!
//! ```text
//! { "birthDate": "1970", "_birthDate": { "extension": [...] } }
//!         -> Node { value: "1970", primitive extensions: [...] }
//! ```
//!
//! A `_field` without a value (common for data-absent-reason) still yields a
//! node whose value is `None`.

use serde_json::Value;

pub const DATA_ABSENT_REASON_URL: &str =
    "http://hl7.org/fhir/StructureDefinition/data-absent-reason";

/// Type suffixes a choice element (`value[x]`) can carry in JSON.
const CHOICE_TYPE_SUFFIXES: &[&str] = &[
    "Base64Binary", "Boolean", "Canonical", "Code", "Date", "DateTime", "Decimal", "Id",
    "Instant", "Integer", "Integer64", "Markdown", "Oid", "PositiveInt", "String", "Time",
    "UnsignedInt", "Uri", "Url", "Uuid", "Address", "Age", "Annotation", "Attachment",
    "CodeableConcept", "CodeableReference", "Coding", "ContactDetail", "ContactPoint",
    "Contributor", "Count", "DataRequirement", "Distance", "Dosage", "Duration", "Expression",
    "HumanName", "Identifier", "Meta", "Money", "ParameterDefinition", "Period", "Quantity",
    "Range", "Ratio", "RatioRange", "Reference", "RelatedArtifact", "SampledData", "Signature",
    "Timing", "TriggerDefinition", "UsageContext",
];

/// Field name used for `class` by code generators that reserve the word.
const CLASS_ALIAS: &str = "local_class";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node<'a> {
    value: Option<&'a Value>,
    primitive_extension: Option<&'a Value>,
    type_hint: Option<&'a str>,
}

impl<'a> Node<'a> {
    /// Wrap a resource (or any JSON value) as the starting point of navigation.
    pub fn root(value: &'a Value) -> Self {
        Self {
            value: Some(value),
            primitive_extension: None,
            type_hint: None,
        }
    }

    /// Wrap every entry of a JSON array (or a single value) as root nodes.
    pub fn roots(value: &'a Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().filter(|v| !v.is_null()).map(Node::root).collect(),
            Value::Null => Vec::new(),
            other => vec![Node::root(other)],
        }
    }

    pub fn value(&self) -> Option<&'a Value> {
        self.value
    }

    /// The `_field` companion object of a primitive, if any.
    pub fn primitive_extension(&self) -> Option<&'a Value> {
        self.primitive_extension
    }

    /// Type suffix taken from a choice key (`Quantity` for `valueQuantity`).
    pub fn type_hint(&self) -> Option<&'a str> {
        self.type_hint
    }

    /// The scalar value, when this node is a primitive.
    pub fn as_primitive(&self) -> Option<&'a Value> {
        self.value.filter(|v| !v.is_object() && !v.is_array())
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.value.and_then(Value::as_str)
    }

    pub fn is_false(&self) -> bool {
        self.value == Some(&Value::Bool(false))
    }

    pub fn is_object(&self) -> bool {
        self.value.is_some_and(Value::is_object)
    }

    /// True for nodes carrying a `_field` companion.
    pub fn is_primitive_wrapper(&self) -> bool {
        self.primitive_extension.is_some()
    }

    /// `resourceType` of the wrapped value, if it is a resource.
    pub fn resource_type(&self) -> Option<&'a str> {
        self.value?.get("resourceType")?.as_str()
    }

    /// String value of a direct child, used for `code`, `system`, `url`.
    pub fn str_field(&self, name: &str) -> Option<&'a str> {
        self.value?.get(name)?.as_str()
    }

    pub fn url(&self) -> Option<&'a str> {
        self.str_field("url")
    }

    /// Logical field names available on this node (`_field` keys folded in).
    pub fn fields(&self) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = Vec::new();
        for source in [self.value, self.primitive_extension].into_iter().flatten() {
            if let Some(object) = source.as_object() {
                for key in object.keys() {
                    let name = key.strip_prefix('_').unwrap_or(key);
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    /// Children reachable through field `name`.
    ///
    /// Looks the field up on the value, falling back to the `_field`
    /// companion for primitives (so `extension` of a primitive resolves).
    /// A missing field yields an empty list; keys that merely start with
    /// `name` (`statusReason` for `status`) are never consulted.
    pub fn field(&self, name: &str) -> Vec<Node<'a>> {
        let name = if name == CLASS_ALIAS { "class" } else { name };

        if let Some(object) = self.value.and_then(Value::as_object) {
            let direct = object.get(name);
            let sibling = object.get(&format!("_{name}"));
            return pair_with_siblings(direct, sibling, None);
        }

        match self.primitive_extension.and_then(Value::as_object) {
            Some(companion) => companion
                .get(name)
                .map(|value| pair_with_siblings(Some(value), None, None))
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Children of the choice element `name[x]`, read from its typed key
    /// (`valueQuantity` for `value`) with the type suffix kept as the hint.
    ///
    /// Only suffixes naming a FHIR data type qualify.
    pub fn choice_field(&self, name: &str) -> Vec<Node<'a>> {
        let Some(object) = self.value.and_then(Value::as_object) else {
            return Vec::new();
        };
        let typed_key = |key: &'a str| -> Option<&'a str> {
            key.strip_prefix(name)
                .filter(|suffix| CHOICE_TYPE_SUFFIXES.contains(suffix))
        };

        if let Some((key, hint)) = object
            .keys()
            .find_map(|key| typed_key(key.as_str()).map(|hint| (key, hint)))
        {
            return pair_with_siblings(object.get(key), object.get(&format!("_{key}")), Some(hint));
        }

        // `_valueDate` without `valueDate`
        object
            .iter()
            .find_map(|(key, companion)| {
                let hint = typed_key(key.strip_prefix('_')?)?;
                Some(pair_with_siblings(None, Some(companion), Some(hint)))
            })
            .unwrap_or_default()
    }

    /// Extensions attached to this node: the primitive companion's and, for
    /// complex values, the value's own `extension` array.
    pub fn extensions(&self) -> Vec<&'a Value> {
        let mut out = Vec::new();
        for source in [self.primitive_extension, self.value].into_iter().flatten() {
            if let Some(Value::Array(items)) = source.get("extension") {
                out.extend(items.iter());
            }
        }
        out
    }

    pub fn extension_urls(&self) -> Vec<&'a str> {
        self.extensions()
            .into_iter()
            .filter_map(|ext| ext.get("url").and_then(Value::as_str))
            .collect()
    }

    pub fn has_extension(&self, url: &str) -> bool {
        self.extension_urls().contains(&url)
    }

    pub fn has_data_absent_reason(&self) -> bool {
        self.has_extension(DATA_ABSENT_REASON_URL)
    }

    /// Whether the node holds something: a non-blank value or a primitive
    /// companion. `false` is *not* present; see [`Node::is_found`].
    pub fn is_present(&self) -> bool {
        self.value.is_some_and(value_present) || self.primitive_extension.is_some()
    }

    /// Present, or the boolean `false`.
    pub fn is_found(&self) -> bool {
        self.is_present() || self.is_false()
    }

    /// Whether the value is populated once its `extension` entries are
    /// ignored. Boolean `false` counts as populated.
    pub fn has_value_without_extensions(&self) -> bool {
        match self.value {
            Some(Value::Object(object)) => object
                .iter()
                .any(|(key, value)| key != "extension" && value_present(value)),
            Some(Value::Bool(false)) => true,
            Some(other) => value_present(other),
            None => false,
        }
    }
}

/// Presence check: blank strings, empty collections and `false` are absent.
fn value_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(object) => !object.is_empty(),
        Value::Bool(true) | Value::Number(_) => true,
    }
}

/// Zip a field with its `_field` companion. Arrays are paired by index.
fn pair_with_siblings<'a>(
    direct: Option<&'a Value>,
    sibling: Option<&'a Value>,
    type_hint: Option<&'a str>,
) -> Vec<Node<'a>> {
    let non_null = |v: Option<&'a Value>| v.filter(|v| !v.is_null());

    match (direct, sibling) {
        (Some(Value::Array(values)), sibling) => {
            let companions = sibling.and_then(Value::as_array);
            values
                .iter()
                .enumerate()
                .filter_map(|(index, value)| {
                    let companion = non_null(companions.and_then(|c| c.get(index)));
                    let value = non_null(Some(value));
                    (value.is_some() || companion.is_some()).then_some(Node {
                        value,
                        primitive_extension: companion,
                        type_hint,
                    })
                })
                .collect()
        }
        (None, Some(Value::Array(companions))) => companions
            .iter()
            .filter(|c| !c.is_null())
            .map(|companion| Node {
                value: None,
                primitive_extension: Some(companion),
                type_hint,
            })
            .collect(),
        (direct, sibling) => {
            let value = non_null(direct);
            let companion = non_null(sibling);
            if value.is_none() && companion.is_none() {
                return Vec::new();
            }
            vec![Node {
                value,
                primitive_extension: companion,
                type_hint,
            }]
        }
    }
}
