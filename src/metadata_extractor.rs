//! Must-support metadata extraction from profile snapshots.
//!
//! Walks a profile's element definitions and produces a
//! [`MustSupportMetadata`]: the extensions, slices and plain elements a
//! conformant system must be able to populate.
//!
//! ## Elements considered
//!
//! An element is must-support when `mustSupport` is true. When a
//! requirement extension URL is configured, elements carrying that extension
//! without `mustSupport` are also included and flagged `uscdi_only`.
//!
//! ## Slices
//!
//! Only the first discriminator of the slicing definition is used:
//!
//! - `pattern`: CodeableConcept, Coding and Identifier patterns, or a
//!   required binding enumerated through the package's value sets
//! - `type`: the type code found at the discriminator path
//! - `value`: one `(path, fixed value)` pair per discriminator
//!
//! ## Plain elements
//!
//! Paths come from element ids, so children of a slice keep the slice name
//! (`class:plan.value`) and resolve through the slice's discriminator.
//! Type-level must-support on choice elements rewrites `value[x]` into one
//! entry per flagged type (`valueQuantity`, ...). Fixed URIs and codes, and
//! CodeableConcept/Identifier patterns that are not slice discriminators,
//! become required fixed values.

use crate::error::{ConformanceError, Result};
use crate::package::IgPackage;
use crate::terminology::ValueExtractor;
use crate::types::{
    BASE_DEFINITION_PREFIX, Discriminator, DiscriminatorValue, ElementDefinition, ElementType,
    MustSupportElement, MustSupportExtension, MustSupportMetadata, MustSupportSlice,
    StructureDefinition,
};

/// Options controlling what counts as must-support.
#[derive(Debug, Clone, Default)]
pub struct ExtractorOptions {
    /// Extension marking elements required by a requirement set (e.g. USCDI)
    pub requirement_extension_url: Option<String>,
}

impl ExtractorOptions {
    pub fn with_requirement_extension(mut self, url: impl Into<String>) -> Self {
        self.requirement_extension_url = Some(url.into());
        self
    }
}

/// Extracts must-support metadata from one profile.
pub struct MetadataExtractor<'a> {
    profile: &'a StructureDefinition,
    elements: &'a [ElementDefinition],
    resource_type: &'a str,
    values: ValueExtractor<'a>,
    options: &'a ExtractorOptions,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(
        profile: &'a StructureDefinition,
        ig: &'a IgPackage,
        options: &'a ExtractorOptions,
    ) -> Self {
        let elements = profile.elements();
        let resource_type = profile.type_name.as_str();
        Self {
            profile,
            elements,
            resource_type,
            values: ValueExtractor::new(ig, resource_type, elements),
            options,
        }
    }

    /// Build the metadata. Fails only on slices whose discriminator cannot
    /// be expressed.
    pub fn extract(&self) -> Result<MustSupportMetadata> {
        let must_support: Vec<&'a ElementDefinition> = self
            .elements
            .iter()
            .filter(|element| element.is_must_support() || self.is_requirement_only(element))
            .collect();

        let extension_elements: Vec<&'a ElementDefinition> = must_support
            .iter()
            .copied()
            .filter(|element| element.path.ends_with("extension"))
            .collect();
        let slice_elements: Vec<&'a ElementDefinition> = must_support
            .iter()
            .copied()
            .filter(|element| !element.path.ends_with("extension") && element.slice_name.is_some())
            .collect();
        let plain_elements: Vec<&'a ElementDefinition> = must_support
            .iter()
            .copied()
            .filter(|element| {
                !element.path.ends_with("extension") && element.slice_name.is_none()
            })
            .collect();

        let mut metadata =
            MustSupportMetadata::new(self.profile.url.clone(), self.resource_type.to_string());
        metadata.profile_version = self.profile.version.clone();
        metadata.extensions = self.extensions(&extension_elements);
        metadata.slices = self.slices(&slice_elements)?;
        metadata.elements = self.plain_elements(&plain_elements, &slice_elements);

        tracing::debug!(
            profile = %self.profile.url,
            elements = metadata.elements.len(),
            extensions = metadata.extensions.len(),
            slices = metadata.slices.len(),
            "Extracted must-support metadata"
        );
        Ok(metadata)
    }

    fn is_requirement_only(&self, element: &ElementDefinition) -> bool {
        !element.is_must_support()
            && self
                .options
                .requirement_extension_url
                .as_deref()
                .is_some_and(|url| element.has_extension(url))
    }

    fn strip_resource_prefix<'p>(&self, path: &'p str) -> &'p str {
        path.strip_prefix(self.resource_type)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(path)
    }

    fn extensions(&self, elements: &[&'a ElementDefinition]) -> Vec<MustSupportExtension> {
        elements
            .iter()
            .filter_map(|element| {
                let Some(url) = element.types.first().and_then(|t| t.profile.first()) else {
                    tracing::warn!("Must-support extension {} has no profile; skipping", element.id);
                    return None;
                };
                Some(MustSupportExtension {
                    id: element.id.clone(),
                    path: self.strip_resource_prefix(&element.path).to_string(),
                    url: url.clone(),
                    uscdi_only: self.is_requirement_only(element),
                })
            })
            .collect()
    }

    /// Slices grouped as pattern slices, then type slices, then value slices.
    fn slices(&self, elements: &[&'a ElementDefinition]) -> Result<Vec<MustSupportSlice>> {
        let mut pattern_slices = Vec::new();
        let mut type_slices = Vec::new();
        let mut value_slices = Vec::new();

        for &slice in elements {
            let Some(slice_name) = slice.slice_name.as_deref() else {
                continue;
            };
            let Some(sliced) = self.sliced_element(slice, slice_name) else {
                tracing::warn!("No slicing definition found for slice {}", slice.id);
                continue;
            };
            let discriminators = sliced.discriminators();
            let Some(first) = discriminators.first() else {
                tracing::warn!("Slicing of {} has no discriminator", sliced.id);
                continue;
            };

            let (group, discriminator) = match first.type_name.as_str() {
                "pattern" => {
                    let path = first.relative_path();
                    let pattern_element = self
                        .find_element_by_discriminator_path(slice, path)
                        .ok_or_else(|| {
                            ConformanceError::unsupported_discriminator(
                                &slice.id,
                                format!("no element at discriminator path '{path}'"),
                            )
                        })?;
                    (
                        &mut pattern_slices,
                        self.pattern_discriminator(slice, pattern_element, path)?,
                    )
                }
                "type" => {
                    let path = first.relative_path();
                    let code = self
                        .find_element_by_discriminator_path(slice, path)
                        .and_then(ElementDefinition::first_type_code)
                        .ok_or_else(|| {
                            ConformanceError::unsupported_discriminator(
                                &slice.id,
                                format!("no type at discriminator path '{path}'"),
                            )
                        })?;
                    let discriminator = Discriminator::Type {
                        path: path.to_string(),
                        code: upcase_first(code),
                    };
                    (&mut type_slices, discriminator)
                }
                "value" => {
                    let values = discriminators
                        .iter()
                        .map(|d| self.value_discriminator(slice, d.relative_path()))
                        .collect::<Result<Vec<_>>>()?;
                    (&mut value_slices, Discriminator::Value { values })
                }
                other => {
                    tracing::debug!("Ignoring slice {} with '{}' discriminator", slice.id, other);
                    continue;
                }
            };

            group.push(MustSupportSlice {
                slice_id: slice.id.clone(),
                slice_name: slice_name.to_string(),
                path: self.strip_resource_prefix(&slice.path).to_string(),
                discriminator,
                uscdi_only: self.is_requirement_only(slice),
            });
        }

        pattern_slices.extend(type_slices);
        pattern_slices.extend(value_slices);
        Ok(pattern_slices)
    }

    /// The element carrying the slicing definition for `slice`.
    fn sliced_element(&self, slice: &ElementDefinition, slice_name: &str) -> Option<&'a ElementDefinition> {
        let unsliced_id = slice.id.replacen(&format!(":{slice_name}"), "", 1);
        self.elements
            .iter()
            .find(|element| element.id == slice.path || element.id == unsliced_id)
    }

    /// Locate the element a discriminator path points at, below `current`.
    ///
    /// Walks the path one segment at a time beneath the slice; when the
    /// slice does not constrain that child, falls back to the un-sliced
    /// element at the same path.
    fn find_element_by_discriminator_path(
        &self,
        current: &'a ElementDefinition,
        discriminator_path: &str,
    ) -> Option<&'a ElementDefinition> {
        if discriminator_path.is_empty() {
            return Some(current);
        }

        let full_path = format!("{}.{}", current.path, discriminator_path);
        let direct = self.elements.iter().find(|element| {
            path_matches(&element.path, &full_path) && element.id.contains(current.id.as_str())
        });
        if direct.is_some() {
            return direct;
        }

        if let Some((first, rest)) = discriminator_path.split_once('.') {
            let child_path = format!("{}.{}", current.path, first);
            let child = self.elements.iter().find(|element| {
                path_matches(&element.path, &child_path) && element.id.contains(current.id.as_str())
            });
            if let Some(child) = child {
                if let Some(found) = self.find_element_by_discriminator_path(child, rest) {
                    return Some(found);
                }
            }
        }

        self.elements
            .iter()
            .find(|element| path_matches(&element.id, &full_path))
    }

    fn pattern_discriminator(
        &self,
        slice: &ElementDefinition,
        pattern_element: &ElementDefinition,
        path: &str,
    ) -> Result<Discriminator> {
        let path = path.to_string();

        if let Some((system, code)) = pattern_element.pattern_codeable_concept_coding() {
            return Ok(Discriminator::PatternCodeableConcept {
                path,
                code: code.map(str::to_string),
                system: system.map(str::to_string),
            });
        }
        if let Some(coding) = pattern_element.pattern_coding() {
            return Ok(Discriminator::PatternCoding {
                path,
                code: string_at(coding, "code"),
                system: string_at(coding, "system"),
            });
        }
        if let Some(identifier) = pattern_element.pattern_identifier() {
            return Ok(Discriminator::PatternIdentifier {
                path,
                system: string_at(identifier, "system"),
            });
        }
        if pattern_element.has_required_binding() {
            let mut values = self.values.codings_from_value_set_binding(pattern_element);
            if values.is_empty() {
                let slice_path = self.strip_resource_prefix(&slice.path);
                values = self.values.values_from_resource_metadata(&[slice_path]);
            }
            return Ok(Discriminator::RequiredBinding { path, values });
        }

        Err(ConformanceError::unsupported_discriminator(
            &slice.id,
            format!(
                "pattern discriminator at '{}' has no supported pattern or required binding",
                pattern_element.id
            ),
        ))
    }

    fn value_discriminator(
        &self,
        slice: &ElementDefinition,
        discriminator_path: &str,
    ) -> Result<DiscriminatorValue> {
        let full_path = if discriminator_path.is_empty() {
            slice.path.clone()
        } else {
            format!("{}.{}", slice.path, discriminator_path)
        };
        self.elements
            .iter()
            .filter(|element| {
                element.id.starts_with(slice.id.as_str()) && path_matches(&element.path, &full_path)
            })
            .find_map(ElementDefinition::fixed_or_pattern_value)
            .map(|value| DiscriminatorValue {
                path: discriminator_path.to_string(),
                value: value.clone(),
            })
            .ok_or_else(|| {
                ConformanceError::unsupported_discriminator(
                    &slice.id,
                    format!("no fixed or pattern value at '{full_path}'"),
                )
            })
    }

    fn plain_elements(
        &self,
        elements: &[&'a ElementDefinition],
        slice_elements: &[&'a ElementDefinition],
    ) -> Vec<MustSupportElement> {
        let mut out: Vec<MustSupportElement> = Vec::new();

        for &current in elements {
            let id = if current.id.is_empty() { &current.path } else { &current.id };
            let mut entry = MustSupportElement::new(self.strip_resource_prefix(id));
            entry.uscdi_only = self.is_requirement_only(current);

            let type_level = self.type_must_support_elements(&entry, current);
            if !type_level.is_empty() {
                out.extend(type_level);
                continue;
            }

            rewrite_choice_under_slice(&mut entry, &out);

            entry.types = current
                .types
                .iter()
                .filter(|t| t.code == "Reference")
                .map(|t| t.code.clone())
                .collect();
            if let Some(reference) = current.types.first().filter(|t| t.code == "Reference") {
                entry.target_profiles = supported_target_profiles(reference);
            }

            self.apply_fixed_value(&mut entry, current, slice_elements);

            out.retain(|existing| !(existing.path == entry.path && existing.fixed_value.is_none()));
            out.push(entry);
        }

        let mut unique: Vec<MustSupportElement> = Vec::with_capacity(out.len());
        for element in out {
            if !unique.contains(&element) {
                unique.push(element);
            }
        }
        unique
    }

    /// One entry per type flagged with the type-level must-support extension.
    fn type_must_support_elements(
        &self,
        entry: &MustSupportElement,
        current: &ElementDefinition,
    ) -> Vec<MustSupportElement> {
        let base_path = entry.path.strip_suffix("[x]").unwrap_or(&entry.path);
        current
            .types
            .iter()
            .filter(|element_type| element_type.is_type_must_support())
            .map(|element_type| {
                let mut typed = MustSupportElement::new(format!(
                    "{}{}",
                    base_path,
                    upcase_first(&element_type.code)
                ));
                typed.original_path = Some(entry.path.clone());
                typed.uscdi_only = entry.uscdi_only;
                if element_type.code == "Reference" {
                    typed.types = vec!["Reference".to_string()];
                    typed.target_profiles = supported_target_profiles(element_type);
                }
                typed
            })
            .collect()
    }

    fn apply_fixed_value(
        &self,
        entry: &mut MustSupportElement,
        current: &ElementDefinition,
        slice_elements: &[&'a ElementDefinition],
    ) {
        let discriminates_slice = slice_elements
            .iter()
            .any(|slice| current.id.contains(slice.id.as_str()));

        if let Some(uri) = current.fixed_uri() {
            entry.fixed_value = Some(uri.into());
        } else if let (false, Some((_, Some(code)))) =
            (discriminates_slice, current.pattern_codeable_concept_coding())
        {
            entry.fixed_value = Some(code.into());
            entry.path.push_str(".coding.code");
        } else if let Some(code) = current.fixed_code() {
            entry.fixed_value = Some(code.into());
        } else if let (false, Some(system)) = (
            discriminates_slice,
            current
                .pattern_identifier()
                .and_then(|identifier| identifier.get("system"))
                .and_then(serde_json::Value::as_str),
        ) {
            entry.fixed_value = Some(system.into());
            entry.path.push_str(".system");
        }
    }
}

/// Extract must-support metadata for `profile` with default options.
pub fn extract_metadata(profile: &StructureDefinition, ig: &IgPackage) -> Result<MustSupportMetadata> {
    let options = ExtractorOptions::default();
    MetadataExtractor::new(profile, ig, &options).extract()
}

/// Must-support target profiles of a Reference type, base resource
/// definitions excluded.
fn supported_target_profiles(reference: &ElementType) -> Vec<String> {
    reference
        .must_support_target_profiles()
        .into_iter()
        .filter(|profile| !profile.starts_with(BASE_DEFINITION_PREFIX))
        .collect()
}

/// A choice element nested under a slice inherits the rewrite of the
/// type-level entry whose original path it contains.
fn rewrite_choice_under_slice(entry: &mut MustSupportElement, previous: &[MustSupportElement]) {
    let rewrite = previous.iter().find_map(|element| {
        let original = element.original_path.as_deref()?;
        entry
            .path
            .contains(original)
            .then(|| entry.path.replacen(original, &element.path, 1))
    });
    if let Some(rewritten) = rewrite {
        entry.original_path = Some(std::mem::replace(&mut entry.path, rewritten));
    }
}

/// Path equality that tolerates the `[x]` suffix of choice elements.
fn path_matches(candidate: &str, expected: &str) -> bool {
    candidate == expected
        || candidate
            .strip_suffix("[x]")
            .is_some_and(|stripped| stripped == expected)
}

fn string_at(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(serde_json::Value::as_str).map(str::to_string)
}

fn upcase_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
