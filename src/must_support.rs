//! Must-support assessment: which required elements, extensions and slices
//! never appear in a set of resources.
//!
//! ```text
//! profile ──extract──▶ MustSupportMetadata ──(customize)──▶ MustSupportAssessor
//!                                                                 │
//!                                        resources ───────────────┤
//!                                                                 ▼
//!                                                        MissingItemReport
//! ```
//!
//! An item is satisfied when at least one resource populates it. Choice
//! groups then relax the result: when any member of a group is supported,
//! every member is dropped from the report.

use std::fmt;

use once_cell::unsync::OnceCell;
use serde_json::Value;

use crate::error::{ConformanceError, Result};
use crate::metadata_extractor::{ExtractorOptions, MetadataExtractor};
use crate::node::{DATA_ABSENT_REASON_URL, Node};
use crate::package::IgPackage;
use crate::path_resolver::PathResolver;
use crate::slicing;
use crate::types::{
    ChoiceGroup, MessageType, MustSupportElement, MustSupportExtension, MustSupportMetadata,
    MustSupportSlice, RunContext, StructureDefinition,
};

/// Items no resource populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingItemReport {
    pub elements: Vec<MustSupportElement>,
    pub slices: Vec<MustSupportSlice>,
    pub extensions: Vec<MustSupportExtension>,
    /// Number of resources assessed
    pub resource_count: usize,
    pub resource_type: String,
}

impl MissingItemReport {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.slices.is_empty() && self.extensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len() + self.slices.len() + self.extensions.len()
    }

    /// Missing elements (`path` or `path:fixed_value`), then slice ids, then
    /// extension ids.
    pub fn to_strings(&self) -> Vec<String> {
        self.elements
            .iter()
            .map(MustSupportElement::display_string)
            .chain(self.slices.iter().map(|slice| slice.slice_id.clone()))
            .chain(self.extensions.iter().map(|extension| extension.id.clone()))
            .collect()
    }

    /// Assertion message for a failed assessment.
    pub fn failure_message(&self) -> String {
        format!(
            "Could not find {} in the {} provided {} resource(s)",
            self.to_strings().join(", "),
            self.resource_count,
            self.resource_type
        )
    }
}

impl fmt::Display for MissingItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_strings().join(", "))
    }
}

/// Assesses one resource set against one metadata instance.
///
/// The report is computed on first request and cached; both inputs are
/// borrowed immutably for the assessor's lifetime.
pub struct MustSupportAssessor<'a> {
    metadata: &'a MustSupportMetadata,
    resources: &'a [Value],
    resolver: PathResolver<'a>,
    report: OnceCell<MissingItemReport>,
}

impl<'a> MustSupportAssessor<'a> {
    pub fn new(metadata: &'a MustSupportMetadata, resources: &'a [Value]) -> Self {
        Self {
            metadata,
            resources,
            resolver: PathResolver::with_metadata(metadata),
            report: OnceCell::new(),
        }
    }

    pub fn report(&self) -> &MissingItemReport {
        self.report.get_or_init(|| self.compute())
    }

    pub fn missing_items(&self) -> Vec<String> {
        self.report().to_strings()
    }

    pub fn missing_elements(&self) -> &[MustSupportElement] {
        &self.report().elements
    }

    pub fn missing_slices(&self) -> &[MustSupportSlice] {
        &self.report().slices
    }

    pub fn missing_extensions(&self) -> &[MustSupportExtension] {
        &self.report().extensions
    }

    fn compute(&self) -> MissingItemReport {
        let mut report = MissingItemReport {
            resource_count: self.resources.len(),
            resource_type: self.metadata.resource_type.clone(),
            ..Default::default()
        };
        if self.resources.is_empty() {
            tracing::debug!("No resources to assess for {}", self.metadata.profile_url);
            return report;
        }

        report.elements = self
            .metadata
            .elements
            .iter()
            .filter(|element| !self.any_resource(|node| self.element_found(node, element)))
            .cloned()
            .collect();
        report.extensions = self
            .metadata
            .extensions
            .iter()
            .filter(|extension| !self.any_resource(|node| self.extension_found(node, extension)))
            .cloned()
            .collect();
        report.slices = self
            .metadata
            .slices
            .iter()
            .filter(|slice| !self.any_resource(|node| self.slice_found(node, slice)))
            .cloned()
            .collect();

        self.resolve_choices(&mut report);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            profile = %self.metadata.profile_url,
            resources = self.resources.len(),
            missing = report.len(),
            "Must-support assessment complete"
        );
        report
    }

    fn any_resource(&self, found: impl Fn(Node<'a>) -> bool) -> bool {
        self.resources.iter().map(Node::root).any(found)
    }

    fn element_found(&self, resource: Node<'a>, element: &MustSupportElement) -> bool {
        let extension_path = format!("{}.extension", element.path);
        let must_support_urls: Vec<&str> = self
            .metadata
            .extensions
            .iter()
            .filter(|extension| extension.path == extension_path)
            .map(|extension| extension.url.as_str())
            .collect();
        let include_dar = must_support_urls.contains(&DATA_ABSENT_REASON_URL);

        self.resolver
            .find_value_at_matching(resource, &element.path, include_dar, |value| {
                matches_without_extensions(value, &must_support_urls, element.fixed_value.as_ref())
            })
            .is_some()
    }

    fn extension_found(&self, resource: Node<'a>, extension: &MustSupportExtension) -> bool {
        let url = Some(extension.url.as_str());
        if extension.path == "extension" {
            return resource.field("extension").iter().any(|ext| ext.url() == url);
        }
        self.resolver
            .find_value_at_matching(resource, &extension.path, false, |ext| ext.url() == url)
            .is_some()
    }

    fn slice_found(&self, resource: Node<'a>, slice: &MustSupportSlice) -> bool {
        self.resolver
            .find_value_at_matching(resource, &slice.path, false, |candidate| {
                slicing::matches(&self.resolver, *candidate, &slice.discriminator)
            })
            .is_some()
    }

    /// Drop every member of a choice group that has a supported member.
    ///
    /// Support is judged against the missing lists as they were before any
    /// group was applied, so the outcome does not depend on group order.
    fn resolve_choices(&self, report: &mut MissingItemReport) {
        if self.metadata.choices.is_empty() {
            return;
        }
        let satisfied: Vec<&ChoiceGroup> = self
            .metadata
            .choices
            .iter()
            .filter(|group| self.group_supported(group, report))
            .collect();
        if satisfied.is_empty() {
            return;
        }

        report
            .elements
            .retain(|element| !satisfied.iter().any(|group| group.contains_element(element)));
        report
            .extensions
            .retain(|extension| !satisfied.iter().any(|group| group.extension_ids.contains(&extension.id)));
        report
            .slices
            .retain(|slice| !satisfied.iter().any(|group| group.slice_names.contains(&slice.slice_name)));
    }

    /// A member is supported when the metadata declares it and it is not missing.
    fn group_supported(&self, group: &ChoiceGroup, report: &MissingItemReport) -> bool {
        let metadata = self.metadata;
        let path_supported = group.paths.iter().any(|path| {
            metadata.elements.iter().any(|e| e.path == *path)
                && !report.elements.iter().any(|e| e.path == *path)
        });
        let extension_supported = group.extension_ids.iter().any(|id| {
            metadata.extensions.iter().any(|x| x.id == *id)
                && !report.extensions.iter().any(|x| x.id == *id)
        });
        let slice_supported = group.slice_names.iter().any(|name| {
            metadata.slices.iter().any(|s| s.slice_name == *name)
                && !report.slices.iter().any(|s| s.slice_name == *name)
        });
        let element_supported = group.elements.iter().any(|choice| {
            let same = |e: &&MustSupportElement| e.path == choice.path && e.fixed_value == choice.fixed_value;
            metadata.elements.iter().any(|e| same(&e)) && !report.elements.iter().any(|e| same(&e))
        });
        path_supported || extension_supported || slice_supported || element_supported
    }
}

/// Whether `value` populates a must-support element.
///
/// Extensions are ignored unless they are themselves must-support on this
/// element; a required fixed value must match exactly.
fn matches_without_extensions(
    value: &Node<'_>,
    must_support_urls: &[&str],
    fixed_value: Option<&Value>,
) -> bool {
    let has_must_support_extension = value
        .extension_urls()
        .iter()
        .any(|url| must_support_urls.contains(url));
    if !has_must_support_extension && !value.has_value_without_extensions() {
        return false;
    }
    match fixed_value {
        Some(expected) => value.value() == Some(expected),
        None => true,
    }
}

/// Assess `resources` against `metadata`.
pub fn assess(resources: &[Value], metadata: &MustSupportMetadata) -> MissingItemReport {
    MustSupportAssessor::new(metadata, resources).report().clone()
}

/// Options for [`MustSupportAssessment`].
#[derive(Debug, Clone, Default)]
pub struct AssessmentOptions {
    pub requirement_extension_url: Option<String>,
    /// Attach the extracted metadata to the run as an info message
    pub debug_metadata: bool,
}

impl AssessmentOptions {
    pub fn with_requirement_extension(mut self, url: impl Into<String>) -> Self {
        self.requirement_extension_url = Some(url.into());
        self
    }

    pub fn with_debug_metadata(mut self, enabled: bool) -> Self {
        self.debug_metadata = enabled;
        self
    }
}

/// Extract, optionally customize, and assess in one step.
pub struct MustSupportAssessment<'a> {
    ig: &'a IgPackage,
    options: AssessmentOptions,
}

impl<'a> MustSupportAssessment<'a> {
    pub fn new(ig: &'a IgPackage) -> Self {
        Self {
            ig,
            options: AssessmentOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AssessmentOptions) -> Self {
        self.options = options;
        self
    }

    /// Metadata for `profile`, as assessment would use it.
    pub fn metadata(&self, profile: &StructureDefinition) -> Result<MustSupportMetadata> {
        let extractor_options = ExtractorOptions {
            requirement_extension_url: self.options.requirement_extension_url.clone(),
        };
        MetadataExtractor::new(profile, self.ig, &extractor_options).extract()
    }

    /// Metadata for the package profile with canonical `profile_url`.
    pub fn metadata_for_url(&self, profile_url: &str) -> Result<MustSupportMetadata> {
        let profile = self
            .ig
            .profile_by_url(profile_url)
            .ok_or_else(|| ConformanceError::profile_not_found(profile_url))?;
        self.metadata(profile)
    }

    /// Missing must-support items of `resources` against `profile`.
    ///
    /// `customize` may adjust the metadata (add or remove elements, declare
    /// choices) before assessment.
    pub fn perform<F>(
        &self,
        profile: &StructureDefinition,
        resources: &[Value],
        customize: F,
        context: &mut RunContext,
    ) -> Result<MissingItemReport>
    where
        F: FnOnce(&mut MustSupportMetadata),
    {
        let mut metadata = self.metadata(profile)?;
        customize(&mut metadata);

        if self.options.debug_metadata {
            context.add_message(
                MessageType::Info,
                format!(
                    "Must-support metadata for {}:\n{}",
                    metadata.profile_url,
                    serde_json::to_string_pretty(&metadata)?
                ),
            );
        }

        Ok(assess(resources, &metadata))
    }
}
