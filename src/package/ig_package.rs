//! Implementation Guide packages (`package.tgz`).
//!
//! A package is a gzipped tarball whose `package/` directory holds one JSON
//! resource per file. Resources are sorted into buckets by type; files under
//! `package/example/` are kept as examples.

use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tar::Archive;

use crate::error::{ConformanceError, Result};
use crate::types::{CodeSystem, StructureDefinition, ValueSet};

/// `package/package.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Resources of one loaded Implementation Guide.
#[derive(Debug, Clone, Default)]
pub struct IgPackage {
    pub manifest: Option<PackageManifest>,
    pub profiles: Vec<StructureDefinition>,
    pub extensions: Vec<StructureDefinition>,
    pub value_sets: Vec<ValueSet>,
    pub code_systems: Vec<CodeSystem>,
    pub search_parameters: Vec<Value>,
    pub examples: Vec<Value>,
}

impl IgPackage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a package from a `.tgz` on disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        #[cfg(feature = "tracing")]
        tracing::info!("Loading IG package from {}", path.display());
        Self::from_tgz_bytes(&bytes)
    }

    /// Blocking variant of [`IgPackage::load`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_tgz_bytes(&bytes)
    }

    /// Read every resource out of a gzipped package tarball.
    pub fn from_tgz_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));
        let mut package = IgPackage::new();
        let mut files_read = 0usize;

        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let entry_path = entry.path()?.to_string_lossy().into_owned();
            let Some(kind) = classify_entry(&entry_path) else {
                continue;
            };

            let mut contents = String::new();
            if let Err(e) = entry.read_to_string(&mut contents) {
                tracing::warn!("Failed to read {}: {}", entry_path, e);
                continue;
            }
            files_read += 1;

            match kind {
                EntryKind::Manifest => {
                    package.manifest = Some(serde_json::from_str(&contents).map_err(|e| {
                        ConformanceError::package(format!("invalid package.json: {e}"))
                    })?);
                }
                EntryKind::Resource { example } => match serde_json::from_str::<Value>(&contents) {
                    Ok(resource) => package.add_resource(resource, example),
                    Err(e) => tracing::warn!("Skipping {}: {}", entry_path, e),
                },
            }
        }

        tracing::info!(
            "Loaded package {}: {} files, {} profiles, {} extensions, {} value sets, {} code systems, {} examples",
            package.package_id().unwrap_or_else(|| "<unnamed>".to_string()),
            files_read,
            package.profiles.len(),
            package.extensions.len(),
            package.value_sets.len(),
            package.code_systems.len(),
            package.examples.len()
        );
        Ok(package)
    }

    /// Sort one resource into its bucket.
    ///
    /// Resources of other types outside `package/example/` are ignored.
    pub fn add_resource(&mut self, resource: Value, example: bool) {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let parsed = match resource_type.as_str() {
            "StructureDefinition" if !example => {
                serde_json::from_value::<StructureDefinition>(resource).map(|definition| {
                    if definition.type_name == "Extension" {
                        self.extensions.push(definition);
                    } else {
                        self.profiles.push(definition);
                    }
                })
            }
            "ValueSet" if !example => {
                serde_json::from_value(resource).map(|value_set| self.value_sets.push(value_set))
            }
            "CodeSystem" if !example => serde_json::from_value(resource)
                .map(|code_system| self.code_systems.push(code_system)),
            "SearchParameter" if !example => {
                self.search_parameters.push(resource);
                Ok(())
            }
            _ if example => {
                self.examples.push(resource);
                Ok(())
            }
            other => {
                tracing::debug!("Ignoring {} resource in package", other);
                Ok(())
            }
        };

        if let Err(e) = parsed {
            tracing::warn!("Failed to parse {} from package: {}", resource_type, e);
        }
    }

    /// `name#version`, when the package has a manifest.
    pub fn package_id(&self) -> Option<String> {
        self.manifest
            .as_ref()
            .map(|manifest| format!("{}#{}", manifest.name, manifest.version))
    }

    /// Profile by canonical URL; a `|version` suffix is ignored.
    pub fn profile_by_url(&self, url: &str) -> Option<&StructureDefinition> {
        let url = strip_version(url);
        self.profiles.iter().find(|profile| profile.url == url)
    }

    pub fn extension_by_url(&self, url: &str) -> Option<&StructureDefinition> {
        let url = strip_version(url);
        self.extensions.iter().find(|extension| extension.url == url)
    }

    pub fn value_set_by_url(&self, url: &str) -> Option<&ValueSet> {
        let url = strip_version(url);
        self.value_sets
            .iter()
            .find(|value_set| value_set.url == url)
    }

    pub fn code_system_by_url(&self, url: &str) -> Option<&CodeSystem> {
        let url = strip_version(url);
        self.code_systems
            .iter()
            .find(|code_system| code_system.url == url)
    }

    pub fn examples_for_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.examples.iter().filter(move |example| {
            example.get("resourceType").and_then(Value::as_str) == Some(resource_type)
        })
    }
}

enum EntryKind {
    Manifest,
    Resource { example: bool },
}

fn classify_entry(path: &str) -> Option<EntryKind> {
    let relative = path.strip_prefix("package/")?;
    let file_name = relative.rsplit('/').next().unwrap_or(relative);

    if relative == "package.json" {
        return Some(EntryKind::Manifest);
    }
    if !file_name.ends_with(".json")
        || file_name.starts_with('.')
        || file_name == "package.json"
        || file_name.ends_with(".openapi.json")
        || file_name == "validation-summary.json"
    {
        return None;
    }
    Some(EntryKind::Resource {
        example: relative.starts_with("example/"),
    })
}

fn strip_version(url: &str) -> &str {
    url.split_once('|').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_entry() {
        assert!(matches!(classify_entry("package/package.json"), Some(EntryKind::Manifest)));
        assert!(matches!(
            classify_entry("package/StructureDefinition-us-core-patient.json"),
            Some(EntryKind::Resource { example: false })
        ));
        assert!(matches!(
            classify_entry("package/example/Patient-example.json"),
            Some(EntryKind::Resource { example: true })
        ));
        assert!(classify_entry("package/.index.json").is_none());
        assert!(classify_entry("package/other/spec.openapi.json").is_none());
        assert!(classify_entry("other/Patient.json").is_none());
        assert!(classify_entry("package/README.md").is_none());
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("http://example.org/p|1.0.0"), "http://example.org/p");
        assert_eq!(strip_version("http://example.org/p"), "http://example.org/p");
    }
}
