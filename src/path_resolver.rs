//! FHIRPath-like navigation over resources.
//!
//! Paths are a small subset of FHIRPath: dot-separated field names, choice
//! types written as `value[x]`, named slices written as `name:sliceName`, and
//! `where(url='...')` filters on extensions. Slice segments need
//! must-support metadata to know how the slice is discriminated, so a
//! [`PathResolver`] optionally carries it.
//!
//! Every operation is total: a navigation miss yields an empty result rather
//! than an error.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::node::Node;
use crate::slicing;
use crate::types::MustSupportMetadata;

static WHERE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^where\(url\s*=\s*'([^']*)'\)$").expect("where(url=...) pattern is valid")
});

/// Split a path on `.` separators.
///
/// A dot directly preceded by `hl7` does not separate segments, so canonical
/// URLs embedded in `where(url='http://hl7.org/...')` survive intact.
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut start = 0;
    for (index, _) in path.match_indices('.') {
        if path[..index].ends_with("hl7") {
            continue;
        }
        segments.push(&path[start..index]);
        start = index + 1;
    }
    segments.push(&path[start..]);
    segments
}

/// Normalize one path segment for navigation.
///
/// Strips a trailing `[x]` and rewrites `name[x]:slice` to `name:slice`.
pub fn normalize_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains("[x]:") {
        return Cow::Owned(segment.replacen("[x]:", ":", 1));
    }
    match segment.strip_suffix("[x]") {
        Some(stripped) => Cow::Borrowed(stripped),
        None => Cow::Borrowed(segment),
    }
}

/// Whether the field part of `segment` names a choice element (`value[x]`,
/// `value[x]:valueQuantity`).
pub fn is_choice_segment(segment: &str) -> bool {
    let field = segment.split_once(':').map_or(segment, |(field, _)| field);
    field.ends_with("[x]")
}

/// Navigates resources, consulting must-support metadata for slice segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver<'m> {
    metadata: Option<&'m MustSupportMetadata>,
}

impl<'m> PathResolver<'m> {
    pub fn new() -> Self {
        Self { metadata: None }
    }

    pub fn with_metadata(metadata: &'m MustSupportMetadata) -> Self {
        Self {
            metadata: Some(metadata),
        }
    }

    pub fn metadata(&self) -> Option<&'m MustSupportMetadata> {
        self.metadata
    }

    /// All values reachable from `elements` by following `path`.
    ///
    /// A blank path returns the elements unchanged.
    pub fn resolve_path<'a>(&self, elements: &[Node<'a>], path: &str) -> Vec<Node<'a>> {
        let mut current = elements.to_vec();
        for segment in split_path(path) {
            current = current
                .iter()
                .flat_map(|element| self.next_value(*element, segment))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// First present value reachable from `element` by `path`.
    ///
    /// Values carrying a data-absent-reason extension are skipped unless
    /// `include_dar` is set.
    pub fn find_value_at<'a>(
        &self,
        element: Node<'a>,
        path: &str,
        include_dar: bool,
    ) -> Option<Node<'a>> {
        self.find_value_at_matching(element, path, include_dar, |_| true)
    }

    /// Depth-first search for the first present value at `path` that
    /// satisfies `predicate`.
    pub fn find_value_at_matching<'a, F>(
        &self,
        element: Node<'a>,
        path: &str,
        include_dar: bool,
        predicate: F,
    ) -> Option<Node<'a>>
    where
        F: Fn(&Node<'a>) -> bool,
    {
        let segments = split_path(path);
        self.find_in(&[element], &segments, include_dar, &predicate)
    }

    fn find_in<'a>(
        &self,
        elements: &[Node<'a>],
        segments: &[&str],
        include_dar: bool,
        predicate: &dyn Fn(&Node<'a>) -> bool,
    ) -> Option<Node<'a>> {
        let Some((segment, rest)) = segments.split_first() else {
            return elements
                .iter()
                .filter(|element| include_dar || !element.has_data_absent_reason())
                .find(|element| element.is_found() && predicate(element))
                .copied();
        };

        elements.iter().find_map(|element| {
            let children = self.next_value(*element, segment);
            self.find_in(&children, rest, include_dar, predicate)
        })
    }

    /// Step from `element` through one path segment.
    ///
    /// Choice segments (`value[x]`) read the typed key; every other field is
    /// matched by its exact name.
    pub fn next_value<'a>(&self, element: Node<'a>, segment: &str) -> Vec<Node<'a>> {
        let choice = is_choice_segment(segment);
        let normalized = normalize_segment(segment);
        let segment: &str = &normalized;

        if let Some(captures) = WHERE_URL.captures(segment) {
            let url = captures.get(1).map(|m| m.as_str());
            return if element.url() == url {
                vec![element]
            } else {
                Vec::new()
            };
        }

        if segment.contains(':') && !segment.contains("url") {
            return self.find_slice(element, segment, choice).into_iter().collect();
        }

        field_values(element, segment, choice)
    }

    /// First instance of the named slice under `element`.
    fn find_slice<'a>(&self, element: Node<'a>, segment: &str, choice: bool) -> Option<Node<'a>> {
        let (field, slice_name) = segment.split_once(':')?;
        let Some(metadata) = self.metadata else {
            tracing::debug!(segment, "slice segment without must-support metadata");
            return None;
        };
        let Some(slice) = metadata.slice_at(field, slice_name) else {
            tracing::debug!(field, slice_name, "unknown slice in path");
            return None;
        };

        field_values(element, field, choice)
            .into_iter()
            .find(|candidate| slicing::matches(self, *candidate, &slice.discriminator))
    }
}

fn field_values<'a>(element: Node<'a>, field: &str, choice: bool) -> Vec<Node<'a>> {
    if choice {
        element.choice_field(field)
    } else {
        element.field(field)
    }
}
