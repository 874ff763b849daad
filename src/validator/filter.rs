//! Issue filtering applied to validator output before the verdict.
//!
//! Filters only ever mark issues; nothing is removed, so callers can still
//! inspect what was suppressed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ValidatorIssue;

/// Caller-supplied predicate; `true` filters the issue.
pub type ExcludeMessage = dyn Fn(&ValidatorIssue) -> bool + Send + Sync;

pub const REFERENCE_CANT_MATCH_CHOICE: &str = "Reference_REF_CantMatchChoice";
const DETAILS_PREFIX: &str = "Details for #";

static UNRESOLVED_URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\S+: [^:]+: URL value '.*' does not resolve",
        r"^\S+: [^:]+: No definition could be found for URL value '.*'",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("unresolved URL pattern is valid"))
    .collect()
});

/// "URL does not resolve" noise from a validator without network access.
pub fn is_unresolved_url(issue: &ValidatorIssue) -> bool {
    UNRESOLVED_URL_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(&issue.message))
}

/// Mark filtered issues in `issues` and, first, in every nested slice info.
pub fn filter_issues(issues: &mut [ValidatorIssue], exclude: Option<&ExcludeMessage>) {
    for issue in issues.iter_mut() {
        filter_issues(&mut issue.slice_info, exclude);
        if is_unresolved_url(issue) || exclude.is_some_and(|exclude| exclude(issue)) {
            issue.filtered = true;
        }
    }
    filter_reference_choice_issues(issues);
}

/// Suppress `Reference_REF_CantMatchChoice` when a candidate profile matched.
///
/// The validator reports one "Details for #..." issue per candidate target
/// profile directly after the choice error, at the same location. If every
/// error-level sub-issue of at least one candidate was filtered, the
/// reference did conform and the whole group is marked filtered.
pub fn filter_reference_choice_issues(issues: &mut [ValidatorIssue]) {
    let mut index = 0;
    while index < issues.len() {
        let issue = &issues[index];
        let is_choice_error = issue.message_id.as_deref() == Some(REFERENCE_CANT_MATCH_CHOICE)
            && !matches!(issue.severity, crate::types::IssueSeverity::Info);
        if !is_choice_error {
            index += 1;
            continue;
        }

        let location = issue.location.clone();
        let details = issues[index + 1..]
            .iter()
            .take_while(|detail| {
                detail.raw_message.starts_with(DETAILS_PREFIX) && detail.location == location
            })
            .count();
        let end = index + 1 + details;

        let candidate_matched = issues[index + 1..end].iter().any(|detail| {
            detail
                .slice_info
                .iter()
                .filter(|nested| nested.is_error())
                .all(|nested| nested.filtered)
        });
        if candidate_matched {
            tracing::debug!(
                "Filtering {} at {:?}: a candidate profile matched",
                REFERENCE_CANT_MATCH_CHOICE,
                location
            );
            for issue in &mut issues[index..end] {
                issue.mark_filtered();
            }
        }
        index = end;
    }
}
