//! Issues reported by the external validator service.

use serde::{Deserialize, Serialize};

/// Normalized severity of a validator issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

impl IssueSeverity {
    /// Map a validator level (`ERROR`, `FATAL`, `WARNING`, `INFORMATION`, ...).
    pub fn from_level(level: &str) -> Self {
        match level.to_ascii_uppercase().as_str() {
            "ERROR" | "FATAL" => IssueSeverity::Error,
            "WARNING" => IssueSeverity::Warning,
            _ => IssueSeverity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Info => "info",
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issue as it appears in the validator's `outcomes[].issues[]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeIssue {
    #[serde(default)]
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slice_info: Vec<OutcomeIssue>,
}

/// A validator issue wrapped for filtering and reporting.
///
/// `slice_info` owns the nested per-slice detail issues.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorIssue {
    pub severity: IssueSeverity,
    pub location: Option<String>,
    /// Message exactly as the validator sent it
    pub raw_message: String,
    pub message_id: Option<String>,
    /// `<prefix>: <location>: <message>`
    pub message: String,
    pub filtered: bool,
    pub slice_info: Vec<ValidatorIssue>,
}

impl ValidatorIssue {
    /// Wrap a raw issue, prefixing its message with the resource identity
    /// (`Patient/123`) and location.
    pub fn from_outcome(issue: &OutcomeIssue, location_prefix: &str) -> Self {
        let location = issue.location.clone().unwrap_or_default();
        Self {
            severity: IssueSeverity::from_level(&issue.level),
            location: issue.location.clone(),
            raw_message: issue.message.clone(),
            message_id: issue.message_id.clone(),
            message: format!("{location_prefix}: {location}: {}", issue.message),
            filtered: false,
            slice_info: issue
                .slice_info
                .iter()
                .map(|nested| ValidatorIssue::from_outcome(nested, location_prefix))
                .collect(),
        }
    }

    /// An issue produced locally by an additional validation step.
    pub fn synthetic(severity: IssueSeverity, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            severity,
            location: None,
            raw_message: message.clone(),
            message_id: None,
            message,
            filtered: false,
            slice_info: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }

    /// Unfiltered error at this level (nested slice info is not considered).
    pub fn is_reportable_error(&self) -> bool {
        self.is_error() && !self.filtered
    }

    /// Mark this issue and all nested detail as filtered.
    pub fn mark_filtered(&mut self) {
        self.filtered = true;
        for nested in &mut self.slice_info {
            nested.mark_filtered();
        }
    }
}
