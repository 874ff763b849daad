//! Validator configuration and the named validator registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConformanceError, Result, ValidatorErrorKind};
use crate::validator::FhirResourceValidator;

/// Environment variable holding the validator base URL.
pub const VALIDATOR_URL_ENV: &str = "FHIR_RESOURCE_VALIDATOR_URL";

pub const DEFAULT_VALIDATOR_NAME: &str = "default";

/// IG loading on a cold validator can take minutes.
pub const DEFAULT_VALIDATOR_TIMEOUT: Duration = Duration::from_secs(600);

/// Keys accepted in the validation context.
pub const ALLOWED_CONTEXT_OPTIONS: &[&str] = &[
    "sv",
    "doNative",
    "extensions",
    "disableDefaultResourceFetcher",
    "igs",
    "locale",
    "snomedCT",
    "txServer",
    "txLog",
    "txCache",
    "level",
    "mode",
    "hintAboutNonMustSupport",
    "assumeValidRestReferences",
    "noExtensibleBindingMessages",
    "showTimes",
    "allowExampleUrls",
    "displayWarnings",
    "securityChecks",
    "crumbTrails",
    "forPublication",
    "noInvariants",
    "wantInvariantInMessage",
    "noUnicodeBiDiControlChars",
    "checkIPSCodes",
    "bundleValidationRules",
];

/// Name of the context object in the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContextKey {
    #[default]
    #[serde(rename = "cliContext")]
    CliContext,
    #[serde(rename = "validationContext")]
    ValidationContext,
}

impl ContextKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKey::CliContext => "cliContext",
            ContextKey::ValidationContext => "validationContext",
        }
    }
}

/// Validation context sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationContext {
    options: BTreeMap<String, Value>,
}

impl Default for ValidationContext {
    fn default() -> Self {
        let mut options = BTreeMap::new();
        options.insert("sv".to_string(), Value::from("4.0.1"));
        options.insert("doNative".to_string(), Value::Bool(false));
        options.insert("extensions".to_string(), Value::from(vec!["any"]));
        options.insert("disableDefaultResourceFetcher".to_string(), Value::Bool(true));
        Self { options }
    }
}

impl ValidationContext {
    /// Set an option; unknown keys are rejected.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        if !ALLOWED_CONTEXT_OPTIONS.contains(&key) {
            return Err(ConformanceError::unknown_attribute(key, ALLOWED_CONTEXT_OPTIONS));
        }
        self.options.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// IG package ids (`name#version`) the validator should load.
    pub fn igs(&self) -> Vec<&str> {
        self.options
            .get("igs")
            .and_then(Value::as_array)
            .map(|igs| igs.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Context object for one request, with `profiles` set.
    pub fn to_request_context(&self, profile_url: &str) -> Map<String, Value> {
        let mut context: Map<String, Value> = self
            .options
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        context.insert("profiles".to_string(), Value::from(vec![profile_url]));
        context
    }
}

/// Configuration of one named validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    /// Base URL; falls back to `FHIR_RESOURCE_VALIDATOR_URL`
    pub url: Option<String>,
    pub test_suite_id: String,
    pub requirements: Option<String>,
    pub timeout: Duration,
    pub context_key: ContextKey,
    pub context: ValidationContext,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_VALIDATOR_NAME.to_string(),
            url: None,
            test_suite_id: String::new(),
            requirements: None,
            timeout: DEFAULT_VALIDATOR_TIMEOUT,
            context_key: ContextKey::default(),
            context: ValidationContext::default(),
        }
    }
}

impl ValidatorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Default configuration with the URL taken from the environment.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var(VALIDATOR_URL_ENV).ok(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_test_suite(mut self, test_suite_id: impl Into<String>) -> Self {
        self.test_suite_id = test_suite_id.into();
        self
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = Some(requirements.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_context_key(mut self, context_key: ContextKey) -> Self {
        self.context_key = context_key;
        self
    }

    pub fn with_igs<I, S>(mut self, igs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let igs: Vec<Value> = igs.into_iter().map(|ig| Value::String(ig.into())).collect();
        self.context.options.insert("igs".to_string(), Value::Array(igs));
        self
    }

    /// Set a validation context option, rejecting unknown keys.
    pub fn with_context_option(mut self, key: &str, value: impl Into<Value>) -> Result<Self> {
        self.context.set(key, value)?;
        Ok(self)
    }

    /// The configured URL, else the environment's.
    pub fn resolved_url(&self) -> Result<String> {
        self.url
            .clone()
            .or_else(|| std::env::var(VALIDATOR_URL_ENV).ok())
            .ok_or_else(|| {
                ConformanceError::validator(
                    ValidatorErrorKind::Connection,
                    format!("no validator URL configured; set {VALIDATOR_URL_ENV}"),
                )
            })
    }
}

/// Validators by name. Suites build their own registry and may inherit
/// entries from a parent scope.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<String, Arc<FhirResourceValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the validator's name, replacing any previous entry.
    pub fn register(&mut self, validator: FhirResourceValidator) -> &mut Self {
        self.validators
            .insert(validator.name().to_string(), Arc::new(validator));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<FhirResourceValidator>> {
        self.validators.get(name).cloned()
    }

    pub fn default_validator(&self) -> Option<Arc<FhirResourceValidator>> {
        self.get(DEFAULT_VALIDATOR_NAME)
    }

    /// Copy in parent entries whose names are not defined locally.
    pub fn inherit_from(&mut self, parent: &ValidatorRegistry) -> &mut Self {
        for (name, validator) in &parent.validators {
            self.validators
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(validator));
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_context() {
        let context = ValidationContext::default().to_request_context("http://example.org/p");
        assert_eq!(context["sv"], json!("4.0.1"));
        assert_eq!(context["doNative"], json!(false));
        assert_eq!(context["extensions"], json!(["any"]));
        assert_eq!(context["disableDefaultResourceFetcher"], json!(true));
        assert_eq!(context["profiles"], json!(["http://example.org/p"]));
    }

    #[test]
    fn test_unknown_context_option_rejected() {
        let err = ValidatorConfig::new("default")
            .with_context_option("colour", "blue")
            .unwrap_err();
        assert!(matches!(err, ConformanceError::UnknownAttribute { .. }));

        let config = ValidatorConfig::new("default")
            .with_context_option("txServer", Value::Null)
            .unwrap();
        assert_eq!(config.context.get("txServer"), Some(&Value::Null));
    }

    #[test]
    fn test_with_igs() {
        let config = ValidatorConfig::new("default").with_igs(["hl7.fhir.us.core#6.1.0"]);
        assert_eq!(config.context.igs(), vec!["hl7.fhir.us.core#6.1.0"]);
    }

    #[test]
    fn test_explicit_url_wins() {
        let config = ValidatorConfig::new("default").with_url("http://validator:3500");
        assert_eq!(config.resolved_url().unwrap(), "http://validator:3500");
    }
}
