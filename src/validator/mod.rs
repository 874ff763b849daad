//! Resource validity through an external FHIR validator service.
//!
//! [`FhirResourceValidator`] sends one resource to the validator, turns the
//! returned issues into [`ValidatorIssue`]s, filters noise, records
//! unfiltered issues as run messages and decides validity: a resource is
//! valid when no unfiltered error remains.
//!
//! Failures of the validator itself (unreachable, non-200, unparseable
//! body) are reported as [`ConformanceError::Validator`], never as an
//! invalid resource.

pub mod client;
pub mod filter;
pub mod session;
pub mod wire;

use std::sync::Arc;

use serde_json::Value;

use crate::config::ValidatorConfig;
use crate::error::{ConformanceError, Result, ValidatorErrorKind};
use crate::types::{IssueSeverity, Message, MessageType, RunContext, ValidatorIssue};

pub use client::{HttpValidatorService, ValidatorResponse, ValidatorService};
pub use filter::{ExcludeMessage, filter_issues, is_unresolved_url};
pub use session::{InMemorySessionStore, SessionKey, SessionStore};
pub use wire::{FileToValidate, ValidateRequest, ValidateResponse};

/// Extra checks run next to the validator: `(resource, profile_url)` to messages.
pub type AdditionalValidation = dyn Fn(&Value, &str) -> Vec<Message> + Send + Sync;

const BASE_PROFILE_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

/// Validates resources against profiles through a validator service.
pub struct FhirResourceValidator {
    config: ValidatorConfig,
    service: Arc<dyn ValidatorService>,
    sessions: Arc<dyn SessionStore>,
    exclude_message: Option<Arc<ExcludeMessage>>,
    additional_validations: Vec<Arc<AdditionalValidation>>,
}

impl std::fmt::Debug for FhirResourceValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirResourceValidator")
            .field("name", &self.config.name)
            .field("url", &self.service.url())
            .field("additional_validations", &self.additional_validations.len())
            .finish()
    }
}

impl FhirResourceValidator {
    pub fn builder(config: ValidatorConfig) -> FhirResourceValidatorBuilder {
        FhirResourceValidatorBuilder::new(config)
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Copy of this validator with another configuration, sharing the
    /// transport, session store and registered filters.
    pub fn with_config(&self, config: ValidatorConfig) -> Self {
        Self {
            config,
            service: Arc::clone(&self.service),
            sessions: Arc::clone(&self.sessions),
            exclude_message: self.exclude_message.clone(),
            additional_validations: self.additional_validations.clone(),
        }
    }

    /// Whether `resource` conforms to `profile_url` (the base resource
    /// profile when `None`). Unfiltered issues are added to `context` when
    /// `add_messages` is set.
    pub async fn is_valid(
        &self,
        resource: &Value,
        profile_url: Option<&str>,
        context: &mut RunContext,
        add_messages: bool,
    ) -> Result<bool> {
        let issues = self.validate(resource, profile_url, context).await?;

        if add_messages {
            for issue in issues.iter().filter(|issue| !issue.filtered) {
                context.add_message(issue.severity.into(), issue.message.clone());
            }
        }

        let valid = !issues.iter().any(ValidatorIssue::is_reportable_error);
        tracing::info!(
            "{} {} against {}",
            wire::message_prefix(resource),
            if valid { "conforms" } else { "does not conform" },
            self.profile_url(resource, profile_url)
        );
        Ok(valid)
    }

    /// All issues for `resource`, filters applied.
    ///
    /// Validator failures are also recorded as error messages on `context`.
    pub async fn validate(
        &self,
        resource: &Value,
        profile_url: Option<&str>,
        context: &mut RunContext,
    ) -> Result<Vec<ValidatorIssue>> {
        let profile_url = self.profile_url(resource, profile_url);
        let session_key = SessionKey::new(
            context.test_suite_id.clone(),
            self.config.name.clone(),
            context.requirements.clone(),
        );
        let cached_session = self.sessions.find(&session_key);

        let request = self.request(resource, &profile_url, cached_session.clone())?;
        let response = match self.service.validate(&request).await {
            Ok(response) => response,
            Err(error) => {
                context.add_message(MessageType::Error, error.to_string());
                return Err(error);
            }
        };

        if response.status != 200 {
            context.add_message(
                MessageType::Error,
                format!("Validator Response: HTTP {}\n{}", response.status, response.body),
            );
            return Err(ConformanceError::validator(
                status_error_kind(response.status),
                "review messages or validator service logs for more information",
            ));
        }

        let parsed = match ValidateResponse::parse(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                context.add_message(
                    MessageType::Error,
                    format!("Validator response was an unexpected format: {e}\n{}", response.body),
                );
                return Err(ConformanceError::validator(
                    ValidatorErrorKind::UnexpectedResponse,
                    "validator response was an unexpected format",
                ));
            }
        };

        if let Some(session_id) = &parsed.session_id {
            if cached_session.as_deref() != Some(session_id.as_str()) {
                tracing::debug!("Saving validator session {} for {}", session_id, session_key);
                self.sessions.save(&session_key, session_id.clone());
            }
        }

        let prefix = wire::message_prefix(resource);
        let mut issues: Vec<ValidatorIssue> = parsed
            .issues()
            .iter()
            .map(|issue| ValidatorIssue::from_outcome(issue, &prefix))
            .collect();
        issues.extend(self.additional_issues(resource, &profile_url));

        filter_issues(&mut issues, self.exclude_message.as_deref());
        Ok(issues)
    }

    fn profile_url(&self, resource: &Value, profile_url: Option<&str>) -> String {
        match profile_url {
            Some(url) => url.to_string(),
            None => format!("{BASE_PROFILE_PREFIX}{}", wire::resource_type(resource)),
        }
    }

    fn request(
        &self,
        resource: &Value,
        profile_url: &str,
        session_id: Option<String>,
    ) -> Result<ValidateRequest> {
        Ok(ValidateRequest {
            context_key: self.config.context_key,
            context: self.config.context.to_request_context(profile_url),
            files_to_validate: vec![FileToValidate::json(resource)?],
            session_id,
        })
    }

    fn additional_issues(&self, resource: &Value, profile_url: &str) -> Vec<ValidatorIssue> {
        self.additional_validations
            .iter()
            .flat_map(|validation| validation(resource, profile_url))
            .map(|message| {
                let severity = match message.message_type {
                    MessageType::Error => IssueSeverity::Error,
                    MessageType::Warning => IssueSeverity::Warning,
                    MessageType::Info => IssueSeverity::Info,
                };
                ValidatorIssue::synthetic(severity, message.message)
            })
            .collect()
    }
}

fn status_error_kind(status: u16) -> ValidatorErrorKind {
    match status {
        400..=499 => ValidatorErrorKind::ClientError(status),
        500..=599 => ValidatorErrorKind::ServerError(status),
        _ => ValidatorErrorKind::UnexpectedResponse,
    }
}

/// Builder for [`FhirResourceValidator`].
pub struct FhirResourceValidatorBuilder {
    config: ValidatorConfig,
    service: Option<Arc<dyn ValidatorService>>,
    sessions: Option<Arc<dyn SessionStore>>,
    exclude_message: Option<Arc<ExcludeMessage>>,
    additional_validations: Vec<Arc<AdditionalValidation>>,
}

impl FhirResourceValidatorBuilder {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            service: None,
            sessions: None,
            exclude_message: None,
            additional_validations: Vec::new(),
        }
    }

    /// Use a custom transport instead of HTTP.
    pub fn service(mut self, service: Arc<dyn ValidatorService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Filter issues for which `exclude` returns true.
    pub fn exclude_message<F>(mut self, exclude: F) -> Self
    where
        F: Fn(&ValidatorIssue) -> bool + Send + Sync + 'static,
    {
        self.exclude_message = Some(Arc::new(exclude));
        self
    }

    /// Register an extra check whose messages join the validator's issues.
    pub fn perform_additional_validation<F>(mut self, validation: F) -> Self
    where
        F: Fn(&Value, &str) -> Vec<Message> + Send + Sync + 'static,
    {
        self.additional_validations.push(Arc::new(validation));
        self
    }

    pub fn build(self) -> Result<FhirResourceValidator> {
        let service: Arc<dyn ValidatorService> = match self.service {
            Some(service) => service,
            None => {
                let url = self.config.resolved_url()?;
                Arc::new(HttpValidatorService::new(&url, self.config.timeout)?)
            }
        };
        Ok(FhirResourceValidator {
            config: self.config,
            service,
            sessions: self
                .sessions
                .unwrap_or_else(|| Arc::new(InMemorySessionStore::new())),
            exclude_message: self.exclude_message,
            additional_validations: self.additional_validations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_kind() {
        assert_eq!(status_error_kind(404), ValidatorErrorKind::ClientError(404));
        assert_eq!(status_error_kind(502), ValidatorErrorKind::ServerError(502));
        assert_eq!(status_error_kind(302), ValidatorErrorKind::UnexpectedResponse);
    }
}
