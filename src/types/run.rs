//! Result surface shared with the test runner: messages and result kinds.

use serde::{Deserialize, Serialize};

use crate::error::ConformanceError;
use crate::types::issue::IssueSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Error,
    Warning,
    Info,
}

impl From<IssueSeverity> for MessageType {
    fn from(severity: IssueSeverity) -> Self {
        match severity {
            IssueSeverity::Error => MessageType::Error,
            IssueSeverity::Warning => MessageType::Warning,
            IssueSeverity::Info => MessageType::Info,
        }
    }
}

/// A severity-tagged message attached to a test result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub message: String,
}

/// Context of the test currently running: which suite it belongs to and the
/// messages it has collected so far.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub test_suite_id: String,
    /// Requirement set / suite options the suite was started with
    pub requirements: Option<String>,
    messages: Vec<Message>,
}

impl RunContext {
    pub fn new(test_suite_id: impl Into<String>) -> Self {
        Self {
            test_suite_id: test_suite_id.into(),
            ..Default::default()
        }
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = Some(requirements.into());
        self
    }

    pub fn add_message(&mut self, message_type: MessageType, message: impl Into<String>) {
        self.messages.push(Message {
            message_type,
            message: message.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn messages_of(&self, message_type: MessageType) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(move |m| m.message_type == message_type)
    }

    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Pass,
    Fail,
    Skip,
    Omit,
    Error,
}

/// Final outcome of one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub result: ResultKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_message: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl TestResult {
    pub fn pass(messages: Vec<Message>) -> Self {
        Self {
            result: ResultKind::Pass,
            result_message: None,
            messages,
        }
    }

    /// Map a failure raised while running a test to its result kind.
    ///
    /// Assertion-style failures keep their own message; anything else is an
    /// `error` result carrying the system-level message.
    pub fn from_error(error: &ConformanceError, messages: Vec<Message>) -> Self {
        let result = match error {
            ConformanceError::AssertionFailed { .. } => ResultKind::Fail,
            ConformanceError::Skip { .. } => ResultKind::Skip,
            ConformanceError::Omit { .. } => ResultKind::Omit,
            _ => ResultKind::Error,
        };
        Self {
            result,
            result_message: Some(error.to_string()),
            messages,
        }
    }

    /// Convenience for `Result`-returning test bodies.
    pub fn from_outcome(outcome: crate::error::Result<()>, context: &mut RunContext) -> Self {
        let messages = context.take_messages();
        match outcome {
            Ok(()) => Self::pass(messages),
            Err(error) => Self::from_error(&error, messages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidatorErrorKind;

    #[test]
    fn test_result_kind_from_errors() {
        let fail = TestResult::from_error(&ConformanceError::assertion("expected 200"), vec![]);
        assert_eq!(fail.result, ResultKind::Fail);
        assert_eq!(fail.result_message.as_deref(), Some("expected 200"));

        let skip = TestResult::from_error(&ConformanceError::skip("no data"), vec![]);
        assert_eq!(skip.result, ResultKind::Skip);

        let error = TestResult::from_error(
            &ConformanceError::validator(ValidatorErrorKind::Timeout, "slow"),
            vec![],
        );
        assert_eq!(error.result, ResultKind::Error);
    }

    #[test]
    fn test_from_outcome_drains_messages() {
        let mut context = RunContext::new("us_core");
        context.add_message(MessageType::Warning, "careful");
        let result = TestResult::from_outcome(Ok(()), &mut context);
        assert_eq!(result.result, ResultKind::Pass);
        assert_eq!(result.messages.len(), 1);
        assert!(context.messages().is_empty());
    }
}
