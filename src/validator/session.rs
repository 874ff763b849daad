//! Validator session reuse.
//!
//! The validator keeps loaded IGs per session. Remembering the session id
//! per (suite, validator, requirement set) avoids reloading them on every
//! request.

use std::fmt;

/// Identity of a validator session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub test_suite_id: String,
    pub validator_name: String,
    pub requirements: Option<String>,
}

impl SessionKey {
    pub fn new(
        test_suite_id: impl Into<String>,
        validator_name: impl Into<String>,
        requirements: Option<String>,
    ) -> Self {
        Self {
            test_suite_id: test_suite_id.into(),
            validator_name: validator_name.into(),
            requirements,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.test_suite_id, self.validator_name)?;
        if let Some(requirements) = &self.requirements {
            write!(f, "/{requirements}")?;
        }
        Ok(())
    }
}

/// Where session ids are persisted.
pub trait SessionStore: Send + Sync {
    fn find(&self, key: &SessionKey) -> Option<String>;
    fn save(&self, key: &SessionKey, session_id: String);
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: papaya::HashMap<SessionKey, String>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn find(&self, key: &SessionKey) -> Option<String> {
        self.sessions.pin().get(key).cloned()
    }

    fn save(&self, key: &SessionKey, session_id: String) {
        self.sessions.pin().insert(key.clone(), session_id);
    }
}
