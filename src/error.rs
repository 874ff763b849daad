use thiserror::Error;

/// Classification of a failed exchange with the external validator service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorErrorKind {
    /// The validator could not be reached at all
    Connection,
    /// The validator did not answer within the configured timeout
    Timeout,
    /// TLS negotiation with the validator failed
    Tls,
    /// The validator answered with a 4xx status
    ClientError(u16),
    /// The validator answered with a 5xx status
    ServerError(u16),
    /// The validator answered, but not with something we understand
    UnexpectedResponse,
}

impl std::fmt::Display for ValidatorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatorErrorKind::Connection => write!(f, "connection failure"),
            ValidatorErrorKind::Timeout => write!(f, "timeout"),
            ValidatorErrorKind::Tls => write!(f, "TLS failure"),
            ValidatorErrorKind::ClientError(status) => write!(f, "HTTP {status} (client error)"),
            ValidatorErrorKind::ServerError(status) => write!(f, "HTTP {status} (server error)"),
            ValidatorErrorKind::UnexpectedResponse => write!(f, "unexpected response"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("{message}")]
    AssertionFailed { message: String },

    #[error("{message}")]
    Skip { message: String },

    #[error("{message}")]
    Omit { message: String },

    #[error("Error occurred in the validator ({kind}): {message}")]
    Validator {
        kind: ValidatorErrorKind,
        message: String,
    },

    #[error("Unknown attribute '{attribute}', expected one of: {}", allowed.join(", "))]
    UnknownAttribute {
        attribute: String,
        allowed: Vec<String>,
    },

    #[error("Unsupported discriminator for slice {slice_id}: {message}")]
    UnsupportedDiscriminator { slice_id: String, message: String },

    #[error("Profile not found: {url}")]
    ProfileNotFound { url: String },

    #[error("Invalid IG package: {message}")]
    Package { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ConformanceError>;

impl ConformanceError {
    pub fn assertion<S: Into<String>>(message: S) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    pub fn skip<S: Into<String>>(message: S) -> Self {
        Self::Skip {
            message: message.into(),
        }
    }

    pub fn omit<S: Into<String>>(message: S) -> Self {
        Self::Omit {
            message: message.into(),
        }
    }

    pub fn validator<S: Into<String>>(kind: ValidatorErrorKind, message: S) -> Self {
        Self::Validator {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_attribute<S: Into<String>>(attribute: S, allowed: &[&str]) -> Self {
        Self::UnknownAttribute {
            attribute: attribute.into(),
            allowed: allowed.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn unsupported_discriminator<S: Into<String>, M: Into<String>>(slice_id: S, message: M) -> Self {
        Self::UnsupportedDiscriminator {
            slice_id: slice_id.into(),
            message: message.into(),
        }
    }

    pub fn profile_not_found<S: Into<String>>(url: S) -> Self {
        Self::ProfileNotFound { url: url.into() }
    }

    pub fn package<S: Into<String>>(message: S) -> Self {
        Self::Package {
            message: message.into(),
        }
    }

    /// True for the expected, control-flow failures raised by assertions.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::AssertionFailed { .. } | Self::Skip { .. } | Self::Omit { .. }
        )
    }

    /// True when the failure came from the validator infrastructure rather
    /// than from the resource under test.
    pub fn is_validator_error(&self) -> bool {
        matches!(self, Self::Validator { .. })
    }
}
