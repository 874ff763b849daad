//! Transport to the external validator service.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{ConformanceError, Result, ValidatorErrorKind};
use crate::validator::wire::ValidateRequest;

/// Raw HTTP answer of the validator; status handling is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorResponse {
    pub status: u16,
    pub body: String,
}

/// Sends validation requests. Transport failures come back as
/// [`ConformanceError::Validator`] with the matching kind.
#[async_trait]
pub trait ValidatorService: Send + Sync {
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidatorResponse>;

    /// Base URL, for messages.
    fn url(&self) -> &str;
}

/// `reqwest`-backed service talking to `{base_url}/validate`.
#[derive(Debug, Clone)]
pub struct HttpValidatorService {
    client: reqwest::Client,
    base_url: String,
    endpoint: Url,
}

impl HttpValidatorService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)?.join("validate")?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            endpoint,
        })
    }
}

#[async_trait]
impl ValidatorService for HttpValidatorService {
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidatorResponse> {
        tracing::debug!("POST {}", self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url))?;
        Ok(ValidatorResponse { status, body })
    }

    fn url(&self) -> &str {
        &self.base_url
    }
}

/// Map a `reqwest` failure to a validator error kind.
pub fn classify_transport_error(error: &reqwest::Error, url: &str) -> ConformanceError {
    let kind = if error.is_timeout() {
        ValidatorErrorKind::Timeout
    } else if is_tls_error(error) {
        ValidatorErrorKind::Tls
    } else if error.is_connect() || error.is_request() {
        ValidatorErrorKind::Connection
    } else {
        ValidatorErrorKind::UnexpectedResponse
    };
    tracing::warn!("Validator request to {} failed: {}", url, error);
    ConformanceError::validator(kind, format!("Unable to connect to validator at {url}: {error}"))
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_validate() {
        let service = HttpValidatorService::new("http://localhost:3500/hl7validatorapi", Duration::from_secs(5)).unwrap();
        assert_eq!(service.endpoint.as_str(), "http://localhost:3500/hl7validatorapi/validate");
        assert_eq!(service.url(), "http://localhost:3500/hl7validatorapi");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(HttpValidatorService::new("not a url", Duration::from_secs(5)).is_err());
    }
}
