//! Payment configuration

use serde::Deserialize;

use super::error::{is_http_url, ValidationError};
use super::service::Environment;

/// Redirect targets handed to the checkout provider
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Where the provider sends the buyer after paying
    pub success_url: String,

    /// Where the provider sends the buyer after abandoning checkout
    pub cancel_url: String,
}

impl PaymentConfig {
    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        for (name, url) in [
            ("PAYMENT__SUCCESS_URL", &self.success_url),
            ("PAYMENT__CANCEL_URL", &self.cancel_url),
        ] {
            if url.is_empty() {
                return Err(ValidationError::MissingRequired(name));
            }
            if !is_http_url(url) {
                return Err(ValidationError::InvalidUrl(name));
            }
            if environment == Environment::Production && !url.starts_with("https://") {
                return Err(ValidationError::MustBeHttps(name));
            }
        }
        Ok(())
    }
}
