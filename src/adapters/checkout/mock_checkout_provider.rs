//! Mock checkout provider for tests and local development.
//!
//! Supports:
//! - Deterministic session ids (`cs_test_{n}`)
//! - Error injection
//! - Call tracking

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{CheckoutProvider, CheckoutRequest, CheckoutSession};

/// In-process `CheckoutProvider`.
///
/// # Example
///
/// ```ignore
/// let mock = MockCheckoutProvider::new();
/// mock.set_error(DomainError::new(ErrorCode::ExternalServiceError, "down"));
/// assert!(mock.create_checkout(&request).await.is_err());
/// assert_eq!(mock.requests().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockCheckoutProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    issued: u64,
    next_error: Option<DomainError>,
    requests: Vec<CheckoutRequest>,
}

impl MockCheckoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `create_checkout` call with `error`.
    pub fn set_error(&self, error: DomainError) {
        if let Ok(mut state) = self.inner.lock() {
            state.next_error = Some(error);
        }
    }

    /// Every request received, oldest first.
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.inner
            .lock()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CheckoutProvider for MockCheckoutProvider {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, DomainError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "Mock state poisoned"))?;
        state.requests.push(request.clone());

        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        state.issued += 1;
        let checkout_id = format!("cs_test_{}", state.issued);
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.test/pay/{}", checkout_id),
            checkout_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::AccountId;
    use crate::ports::Purchase;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            account_id: AccountId::new(),
            request_id: "req-1".to_string(),
            purchase: Purchase::Topup {
                points: 100,
                price: 999,
            },
            price: 999,
            description: "100 points".to_string(),
            success_url: "https://app.test/ok".to_string(),
            cancel_url: "https://app.test/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn issues_sequential_ids() {
        let mock = MockCheckoutProvider::new();
        let a = mock.create_checkout(&request()).await.unwrap();
        let b = mock.create_checkout(&request()).await.unwrap();
        assert_eq!(a.checkout_id, "cs_test_1");
        assert_eq!(b.checkout_id, "cs_test_2");
        assert!(a.checkout_url.ends_with("cs_test_1"));
    }

    #[tokio::test]
    async fn injected_error_fires_once() {
        let mock = MockCheckoutProvider::new();
        mock.set_error(DomainError::new(ErrorCode::ExternalServiceError, "down"));
        assert!(mock.create_checkout(&request()).await.is_err());
        assert!(mock.create_checkout(&request()).await.is_ok());
        assert_eq!(mock.requests().len(), 2);
    }
}
