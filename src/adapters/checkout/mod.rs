//! Checkout provider adapters.

mod mock_checkout_provider;

pub use mock_checkout_provider::MockCheckoutProvider;
