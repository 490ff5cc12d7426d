//! Payment handlers.
//!
//! ## Commands
//! - Start a hosted checkout (creates the PENDING row)
//! - Reconcile a payment confirmation
//! - Apply a recurring subscription charge

mod handle_confirmation;
mod handle_recurring_charge;
mod start_checkout;

pub use handle_confirmation::{
    ConfirmationOutcome, HandleConfirmationCommand, HandleConfirmationHandler, ReconcileOutcome,
};
pub use handle_recurring_charge::{HandleRecurringChargeCommand, HandleRecurringChargeHandler};
pub use start_checkout::{StartCheckoutCommand, StartCheckoutHandler, StartCheckoutResult};
