//! Application layer - Commands, Queries, Handlers and background services.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;
mod notify;
pub mod supervisor;

pub use handlers::*;
pub use supervisor::{TaskSupervisor, TaskSupervisorConfig};
