//! Generation backend adapters.
//!
//! - `HttpTaskHandler` - forwards task input to an HTTP generation service

mod http_task_handler;

pub use http_task_handler::{HttpTaskHandler, HttpTaskHandlerConfig};
