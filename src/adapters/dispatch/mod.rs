//! Task dispatch adapters.
//!
//! - `ChannelTaskDispatcher` - tokio mpsc hand-off to the `TaskSupervisor`
//! - `RecordingTaskDispatcher` - captures dispatches for tests

mod channel;
mod recording;

pub use channel::{ChannelTaskDispatcher, DispatchReceiver};
pub use recording::{Dispatch, RecordingTaskDispatcher};
