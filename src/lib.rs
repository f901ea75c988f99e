/* src/lib.rs */

// Re-export modules for both binary and tests
pub mod parse;
pub mod snapshot;
pub mod event_loop;
pub mod launcher;
pub mod instance;
pub mod status;
pub mod reactor;
pub mod runtime;
pub mod control;
pub mod shell;
pub mod logger;

#[cfg(test)]
mod testing;

pub use event_loop::{Event, EventLoop, TimerId};
pub use instance::{Instance, State, DEFAULT_STOP_TIMEOUT, FORCED_EXIT_STATUS};
pub use launcher::{ForkExec, Launcher, EXEC_FAILURE_STATUS};
pub use reactor::Reactor;
pub use runtime::{ControlError, Supervisor};
pub use snapshot::{Argv, KvSet, Snapshot};
pub use status::{InstanceStatus, StatusReport};
