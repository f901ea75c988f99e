use nix::unistd::Pid;
use std::time::Duration;

/// Handle for a one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// Something the loop wants an instance to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ProcessExited { pid: Pid, status: i32 },
    TimerExpired(TimerId),
}

/// The scheduling primitives an instance needs from its loop.
///
/// Cancellation is idempotent and never fires the cancelled event.
pub trait EventLoop {
    /// Report exactly one `ProcessExited` for `pid` once it terminates.
    fn watch_process(&mut self, pid: Pid);
    fn unwatch_process(&mut self, pid: Pid);
    fn schedule_timer(&mut self, after: Duration) -> TimerId;
    fn cancel_timer(&mut self, timer: TimerId);
}
