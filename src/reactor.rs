use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::event_loop::{Event, EventLoop, TimerId};
use crate::instance::FORCED_EXIT_STATUS;

/// How often watched children are polled when no timer is due sooner.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Single-threaded event source: reaps watched children with `waitpid(WNOHANG)`
/// and fires one-shot timers. Only pids it was handed are ever waited on.
#[derive(Debug, Default)]
pub struct Reactor {
    watched: HashSet<Pid>,
    // Unwatched children still owed a waitpid.
    orphans: HashSet<Pid>,
    timers: BTreeMap<TimerId, Instant>,
    next_timer: u64,
}

impl Reactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_watching(&self, pid: Pid) -> bool {
        self.watched.contains(&pid)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    /// How long the driver may sleep before the next poll.
    pub fn tick(&self, now: Instant) -> Duration {
        match self.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(POLL_INTERVAL),
            None => POLL_INTERVAL,
        }
    }

    /*
        @@@
        @next_event();
        . Reaps orphans silently so forced kills never leave zombies behind.
        . Returns the first watched child that terminated; exit code as-is, signal deaths as 128 + signo.
        . Otherwise returns the earliest timer due at `now`. Events come out one at a time,
          so anything cancelled while handling one is never delivered.
    */
    pub fn next_event(&mut self, now: Instant) -> Option<Event> {
        self.reap_orphans();

        let watched: Vec<Pid> = self.watched.iter().copied().collect();
        for pid in watched {
            let status = match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => code,
                Ok(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
                Ok(_) => continue,
                Err(Errno::ECHILD) => {
                    warn!(pid = pid.as_raw(), "Watched child vanished");
                    FORCED_EXIT_STATUS
                }
                Err(err) => {
                    warn!(pid = pid.as_raw(), error = %err, "waitpid failed");
                    continue;
                }
            };
            self.watched.remove(&pid);
            debug!(pid = pid.as_raw(), status, "Child process exited");
            return Some(Event::ProcessExited { pid, status });
        }

        let (&timer, _) = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .min_by_key(|(_, deadline)| **deadline)?;
        self.timers.remove(&timer);
        trace!(timer = timer.0, "Timer expired");
        Some(Event::TimerExpired(timer))
    }

    fn reap_orphans(&mut self) {
        self.orphans.retain(|pid| {
            !matches!(
                waitpid(*pid, Some(WaitPidFlag::WNOHANG)),
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(_)
            )
        });
    }
}

impl EventLoop for Reactor {
    fn watch_process(&mut self, pid: Pid) {
        self.orphans.remove(&pid);
        self.watched.insert(pid);
    }

    fn unwatch_process(&mut self, pid: Pid) {
        if self.watched.remove(&pid) {
            self.orphans.insert(pid);
        }
    }

    fn schedule_timer(&mut self, after: Duration) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.timers.insert(id, Instant::now() + after);
        id
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}
