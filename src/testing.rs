//! In-memory stand-ins for the loop and the launcher.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::event_loop::{EventLoop, TimerId};
use crate::launcher::Launcher;
use crate::snapshot::Snapshot;

pub fn entry(yaml: &str) -> Value {
    serde_yaml::from_str(yaml).unwrap()
}

#[derive(Debug, Default)]
pub struct FakeLoop {
    pub watched: Vec<Pid>,
    pub timers: BTreeMap<TimerId, Duration>,
    next_timer: u64,
}

impl EventLoop for FakeLoop {
    fn watch_process(&mut self, pid: Pid) {
        assert!(!self.watched.contains(&pid), "pid {pid} watched twice");
        self.watched.push(pid);
    }

    fn unwatch_process(&mut self, pid: Pid) {
        self.watched.retain(|p| *p != pid);
    }

    fn schedule_timer(&mut self, after: Duration) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.timers.insert(id, after);
        id
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}

#[derive(Debug)]
pub struct FakeLauncher {
    pub fail: bool,
    pub launched: Vec<(Pid, Snapshot)>,
    pub signals: Vec<(Pid, Signal)>,
    next_pid: i32,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        FakeLauncher {
            fail: false,
            launched: Vec::new(),
            signals: Vec::new(),
            next_pid: 1000,
        }
    }
}

impl FakeLauncher {
    /// A launcher whose every fork fails.
    pub fn failing() -> Self {
        FakeLauncher { fail: true, ..FakeLauncher::default() }
    }
}

impl Launcher for FakeLauncher {
    fn launch(&mut self, config: &Snapshot) -> nix::Result<Pid> {
        if self.fail {
            return Err(Errno::EAGAIN);
        }
        self.next_pid += 1;
        let pid = Pid::from_raw(self.next_pid);
        self.launched.push((pid, config.clone()));
        Ok(pid)
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> nix::Result<()> {
        self.signals.push((pid, signal));
        Ok(())
    }
}
