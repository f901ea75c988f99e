//! Lifecycle of one supervised process.
//!
//! Every method runs to completion on the loop's thread. Process exits and
//! kill timers come back in through [`Instance::on_process_exited`] and
//! [`Instance::on_kill_timer_expired`]; the owner routes them here.

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use serde_yaml::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::event_loop::{EventLoop, TimerId};
use crate::launcher::Launcher;
use crate::parse::parse_entry;
use crate::snapshot::{config_changed, Argv, KvSet, Snapshot};

/// Status reported for a process we had to SIGKILL ourselves.
pub const FORCED_EXIT_STATUS: i32 = -1;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Invalid,
    Stopped,
    Running,
    StoppingForRestart,
    StoppingFinal,
}

#[derive(Debug)]
pub struct Instance {
    name: String,
    raw_config: Value,
    config: Snapshot,
    valid: bool,
    restart: bool,
    pid: Option<Pid>,
    kill_timer: Option<TimerId>,
    stop_timeout: Duration,
}

impl Instance {
    /// Build an instance from a raw service entry. A bad entry yields an
    /// instance that refuses to start rather than an error.
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        let name = name.into();
        let mut snapshot = Snapshot::default();
        let valid = match parse_entry(&config, &mut snapshot) {
            Ok(()) => true,
            Err(err) => {
                warn!(instance = %name, error = %err, "Invalid service entry");
                false
            }
        };

        Instance {
            name,
            raw_config: config,
            config: snapshot,
            valid,
            restart: false,
            pid: None,
            kill_timer: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Grace period between SIGTERM and SIGKILL.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_config(&self) -> &Value {
        &self.raw_config
    }

    pub fn command(&self) -> &Argv {
        &self.config.command
    }

    pub fn env(&self) -> &KvSet {
        &self.config.env
    }

    pub fn data(&self) -> &KvSet {
        &self.config.data
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn restart_requested(&self) -> bool {
        self.restart
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn kill_timer(&self) -> Option<TimerId> {
        self.kill_timer
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    pub fn state(&self) -> State {
        match (self.pid, self.kill_timer) {
            (None, _) if !self.valid => State::Invalid,
            (None, _) => State::Stopped,
            (Some(_), None) => State::Running,
            (Some(_), Some(_)) if self.restart => State::StoppingForRestart,
            (Some(_), Some(_)) => State::StoppingFinal,
        }
    }

    /*
        @@@
        @start();
        . Does nothing while a process is still pending, so a second start never forks twice.
        . Clears the restart request, then refuses to launch an invalid configuration.
        . A failed fork leaves the instance stopped; a successful one is handed to the loop to watch.
    */
    pub fn start<E: EventLoop, L: Launcher>(&mut self, events: &mut E, launcher: &mut L) {
        if self.pid.is_some() {
            return;
        }

        self.restart = false;
        if !self.valid {
            debug!(instance = %self.name, "Not starting invalid instance");
            return;
        }

        match launcher.launch(&self.config) {
            Ok(pid) => {
                info!(instance = %self.name, pid = pid.as_raw(), command = %self.config.command, "Spawned new instance");
                self.pid = Some(pid);
                events.watch_process(pid);
            }
            Err(err) => {
                error!(instance = %self.name, error = %err, "fork failed");
            }
        }
    }

    /*
        @@@
        @stop();
        . Sends SIGTERM to the tracked process and records whether it should come back.
        . (Re)arms the kill timer so the stop resolves within `stop_timeout` even if SIGTERM is ignored.
    */
    pub fn stop<E: EventLoop, L: Launcher>(&mut self, restart: bool, events: &mut E, launcher: &mut L) {
        let Some(pid) = self.pid else {
            return;
        };

        info!(instance = %self.name, pid = pid.as_raw(), restart, "Stopping instance");
        if let Err(err) = launcher.signal(pid, Signal::SIGTERM) {
            warn!(instance = %self.name, pid = pid.as_raw(), error = %err, "failed to send SIGTERM");
        }
        self.restart = restart;

        if let Some(timer) = self.kill_timer.take() {
            events.cancel_timer(timer);
        }
        self.kill_timer = Some(events.schedule_timer(self.stop_timeout));
    }

    /// Resolve the termination of the tracked process, natural or forced.
    pub fn on_process_exited<E: EventLoop, L: Launcher>(
        &mut self,
        status: i32,
        events: &mut E,
        launcher: &mut L,
    ) {
        if let Some(timer) = self.kill_timer.take() {
            events.cancel_timer(timer);
        }

        if let Some(pid) = self.pid.take() {
            info!(instance = %self.name, pid = pid.as_raw(), status, "Instance exited");
        }

        if self.restart {
            self.start(events, launcher);
        }
    }

    pub fn on_kill_timer_expired<E: EventLoop, L: Launcher>(&mut self, events: &mut E, launcher: &mut L) {
        // The loop has already dropped a fired timer.
        self.kill_timer = None;

        if let Some(pid) = self.pid {
            warn!(instance = %self.name, pid = pid.as_raw(), timeout = ?self.stop_timeout, "Still alive after grace period, sending SIGKILL");
            self.force_exit(pid, events, launcher);
        }
    }

    /// SIGKILL the tracked process right away, without waiting for the kill
    /// timer and without relaunching it.
    pub fn kill<E: EventLoop, L: Launcher>(&mut self, events: &mut E, launcher: &mut L) {
        self.restart = false;
        if let Some(timer) = self.kill_timer.take() {
            events.cancel_timer(timer);
        }

        if let Some(pid) = self.pid {
            warn!(instance = %self.name, pid = pid.as_raw(), "Killing instance");
            self.force_exit(pid, events, launcher);
        }
    }

    fn force_exit<E: EventLoop, L: Launcher>(&mut self, pid: Pid, events: &mut E, launcher: &mut L) {
        if let Err(err) = launcher.signal(pid, Signal::SIGKILL) {
            warn!(instance = %self.name, pid = pid.as_raw(), error = %err, "failed to send SIGKILL");
        }
        events.unwatch_process(pid);
        self.on_process_exited(FORCED_EXIT_STATUS, events, launcher);
    }

    /*
        @@@
        @update();
        . Always keeps the newest raw entry, even when nothing relevant changed.
        . Returns false without side effects unless command, env or data differ (or we were invalid).
        . On a change: requests a restart, stops the running process and swaps in the new configuration.
        . The running process keeps its old argv/env until it exits and is relaunched.
    */
    pub fn update<E: EventLoop, L: Launcher>(&mut self, mut new: Instance, events: &mut E, launcher: &mut L) -> bool {
        debug_assert!(new.pid.is_none(), "candidate instance must never have been started");

        let changed = config_changed(self.valid, &self.config, &new.config);

        self.raw_config = std::mem::take(&mut new.raw_config);
        if !changed {
            return false;
        }

        info!(instance = %self.name, "Configuration changed");
        self.restart = true;
        self.stop(true, events, launcher);

        self.config.adopt(&mut new.config);
        self.name = std::mem::take(&mut new.name);
        self.valid = new.valid;
        true
    }

    /// Tear down from any state. Cancels the watch and kill timer without firing them.
    pub fn free<E: EventLoop>(mut self, events: &mut E) {
        if let Some(pid) = self.pid.take() {
            debug!(instance = %self.name, pid = pid.as_raw(), "Releasing running instance");
            events.unwatch_process(pid);
        }
        if let Some(timer) = self.kill_timer.take() {
            events.cancel_timer(timer);
        }
    }
}
