use serde_yaml::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::event_loop::{Event, EventLoop};
use crate::instance::{Instance, DEFAULT_STOP_TIMEOUT};
use crate::launcher::{ForkExec, Launcher};
use crate::status::StatusReport;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no such service: `{0}`")]
    UnknownService(String),
}

/// Owns every instance by name and routes loop events to them.
#[derive(Debug)]
pub struct Supervisor<L = ForkExec> {
    instances: BTreeMap<String, Instance>,
    // Removed from the config but still waiting for their process to exit.
    retiring: Vec<Instance>,
    launcher: L,
    stop_timeout: Duration,
}

impl Supervisor<ForkExec> {
    pub fn new(stop_timeout: Duration) -> Self {
        Self::with_launcher(ForkExec, stop_timeout)
    }
}

impl Default for Supervisor<ForkExec> {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TIMEOUT)
    }
}

impl<L: Launcher> Supervisor<L> {
    pub fn with_launcher(launcher: L, stop_timeout: Duration) -> Self {
        Supervisor {
            instances: BTreeMap::new(),
            retiring: Vec::new(),
            launcher,
            stop_timeout,
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    /// Takes effect on instances created afterwards.
    pub fn set_stop_timeout(&mut self, stop_timeout: Duration) {
        self.stop_timeout = stop_timeout;
    }

    /*
        @@@
        @apply_config();
        . New services are built from their entry and started right away.
        . Existing services are updated; a changed service that is not running is started with the new entry.
        . Services missing from `services` are stopped without restart and freed once their process is gone.
    */
    pub fn apply_config<E: EventLoop>(&mut self, services: &BTreeMap<String, Value>, events: &mut E) {
        let removed: Vec<String> = self
            .instances
            .keys()
            .filter(|name| !services.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(inst) = self.instances.remove(&name) {
                info!(instance = %name, "Service removed from configuration");
                self.retire(inst, events);
            }
        }

        for (name, entry) in services {
            let candidate = Instance::new(name.clone(), entry.clone()).with_stop_timeout(self.stop_timeout);
            match self.instances.get_mut(name) {
                Some(inst) => {
                    if inst.update(candidate, events, &mut self.launcher) && !inst.is_running() {
                        inst.start(events, &mut self.launcher);
                    }
                }
                None => {
                    let mut inst = candidate;
                    inst.start(events, &mut self.launcher);
                    self.instances.insert(name.clone(), inst);
                }
            }
        }
    }

    pub fn start<E: EventLoop>(&mut self, name: &str, events: &mut E) -> Result<(), ControlError> {
        let inst = self
            .instances
            .get_mut(name)
            .ok_or_else(|| ControlError::UnknownService(name.to_owned()))?;
        inst.start(events, &mut self.launcher);
        Ok(())
    }

    pub fn stop<E: EventLoop>(&mut self, name: &str, events: &mut E) -> Result<(), ControlError> {
        let inst = self
            .instances
            .get_mut(name)
            .ok_or_else(|| ControlError::UnknownService(name.to_owned()))?;
        inst.stop(false, events, &mut self.launcher);
        Ok(())
    }

    /*
        @@@
        @dispatch();
        . Finds the instance (live or retiring) that owns the exited pid or the expired timer.
        . Events nobody owns any more (already resolved or freed) are dropped.
        . Retiring instances are freed as soon as their process is gone.
    */
    pub fn dispatch<E: EventLoop>(&mut self, event: Event, events: &mut E) {
        let launcher = &mut self.launcher;
        let mut owners = self.instances.values_mut().chain(self.retiring.iter_mut());

        match event {
            Event::ProcessExited { pid, status } => {
                match owners.find(|inst| inst.pid() == Some(pid)) {
                    Some(inst) => inst.on_process_exited(status, events, launcher),
                    None => debug!(pid = pid.as_raw(), status, "Exit of an unowned process"),
                }
            }
            Event::TimerExpired(timer) => {
                match owners.find(|inst| inst.kill_timer() == Some(timer)) {
                    Some(inst) => inst.on_kill_timer_expired(events, launcher),
                    None => debug!(timer = timer.0, "Stale timer"),
                }
            }
        }

        self.collect_retired(events);
    }

    pub fn dump(&self) -> StatusReport {
        let mut report = StatusReport::new();
        for inst in self.instances.values() {
            inst.dump(&mut report);
        }
        report
    }

    /// Stop everything for good. Poll [`Supervisor::is_idle`] to know when it's done.
    pub fn shutdown<E: EventLoop>(&mut self, events: &mut E) {
        let all = std::mem::take(&mut self.instances);
        for (_, inst) in all {
            self.retire(inst, events);
        }
    }

    /// Longest grace period any instance still holding a process was given.
    pub fn max_stop_timeout(&self) -> Duration {
        self.instances
            .values()
            .chain(self.retiring.iter())
            .filter(|inst| inst.is_running())
            .map(|inst| inst.stop_timeout())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// SIGKILL whatever is still running, without waiting for kill timers.
    pub fn kill_remaining<E: EventLoop>(&mut self, events: &mut E) {
        let launcher = &mut self.launcher;
        for inst in self.instances.values_mut().chain(self.retiring.iter_mut()) {
            if inst.is_running() {
                inst.kill(events, launcher);
            }
        }
        self.collect_retired(events);
    }

    pub fn is_idle(&self) -> bool {
        self.retiring.is_empty() && self.instances.values().all(|inst| !inst.is_running())
    }

    /// Drop every instance now, cancelling whatever they still have scheduled.
    pub fn free<E: EventLoop>(self, events: &mut E) {
        for inst in self.instances.into_values().chain(self.retiring) {
            inst.free(events);
        }
    }

    fn retire<E: EventLoop>(&mut self, mut inst: Instance, events: &mut E) {
        if inst.is_running() {
            inst.stop(false, events, &mut self.launcher);
            self.retiring.push(inst);
        } else {
            inst.free(events);
        }
    }

    fn collect_retired<E: EventLoop>(&mut self, events: &mut E) {
        let (done, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.retiring).into_iter().partition(|inst| !inst.is_running());
        self.retiring = waiting;
        for inst in done {
            debug!(instance = %inst.name(), "Freeing retired instance");
            inst.free(events);
        }
    }
}
