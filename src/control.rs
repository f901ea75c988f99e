use crate::parse::{parser, Config};
use crate::reactor::Reactor;
use crate::runtime::Supervisor;
use crate::status::render;
use futures::StreamExt;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// What the shell can ask of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Status,
    Reload,
    Start(String),
    Stop(String),
    Exit,
}

impl ShellCommand {
    pub fn parse(input: &str) -> Option<ShellCommand> {
        let mut words = input.split_whitespace();
        let cmd = match (words.next()?, words.next()) {
            ("status", None) => ShellCommand::Status,
            ("reload", None) => ShellCommand::Reload,
            ("exit", None) => ShellCommand::Exit,
            ("start", Some(name)) => ShellCommand::Start(name.to_owned()),
            ("stop", Some(name)) => ShellCommand::Stop(name.to_owned()),
            _ => return None,
        };
        match words.next() {
            Some(_) => None,
            None => Some(cmd),
        }
    }
}

/// A command plus where to send the text reply.
#[derive(Debug)]
pub struct Request {
    pub command: ShellCommand,
    pub reply: oneshot::Sender<String>,
}

// Extra time granted after the longest stop timeout before killing what is left.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

struct Daemon {
    config_path: String,
    supervisor: Supervisor,
    reactor: Reactor,
    shutdown_deadline: Option<Instant>,
}

impl Daemon {
    fn new(config_path: String, config: &Config) -> Self {
        let mut daemon = Daemon {
            config_path,
            supervisor: Supervisor::new(config.stop_timeout()),
            reactor: Reactor::new(),
            shutdown_deadline: None,
        };
        daemon.supervisor.apply_config(&config.services, &mut daemon.reactor);
        daemon
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.reactor.next_event(Instant::now()) {
            self.supervisor.dispatch(event, &mut self.reactor);
        }
    }

    fn shutting_down(&self) -> bool {
        self.shutdown_deadline.is_some()
    }

    fn reload(&mut self) -> String {
        if self.shutting_down() {
            warn!(path = %self.config_path, "Shutting down, reload ignored");
            return String::from("shutting down, reload ignored");
        }
        match parser(&self.config_path) {
            Ok(config) => {
                info!(path = %self.config_path, services = config.services.len(), "Reloading configuration");
                self.supervisor.set_stop_timeout(config.stop_timeout());
                self.supervisor.apply_config(&config.services, &mut self.reactor);
                String::from("reloaded")
            }
            Err(err) => {
                error!(path = %self.config_path, error = %format!("{:#}", err), "Reload failed, keeping current configuration");
                format!("reload failed: {:#}", err)
            }
        }
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down() {
            return;
        }
        info!("Shutting down, stopping all instances");
        self.supervisor.shutdown(&mut self.reactor);
        let grace = self.supervisor.max_stop_timeout();
        self.shutdown_deadline = Some(Instant::now() + grace + SHUTDOWN_SLACK);
    }

    fn finished(&self) -> bool {
        match self.shutdown_deadline {
            Some(deadline) => self.supervisor.is_idle() || Instant::now() >= deadline,
            None => false,
        }
    }

    fn handle(&mut self, command: ShellCommand) -> String {
        match command {
            ShellCommand::Status => render(&self.supervisor.dump())
                .unwrap_or_else(|err| format!("status failed: {}", err)),
            ShellCommand::Reload => self.reload(),
            ShellCommand::Start(name) if self.shutting_down() => {
                format!("shutting down, not starting `{}`", name)
            }
            ShellCommand::Start(name) => match self.supervisor.start(&name, &mut self.reactor) {
                Ok(()) => format!("start requested for `{}`", name),
                Err(err) => err.to_string(),
            },
            ShellCommand::Stop(name) => match self.supervisor.stop(&name, &mut self.reactor) {
                Ok(()) => format!("stop requested for `{}`", name),
                Err(err) => err.to_string(),
            },
            ShellCommand::Exit => {
                self.begin_shutdown();
                String::from("bye")
            }
        }
    }
}

/*
    @@@
    @run();
    . Applies the initial config, then loops on a single thread: deliver every ready child exit and timer,
      then wait for the next poll tick, a process signal or a shell request.
    . SIGHUP reloads the config file; SIGTERM/SIGINT and `exit` stop every instance without restart.
    . Once shutdown begins, reloads and starts are refused.
    . Returns once everything has exited; at the deadline (longest stop timeout plus slack) survivors get SIGKILL.
*/
pub async fn run(
    config_path: String,
    config: Config,
    mut requests: mpsc::UnboundedReceiver<Request>,
) -> anyhow::Result<()> {
    let mut signals = Signals::new([SIGHUP, SIGTERM, SIGINT])?;
    let signals_handle = signals.handle();
    let mut daemon = Daemon::new(config_path, &config);
    let mut requests_open = true;

    loop {
        daemon.drain_events();
        if daemon.finished() {
            break;
        }

        let tick = daemon.reactor.tick(Instant::now());
        tokio::select! {
            _ = sleep(tick) => {}
            Some(signal) = signals.next() => match signal {
                SIGHUP => {
                    daemon.reload();
                }
                _ => {
                    info!(signal, "Received termination signal");
                    daemon.begin_shutdown();
                }
            },
            request = requests.recv(), if requests_open => match request {
                Some(Request { command, reply }) => {
                    let text = daemon.handle(command);
                    if reply.send(text).is_err() {
                        warn!("Shell went away before the reply");
                    }
                }
                None => requests_open = false,
            },
        }
    }

    if !daemon.supervisor.is_idle() {
        warn!("Instances still running at shutdown deadline, killing them");
        daemon.supervisor.kill_remaining(&mut daemon.reactor);
    }
    signals_handle.close();
    daemon.supervisor.free(&mut daemon.reactor);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shell_commands() {
        assert_eq!(ShellCommand::parse("status"), Some(ShellCommand::Status));
        assert_eq!(ShellCommand::parse("  reload "), Some(ShellCommand::Reload));
        assert_eq!(ShellCommand::parse("start web"), Some(ShellCommand::Start("web".into())));
        assert_eq!(ShellCommand::parse("stop   web"), Some(ShellCommand::Stop("web".into())));
        assert_eq!(ShellCommand::parse("exit"), Some(ShellCommand::Exit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(ShellCommand::parse(""), None);
        assert_eq!(ShellCommand::parse("start"), None);
        assert_eq!(ShellCommand::parse("stop a b"), None);
        assert_eq!(ShellCommand::parse("status now"), None);
        assert_eq!(ShellCommand::parse("restart web"), None);
    }

    fn config_file(name: &str, yaml: &str) -> String {
        let path = std::env::temp_dir().join(format!("instanced-{}-{}.yml", name, std::process::id()));
        std::fs::write(&path, yaml).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn nothing_starts_once_shutdown_began() {
        let path = config_file("shutdown", "services: {}\n");
        let config = parser(&path).unwrap();
        let mut daemon = Daemon::new(path.clone(), &config);

        daemon.begin_shutdown();
        assert!(daemon.finished());

        std::fs::write(&path, "services:\n  late: { command: [/bin/sleep, '30'] }\n").unwrap();
        assert_eq!(daemon.reload(), "shutting down, reload ignored");
        assert_eq!(daemon.handle(ShellCommand::Reload), "shutting down, reload ignored");
        assert_eq!(
            daemon.handle(ShellCommand::Start("late".into())),
            "shutting down, not starting `late`"
        );

        assert!(daemon.supervisor.dump().is_empty());
        assert!(daemon.supervisor.is_idle());
        assert!(daemon.finished());
        std::fs::remove_file(&path).unwrap();
    }
}
