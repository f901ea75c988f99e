use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{fork, setsid, ForkResult, Pid};
use std::collections::BTreeMap;
use std::ffi::{CString, OsString};
use std::ptr;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use tracing::debug;

use crate::snapshot::Snapshot;

/// Exit status of a child whose exec failed.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Process-level side effects of the state machine.
pub trait Launcher {
    /// Fork a child running `config`. Returns the child's pid in the parent.
    fn launch(&mut self, config: &Snapshot) -> nix::Result<Pid>;
    fn signal(&mut self, pid: Pid, signal: Signal) -> nix::Result<()>;
}

/// Launcher backed by fork(2) and execvpe(3).
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkExec;

impl Launcher for ForkExec {
    /*
        @@@
        @launch();
        . Marshals argv and the merged environment into C strings and NULL-terminated pointer arrays before forking.
        . The child detaches into its own session (setsid()) and replaces its image with execvpe().
        . If exec fails the child dies with EXEC_FAILURE_STATUS; the parent sees it as a normal exit.
    */
    fn launch(&mut self, config: &Snapshot) -> nix::Result<Pid> {
        let argv = to_cstrings(config.command.as_slice().iter().map(|a| a.as_bytes().to_vec()))?;
        if argv.is_empty() {
            return Err(Errno::EINVAL);
        }
        let envp = to_cstrings(merged_env(config).into_iter().map(|(k, v)| {
            let mut kv = k.into_vec();
            kv.push(b'=');
            kv.extend_from_slice(v.as_bytes());
            kv
        }))?;
        let argv_ptrs = exec_array(&argv);
        let envp_ptrs = exec_array(&envp);

        // The child must not allocate: only setsid, execvpe and _exit after fork.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), program = ?argv[0], "forked");
                Ok(child)
            }
            ForkResult::Child => {
                let _ = setsid();
                unsafe {
                    libc::execvpe(argv_ptrs[0], argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
                    libc::_exit(EXEC_FAILURE_STATUS)
                }
            }
        }
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> nix::Result<()> {
        kill(pid, signal)
    }
}

// Inherited environment with the instance's entries layered on top.
fn merged_env(config: &Snapshot) -> BTreeMap<OsString, OsString> {
    let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
    for (k, v) in config.env.iter() {
        env.insert(k.into(), v.into());
    }
    env
}

fn to_cstrings(items: impl Iterator<Item = Vec<u8>>) -> nix::Result<Vec<CString>> {
    items
        .map(|bytes| CString::new(bytes).map_err(|_| Errno::EINVAL))
        .collect()
}

// Borrowed pointers into `items`, followed by the NULL exec(3) expects.
fn exec_array(items: &[CString]) -> Vec<*const libc::c_char> {
    items.iter().map(|s| s.as_ptr()).chain(std::iter::once(ptr::null())).collect()
}
