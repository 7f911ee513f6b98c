// src/exec/terminate.rs

//! Graceful-then-forced process termination.
//!
//! On unix every child is started as the leader of its own process group, so
//! signals are sent to the whole group and reach grandchildren spawned by a
//! shell wrapper. Elsewhere we can only kill the direct child.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default wait between the graceful signal and the forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: Signal) {
    let sig = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // ESRCH just means the group is already gone.
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, sig) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!(pgid, ?signal, error = %err, "killpg failed");
        }
    }
}

/// Whether any process is still in group `pgid`.
#[cfg(unix)]
fn group_has_members(pgid: u32) -> bool {
    unsafe { libc::killpg(pgid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: Signal) {}

#[cfg(not(unix))]
fn group_has_members(_pgid: u32) -> bool {
    false
}

/// Stop `child`: graceful signal, up to `grace` to exit, then forced kill.
///
/// Always waits for the child so it is reaped before returning, whichever
/// path was taken.
pub async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return child.wait().await;
    };

    if cfg!(unix) {
        signal_group(pid, Signal::Terminate);
    } else {
        child.start_kill()?;
    }

    match timeout(grace, child.wait()).await {
        Ok(status) => {
            // The leader is reaped, so `pid` is only reserved while the group
            // still has members. Sweep only then; an empty group's id may
            // already belong to someone else.
            if group_has_members(pid) {
                debug!(pid, "sweeping processes left in the group");
                signal_group(pid, Signal::Kill);
            }
            status
        }
        Err(_) => {
            warn!(
                pid,
                grace_ms = grace.as_millis() as u64,
                "process ignored graceful termination; forcing kill"
            );
            signal_group(pid, Signal::Kill);
            if let Err(e) = child.start_kill() {
                debug!(pid, error = %e, "start_kill after grace period failed");
            }
            child.wait().await
        }
    }
}
