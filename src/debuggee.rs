//! The controlled child process.
//!
//! [`Debuggee`] carries the process-side state of the engine: the root
//! pid, whether the exec handshake already happened, which task is
//! currently stopped, and that task's registers as of the last stop
//! (after the program-counter rewind). The engine in
//! [`crate::debugger`] drives the state machine; everything here is
//! plain data plus launch/kill.

use std::path::Path;

use nix::libc::user_regs_struct;
use nix::unistd::Pid;
use tracing::info;

use crate::errors::Result;
use crate::trace::TraceChannel;

pub struct Debuggee {
    /// Root task of the debuggee.
    pub(crate) pid: Pid,
    /// True once the initial exec trap has been consumed.
    pub(crate) proc_is_up: bool,
    /// The task that delivered the last stop.
    pub(crate) stopped_pid: Pid,
    /// Registers of `stopped_pid`, populated at each stop.
    pub(crate) stopped_regs: Option<user_regs_struct>,
}

impl Debuggee {
    /// Forks and execs the executable under trace. The child stops at its
    /// exec trap; the first resume consumes it.
    pub(crate) fn launch(channel: &TraceChannel, path: impl AsRef<Path>) -> Result<Self> {
        let pid = channel.spawn_debuggee(path.as_ref().to_path_buf())?;
        info!("started {} as pid {pid}", path.as_ref().display());
        Ok(Debuggee {
            pid,
            proc_is_up: false,
            stopped_pid: pid,
            stopped_regs: None,
        })
    }

    pub fn kill(&self, channel: &TraceChannel) -> Result<()> {
        channel.kill(self.pid)
    }

    /// Program counter at the last stop, after the rewind.
    pub fn pc(&self) -> Option<u64> {
        self.stopped_regs.map(|regs| regs.rip)
    }

    /// Stack pointer at the last stop.
    pub fn sp(&self) -> Option<u64> {
        self.stopped_regs.map(|regs| regs.rsp)
    }
}
