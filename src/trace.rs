//! The trace channel: single-tracer serialization of all ptrace work.
//!
//! The kernel ties tracer identity to the task that performed the attach,
//! so every ptrace call, the `wait` for stops, and the initial fork/exec
//! must run on one OS thread. [`TraceChannel`] pins them: a dedicated
//! `tracer` thread consumes thunks from a channel, and every submission
//! blocks the submitter on a per-call reply channel until the thunk has
//! run. Thunks must never submit further thunks.

use std::ffi::CString;
use std::os::fd::IntoRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use nix::libc::user_regs_struct;
use nix::sys::personality::{self, Persona};
use nix::sys::prctl;
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execv, fork, ForkResult, Pid};
use tracing::trace;

use crate::errors::{DebuggerError, Result};
use crate::WORD_BYTES;

type Thunk = Box<dyn FnOnce() + Send>;

pub struct TraceChannel {
    tx: mpsc::Sender<Thunk>,
}

impl TraceChannel {
    /// Spawns the tracer thread. It runs until the channel is dropped.
    pub fn build() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Thunk>();
        thread::Builder::new()
            .name("tracer".to_string())
            .spawn(move || {
                for thunk in rx {
                    thunk();
                }
                trace!("tracer thread shutting down");
            })?;
        Ok(TraceChannel { tx })
    }

    /// Runs `f` on the tracer thread and blocks until it returns.
    pub fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Box::new(move || {
                let _ = reply_tx.send(f());
            }))
            .map_err(|_| DebuggerError::TracerGone)?;
        reply_rx.recv().map_err(|_| DebuggerError::TracerGone)?
    }

    /// Forks and execs the debuggee, traced and stopped at its entry trap.
    ///
    /// The child disables address-space randomization, arranges to die with
    /// the server, reads stdin from /dev/null, and forwards stdout to the
    /// server's stderr before calling `execv`. Does not wait for the exec
    /// trap; the first resume does.
    pub fn spawn_debuggee(&self, path: PathBuf) -> Result<Pid> {
        self.call(move || {
            let cpath = CString::new(path.as_os_str().as_bytes())?;
            match unsafe { fork() }.map_err(DebuggerError::Spawn)? {
                ForkResult::Parent { child } => Ok(child),
                ForkResult::Child => {
                    let _ = personality::get()
                        .and_then(|p| personality::set(p | Persona::ADDR_NO_RANDOMIZE));
                    let _ = prctl::set_pdeathsig(Signal::SIGKILL);
                    // raw libc here: only async-signal-safe calls between fork and exec
                    if let Ok(devnull) = std::fs::File::open("/dev/null") {
                        unsafe { nix::libc::dup2(devnull.into_raw_fd(), 0) };
                    }
                    unsafe { nix::libc::dup2(2, 1) };
                    if ptrace::traceme().is_err() {
                        std::process::exit(127);
                    }
                    let _ = execv(&cpath, &[cpath.clone()]);
                    std::process::exit(127);
                }
            }
        })
    }

    pub fn kill(&self, pid: Pid) -> Result<()> {
        self.call(move || {
            signal::kill(pid, Signal::SIGKILL).map_err(DebuggerError::Kill)?;
            // reap so the pid does not linger as a zombie
            let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
            Ok(())
        })
    }

    pub fn cont(&self, pid: Pid, sig: Option<Signal>) -> Result<()> {
        self.call(move || ptrace::cont(pid, sig).map_err(DebuggerError::Continue))
    }

    pub fn single_step(&self, pid: Pid) -> Result<()> {
        self.call(move || ptrace::step(pid, None).map_err(DebuggerError::Step))
    }

    pub fn set_options(&self, pid: Pid, options: ptrace::Options) -> Result<()> {
        self.call(move || ptrace::setoptions(pid, options).map_err(DebuggerError::SetOptions))
    }

    pub fn get_regs(&self, pid: Pid) -> Result<user_regs_struct> {
        self.call(move || ptrace::getregs(pid).map_err(DebuggerError::GetRegs))
    }

    pub fn set_regs(&self, pid: Pid, regs: user_regs_struct) -> Result<()> {
        self.call(move || ptrace::setregs(pid, regs).map_err(DebuggerError::SetRegs))
    }

    /// Waits for a state change of `pid`, or of any traced task if `None`.
    pub fn wait(&self, pid: Option<Pid>) -> Result<WaitStatus> {
        self.call(move || waitpid(pid, None).map_err(DebuggerError::Wait))
    }

    pub fn peek(&self, pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>> {
        self.call(move || peek_bytes(pid, addr, len))
    }

    pub fn poke(&self, pid: Pid, addr: u64, data: Vec<u8>) -> Result<()> {
        self.call(move || poke_bytes(pid, addr, &data))
    }
}

fn raw(addr: u64) -> ptrace::AddressType {
    addr as usize as ptrace::AddressType
}

/// Reads `len` bytes of target memory, one word at a time.
fn peek_bytes(pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut off = 0;
    while off < len {
        let word = ptrace::read(pid, raw(addr + off as u64)).map_err(DebuggerError::Peek)?;
        let bytes = word.to_le_bytes();
        let n = usize::min(WORD_BYTES, len - off);
        buf[off..off + n].copy_from_slice(&bytes[..n]);
        off += n;
    }
    Ok(buf)
}

/// Writes `data` into target memory. Partial trailing words are merged with
/// the existing memory so neighbouring bytes survive.
fn poke_bytes(pid: Pid, addr: u64, data: &[u8]) -> Result<()> {
    let mut off = 0;
    while off < data.len() {
        let n = usize::min(WORD_BYTES, data.len() - off);
        let word_addr = addr + off as u64;
        let word = if n == WORD_BYTES {
            let mut bytes = [0u8; WORD_BYTES];
            bytes.copy_from_slice(&data[off..off + n]);
            i64::from_le_bytes(bytes)
        } else {
            let existing = ptrace::read(pid, raw(word_addr)).map_err(DebuggerError::Peek)?;
            let mut bytes = existing.to_le_bytes();
            bytes[..n].copy_from_slice(&data[off..off + n]);
            i64::from_le_bytes(bytes)
        };
        ptrace::write(pid, raw(word_addr), word).map_err(DebuggerError::Poke)?;
        off += n;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_call_runs_on_tracer_thread() {
        let channel = TraceChannel::build().unwrap();
        let name = channel
            .call(|| {
                Ok(thread::current()
                    .name()
                    .unwrap_or_default()
                    .to_string())
            })
            .unwrap();
        assert_eq!(name, "tracer");
    }

    #[test]
    fn test_call_serializes_submissions() {
        let channel = TraceChannel::build().unwrap();
        let mut total = 0u64;
        for i in 0..100u64 {
            total += channel.call(move || Ok(i)).unwrap();
        }
        assert_eq!(total, 4950);
    }

    #[test]
    fn test_call_propagates_errors() {
        let channel = TraceChannel::build().unwrap();
        let err = channel
            .call::<(), _>(|| Err(DebuggerError::NoProcess))
            .unwrap_err();
        assert!(matches!(err, DebuggerError::NoProcess));
    }
}
