//! The debug engine.
//!
//! [`Debugger`] owns everything mutable: the trace channel, the optional
//! live debuggee, the breakpoint table, and the auxiliary file table. The
//! load-time state (architecture, DWARF data, symbol table) is immutable
//! after construction. One engine instance drives one debuggee at a time.

use std::path::{Path, PathBuf};

use nix::sys::ptrace::Options;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use regex::Regex;
use tracing::{debug, info, trace, warn};

use crate::arch::Architecture;
use crate::breakpoint::BreakpointTable;
use crate::dbginfo::DebugData;
use crate::debuggee::Debuggee;
use crate::errors::{DebuggerError, Result};
use crate::eval::{self, Expr};
use crate::files::FileTable;
use crate::frames::{self, Frame};
use crate::load::{load_executable, LoadedExecutable};
use crate::protocol::Status;
use crate::symbols::SymbolTable;
use crate::trace::TraceChannel;

pub struct Debugger {
    executable: PathBuf,
    arch: Architecture,
    debug: DebugData,
    symbols: SymbolTable,
    channel: TraceChannel,
    breakpoints: BreakpointTable,
    files: FileTable,
    debuggee: Option<Debuggee>,
}

impl Debugger {
    /// Parses the executable and builds an engine ready to serve requests
    /// about it. Also spawns the tracer thread.
    pub fn build(executable: impl AsRef<Path>) -> Result<Self> {
        let executable = executable.as_ref().to_path_buf();
        let LoadedExecutable {
            arch,
            debug,
            symbols,
        } = load_executable(&executable)?;
        let channel = TraceChannel::build()?;

        Ok(Debugger {
            executable,
            arch,
            debug,
            symbols,
            channel,
            breakpoints: BreakpointTable::new(),
            files: FileTable::new(),
            debuggee: None,
        })
    }

    /// Starts (or restarts) the debuggee. A prior process is killed and
    /// its stop state discarded; breakpoints stay in the table.
    pub fn run(&mut self) -> Result<()> {
        if let Some(old) = self.debuggee.take() {
            info!("killing previous debuggee {}", old.pid);
            if let Err(e) = old.kill(&self.channel) {
                warn!("could not kill previous debuggee: {e}");
            }
        }
        let dbge = Debuggee::launch(&self.channel, &self.executable)?;
        self.debuggee = Some(dbge);
        Ok(())
    }

    /// Resumes the debuggee until the next breakpoint trap and reports
    /// where it stopped.
    ///
    /// The first resume consumes the exec trap and enables clone tracing.
    /// If the debuggee sits on one of our breakpoints, the original
    /// instruction is single-stepped first. Then: install all breakpoints,
    /// continue, wait for a trap from any task, lift all breakpoints, and
    /// rewind the program counter over the trap instruction so the
    /// original instruction re-executes on the next resume.
    pub fn resume(&mut self) -> Result<Status> {
        let dbge = self.debuggee.as_mut().ok_or(DebuggerError::NoProcess)?;

        if !dbge.proc_is_up {
            wait_for_trap(&self.channel, Some(dbge.stopped_pid))?;
            self.channel
                .set_options(dbge.stopped_pid, Options::PTRACE_O_TRACECLONE)?;
            dbge.proc_is_up = true;
            debug!("debuggee {} is up", dbge.pid);
        } else if dbge.pc().is_some_and(|pc| self.breakpoints.contains(pc)) {
            trace!("stopped on an own breakpoint, stepping over it");
            self.channel.single_step(dbge.stopped_pid)?;
            wait_for_trap(&self.channel, Some(dbge.stopped_pid))?;
        }

        self.breakpoints
            .install_all(&self.channel, dbge.stopped_pid, &self.arch)?;
        self.channel.cont(dbge.stopped_pid, None)?;

        dbge.stopped_pid = wait_for_trap(&self.channel, None)?;

        self.breakpoints
            .lift_all(&self.channel, dbge.stopped_pid, &self.arch)?;

        let mut regs = self.channel.get_regs(dbge.stopped_pid)?;
        regs.rip -= self.arch.breakpoint_size as u64;
        self.channel.set_regs(dbge.stopped_pid, regs)?;
        dbge.stopped_regs = Some(regs);

        debug!("stopped at pc {:#x}", regs.rip);
        Ok(Status {
            pc: regs.rip,
            sp: regs.rsp,
        })
    }

    /// Evaluates `expr` to one or more program counters and inserts a
    /// breakpoint at each, capturing the original instruction bytes.
    pub fn breakpoint(&mut self, expr: &str) -> Result<()> {
        let dbge = self.debuggee.as_ref().ok_or(DebuggerError::NoProcess)?;

        for pc in self.eval_breakpoint_addrs(expr)? {
            if self.breakpoints.contains(pc) {
                return Err(DebuggerError::DuplicateBreakpoint(pc));
            }
            let orig = self
                .channel
                .peek(dbge.stopped_pid, pc, self.arch.breakpoint_size)?;
            self.breakpoints.add(pc, &orig)?;
            info!("breakpoint set at {pc:#x}");
        }
        Ok(())
    }

    /// Evaluates `expr` like [`Self::breakpoint`] and removes the table
    /// entry for each resolved address. The debuggee is stopped whenever
    /// this runs, so the code bytes already hold the original
    /// instructions and no poke is needed.
    pub fn delete_breakpoints(&mut self, expr: &str) -> Result<()> {
        self.debuggee.as_ref().ok_or(DebuggerError::NoProcess)?;

        for pc in self.eval_breakpoint_addrs(expr)? {
            self.breakpoints.remove(pc)?;
            info!("breakpoint removed at {pc:#x}");
        }
        Ok(())
    }

    /// Resolves a breakpoint expression to program counters. Regex and
    /// symbol forms go through [`Self::eval_address`]; `src:` and bare
    /// numeric forms already name a pc directly (for `src:` the line
    /// table must cover it).
    fn eval_breakpoint_addrs(&self, expr: &str) -> Result<Vec<u64>> {
        match eval::parse(expr)? {
            Expr::Regex(re) => {
                let re = Regex::new(re)?;
                self.symbols
                    .match_symbols(&re)
                    .iter()
                    .map(|name| self.eval_address(name))
                    .collect()
            }
            Expr::Symbol(name) => Ok(vec![self.eval_address(name)?]),
            Expr::Source(pc) => {
                self.debug
                    .find_location(pc)?
                    .ok_or(DebuggerError::NoLineData(pc))?;
                Ok(vec![pc])
            }
            Expr::Address(pc) => Ok(vec![pc]),
        }
    }

    /// Evaluates an expression against the symbol and line tables.
    pub fn eval(&self, expr: &str) -> Result<Vec<String>> {
        match eval::parse(expr)? {
            Expr::Regex(re) => {
                let re = Regex::new(re)?;
                Ok(self.symbols.match_symbols(&re))
            }
            Expr::Symbol(name) => {
                let addr = self.symbols.sym_to_addr(name)?;
                Ok(vec![format!("{addr:#x}")])
            }
            Expr::Source(pc) => {
                let (file, line) = self
                    .debug
                    .find_location(pc)?
                    .ok_or(DebuggerError::NoLineData(pc))?;
                Ok(vec![format!("{file}:{line}")])
            }
            Expr::Address(pc) => Ok(vec![self.symbols.addr_to_sym(pc)?.to_string()]),
        }
    }

    /// Narrow address evaluation for the breakpoint path: a symbol name,
    /// or a base-prefixed unsigned integer.
    fn eval_address(&self, expr: &str) -> Result<u64> {
        if let Ok(addr) = self.symbols.sym_to_addr(expr) {
            return Ok(addr);
        }
        eval::parse_uint(expr).map_err(|_| DebuggerError::NotAnAddress(expr.to_string()))
    }

    /// Reports the innermost frame. Only `count == 1` is supported.
    pub fn frames(&self, count: usize) -> Result<Vec<Frame>> {
        let dbge = self.debuggee.as_ref().ok_or(DebuggerError::NoProcess)?;
        if count != 1 {
            return Err(DebuggerError::Unimplemented("frame counts other than 1"));
        }

        let regs = self.channel.get_regs(dbge.stopped_pid)?;
        // at a function entry the return address is the only thing pushed
        let fp = regs.rsp + self.arch.pointer_size as u64;
        let frame = frames::walk_entry_frame(
            &self.debug,
            &self.arch,
            &self.channel,
            dbge.stopped_pid,
            regs.rip,
            fp,
        )?;
        Ok(vec![frame])
    }

    pub fn open_file(&mut self, name: &str, mode: &str) -> Result<usize> {
        self.files.open(name, mode)
    }

    pub fn read_file_at(&self, fd: usize, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.files.read_at(fd, offset, len)
    }

    pub fn close_file(&mut self, fd: usize) -> Result<()> {
        self.files.close(fd)
    }

    /// Kills a still-running debuggee, if any.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(dbge) = self.debuggee.take() {
            dbge.kill(&self.channel)?;
        }
        Ok(())
    }
}

/// Waits until `pid` (or any task, for `None`) delivers a SIGTRAP that is
/// not a clone event. Clone-event stops and other signals are continued
/// transparently; debuggee exit surfaces as an error.
fn wait_for_trap(channel: &TraceChannel, pid: Option<Pid>) -> Result<Pid> {
    loop {
        match channel.wait(pid)? {
            WaitStatus::Stopped(wpid, Signal::SIGTRAP) => return Ok(wpid),
            WaitStatus::PtraceEvent(wpid, _, event)
                if event == nix::libc::PTRACE_EVENT_CLONE =>
            {
                trace!("clone event from {wpid}, continuing");
                channel.cont(wpid, None)?;
            }
            WaitStatus::PtraceEvent(wpid, _, event) => {
                trace!("ptrace event {event} from {wpid}, continuing");
                channel.cont(wpid, None)?;
            }
            WaitStatus::Stopped(wpid, sig) => {
                trace!("stop with {sig} from {wpid}, continuing");
                channel.cont(wpid, None)?;
            }
            WaitStatus::Exited(wpid, code) => {
                debug!("debuggee task {wpid} exited with {code}");
                return Err(DebuggerError::ProcessExited(code));
            }
            WaitStatus::Signaled(wpid, sig, _) => {
                debug!("debuggee task {wpid} terminated by {sig}");
                return Err(DebuggerError::ProcessExited(-1));
            }
            other => {
                trace!("ignoring wait status {other:?}");
            }
        }
    }
}
