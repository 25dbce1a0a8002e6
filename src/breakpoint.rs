//! Software breakpoints and the breakpoint table.
//!
//! A [`Breakpoint`] records a program counter and the original instruction
//! bytes captured at insertion time. The table's bulk operations keep the
//! two invariants the engine relies on: while the debuggee runs, every
//! listed pc holds the breakpoint instruction ([`BreakpointTable::install_all`]);
//! at rest, every listed pc holds the original bytes
//! ([`BreakpointTable::lift_all`]).

use std::collections::HashMap;

use nix::unistd::Pid;
use tracing::trace;

use crate::arch::{Architecture, MAX_BREAKPOINT_SIZE};
use crate::errors::{DebuggerError, Result};
use crate::trace::TraceChannel;

#[derive(Debug, Clone, Copy)]
pub struct Breakpoint {
    pc: u64,
    orig_instr: [u8; MAX_BREAKPOINT_SIZE],
}

impl Breakpoint {
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// The saved original bytes, trimmed to the architecture's breakpoint
    /// instruction length.
    pub fn orig_bytes(&self, arch: &Architecture) -> &[u8] {
        &self.orig_instr[..arch.breakpoint_size]
    }
}

#[derive(Debug, Default)]
pub struct BreakpointTable {
    inner: HashMap<u64, Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a breakpoint whose original bytes were peeked from the
    /// debuggee's unpatched memory.
    pub fn add(&mut self, pc: u64, orig: &[u8]) -> Result<()> {
        if self.inner.contains_key(&pc) {
            return Err(DebuggerError::DuplicateBreakpoint(pc));
        }
        let mut orig_instr = [0u8; MAX_BREAKPOINT_SIZE];
        orig_instr[..orig.len()].copy_from_slice(orig);
        self.inner.insert(pc, Breakpoint { pc, orig_instr });
        Ok(())
    }

    pub fn remove(&mut self, pc: u64) -> Result<Breakpoint> {
        self.inner
            .remove(&pc)
            .ok_or(DebuggerError::BreakpointNotFound(pc))
    }

    pub fn contains(&self, pc: u64) -> bool {
        self.inner.contains_key(&pc)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Patches the breakpoint instruction into target memory at every
    /// entry. Must run immediately before every continue. The first failed
    /// poke aborts the batch.
    pub fn install_all(
        &self,
        channel: &TraceChannel,
        pid: Pid,
        arch: &Architecture,
    ) -> Result<()> {
        for pc in self.inner.keys() {
            trace!("installing breakpoint at {pc:#x}");
            channel.poke(pid, *pc, arch.breakpoint_bytes().to_vec())?;
        }
        Ok(())
    }

    /// Restores the original bytes at every entry. Must run immediately
    /// after each stop. The first failed poke aborts the batch.
    pub fn lift_all(&self, channel: &TraceChannel, pid: Pid, arch: &Architecture) -> Result<()> {
        for (pc, bp) in &self.inner {
            trace!("lifting breakpoint at {pc:#x}");
            channel.poke(pid, *pc, bp.orig_bytes(arch).to_vec())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arch;

    #[test]
    fn test_add_rejects_duplicates() {
        let mut table = BreakpointTable::new();
        table.add(0x401000, &[0x55]).unwrap();
        assert!(matches!(
            table.add(0x401000, &[0x55]),
            Err(DebuggerError::DuplicateBreakpoint(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_missing() {
        let mut table = BreakpointTable::new();
        assert!(matches!(
            table.remove(0x1),
            Err(DebuggerError::BreakpointNotFound(_))
        ));
    }

    #[test]
    fn test_orig_bytes_trimmed_to_arch() {
        let mut table = BreakpointTable::new();
        table.add(0x401000, &[0x55, 0x48, 0x89, 0xe5]).unwrap();
        let bp = table.remove(0x401000).unwrap();
        assert_eq!(bp.orig_bytes(&arch::AMD64), &[0x55]);
        assert_eq!(bp.orig_bytes(&arch::ARM), &[0x55, 0x48, 0x89, 0xe5]);
        assert_eq!(bp.pc(), 0x401000);
    }
}
