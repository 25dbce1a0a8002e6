//! # Auxiliary File Table
//!
//! A dense, index-addressed table of files open on the debugger host. The
//! controller uses it as a side channel to fetch auxiliary files next to
//! the debuggee. Slots are small non-negative integers handed out
//! first-free-first and reused after a close.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::errors::{DebuggerError, Result};

/// Access mode of an open slot, parsed from `r`, `w`, or `rw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl FromStr for OpenMode {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "rw" => Ok(OpenMode::ReadWrite),
            other => Err(DebuggerError::BadMode(other.to_string())),
        }
    }
}

#[derive(Debug)]
struct OpenFile {
    #[allow(dead_code)]
    mode: OpenMode,
    file: File,
}

/// The table itself. Index == file descriptor as seen by the client.
#[derive(Debug, Default)]
pub struct FileTable {
    slots: Vec<Option<OpenFile>>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a host file and stores it in the first free slot.
    ///
    /// Returns the slot index. The mode string must be one of `r`, `w`,
    /// `rw`; anything else fails [`DebuggerError::BadMode`] before any
    /// host IO happens.
    pub fn open(&mut self, name: impl AsRef<Path>, mode: &str) -> Result<usize> {
        let mode: OpenMode = mode.parse()?;
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true),
            OpenMode::ReadWrite => options.read(true).write(true),
        };
        let file = options.open(name.as_ref())?;

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len());
        let entry = OpenFile { mode, file };
        if index == self.slots.len() {
            self.slots.push(Some(entry));
        } else {
            self.slots[index] = Some(entry);
        }
        debug!("opened {} as fd {index}", name.as_ref().display());
        Ok(index)
    }

    /// Reads up to `len` bytes at `offset`. Short only at end of file.
    pub fn read_at(&self, fd: usize, offset: u64, len: usize) -> Result<Vec<u8>> {
        let entry = self
            .slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(DebuggerError::BadFd(fd))?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = entry.file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Removes the slot. The host file is closed on drop regardless of
    /// outstanding errors.
    pub fn close(&mut self, fd: usize) -> Result<()> {
        let slot = self.slots.get_mut(fd).ok_or(DebuggerError::BadFd(fd))?;
        if slot.is_none() {
            return Err(DebuggerError::BadFd(fd));
        }
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn manifest() -> String {
        format!("{}/Cargo.toml", env!("CARGO_MANIFEST_DIR"))
    }

    #[test]
    fn test_bad_mode() {
        let mut table = FileTable::new();
        assert!(matches!(
            table.open(manifest(), "rx"),
            Err(DebuggerError::BadMode(_))
        ));
    }

    #[test]
    fn test_open_read_close() {
        let mut table = FileTable::new();
        let fd = table.open(manifest(), "r").unwrap();
        assert_eq!(fd, 0);

        let head = table.read_at(fd, 0, 9).unwrap();
        assert_eq!(head, b"[package]");

        let shifted = table.read_at(fd, 1, 8).unwrap();
        assert_eq!(shifted, b"package]");

        table.close(fd).unwrap();
        assert!(matches!(
            table.read_at(fd, 0, 1),
            Err(DebuggerError::BadFd(_))
        ));
        assert!(matches!(table.close(fd), Err(DebuggerError::BadFd(_))));
    }

    #[test]
    fn test_slot_reuse() {
        let mut table = FileTable::new();
        let a = table.open(manifest(), "r").unwrap();
        let b = table.open(manifest(), "r").unwrap();
        assert_eq!((a, b), (0, 1));

        table.close(a).unwrap();
        let c = table.open(manifest(), "r").unwrap();
        assert_eq!(c, 0);
        // the untouched slot keeps working
        assert!(!table.read_at(b, 0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_read_past_eof_is_short() {
        let mut table = FileTable::new();
        let fd = table.open(manifest(), "r").unwrap();
        let len = std::fs::metadata(manifest()).unwrap().len();
        let tail = table.read_at(fd, len.saturating_sub(2), 64).unwrap();
        assert_eq!(tail.len(), 2);
        let past = table.read_at(fd, len + 10, 16).unwrap();
        assert!(past.is_empty());
    }

    #[test]
    fn test_out_of_range_fd() {
        let table = FileTable::new();
        assert!(matches!(
            table.read_at(3, 0, 1),
            Err(DebuggerError::BadFd(3))
        ));
    }
}
