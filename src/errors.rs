//! # Error Types
//!
//! Defines error types and a result alias used throughout the [crate].
//!
//! All fallible operations of the engine return [`DebuggerError`] through
//! the [`Result`] alias. The error is serializable so the server can send
//! it back over the wire as `{error_type, message}`.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Type alias for Results returned by spyglass functions
pub type Result<T> = std::result::Result<T, DebuggerError>;

/// Comprehensive error type for the debugger engine
///
/// Groups usage errors (bad requests), debug-info errors (missing or
/// unusable symbol data), trace errors (ptrace and wait failures, by
/// operation), and host IO/parsing errors.
#[derive(Error, Debug)]
pub enum DebuggerError {
    // ---- usage errors -----------------------------------------------------
    #[error("bad open mode {0:?}")]
    BadMode(String),
    #[error("bad file descriptor {0}")]
    BadFd(usize),
    #[error("bad expression syntax: {0:?}")]
    BadExpression(String),
    #[error("{0:?} is neither symbol nor number")]
    NotAnAddress(String),
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
    #[error("breakpoint already set at {0:#x}")]
    DuplicateBreakpoint(u64),
    #[error("no breakpoint at {0:#x}")]
    BreakpointNotFound(u64),
    #[error("run did not successfully start a process")]
    NoProcess,

    // ---- debug info errors ------------------------------------------------
    #[error("unrecognized object architecture")]
    UnsupportedArchitecture,
    #[error("unrecognized binary format")]
    UnknownFormat,
    #[error("executable carries no debug information")]
    DebugInfoUnavailable,
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("no symbol at address {0:#x}")]
    NoSymbolAtAddress(u64),
    #[error("no pc/line data for address {0:#x}")]
    NoLineData(u64),
    #[error("the stop address is not inside a known function")]
    NotInFunction,
    #[error("unsupported location expression")]
    UnsupportedLocation,
    #[error("formal parameter has children, expected none")]
    ParameterHasChildren,
    #[error("no location for formal parameter")]
    ParameterWithoutLocation,

    // ---- trace errors -----------------------------------------------------
    #[error("ptrace peek: {0}")]
    Peek(nix::Error),
    #[error("ptrace poke: {0}")]
    Poke(nix::Error),
    #[error("ptrace cont: {0}")]
    Continue(nix::Error),
    #[error("ptrace single step: {0}")]
    Step(nix::Error),
    #[error("ptrace set options: {0}")]
    SetOptions(nix::Error),
    #[error("ptrace get regs: {0}")]
    GetRegs(nix::Error),
    #[error("ptrace set regs: {0}")]
    SetRegs(nix::Error),
    #[error("wait: {0}")]
    Wait(nix::Error),
    #[error("could not spawn debuggee: {0}")]
    Spawn(nix::Error),
    #[error("could not kill debuggee: {0}")]
    Kill(nix::Error),
    #[error("debuggee exited with code {0}")]
    ProcessExited(i32),
    #[error("tracer thread is gone")]
    TracerGone,

    // ---- host io and parsing ----------------------------------------------
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error while reading information from the executable file: {0}")]
    Object(#[from] object::Error),
    #[error("error while working with the DWARF debug information: {0}")]
    Dwarf(#[from] gimli::Error),
    #[error("could not compile regular expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("could not parse integer: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("could not convert to CString: {0}")]
    CStringConv(#[from] std::ffi::NulError),
    #[error("working with JSON failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SerializableError {
    error_type: String,
    message: String,
}

impl Serialize for DebuggerError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let error_type = match self {
            DebuggerError::BadMode(_) => "BadMode",
            DebuggerError::BadFd(_) => "BadFd",
            DebuggerError::BadExpression(_) => "BadExpression",
            DebuggerError::NotAnAddress(_) => "NotAnAddress",
            DebuggerError::Unimplemented(_) => "Unimplemented",
            DebuggerError::DuplicateBreakpoint(_) => "DuplicateBreakpoint",
            DebuggerError::BreakpointNotFound(_) => "BreakpointNotFound",
            DebuggerError::NoProcess => "NoProcess",
            DebuggerError::UnsupportedArchitecture => "UnsupportedArchitecture",
            DebuggerError::UnknownFormat => "UnknownFormat",
            DebuggerError::DebugInfoUnavailable => "DebugInfoUnavailable",
            DebuggerError::SymbolNotFound(_) => "SymbolNotFound",
            DebuggerError::NoSymbolAtAddress(_) => "NoSymbolAtAddress",
            DebuggerError::NoLineData(_) => "NoLineData",
            DebuggerError::NotInFunction => "NotInFunction",
            DebuggerError::UnsupportedLocation => "UnsupportedLocation",
            DebuggerError::ParameterHasChildren => "ParameterHasChildren",
            DebuggerError::ParameterWithoutLocation => "ParameterWithoutLocation",
            DebuggerError::Peek(_) => "PeekFailed",
            DebuggerError::Poke(_) => "PokeFailed",
            DebuggerError::Continue(_) => "ContinueFailed",
            DebuggerError::Step(_) => "StepFailed",
            DebuggerError::SetOptions(_) => "SetOptionsFailed",
            DebuggerError::GetRegs(_) => "GetRegsFailed",
            DebuggerError::SetRegs(_) => "SetRegsFailed",
            DebuggerError::Wait(_) => "WaitFailed",
            DebuggerError::Spawn(_) => "SpawnFailed",
            DebuggerError::Kill(_) => "KillFailed",
            DebuggerError::ProcessExited(_) => "ProcessExited",
            DebuggerError::TracerGone => "TracerGone",
            DebuggerError::Io(_) => "IO",
            DebuggerError::Object(_) => "Object",
            DebuggerError::Dwarf(_) => "DWARF",
            DebuggerError::Regex(_) => "Regex",
            DebuggerError::ParseInt(_) => "ParseInt",
            DebuggerError::CStringConv(_) => "CStringConversion",
            DebuggerError::Json(_) => "Json",
        };

        SerializableError {
            error_type: error_type.to_string(),
            message: self.to_string(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_serialization_shape() {
        let err = DebuggerError::DuplicateBreakpoint(0x401000);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error_type"], "DuplicateBreakpoint");
        assert_eq!(json["message"], "breakpoint already set at 0x401000");
    }

    #[test]
    fn test_usage_error_messages() {
        assert_eq!(
            DebuggerError::BadMode("rwx".into()).to_string(),
            "bad open mode \"rwx\""
        );
        assert_eq!(DebuggerError::BadFd(7).to_string(), "bad file descriptor 7");
    }
}
