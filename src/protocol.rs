//! Wire types for the request/response surface.
//!
//! Requests arrive as externally-tagged JSON values, one per line, e.g.
//! `{"Breakpoint":{"address":"sym:main.foo"}}` or `"Run"`. Responses
//! mirror the shape: `{"Status":{"status":{"pc":…,"sp":…}}}`, `"Ok"`, or
//! `{"Error":{"error":{"error_type":…,"message":…}}}`.

use serde::{Deserialize, Serialize};

use crate::errors::DebuggerError;
use crate::frames::Frame;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Open a file on the debugger host. Mode is `r`, `w`, or `rw`.
    Open { name: String, mode: String },
    /// Read up to `len` bytes at `offset` from an open slot.
    ReadAt { fd: usize, offset: u64, len: usize },
    /// Close a slot. The index is reusable afterwards.
    Close { fd: usize },
    /// Start or restart the debuggee.
    Run,
    /// Continue until the next breakpoint trap.
    Resume,
    /// Set breakpoints at every address the expression resolves to.
    Breakpoint { address: String },
    /// Remove the breakpoints the expression resolves to.
    DeleteBreakpoints { address: String },
    /// Evaluate an expression against the symbol and line tables.
    Eval { expr: String },
    /// Report stack frames; only `count == 1` is supported.
    Frames { count: usize },
}

#[derive(Debug, Serialize)]
pub enum Response {
    Ok,
    Data { data: Vec<u8> },
    Status { status: Status },
    Result { result: Vec<String> },
    Frames { frames: Vec<Frame> },
    Error { error: DebuggerError },
}

/// Where the debuggee stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Status {
    pub pc: u64,
    pub sp: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let req: Request = serde_json::from_str(r#"{"Open":{"name":"/etc/hostname","mode":"r"}}"#)
            .unwrap();
        assert!(matches!(req, Request::Open { ref name, ref mode } if name == "/etc/hostname" && mode == "r"));

        let req: Request = serde_json::from_str(r#""Run""#).unwrap();
        assert!(matches!(req, Request::Run));

        let req: Request =
            serde_json::from_str(r#"{"Frames":{"count":1}}"#).unwrap();
        assert!(matches!(req, Request::Frames { count: 1 }));
    }

    #[test]
    fn test_response_shapes() {
        let json = serde_json::to_string(&Response::Ok).unwrap();
        assert_eq!(json, r#""Ok""#);

        let json = serde_json::to_value(Response::Status {
            status: Status { pc: 0x401000, sp: 0x7ffe0000 },
        })
        .unwrap();
        assert_eq!(json["Status"]["status"]["pc"], 0x401000);

        let json = serde_json::to_value(Response::Error {
            error: DebuggerError::NoProcess,
        })
        .unwrap();
        assert_eq!(json["Error"]["error"]["error_type"], "NoProcess");
    }
}
