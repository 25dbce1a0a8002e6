//! Request dispatch over the engine.
//!
//! [`Server`] wraps the engine in a mutex and serializes handlers: each
//! request holds the lock for its whole duration, including the blocking
//! wait inside `Resume`. [`Server::serve`] is the line-delimited JSON
//! loop; `handle` is usable directly over any other transport.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use tracing::{debug, error};

use crate::debugger::Debugger;
use crate::errors::Result;
use crate::protocol::{Request, Response};

pub struct Server {
    engine: Mutex<Debugger>,
}

impl Server {
    pub fn new(engine: Debugger) -> Self {
        Server {
            engine: Mutex::new(engine),
        }
    }

    /// Handles one request. Errors become [`Response::Error`]; the
    /// connection stays usable.
    pub fn handle(&self, request: Request) -> Response {
        debug!("request: {request:?}");
        let mut engine = match self.engine.lock() {
            Ok(engine) => engine,
            Err(poisoned) => poisoned.into_inner(),
        };

        let result = match request {
            Request::Open { name, mode } => engine.open_file(&name, &mode).map(|_| Response::Ok),
            Request::ReadAt { fd, offset, len } => engine
                .read_file_at(fd, offset, len)
                .map(|data| Response::Data { data }),
            Request::Close { fd } => engine.close_file(fd).map(|()| Response::Ok),
            Request::Run => engine.run().map(|()| Response::Ok),
            Request::Resume => engine.resume().map(|status| Response::Status { status }),
            Request::Breakpoint { address } => {
                engine.breakpoint(&address).map(|()| Response::Ok)
            }
            Request::DeleteBreakpoints { address } => {
                engine.delete_breakpoints(&address).map(|()| Response::Ok)
            }
            Request::Eval { expr } => engine.eval(&expr).map(|result| Response::Result { result }),
            Request::Frames { count } => {
                engine.frames(count).map(|frames| Response::Frames { frames })
            }
        };

        result.unwrap_or_else(|e| {
            error!("{e}");
            Response::Error { error: e }
        })
    }

    /// Kills a still-running debuggee, if any.
    pub fn cleanup(&self) -> Result<()> {
        let mut engine = match self.engine.lock() {
            Ok(engine) => engine,
            Err(poisoned) => poisoned.into_inner(),
        };
        engine.cleanup()
    }

    /// Reads line-delimited JSON requests until end of input, writing one
    /// JSON response per line.
    pub fn serve(&self, reader: impl BufRead, mut writer: impl Write) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.handle(request),
                Err(e) => {
                    error!("unparseable request: {e}");
                    Response::Error { error: e.into() }
                }
            };
            serde_json::to_writer(&mut writer, &response)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        Ok(())
    }
}
