//! Executable loading: format sniffing, architecture selection, and
//! extraction of the DWARF tree and symbol table.

use std::path::Path;

use object::Object;
use tracing::{debug, info};

use crate::arch::{self, Architecture};
use crate::dbginfo::DebugData;
use crate::errors::{DebuggerError, Result};
use crate::symbols::SymbolTable;

pub struct LoadedExecutable {
    pub arch: Architecture,
    pub debug: DebugData,
    pub symbols: SymbolTable,
}

/// Parses the executable and builds the immutable load-time state.
///
/// Format sniffing is delegated to [`object::File::parse`]; any input it
/// cannot recognize maps to [`DebuggerError::UnknownFormat`]. Architecture
/// selection uses the machine field of the object header.
pub fn load_executable(path: impl AsRef<Path>) -> Result<LoadedExecutable> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let object_info = object::File::parse(&*data).map_err(|e| {
        debug!("could not sniff object format: {e}");
        DebuggerError::UnknownFormat
    })?;

    let arch = match object_info.architecture() {
        object::Architecture::I386 => arch::X86,
        object::Architecture::X86_64 => arch::AMD64,
        object::Architecture::Arm => arch::ARM,
        other => {
            debug!("unsupported machine: {other:?}");
            return Err(DebuggerError::UnsupportedArchitecture);
        }
    };

    let debug = DebugData::build(&object_info)?;
    let symbols = SymbolTable::build(&object_info)?;

    info!(
        "loaded {} ({:?}, pointer size {})",
        path.display(),
        object_info.architecture(),
        arch.pointer_size
    );

    Ok(LoadedExecutable {
        arch,
        debug,
        symbols,
    })
}
