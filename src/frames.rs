//! Innermost-frame inspection.
//!
//! The walker assumes the debuggee is stopped at a function entry point,
//! so the frame pointer is `sp + pointer_size`. It locates the subprogram
//! entry for the current pc, iterates its formal-parameter children,
//! decodes each parameter's location as a constant offset from the frame
//! pointer, and reads the value for built-in signed integers of exactly
//! the architecture's int width. Deeper frames would need call-frame
//! unwinding and are not supported here.

use gimli::{AttributeValue, EndianSlice, LittleEndian, Reader};
use nix::unistd::Pid;
use serde::Serialize;
use std::fmt::Display;
use tracing::trace;

use crate::arch::Architecture;
use crate::dbginfo::DebugData;
use crate::errors::{DebuggerError, Result};
use crate::trace::TraceChannel;

/// One stack frame, innermost only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Frame {
    pub params: Vec<FrameParam>,
}

/// A formal parameter of the frame's function.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameParam {
    pub name: Option<String>,
    /// Constant offset from the frame pointer, when the location decoded.
    pub offset: Option<i64>,
    pub type_name: Option<String>,
    /// Decoded integer value, rendered in hex, when the type qualified.
    pub value: Option<String>,
}

impl Display for FrameParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(offset) = self.offset {
            write!(f, "({offset}(FP))")?;
        }
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if let Some(type_name) = &self.type_name {
            write!(f, "[{type_name}]")?;
        }
        if let Some(value) = &self.value {
            write!(f, "=={value}")?;
        }
        Ok(())
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for param in &self.params {
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

/// Walks the formal parameters of the function containing `pc`, with the
/// frame pointer already computed by the caller.
pub(crate) fn walk_entry_frame(
    debug: &DebugData,
    arch: &Architecture,
    channel: &TraceChannel,
    pid: Pid,
    pc: u64,
    fp: u64,
) -> Result<Frame> {
    let (unit, offset) = debug.entry_for_pc(pc)?;
    let mut frame = Frame::default();

    let mut tree = unit.entries_tree(Some(offset))?;
    let root = tree.root()?;
    let mut children = root.children();
    while let Some(node) = children.next()? {
        let entry = node.entry();
        if entry.tag() != gimli::DW_TAG_formal_parameter {
            continue;
        }
        if entry.has_children() {
            return Err(DebuggerError::ParameterHasChildren);
        }

        let mut param = FrameParam::default();
        let mut type_offset = None;
        let mut attrs = entry.attrs();
        while let Some(attr) = attrs.next()? {
            match attr.name() {
                gimli::DW_AT_location => {
                    if let AttributeValue::Exprloc(expr) = attr.value() {
                        let bytes = expr.0.to_slice()?;
                        param.offset = Some(eval_location(&bytes)?);
                    }
                }
                gimli::DW_AT_name => {
                    param.name = Some(debug.attr_string(&unit, attr.value())?);
                }
                gimli::DW_AT_type => {
                    if let AttributeValue::UnitRef(offset) = attr.value() {
                        type_offset = Some(offset);
                    }
                }
                _ => {}
            }
        }

        if let Some(type_offset) = type_offset {
            let type_info = debug.type_at(&unit, type_offset)?;
            param.type_name = type_info.name.clone();
            if type_info.signed && type_info.byte_size == Some(arch.int_size as u64) {
                let offset = param.offset.ok_or(DebuggerError::ParameterWithoutLocation)?;
                let location = fp.wrapping_add_signed(offset);
                let bytes = channel.peek(pid, location, arch.int_size)?;
                param.value = Some(format!("{:#x}", arch.int(&bytes)));
            }
        }

        trace!("frame parameter: {param}");
        frame.params.push(param);
    }

    Ok(frame)
}

/// Evaluates the narrow location-expression dialect the walker supports:
/// a constant offset from the frame base. Everything else is rejected.
pub(crate) fn eval_location(bytes: &[u8]) -> Result<i64> {
    let mut reader = EndianSlice::new(bytes, LittleEndian);
    let opcode = match reader.read_u8() {
        Ok(op) => op,
        Err(_) => return Ok(0),
    };

    if opcode == gimli::DW_OP_fbreg.0 {
        let offset = reader.read_sleb128()?;
        if reader.is_empty() {
            return Ok(offset);
        }
        return Err(DebuggerError::UnsupportedLocation);
    }

    if opcode == gimli::DW_OP_call_frame_cfa.0 {
        if reader.is_empty() {
            return Ok(0);
        }
        let next = reader.read_u8()?;
        if next == gimli::DW_OP_consts.0 {
            let offset = reader.read_sleb128()?;
            if reader.read_u8()? == gimli::DW_OP_plus.0 && reader.is_empty() {
                return Ok(offset);
            }
        } else if next == gimli::DW_OP_plus_uconst.0 {
            let offset = reader.read_uleb128()?;
            if reader.is_empty() {
                return Ok(offset as i64);
            }
        }
        return Err(DebuggerError::UnsupportedLocation);
    }

    Err(DebuggerError::UnsupportedLocation)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_eval_location_fbreg() {
        // DW_OP_fbreg 8
        assert_eq!(eval_location(&[0x91, 0x08]).unwrap(), 8);
        // DW_OP_fbreg -16 (sleb128: 0x70)
        assert_eq!(eval_location(&[0x91, 0x70]).unwrap(), -16);
    }

    #[test]
    fn test_eval_location_cfa_forms() {
        // bare DW_OP_call_frame_cfa
        assert_eq!(eval_location(&[0x9c]).unwrap(), 0);
        // DW_OP_call_frame_cfa, DW_OP_consts 16, DW_OP_plus
        assert_eq!(eval_location(&[0x9c, 0x11, 0x10, 0x22]).unwrap(), 16);
        // DW_OP_call_frame_cfa, DW_OP_plus_uconst 24
        assert_eq!(eval_location(&[0x9c, 0x23, 0x18]).unwrap(), 24);
    }

    #[test]
    fn test_eval_location_rejects_general_expressions() {
        // DW_OP_addr <8 bytes> is not a constant frame offset
        let expr = [0x03, 0, 0x10, 0x40, 0, 0, 0, 0, 0];
        assert!(matches!(
            eval_location(&expr),
            Err(DebuggerError::UnsupportedLocation)
        ));
        // trailing garbage after fbreg
        assert!(matches!(
            eval_location(&[0x91, 0x08, 0x22]),
            Err(DebuggerError::UnsupportedLocation)
        ));
    }

    #[test]
    fn test_eval_location_empty_is_zero() {
        assert_eq!(eval_location(&[]).unwrap(), 0);
    }

    #[test]
    fn test_param_display() {
        let param = FrameParam {
            name: Some("x".into()),
            offset: Some(8),
            type_name: Some("int".into()),
            value: Some("0x2a".into()),
        };
        assert_eq!(param.to_string(), "(8(FP)) x[int]==0x2a");
    }
}
