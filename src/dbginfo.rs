//! DWARF debug information access.
//!
//! [`DebugData`] owns the parsed DWARF tree and an [`addr2line`] context
//! built from the same sections. Section bytes are copied into `Arc`
//! slices at load time, so the data is immutable and independent of the
//! executable file afterwards.

use std::sync::Arc;

use gimli::{AttributeValue, Reader, RunTimeEndian, Unit, UnitOffset};
use object::{Object, ObjectSection};
use tracing::debug;

use crate::errors::{DebuggerError, Result};

/// The gimli reader used throughout the crate.
pub(crate) type DwarfReader = gimli::EndianArcSlice<RunTimeEndian>;

pub struct DebugData {
    pub(crate) dwarf: gimli::Dwarf<DwarfReader>,
    linedata: addr2line::Context<DwarfReader>,
}

/// What the frame walker needs to know about a parameter's type.
pub(crate) struct TypeInfo {
    pub name: Option<String>,
    pub byte_size: Option<u64>,
    pub signed: bool,
}

fn load_section(
    object_info: &object::File<'_>,
    endian: RunTimeEndian,
    section: gimli::SectionId,
) -> Result<DwarfReader> {
    let data = object_info
        .section_by_name(section.name())
        .and_then(|s| s.uncompressed_data().ok())
        .unwrap_or_default();
    Ok(DwarfReader::new(Arc::from(data.as_ref()), endian))
}

impl DebugData {
    pub fn build(object_info: &object::File<'_>) -> Result<Self> {
        let has_debug_info = object_info
            .section_by_name(".debug_info")
            .and_then(|s| s.uncompressed_data().ok())
            .is_some_and(|d| !d.is_empty());
        if !has_debug_info {
            return Err(DebuggerError::DebugInfoUnavailable);
        }

        let endian = if object_info.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let dwarf = gimli::Dwarf::load(|section| load_section(object_info, endian, section))?;
        let for_lines = gimli::Dwarf::load(|section| load_section(object_info, endian, section))?;
        let linedata = addr2line::Context::from_dwarf(for_lines)?;

        Ok(DebugData { dwarf, linedata })
    }

    /// Maps a program counter to its source file and line, if the line
    /// table covers it.
    pub fn find_location(&self, pc: u64) -> Result<Option<(String, u32)>> {
        let location = self.linedata.find_location(pc)?;
        Ok(location.and_then(|loc| match (loc.file, loc.line) {
            (Some(file), Some(line)) => Some((file.to_string(), line)),
            _ => None,
        }))
    }

    /// Finds the subprogram entry whose pc range contains `pc` and returns
    /// its unit together with the entry's offset inside that unit.
    pub fn entry_for_pc(&self, pc: u64) -> Result<(Unit<DwarfReader>, UnitOffset)> {
        let mut units = self.dwarf.units();
        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            let mut found: Option<UnitOffset> = None;
            {
                let mut entries = unit.entries();
                while let Some((_, entry)) = entries.next_dfs()? {
                    if entry.tag() != gimli::DW_TAG_subprogram {
                        continue;
                    }
                    let low = match entry.attr_value(gimli::DW_AT_low_pc)? {
                        Some(value) => self.dwarf.attr_address(&unit, value)?,
                        None => None,
                    };
                    let Some(low) = low else { continue };
                    let high = match entry.attr_value(gimli::DW_AT_high_pc)? {
                        Some(AttributeValue::Udata(offset)) => Some(low + offset),
                        Some(value) => self.dwarf.attr_address(&unit, value)?,
                        None => None,
                    };
                    let Some(high) = high else { continue };
                    if low <= pc && pc < high {
                        found = Some(entry.offset());
                        break;
                    }
                }
            }
            if let Some(offset) = found {
                return Ok((unit, offset));
            }
        }
        debug!("no subprogram entry covers {pc:#x}");
        Err(DebuggerError::NotInFunction)
    }

    pub(crate) fn attr_string(
        &self,
        unit: &Unit<DwarfReader>,
        value: AttributeValue<DwarfReader>,
    ) -> Result<String> {
        Ok(self
            .dwarf
            .attr_string(unit, value)?
            .to_string_lossy()?
            .to_string())
    }

    /// Reads name, size, and signedness of the type entry at `offset`.
    pub(crate) fn type_at(
        &self,
        unit: &Unit<DwarfReader>,
        offset: UnitOffset,
    ) -> Result<TypeInfo> {
        let entry = unit.entry(offset)?;
        let name = match entry.attr_value(gimli::DW_AT_name)? {
            Some(value) => Some(self.attr_string(unit, value)?),
            None => None,
        };
        let byte_size = entry
            .attr_value(gimli::DW_AT_byte_size)?
            .and_then(|v| v.udata_value());
        let signed = entry.tag() == gimli::DW_TAG_base_type
            && match entry.attr_value(gimli::DW_AT_encoding)? {
                Some(AttributeValue::Encoding(encoding)) => encoding == gimli::DW_ATE_signed,
                _ => false,
            };
        Ok(TypeInfo {
            name,
            byte_size,
            signed,
        })
    }
}
