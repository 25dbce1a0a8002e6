//! Symbol table queries.
//!
//! [`SymbolTable`] is built once from the executable's symbol table and is
//! read-only afterwards. It answers the four lookups the engine needs:
//! name to address, address to enclosing function, regex enumeration, and
//! (through [`crate::dbginfo::DebugData`]) address to source line.

use std::collections::HashMap;

use object::{Object, ObjectSymbol, SymbolKind};
use regex::Regex;

use crate::errors::{DebuggerError, Result};

#[derive(Debug, Clone)]
struct FuncRange {
    name: String,
    addr: u64,
    size: u64,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    /// name -> address, over all named symbols (functions and data)
    by_name: HashMap<String, u64>,
    /// insertion order of `by_name` keys, for stable regex enumeration
    order: Vec<String>,
    /// function symbols sorted by address, for pc containment queries
    funcs: Vec<FuncRange>,
}

impl SymbolTable {
    pub fn build(object_info: &object::File<'_>) -> Result<Self> {
        let mut table = SymbolTable::default();
        for sym in object_info.symbols() {
            let Ok(name) = sym.name() else { continue };
            if name.is_empty() {
                continue;
            }
            match sym.kind() {
                SymbolKind::Text | SymbolKind::Data | SymbolKind::Unknown => {}
                _ => continue,
            }
            if !table.by_name.contains_key(name) {
                table.by_name.insert(name.to_string(), sym.address());
                table.order.push(name.to_string());
            }
            if sym.kind() == SymbolKind::Text {
                table.funcs.push(FuncRange {
                    name: name.to_string(),
                    addr: sym.address(),
                    size: sym.size(),
                });
            }
        }
        table.funcs.sort_by_key(|f| f.addr);
        Ok(table)
    }

    /// Resolves a symbol name to its address.
    pub fn sym_to_addr(&self, name: &str) -> Result<u64> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| DebuggerError::SymbolNotFound(name.to_string()))
    }

    /// Returns the name of the function whose range encloses `pc`.
    ///
    /// A function with a zero recorded size extends to the start of the
    /// next function symbol.
    pub fn addr_to_sym(&self, pc: u64) -> Result<&str> {
        let idx = self.funcs.partition_point(|f| f.addr <= pc);
        if idx == 0 {
            return Err(DebuggerError::NoSymbolAtAddress(pc));
        }
        let func = &self.funcs[idx - 1];
        let end = if func.size > 0 {
            func.addr + func.size
        } else {
            self.funcs.get(idx).map_or(u64::MAX, |next| next.addr)
        };
        if pc < end {
            Ok(&func.name)
        } else {
            Err(DebuggerError::NoSymbolAtAddress(pc))
        }
    }

    /// Enumerates every symbol name matching `re`, without duplicates, in
    /// a stable order for a given load.
    pub fn match_symbols(&self, re: &Regex) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| re.is_match(name))
            .cloned()
            .collect()
    }

    #[cfg(test)]
    fn insert_for_test(&mut self, name: &str, addr: u64, size: u64, function: bool) {
        if !self.by_name.contains_key(name) {
            self.by_name.insert(name.to_string(), addr);
            self.order.push(name.to_string());
        }
        if function {
            self.funcs.push(FuncRange {
                name: name.to_string(),
                addr,
                size,
            });
            self.funcs.sort_by_key(|f| f.addr);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::default();
        t.insert_for_test("main.foo", 0x1000, 0x40, true);
        t.insert_for_test("main.f1", 0x1040, 0, true);
        t.insert_for_test("main.f2", 0x10a0, 0x20, true);
        t.insert_for_test("main.Z_int16", 0x2000, 2, false);
        t.insert_for_test("main.Z_float32", 0x2008, 4, false);
        t
    }

    #[test]
    fn test_sym_to_addr() {
        let t = table();
        assert_eq!(t.sym_to_addr("main.foo").unwrap(), 0x1000);
        assert!(matches!(
            t.sym_to_addr("main.nope"),
            Err(DebuggerError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn test_addr_to_sym_ranges() {
        let t = table();
        assert_eq!(t.addr_to_sym(0x1000).unwrap(), "main.foo");
        assert_eq!(t.addr_to_sym(0x103f).unwrap(), "main.foo");
        // zero-size function extends to the next symbol
        assert_eq!(t.addr_to_sym(0x1040).unwrap(), "main.f1");
        assert_eq!(t.addr_to_sym(0x109f).unwrap(), "main.f1");
        assert_eq!(t.addr_to_sym(0x10a0).unwrap(), "main.f2");
        assert!(t.addr_to_sym(0x0fff).is_err());
        assert!(t.addr_to_sym(0x10c0).is_err());
    }

    #[test]
    fn test_match_symbols() {
        let t = table();
        let re = Regex::new(r"main\.Z_.*").unwrap();
        assert_eq!(
            t.match_symbols(&re),
            vec!["main.Z_int16".to_string(), "main.Z_float32".to_string()]
        );
        let none = Regex::new(r"other\..*").unwrap();
        assert!(t.match_symbols(&none).is_empty());
    }
}
