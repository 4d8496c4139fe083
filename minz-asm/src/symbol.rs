//! The assembler's symbol table: labels, `EQU` constants, and the platform
//! symbols a [`minz_codegen::TargetConfig`] pre-populates via `TARGET`/
//! `MODEL` (SPEC_FULL.md §4.11).

use crate::error::{AsmError, AsmResult};
use std::collections::HashMap;

/// Maps names to resolved integer values across both assembler passes.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    values: HashMap<String, i64>,
    defined_at: HashMap<String, u32>,
}

impl SymbolTable {
    /// An empty table.
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Seed `name = value` without duplicate checking (used to pre-populate
    /// platform-standard symbols before assembly starts).
    pub fn seed(&mut self, name: &str, value: i64) {
        self.values.insert(name.to_string(), value);
    }

    /// Define `name = value` at source `line`. Redefining a name to a
    /// *different* value is an error; redefining to the same value (label
    /// seen again identically on a second pass) is not.
    pub fn define(&mut self, name: &str, value: i64, line: u32) -> AsmResult<()> {
        if let Some(existing) = self.values.get(name) {
            if *existing != value {
                return Err(AsmError::DuplicateSymbol { line, name: name.to_string() });
            }
            return Ok(());
        }
        self.values.insert(name.to_string(), value);
        self.defined_at.insert(name.to_string(), line);
        Ok(())
    }

    /// Look up `name`'s value, if defined.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    /// `true` if `name` has been defined.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Every defined name, for listing output (SPEC_FULL.md §4.11).
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redefining_to_the_same_value_is_not_an_error() {
        let mut t = SymbolTable::new();
        t.define("LOOP", 0x8000, 1).unwrap();
        t.define("LOOP", 0x8000, 2).unwrap();
    }

    #[test]
    fn redefining_to_a_different_value_is_an_error() {
        let mut t = SymbolTable::new();
        t.define("LOOP", 0x8000, 1).unwrap();
        let err = t.define("LOOP", 0x9000, 2).unwrap_err();
        assert!(matches!(err, AsmError::DuplicateSymbol { .. }));
    }

    #[test]
    fn seeded_symbols_are_visible_without_a_defining_line() {
        let mut t = SymbolTable::new();
        t.seed("BDOS", 5);
        assert_eq!(t.get("BDOS"), Some(5));
    }
}
