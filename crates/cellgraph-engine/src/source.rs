//! External data-source collaborator
//!
//! The engine's only window onto the originating spreadsheet: an active
//! sheet, plus per-cell formula/value lookups. The graph builder queries it
//! while discovering cells; evaluation never touches it.

use crate::compile::{parse_reference, CompiledRef};
use crate::error::{EngineError, EngineResult};
use ahash::AHashMap;
use cellgraph_core::{CellKey, Value};

/// A cell as reported by the data source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCell {
    /// Raw formula text (with leading `=`), if the cell holds a formula
    pub formula: Option<String>,
    /// The cell's current stored value
    pub value: Value,
}

/// The spreadsheet-side collaborator the engine compiles from
pub trait DataSource {
    /// Name of the currently active sheet
    fn active_sheet(&self) -> &str;

    /// Change the active sheet
    fn set_active_sheet(&mut self, name: &str);

    /// Look up a cell's formula and current value
    fn cell(&self, key: &CellKey) -> Option<SourceCell>;
}

/// In-memory data source for tests and embedders
#[derive(Debug, Default)]
pub struct MemorySource {
    active: String,
    cells: AHashMap<CellKey, SourceCell>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            active: "Sheet1".to_string(),
            cells: AHashMap::new(),
        }
    }

    /// Store a constant value; `addr` may carry a sheet qualifier and
    /// otherwise resolves against the active sheet
    pub fn set_value(&mut self, addr: &str, value: impl Into<Value>) -> EngineResult<()> {
        let key = self.key_for(addr)?;
        self.cells.insert(
            key,
            SourceCell {
                formula: None,
                value: value.into(),
            },
        );
        Ok(())
    }

    /// Store a formula (leading `=` expected); the stored value stays Empty
    /// until something evaluates it
    pub fn set_formula(&mut self, addr: &str, formula: &str) -> EngineResult<()> {
        let key = self.key_for(addr)?;
        self.cells.insert(
            key,
            SourceCell {
                formula: Some(formula.to_string()),
                value: Value::Empty,
            },
        );
        Ok(())
    }

    fn key_for(&self, addr: &str) -> EngineResult<CellKey> {
        match parse_reference(addr, &self.active, None)? {
            CompiledRef::Cell(key) => Ok(key),
            CompiledRef::Range(key) => Err(EngineError::InvalidReference(format!(
                "expected a single cell, got range {key}"
            ))),
        }
    }
}

impl DataSource for MemorySource {
    fn active_sheet(&self) -> &str {
        &self.active
    }

    fn set_active_sheet(&mut self, name: &str) {
        self.active = name.to_string();
    }

    fn cell(&self, key: &CellKey) -> Option<SourceCell> {
        self.cells.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellgraph_core::CellAddress;
    use pretty_assertions::assert_eq;

    #[test]
    fn stores_and_reads_cells() {
        let mut source = MemorySource::new();
        source.set_value("A1", 5.0).unwrap();
        source.set_formula("B1", "=A1*2").unwrap();

        let key = CellKey::new("Sheet1", CellAddress::parse("A1").unwrap());
        assert_eq!(
            source.cell(&key),
            Some(SourceCell {
                formula: None,
                value: Value::Number(5.0),
            })
        );

        let key = CellKey::new("Sheet1", CellAddress::parse("B1").unwrap());
        assert_eq!(source.cell(&key).unwrap().formula.as_deref(), Some("=A1*2"));
    }

    #[test]
    fn active_sheet_scopes_bare_addresses() {
        let mut source = MemorySource::new();
        source.set_active_sheet("Data");
        source.set_value("A1", 1.0).unwrap();

        assert!(source
            .cell(&CellKey::new("Data", CellAddress::parse("A1").unwrap()))
            .is_some());
        assert!(source
            .cell(&CellKey::new("Sheet1", CellAddress::parse("A1").unwrap()))
            .is_none());
    }

    #[test]
    fn qualified_addresses_override_active_sheet() {
        let mut source = MemorySource::new();
        source.set_value("Other!C3", 9.0).unwrap();
        assert!(source
            .cell(&CellKey::new("Other", CellAddress::parse("C3").unwrap()))
            .is_some());
    }
}
