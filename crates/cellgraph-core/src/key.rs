//! Sheet-qualified canonical identities for graph entities
//!
//! Two syntactically different references to the same cell or block
//! (`B5`, `$B$5`, `Sheet1!B5`) must collapse to one graph node, so keys
//! carry the sheet name plus coordinates with all `$` markers dropped.

use crate::address::{CellAddress, CellRange};
use std::fmt;

/// Canonical identity of a single cell: sheet name + coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub sheet: String,
    pub addr: CellAddress,
}

impl CellKey {
    /// Build a key, dropping any `$` markers from the address
    pub fn new(sheet: impl Into<String>, addr: CellAddress) -> Self {
        Self {
            sheet: sheet.into(),
            addr: addr.relative(),
        }
    }

    /// Key for the cell at a row/column offset from this one
    ///
    /// Returns `None` when the offset would leave the sheet.
    pub fn offset(&self, d_row: i64, d_col: i64) -> Option<Self> {
        let row = self.addr.row as i64 + d_row;
        let col = self.addr.col as i64 + d_col;
        if row < 0 || col < 0 || row >= crate::MAX_ROWS as i64 || col >= crate::MAX_COLS as i64 {
            return None;
        }
        Some(Self::new(
            self.sheet.clone(),
            CellAddress::new(row as u32, col as u16),
        ))
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.addr)
    }
}

/// Canonical identity of a rectangular block: sheet name + normalized corners
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeKey {
    pub sheet: String,
    pub range: CellRange,
}

impl RangeKey {
    pub fn new(sheet: impl Into<String>, range: CellRange) -> Self {
        Self {
            sheet: sheet.into(),
            range,
        }
    }

    /// Member cell keys in row-major order
    pub fn member_cells(&self) -> Vec<CellKey> {
        self.range
            .cells()
            .map(|addr| CellKey::new(self.sheet.clone(), addr))
            .collect()
    }
}

impl fmt::Display for RangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.range)
    }
}
