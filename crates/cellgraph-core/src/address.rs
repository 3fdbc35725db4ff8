//! A1-style cell addresses and rectangular ranges

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A single cell address (e.g., "A1", "$B$2")
///
/// Rows and columns are 0-based internally; display is 1-based A1 notation.
/// The `$` markers are carried through parsing so the original reference can
/// be reproduced, but canonical graph identities drop them (see
/// [`crate::CellKey`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    /// Row index (0-based)
    pub row: u32,
    /// Column index (0-based, A=0)
    pub col: u16,
    /// Whether the row part was written absolute ($)
    pub abs_row: bool,
    /// Whether the column part was written absolute ($)
    pub abs_col: bool,
}

impl CellAddress {
    /// Create a relative address
    pub fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            abs_row: false,
            abs_col: false,
        }
    }

    /// Parse an A1-style address, accepting `$` markers
    ///
    /// # Examples
    /// ```
    /// use cellgraph_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("B5").unwrap();
    /// assert_eq!((addr.row, addr.col), (4, 1));
    ///
    /// let addr = CellAddress::parse("$AA$10").unwrap();
    /// assert_eq!((addr.row, addr.col), (9, 26));
    /// assert!(addr.abs_row && addr.abs_col);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }

        let bytes = s.as_bytes();
        let mut pos = 0;

        let abs_col = bytes.first() == Some(&b'$');
        if abs_col {
            pos += 1;
        }

        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(Error::InvalidAddress(format!("no column letters in '{s}'")));
        }
        let col = Self::letters_to_column(&s[col_start..pos])?;

        let abs_row = bytes.get(pos) == Some(&b'$');
        if abs_row {
            pos += 1;
        }

        let row_str = &s[pos..];
        let row: u32 = row_str
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid row number in '{s}'")))?;
        if row == 0 {
            return Err(Error::InvalidAddress(format!("row must be >= 1 in '{s}'")));
        }
        let row = row - 1;
        if row >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }

        Ok(Self {
            row,
            col,
            abs_row,
            abs_col,
        })
    }

    /// Convert column letters to a 0-based index (A=0, Z=25, AA=26)
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() {
            return Err(Error::InvalidAddress("empty column letters".into()));
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!("invalid column letter '{c}'")));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        let col = col - 1;
        if col >= MAX_COLS as u32 {
            return Err(Error::ColumnOutOfBounds(col as u16, MAX_COLS - 1));
        }
        Ok(col as u16)
    }

    /// Convert a 0-based column index to letters (0=A, 25=Z, 26=AA)
    pub fn column_to_letters(col: u16) -> String {
        let mut out = String::new();
        let mut n = col as u32 + 1;
        while n > 0 {
            n -= 1;
            out.insert(0, ((n % 26) as u8 + b'A') as char);
            n /= 26;
        }
        out
    }

    /// Drop the `$` markers, keeping the coordinates
    pub fn relative(self) -> Self {
        Self::new(self.row, self.col)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.abs_col {
            f.write_str("$")?;
        }
        f.write_str(&Self::column_to_letters(self.col))?;
        if self.abs_row {
            f.write_str("$")?;
        }
        write!(f, "{}", self.row + 1)
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular block of cells (e.g., "B5:B15")
///
/// Corners are normalized so `(start_row, start_col)` is the top-left and
/// `(end_row, end_col)` the bottom-right. Ranges are always treated as
/// absolute: `$` markers on the endpoints are dropped during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u16,
    pub end_row: u32,
    pub end_col: u16,
}

impl CellRange {
    /// Create a range from two corner addresses, normalizing corner order
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start_row: a.row.min(b.row),
            start_col: a.col.min(b.col),
            end_row: a.row.max(b.row),
            end_col: a.col.max(b.col),
        }
    }

    /// Create a single-cell range
    pub fn single(addr: CellAddress) -> Self {
        Self::new(addr, addr)
    }

    /// Parse `A1:B10` notation; a bare address yields a single-cell range
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(CellAddress::parse(a)?, CellAddress::parse(b)?)),
            None => Ok(Self::single(CellAddress::parse(s)?)),
        }
    }

    /// Number of rows in the range
    pub fn row_count(&self) -> u32 {
        self.end_row - self.start_row + 1
    }

    /// Number of columns in the range
    pub fn col_count(&self) -> u16 {
        self.end_col - self.start_col + 1
    }

    /// Total number of cells
    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    /// True when the range covers exactly one cell
    pub fn is_single_cell(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    /// Top-left address
    pub fn top_left(&self) -> CellAddress {
        CellAddress::new(self.start_row, self.start_col)
    }

    /// Iterate member addresses in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        let (sr, sc, er, ec) = (self.start_row, self.start_col, self.end_row, self.end_col);
        (sr..=er).flat_map(move |row| (sc..=ec).map(move |col| CellAddress::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let top_left = CellAddress::new(self.start_row, self.start_col);
        if self.is_single_cell() {
            write!(f, "{top_left}")
        } else {
            write!(f, "{}:{}", top_left, CellAddress::new(self.end_row, self.end_col))
        }
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
