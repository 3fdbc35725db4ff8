//! # cellgraph-core
//!
//! Core data structures for the cellgraph formula engine:
//! - [`CellAddress`] and [`CellRange`] - A1-style cell addressing
//! - [`CellKey`] and [`RangeKey`] - sheet-qualified canonical identities
//! - [`Value`] - evaluated cell values and coercions
//!
//! ## Example
//!
//! ```rust
//! use cellgraph_core::{CellAddress, CellKey};
//!
//! let addr = CellAddress::parse("$B$5").unwrap();
//! assert_eq!(addr.row, 4);
//! assert_eq!(addr.col, 1);
//!
//! let key = CellKey::new("Sheet1", addr);
//! assert_eq!(key.to_string(), "Sheet1!B5");
//! ```

pub mod address;
pub mod error;
pub mod key;
pub mod value;

pub use address::{CellAddress, CellRange};
pub use error::{Error, Result};
pub use key::{CellKey, RangeKey};
pub use value::Value;

/// Maximum number of rows in a sheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a sheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;
