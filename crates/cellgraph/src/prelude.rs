//! Prelude module - common imports for cellgraph users
//!
//! ```rust
//! use cellgraph::prelude::*;
//! ```

pub use crate::{
    CellAddress,
    CellKey,
    CellRange,
    // External data interface
    DataSource,
    // Main types
    Engine,
    // Error types
    EngineError,
    EngineResult,
    GraphBuilder,
    MemorySource,
    RangeKey,
    SourceCell,
    // Values
    Value,
};
