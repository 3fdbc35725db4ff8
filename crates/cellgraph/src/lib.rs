//! # cellgraph
//!
//! A spreadsheet formula compiler and incremental calculation engine.
//!
//! Cellgraph compiles Excel-style formulas into a dependency graph rooted
//! at a seed cell, then evaluates lazily with memoization: each formula
//! runs at most once until an input changes, and changing an input clears
//! exactly the downstream caches.
//!
//! ## Example
//!
//! ```rust
//! use cellgraph::prelude::*;
//!
//! let mut source = MemorySource::new();
//! for (row, n) in (5..=15).zip(1..) {
//!     source.set_value(&format!("B{row}"), n as f64).unwrap();
//! }
//! source.set_formula("B16", "=SUM(B5:B15)").unwrap();
//!
//! let mut engine = Engine::compile(&source, "B16", None).unwrap();
//! assert_eq!(engine.evaluate("B16").unwrap(), Value::Number(66.0));
//!
//! // change an input; only B16's cache is invalidated
//! engine.set_value("B5", 100.0).unwrap();
//! assert_eq!(engine.evaluate("B16").unwrap(), Value::Number(165.0));
//! ```

pub mod prelude;

// Re-export core types
pub use cellgraph_core::{
    CellAddress,
    CellKey,
    CellRange,
    // Error types
    Error as CoreError,
    RangeKey,
    Result as CoreResult,
    // Values
    Value,

    MAX_COLS,
    // Constants
    MAX_ROWS,
};

// Re-export engine types
pub use cellgraph_engine::{
    compile_expr,
    parse_formula,
    parse_reference,
    registry,
    tokenize,
    BinaryOp,
    CompileContext,
    CompiledExpr,
    CompiledRef,
    // Graph types
    DependencyGraph,
    // External data interface
    DataSource,
    // Main types
    Engine,
    EngineError,
    EngineResult,
    Entity,
    EntityId,
    EntityKey,
    Expr,
    FunctionDef,
    FunctionRegistry,
    GraphBuilder,
    MemorySource,
    SourceCell,
    Token,
    TokenKind,
    TokenSubkind,
    UnaryOp,
};
