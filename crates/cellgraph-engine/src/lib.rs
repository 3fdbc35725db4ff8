//! # cellgraph-engine
//!
//! Formula compiler and incremental dependency-graph engine:
//! - [`tokenizer`] / [`parser`] / [`ast`] - formula text to expression tree
//! - [`functions`] - the registered built-in function table
//! - [`compile`] - lowering to an evaluable [`CompiledExpr`]
//! - [`builder`] / [`graph`] - dependency graph construction from a seed
//! - [`engine`] - lazy, memoizing evaluation with downstream invalidation
//!
//! ## Example
//!
//! ```rust
//! use cellgraph_engine::{Engine, MemorySource};
//! use cellgraph_core::Value;
//!
//! let mut source = MemorySource::new();
//! source.set_value("A1", 2.0).unwrap();
//! source.set_formula("B1", "=A1*10").unwrap();
//!
//! let mut engine = Engine::compile(&source, "B1", None).unwrap();
//! assert_eq!(engine.evaluate("B1").unwrap(), Value::Number(20.0));
//!
//! engine.set_value("A1", 3.0).unwrap();
//! assert_eq!(engine.evaluate("B1").unwrap(), Value::Number(30.0));
//! ```

pub mod ast;
pub mod builder;
pub mod compile;
pub mod engine;
pub mod error;
pub mod functions;
pub mod graph;
pub mod parser;
pub mod source;
pub mod tokenizer;

pub use ast::{parse_formula, BinaryOp, Expr, UnaryOp};
pub use builder::GraphBuilder;
pub use compile::{compile_expr, parse_reference, CompileContext, CompiledExpr, CompiledRef};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use functions::{registry, FunctionDef, FunctionRegistry, Lowering};
pub use graph::{Cell, DependencyGraph, Entity, EntityId, EntityKey, RangeEntity};
pub use source::{DataSource, MemorySource, SourceCell};
pub use tokenizer::{tokenize, Token, TokenKind, TokenSubkind};
