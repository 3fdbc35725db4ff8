//! Compilation of expression trees into an evaluable form
//!
//! Instead of generating host source text, each cell's tree is lowered into
//! a [`CompiledExpr`] the engine interprets directly. Lowering resolves
//! references against the referencing cell's sheet, folds constants, swaps
//! host-order arguments, and rewrites the special forms the function table
//! marks (conditionals, boolean reductions, array literals, regression
//! coefficient selection).

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{EngineError, EngineResult};
use crate::functions::{registry, Lowering};
use crate::source::DataSource;
use cellgraph_core::{CellAddress, CellKey, CellRange, Error as CoreError, RangeKey};

/// A reference discovered in a compiled expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompiledRef {
    Cell(CellKey),
    Range(RangeKey),
}

/// The evaluable form of a formula
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    Number(f64),
    Text(String),
    Logical(bool),
    /// Error literal; evaluating it fails with the literal's code
    ErrorLit(String),
    CellRef(CellKey),
    RangeRef(RangeKey),
    Unary {
        op: UnaryOp,
        operand: Box<CompiledExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
    },
    /// Inline conditional (IF)
    If {
        cond: Box<CompiledExpr>,
        then: Box<CompiledExpr>,
        otherwise: Option<Box<CompiledExpr>>,
    },
    /// All scalars truthy (AND)
    All(Vec<CompiledExpr>),
    /// Any scalar truthy (OR)
    Any(Vec<CompiledExpr>),
    /// Array literal, row-major
    Array(Vec<Vec<CompiledExpr>>),
    /// Registry-dispatched call
    Call {
        name: String,
        args: Vec<CompiledExpr>,
    },
    /// One coefficient of a polynomial regression over known data
    RegressionCoef {
        known_ys: Box<CompiledExpr>,
        known_xs: Option<Box<CompiledExpr>>,
        degree: usize,
        index: usize,
    },
}

impl CompiledExpr {
    /// Collect every cell/range reference in the expression
    pub fn collect_refs(&self, out: &mut Vec<CompiledRef>) {
        match self {
            CompiledExpr::CellRef(key) => out.push(CompiledRef::Cell(key.clone())),
            CompiledExpr::RangeRef(key) => out.push(CompiledRef::Range(key.clone())),
            CompiledExpr::Unary { operand, .. } => operand.collect_refs(out),
            CompiledExpr::Binary { left, right, .. } => {
                left.collect_refs(out);
                right.collect_refs(out);
            }
            CompiledExpr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_refs(out);
                then.collect_refs(out);
                if let Some(e) = otherwise {
                    e.collect_refs(out);
                }
            }
            CompiledExpr::All(items) | CompiledExpr::Any(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            CompiledExpr::Array(rows) => {
                for row in rows {
                    for item in row {
                        item.collect_refs(out);
                    }
                }
            }
            CompiledExpr::Call { args, .. } => {
                for arg in args {
                    arg.collect_refs(out);
                }
            }
            CompiledExpr::RegressionCoef {
                known_ys, known_xs, ..
            } => {
                known_ys.collect_refs(out);
                if let Some(xs) = known_xs {
                    xs.collect_refs(out);
                }
            }
            _ => {}
        }
    }
}

/// Context a formula is compiled in: the cell it belongs to, plus the data
/// source (consulted only for regression shape inference)
pub struct CompileContext<'a> {
    pub current: &'a CellKey,
    pub source: &'a dyn DataSource,
}

/// Lower an expression tree to its evaluable form
pub fn compile_expr(expr: &Expr, ctx: &CompileContext<'_>) -> EngineResult<CompiledExpr> {
    match expr {
        Expr::Number(n) => Ok(CompiledExpr::Number(*n)),
        Expr::Text(s) => Ok(CompiledExpr::Text(s.clone())),
        Expr::Logical(b) => Ok(CompiledExpr::Logical(*b)),
        Expr::ErrorLit(code) => Ok(CompiledExpr::ErrorLit(code.clone())),

        Expr::Reference(text) => {
            match parse_reference(text, &ctx.current.sheet, Some(ctx.current))? {
                CompiledRef::Cell(key) => Ok(CompiledExpr::CellRef(key)),
                CompiledRef::Range(key) => Ok(CompiledExpr::RangeRef(key)),
            }
        }

        Expr::Unary { op, operand } => Ok(CompiledExpr::Unary {
            op: *op,
            operand: Box::new(compile_expr(operand, ctx)?),
        }),

        Expr::Binary { op, left, right } => {
            let left = compile_expr(left, ctx)?;
            let right = compile_expr(right, ctx)?;
            if *op == BinaryOp::Range {
                // `:` between two compiled endpoints collapses to one range
                return match (left, right) {
                    (CompiledExpr::CellRef(a), CompiledExpr::CellRef(b)) => {
                        if a.sheet != b.sheet {
                            return Err(EngineError::Address(CoreError::SheetMismatch {
                                expected: a.sheet,
                                found: b.sheet,
                            }));
                        }
                        Ok(CompiledExpr::RangeRef(RangeKey::new(
                            a.sheet,
                            CellRange::new(a.addr, b.addr),
                        )))
                    }
                    _ => Err(EngineError::Parse(
                        "range endpoints must be cell references".into(),
                    )),
                };
            }
            Ok(CompiledExpr::Binary {
                op: *op,
                left: Box::new(left),
                right: Box::new(right),
            })
        }

        Expr::Call { name, args } => compile_call(name, args, ctx),
    }
}

fn compile_call(name: &str, args: &[Expr], ctx: &CompileContext<'_>) -> EngineResult<CompiledExpr> {
    let def = registry()
        .get(name)
        .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
    def.check_arity(args.len())?;

    let mut compiled: Vec<CompiledExpr> = args
        .iter()
        .map(|arg| compile_expr(arg, ctx))
        .collect::<EngineResult<_>>()?;

    match def.lowering {
        Lowering::Default => Ok(CompiledExpr::Call {
            name: def.name.to_string(),
            args: compiled,
        }),

        Lowering::Constant => {
            let eval = def.eval.expect("constant function has an eval fn");
            match eval(&[])? {
                cellgraph_core::Value::Number(n) => Ok(CompiledExpr::Number(n)),
                other => Err(EngineError::Argument(format!(
                    "constant {} produced non-numeric value {other:?}",
                    def.name
                ))),
            }
        }

        Lowering::SwapTwo => {
            compiled.swap(0, 1);
            Ok(CompiledExpr::Call {
                name: def.name.to_string(),
                args: compiled,
            })
        }

        Lowering::Conditional => {
            let mut drain = compiled.into_iter();
            let cond = drain.next().expect("arity checked");
            let then = drain.next().expect("arity checked");
            let otherwise = drain.next();
            Ok(CompiledExpr::If {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: otherwise.map(Box::new),
            })
        }

        Lowering::AllOf => Ok(CompiledExpr::All(compiled)),
        Lowering::AnyOf => Ok(CompiledExpr::Any(compiled)),

        Lowering::ArrayRow => Ok(CompiledExpr::Array(vec![compiled])),

        Lowering::ArrayLiteral => {
            let rows = compiled
                .into_iter()
                .map(|arg| match arg {
                    CompiledExpr::Array(mut rows) if rows.len() == 1 => rows.remove(0),
                    other => vec![other],
                })
                .collect();
            Ok(CompiledExpr::Array(rows))
        }

        Lowering::Regression => {
            let (degree, index) = infer_regression_shape(ctx);
            let mut drain = compiled.into_iter();
            let known_ys = drain.next().expect("arity checked");
            let known_xs = drain.next();
            // trailing const/stats arguments carry no data; drop them
            Ok(CompiledExpr::RegressionCoef {
                known_ys: Box::new(known_ys),
                known_xs: known_xs.map(Box::new),
                degree,
                index,
            })
        }
    }
}

/// Infer which coefficient of a shared array-formula result this cell is
///
/// Scans the contiguous horizontal run of cells whose formula text is
/// identical to the current cell's; if the cell has no horizontal
/// co-members, scans vertically instead. The run length determines the
/// polynomial degree (run - 1, at least 1) and the cell's offset within the
/// run is the 0-based coefficient index.
fn infer_regression_shape(ctx: &CompileContext<'_>) -> (usize, usize) {
    let Some(formula) = ctx
        .source
        .cell(ctx.current)
        .and_then(|cell| cell.formula)
    else {
        return (1, 0);
    };

    let same_formula = |key: Option<CellKey>| {
        key.and_then(|k| ctx.source.cell(&k))
            .and_then(|cell| cell.formula)
            .is_some_and(|text| text == formula)
    };

    let run_along = |d_row: i64, d_col: i64| {
        let mut before = 0usize;
        while same_formula(
            ctx.current
                .offset(-d_row * (before as i64 + 1), -d_col * (before as i64 + 1)),
        ) {
            before += 1;
        }
        let mut after = 0usize;
        while same_formula(
            ctx.current
                .offset(d_row * (after as i64 + 1), d_col * (after as i64 + 1)),
        ) {
            after += 1;
        }
        (before, after)
    };

    let (mut before, mut after) = run_along(0, 1);
    if before + after == 0 {
        (before, after) = run_along(1, 0);
    }
    let run = before + after + 1;
    (run.saturating_sub(1).max(1), before)
}

/// Parse raw reference text into a canonical key
///
/// Accepts A1-style addresses with `$` markers, `Sheet!` and `'Quoted
/// Sheet'!` qualifiers, `[Workbook]` prefixes (ignored), `:`-joined ranges,
/// and R1C1-style addresses (absolute `R3C2` or `R[-1]C[2]` relative to
/// `current`). References with no sheet qualifier resolve against
/// `default_sheet`.
pub fn parse_reference(
    text: &str,
    default_sheet: &str,
    current: Option<&CellKey>,
) -> EngineResult<CompiledRef> {
    let mut rest = text.trim();

    // workbook qualifier: identifies the book, irrelevant to graph identity
    if let Some(stripped) = rest.strip_prefix('[') {
        rest = match stripped.split_once(']') {
            Some((_, tail)) => tail,
            None => {
                return Err(EngineError::Address(CoreError::InvalidAddress(
                    text.to_string(),
                )))
            }
        };
    }

    let (sheet, addr_text) = match split_sheet_qualifier(rest) {
        Some((sheet, tail)) => (sheet, tail),
        None => (default_sheet.to_string(), rest),
    };

    match addr_text.split_once(':') {
        Some((a, b)) => {
            let start = parse_endpoint(a, current)?;
            let end = parse_endpoint(b, current)?;
            Ok(CompiledRef::Range(RangeKey::new(
                sheet,
                CellRange::new(start, end),
            )))
        }
        None => Ok(CompiledRef::Cell(CellKey::new(
            sheet,
            parse_endpoint(addr_text, current)?,
        ))),
    }
}

/// Split a leading `Sheet!` or `'My Sheet'!` qualifier off a reference
fn split_sheet_qualifier(text: &str) -> Option<(String, &str)> {
    if let Some(stripped) = text.strip_prefix('\'') {
        let close = stripped.find('\'')?;
        let sheet = stripped[..close].replace("''", "'");
        let tail = stripped[close + 1..].strip_prefix('!')?;
        return Some((sheet, tail));
    }
    let bang = text.find('!')?;
    Some((text[..bang].to_string(), &text[bang + 1..]))
}

/// One endpoint: A1 style first, then R1C1
fn parse_endpoint(text: &str, current: Option<&CellKey>) -> EngineResult<CellAddress> {
    let text = text.trim();
    match CellAddress::parse(text) {
        Ok(addr) => Ok(addr),
        Err(a1_err) => {
            parse_r1c1(text, current).ok_or(EngineError::Address(a1_err))
        }
    }
}

/// R1C1 notation: `R3C2` is absolute (1-based), `R[-1]C[2]` offsets from
/// the current cell, and a bare `R`/`C` part means "same row/column"
fn parse_r1c1(text: &str, current: Option<&CellKey>) -> Option<CellAddress> {
    let upper = text.to_uppercase();
    let rest = upper.strip_prefix('R')?;
    let c_pos = rest.find('C')?;
    let (row_part, col_part) = (&rest[..c_pos], &rest[c_pos + 1..]);

    let resolve = |part: &str, base: i64| -> Option<i64> {
        if part.is_empty() {
            // same row/column as the current cell
            return if current.is_some() { Some(base) } else { None };
        }
        if let Some(offset) = part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            let delta: i64 = offset.parse().ok()?;
            return if current.is_some() { Some(base + delta) } else { None };
        }
        let absolute: i64 = part.parse().ok()?;
        Some(absolute - 1)
    };

    let base_row = current.map_or(0, |c| c.addr.row as i64);
    let base_col = current.map_or(0, |c| c.addr.col as i64);
    let row = resolve(row_part, base_row)?;
    let col = resolve(col_part, base_col)?;
    if row < 0 || col < 0 || row >= cellgraph_core::MAX_ROWS as i64 || col >= cellgraph_core::MAX_COLS as i64 {
        return None;
    }
    Some(CellAddress::new(row as u32, col as u16))
}
