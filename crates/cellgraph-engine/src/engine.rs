//! Lazy, memoizing evaluation over the dependency graph
//!
//! Each cell's compiled expression runs at most once per validity period:
//! the first demand computes and caches, later demands return the cache,
//! and [`Engine::set_value`] clears exactly the caches downstream of the
//! changed cell. Evaluation failures are wrapped once with the offending
//! cell's address and formula text, then propagate unchanged through the
//! cells that demanded it.

use crate::ast::{BinaryOp, UnaryOp};
use crate::builder::GraphBuilder;
use crate::compile::{parse_reference, CompiledExpr, CompiledRef};
use crate::error::{EngineError, EngineResult};
use crate::functions::{fit_polynomial, registry};
use crate::graph::{DependencyGraph, Entity, EntityId};
use crate::source::DataSource;
use cellgraph_core::Value;
use std::rc::Rc;

/// Compiled formula engine for one seed's dependency closure
#[derive(Debug)]
pub struct Engine {
    graph: DependencyGraph,
    default_sheet: String,
}

impl Engine {
    /// Compile the dependency closure of `seed` from `source`
    ///
    /// `sheet` overrides the source's active sheet for resolving
    /// unqualified addresses, both here and in later [`Engine::evaluate`] /
    /// [`Engine::set_value`] calls.
    pub fn compile(
        source: &dyn DataSource,
        seed: &str,
        sheet: Option<&str>,
    ) -> EngineResult<Self> {
        let default_sheet = sheet.unwrap_or_else(|| source.active_sheet()).to_string();
        let graph = GraphBuilder::new(source).build(seed, sheet)?;
        Ok(Self {
            graph,
            default_sheet,
        })
    }

    /// The underlying dependency graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Evaluate a cell or range by address
    ///
    /// Addresses resolve against the engine's default sheet; only entities
    /// inside the compiled graph are addressable.
    pub fn evaluate(&mut self, addr: &str) -> EngineResult<Value> {
        match parse_reference(addr, &self.default_sheet, None)? {
            CompiledRef::Cell(key) => {
                let id = self
                    .graph
                    .cell_id(&key)
                    .ok_or_else(|| EngineError::InvalidReference(key.to_string()))?;
                self.evaluate_cell_id(id)
            }
            CompiledRef::Range(key) => {
                let id = self
                    .graph
                    .range_id(&key)
                    .ok_or_else(|| EngineError::InvalidReference(key.to_string()))?;
                self.evaluate_range_id(id)
            }
        }
    }

    /// Evaluate a range by address, returning its row-major aggregate
    ///
    /// A flat vector for a single row or column, a matrix otherwise.
    pub fn evaluate_range(&mut self, addr: &str) -> EngineResult<Value> {
        match parse_reference(addr, &self.default_sheet, None)? {
            CompiledRef::Range(key) => {
                let id = self
                    .graph
                    .range_id(&key)
                    .ok_or_else(|| EngineError::InvalidReference(key.to_string()))?;
                self.evaluate_range_id(id)
            }
            CompiledRef::Cell(key) => Err(EngineError::InvalidReference(format!(
                "expected a range, got cell {key}"
            ))),
        }
    }

    /// Overwrite a cell's value, invalidating everything downstream
    ///
    /// Writing a value equal to the current cached one is a no-op and
    /// invalidates nothing.
    pub fn set_value(&mut self, addr: &str, value: impl Into<Value>) -> EngineResult<()> {
        let value = value.into();
        let key = match parse_reference(addr, &self.default_sheet, None)? {
            CompiledRef::Cell(key) => key,
            CompiledRef::Range(key) => {
                return Err(EngineError::InvalidReference(format!(
                    "expected a single cell, got range {key}"
                )))
            }
        };
        let id = self
            .graph
            .cell_id(&key)
            .ok_or_else(|| EngineError::InvalidReference(key.to_string()))?;

        let unchanged = self
            .graph
            .cell(id)
            .is_some_and(|cell| cell.value.as_ref() == Some(&value));
        if unchanged {
            return Ok(());
        }

        self.graph.invalidate_from(id);
        if let Some(cell) = self.graph.cell_mut(id) {
            cell.value = Some(value);
        }
        Ok(())
    }

    fn evaluate_cell_id(&mut self, id: EntityId) -> EngineResult<Value> {
        let (expr, address, formula) = match self.graph.cell(id) {
            Some(cell) => {
                if let Some(value) = &cell.value {
                    return Ok(value.clone());
                }
                match &cell.expr {
                    Some(expr) => (
                        Rc::clone(expr),
                        cell.key.to_string(),
                        cell.formula.clone().unwrap_or_default(),
                    ),
                    // constant cell cleared by invalidation: reads as blank
                    None => return Ok(Value::Empty),
                }
            }
            None => {
                return Err(EngineError::InvalidReference(
                    "expected a cell entity".into(),
                ))
            }
        };

        let value = self
            .eval_expr(&expr)
            .map_err(|err| err.into_evaluation(&address, &formula))?;
        if let Some(cell) = self.graph.cell_mut(id) {
            cell.value = Some(value.clone());
        }
        Ok(value)
    }

    fn evaluate_range_id(&mut self, id: EntityId) -> EngineResult<Value> {
        let (members, nrows, ncols) = match self.graph.entity(id) {
            Entity::Range(range) => {
                if let Some(value) = &range.value {
                    return Ok(value.clone());
                }
                (range.members.clone(), range.nrows, range.ncols)
            }
            Entity::Cell(_) => {
                return Err(EngineError::InvalidReference(
                    "expected a range entity".into(),
                ))
            }
        };

        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            flat.push(self.evaluate_cell_id(member)?);
        }
        let value = crate::graph::shape_range_values(flat, nrows, ncols);

        if let Entity::Range(range) = self.graph.entity_mut(id) {
            range.value = Some(value.clone());
        }
        Ok(value)
    }

    fn eval_expr(&mut self, expr: &CompiledExpr) -> EngineResult<Value> {
        match expr {
            CompiledExpr::Number(n) => Ok(Value::Number(*n)),
            CompiledExpr::Text(s) => Ok(Value::Text(s.clone())),
            CompiledExpr::Logical(b) => Ok(Value::Logical(*b)),
            CompiledExpr::ErrorLit(code) => {
                Err(EngineError::Argument(format!("error literal {code}")))
            }

            CompiledExpr::CellRef(key) => {
                let id = self
                    .graph
                    .cell_id(key)
                    .ok_or_else(|| EngineError::InvalidReference(key.to_string()))?;
                self.evaluate_cell_id(id)
            }

            CompiledExpr::RangeRef(key) => {
                let id = self
                    .graph
                    .range_id(key)
                    .ok_or_else(|| EngineError::InvalidReference(key.to_string()))?;
                self.evaluate_range_id(id)
            }

            CompiledExpr::Unary { op, operand } => {
                let value = self.eval_expr(operand)?;
                let n = value
                    .as_number()
                    .ok_or_else(|| EngineError::Argument("expected a number".into()))?;
                Ok(Value::Number(match op {
                    UnaryOp::Neg => -n,
                    UnaryOp::Percent => n / 100.0,
                }))
            }

            CompiledExpr::Binary { op, left, right } => {
                let lhs = self.eval_expr(left)?;
                let rhs = self.eval_expr(right)?;
                eval_binary(*op, lhs, rhs)
            }

            CompiledExpr::If {
                cond,
                then,
                otherwise,
            } => {
                let test = self
                    .eval_expr(cond)?
                    .as_bool()
                    .ok_or_else(|| EngineError::Argument("IF condition must be boolean".into()))?;
                if test {
                    self.eval_expr(then)
                } else {
                    match otherwise {
                        Some(expr) => self.eval_expr(expr),
                        None => Ok(Value::Logical(false)),
                    }
                }
            }

            CompiledExpr::All(items) => {
                for item in items {
                    if !self.truthy_scalars(item)? {
                        return Ok(Value::Logical(false));
                    }
                }
                Ok(Value::Logical(true))
            }

            CompiledExpr::Any(items) => {
                for item in items {
                    if self.truthy_scalars(item)? {
                        return Ok(Value::Logical(true));
                    }
                }
                Ok(Value::Logical(false))
            }

            CompiledExpr::Array(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut out_row = Vec::with_capacity(row.len());
                    for item in row {
                        out_row.push(self.eval_expr(item)?);
                    }
                    out.push(out_row);
                }
                Ok(Value::Array(out))
            }

            CompiledExpr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg)?);
                }
                let def = registry()
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownFunction(name.clone()))?;
                let eval = def.eval.ok_or_else(|| {
                    EngineError::Argument(format!("{name} is not directly callable"))
                })?;
                eval(&values)
            }

            CompiledExpr::RegressionCoef {
                known_ys,
                known_xs,
                degree,
                index,
            } => {
                let ys = self.number_column(known_ys)?;
                let xs = match known_xs {
                    Some(expr) => self.number_column(expr)?,
                    // default x values: 1, 2, ..., n
                    None => (1..=ys.len()).map(|i| i as f64).collect(),
                };
                let coeffs = fit_polynomial(&xs, &ys, *degree)?;
                coeffs.get(*index).copied().map(Value::Number).ok_or_else(|| {
                    EngineError::Argument(format!(
                        "no regression coefficient at position {index}"
                    ))
                })
            }
        }
    }

    /// Evaluate and flatten to the numeric scalars inside
    fn number_column(&mut self, expr: &CompiledExpr) -> EngineResult<Vec<f64>> {
        let value = self.eval_expr(expr)?;
        let mut out = Vec::new();
        value.for_each_scalar(&mut |v| {
            if let Value::Number(n) = v {
                out.push(*n);
            }
        });
        Ok(out)
    }

    /// True when every boolean-ish scalar in the item is truthy
    ///
    /// Text and blank scalars don't vote; an item with no votes is an error.
    fn truthy_scalars(&mut self, expr: &CompiledExpr) -> EngineResult<bool> {
        let value = self.eval_expr(expr)?;
        let mut votes = 0usize;
        let mut all_true = true;
        value.for_each_scalar(&mut |v| match v {
            Value::Logical(b) => {
                votes += 1;
                all_true &= *b;
            }
            Value::Number(n) => {
                votes += 1;
                all_true &= *n != 0.0;
            }
            _ => {}
        });
        if votes == 0 {
            return Err(EngineError::Argument(
                "boolean function argument has no logical values".into(),
            ));
        }
        Ok(all_true)
    }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> EngineResult<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            let a = lhs
                .as_number()
                .ok_or_else(|| EngineError::Argument("expected a number".into()))?;
            let b = rhs
                .as_number()
                .ok_or_else(|| EngineError::Argument("expected a number".into()))?;
            let n = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(EngineError::Argument("division by zero".into()));
                    }
                    a / b
                }
                BinaryOp::Pow => a.powf(b),
                _ => unreachable!(),
            };
            Ok(Value::Number(n))
        }

        BinaryOp::Concat => Ok(Value::Text(format!("{}{}", lhs.as_text(), rhs.as_text()))),

        BinaryOp::Eq => Ok(Value::Logical(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Logical(!values_equal(&lhs, &rhs))),

        BinaryOp::Lt => compare_order(&lhs, &rhs).map(|ord| Value::Logical(ord.is_lt())),
        BinaryOp::Le => compare_order(&lhs, &rhs).map(|ord| Value::Logical(ord.is_le())),
        BinaryOp::Gt => compare_order(&lhs, &rhs).map(|ord| Value::Logical(ord.is_gt())),
        BinaryOp::Ge => compare_order(&lhs, &rhs).map(|ord| Value::Logical(ord.is_ge())),

        BinaryOp::Union => {
            let mut flat = Vec::new();
            for value in [lhs, rhs] {
                value.for_each_scalar(&mut |v| flat.push(v.clone()));
            }
            Ok(Value::Array(vec![flat]))
        }

        // `:` collapses to a RangeRef during compilation
        BinaryOp::Range => Err(EngineError::Argument(
            "range operator outside a reference".into(),
        )),
    }
}

/// Equality: blank equals only blank; otherwise numeric when both sides
/// coerce, else case-insensitive text
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if lhs.is_empty() || rhs.is_empty() {
        return lhs.is_empty() && rhs.is_empty();
    }
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return a == b;
    }
    lhs.as_text().eq_ignore_ascii_case(&rhs.as_text())
}

/// Ordering with blank treated as larger than any number, and text compared
/// case-insensitively against text
fn compare_order(lhs: &Value, rhs: &Value) -> EngineResult<std::cmp::Ordering> {
    if let (Value::Text(a), Value::Text(b)) = (lhs, rhs) {
        return Ok(a.to_lowercase().cmp(&b.to_lowercase()));
    }
    let a = ordering_number(lhs)?;
    let b = ordering_number(rhs)?;
    Ok(a.total_cmp(&b))
}

fn ordering_number(value: &Value) -> EngineResult<f64> {
    if value.is_empty() {
        return Ok(f64::INFINITY);
    }
    value
        .as_number()
        .ok_or_else(|| EngineError::Argument(format!("cannot order {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;

    fn engine_with(cells: &[(&str, &str)]) -> Engine {
        let mut source = MemorySource::new();
        for (addr, content) in cells {
            if content.starts_with('=') {
                source.set_formula(addr, content).unwrap();
            } else if let Ok(n) = content.parse::<f64>() {
                source.set_value(addr, n).unwrap();
            } else {
                source.set_value(addr, *content).unwrap();
            }
        }
        Engine::compile(&source, cells.last().map(|(a, _)| *a).unwrap(), None).unwrap()
    }

    #[test]
    fn arithmetic_with_precedence() {
        let mut engine = engine_with(&[("A1", "=3 + 4 * 2 / ( 1 - 5 ) ^ 2 ^ 3")]);
        // `^` associates left: (1-5)^2 = 16, 16^3 = 4096
        assert_eq!(
            engine.evaluate("A1").unwrap(),
            Value::Number(3.0 + 8.0 / 4096.0)
        );
    }

    #[test]
    fn evaluation_is_memoized_and_idempotent() {
        let mut engine = engine_with(&[("A1", "2"), ("B1", "=A1*10")]);
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Number(20.0));
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Number(20.0));

        let id = engine
            .graph()
            .cell_id(&cellgraph_core::CellKey::new(
                "Sheet1",
                "B1".parse().unwrap(),
            ))
            .unwrap();
        assert!(engine.graph().cell(id).unwrap().value.is_some());
    }

    #[test]
    fn set_value_invalidates_downstream() {
        let mut engine = engine_with(&[("A1", "1"), ("B1", "=A1+1"), ("C1", "=B1+1")]);
        assert_eq!(engine.evaluate("C1").unwrap(), Value::Number(3.0));

        engine.set_value("A1", 10.0).unwrap();
        assert_eq!(engine.evaluate("C1").unwrap(), Value::Number(12.0));
    }

    #[test]
    fn set_value_with_equal_value_keeps_caches() {
        let mut engine = engine_with(&[("A1", "1"), ("B1", "=A1+1")]);
        engine.evaluate("B1").unwrap();

        engine.set_value("A1", 1.0).unwrap();
        let id = engine
            .graph()
            .cell_id(&cellgraph_core::CellKey::new(
                "Sheet1",
                "B1".parse().unwrap(),
            ))
            .unwrap();
        assert!(engine.graph().cell(id).unwrap().value.is_some());
    }

    #[test]
    fn blank_compares_as_larger_than_any_number() {
        let mut engine = engine_with(&[("B1", "=A1<0")]);
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Logical(false));

        let mut engine = engine_with(&[("B1", "=A1>1000000")]);
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Logical(true));
    }

    #[test]
    fn text_comparison_is_case_insensitive() {
        let mut engine = engine_with(&[("A1", "Apple"), ("B1", "=A1=\"APPLE\"")]);
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Logical(true));
    }

    #[test]
    fn percent_and_concat() {
        let mut engine = engine_with(&[("A1", "=50%*200")]);
        assert_eq!(engine.evaluate("A1").unwrap(), Value::Number(100.0));

        let mut engine = engine_with(&[("A1", "=\"total: \"&42")]);
        assert_eq!(
            engine.evaluate("A1").unwrap(),
            Value::Text("total: 42".into())
        );
    }

    #[test]
    fn division_by_zero_is_wrapped_with_the_cell() {
        let mut engine = engine_with(&[("A1", "=1/0")]);
        match engine.evaluate("A1").unwrap_err() {
            EngineError::Evaluation {
                address, formula, ..
            } => {
                assert_eq!(address, "Sheet1!A1");
                assert_eq!(formula, "=1/0");
            }
            other => panic!("expected Evaluation, got {other:?}"),
        }
    }

    #[test]
    fn failure_reports_the_originating_cell() {
        let mut engine = engine_with(&[("A1", "=1/0"), ("B1", "=A1+1")]);
        match engine.evaluate("B1").unwrap_err() {
            EngineError::Evaluation { address, .. } => assert_eq!(address, "Sheet1!A1"),
            other => panic!("expected Evaluation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_address_is_an_invalid_reference() {
        let mut engine = engine_with(&[("A1", "=1+1")]);
        assert!(matches!(
            engine.evaluate("Z99").unwrap_err(),
            EngineError::InvalidReference(_)
        ));
    }

    #[test]
    fn conditional_picks_branches_lazily() {
        // false branch divides by zero but is never taken
        let mut engine = engine_with(&[("A1", "5"), ("B1", "=IF(A1>0,\"pos\",1/0)")]);
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Text("pos".into()));
    }

    #[test]
    fn boolean_reductions() {
        let mut engine = engine_with(&[("A1", "1"), ("B1", "=AND(A1,TRUE,2)")]);
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Logical(true));

        let mut engine = engine_with(&[("B1", "=OR(FALSE,0)")]);
        assert_eq!(engine.evaluate("B1").unwrap(), Value::Logical(false));
    }

    #[test]
    fn range_evaluation_shapes() {
        let mut source = MemorySource::new();
        source.set_value("A1", 1.0).unwrap();
        source.set_value("A2", 2.0).unwrap();
        source.set_value("A3", 3.0).unwrap();
        source.set_formula("B1", "=SUM(A1:A3)").unwrap();
        let mut engine = Engine::compile(&source, "B1", None).unwrap();

        assert_eq!(engine.evaluate("B1").unwrap(), Value::Number(6.0));
        assert_eq!(
            engine.evaluate("A1:A3").unwrap(),
            Value::Array(vec![vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0)
            ]])
        );
    }

    #[test]
    fn union_flattens_operands() {
        let mut source = MemorySource::new();
        source.set_value("A1", 1.0).unwrap();
        source.set_value("A2", 2.0).unwrap();
        source.set_value("C1", 10.0).unwrap();
        source.set_formula("D1", "=SUM((A1:A2,C1))").unwrap();
        let mut engine = Engine::compile(&source, "D1", None).unwrap();
        assert_eq!(engine.evaluate("D1").unwrap(), Value::Number(13.0));
    }

    #[test]
    fn regression_over_graph_data() {
        let mut source = MemorySource::new();
        // y = 2x + 1
        for (i, y) in [3.0, 5.0, 7.0, 9.0].iter().enumerate() {
            source.set_value(&format!("A{}", i + 1), *y).unwrap();
            source.set_value(&format!("B{}", i + 1), (i + 1) as f64).unwrap();
        }
        source.set_formula("D1", "=LINEST(A1:A4,B1:B4)").unwrap();
        let mut engine = Engine::compile(&source, "D1", None).unwrap();

        // single cell: degree 1, coefficient 0 is the slope
        match engine.evaluate("D1").unwrap() {
            Value::Number(n) => assert!((n - 2.0).abs() < 1e-9),
            other => panic!("expected number, got {other:?}"),
        }
    }
}
