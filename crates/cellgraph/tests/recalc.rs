//! End-to-end tests: compile a dependency graph from a data source, then
//! evaluate, mutate, and re-evaluate through the public API

use cellgraph::prelude::*;
use pretty_assertions::assert_eq;

fn number(engine: &mut Engine, addr: &str) -> f64 {
    match engine.evaluate(addr).unwrap() {
        Value::Number(n) => n,
        other => panic!("expected number at {addr}, got {other:?}"),
    }
}

/// Operator precedence, with `^` associating left
#[test]
fn test_operator_precedence() {
    let mut source = MemorySource::new();
    source.set_formula("A1", "=3 + 4 * 2 / ( 1 - 5 ) ^ 2 ^ 3").unwrap();
    let mut engine = Engine::compile(&source, "A1", None).unwrap();

    // (1-5)^2 = 16, then 16^3 = 4096
    assert_eq!(number(&mut engine, "A1"), 3.0 + 8.0 / 4096.0);
}

/// A range reference becomes one graph entity backed by its member cells
#[test]
fn test_range_aggregation() {
    let mut source = MemorySource::new();
    for (row, n) in (5..=15).zip(1..) {
        source.set_value(&format!("B{row}"), n as f64).unwrap();
    }
    source.set_formula("B16", "=SUM(B5:B15)").unwrap();
    let mut engine = Engine::compile(&source, "B16", None).unwrap();

    assert_eq!(number(&mut engine, "B16"), 66.0);

    // seed + 11 member cells + the range entity itself
    assert_eq!(engine.graph().len(), 13);
    let seed = engine
        .graph()
        .cell_id(&CellKey::new("Sheet1", "B16".parse().unwrap()))
        .unwrap();
    let range = engine.graph().precedents(seed)[0];
    assert_eq!(engine.graph().precedents(range).len(), 11);
}

/// A range containing a formula cell evaluates that formula on demand and
/// tracks it through mutation
#[test]
fn test_range_with_formula_members() {
    let mut source = MemorySource::new();
    source.set_value("A1", 3.0).unwrap();
    source.set_formula("A2", "=A1*2").unwrap();
    source.set_formula("B1", "=SUM(A1:A2)").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();

    assert_eq!(number(&mut engine, "B1"), 9.0);

    // overwriting the formula member invalidates the range and its consumer
    engine.set_value("A2", 10.0).unwrap();
    assert_eq!(number(&mut engine, "B1"), 13.0);

    // same mutation before anything was ever evaluated
    let mut engine = Engine::compile(&source, "B1", None).unwrap();
    engine.set_value("A2", 4.0).unwrap();
    assert_eq!(number(&mut engine, "B1"), 7.0);
}

/// Repeated evaluation returns the cached value
#[test]
fn test_evaluation_is_idempotent() {
    let mut source = MemorySource::new();
    source.set_value("A1", 7.0).unwrap();
    source.set_formula("B1", "=A1*A1").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();

    assert_eq!(number(&mut engine, "B1"), 49.0);
    assert_eq!(number(&mut engine, "B1"), 49.0);
}

/// Changing an input invalidates the whole downstream chain
#[test]
fn test_invalidation_chain() {
    let mut source = MemorySource::new();
    source.set_value("A1", 1.0).unwrap();
    source.set_formula("B1", "=A1*2").unwrap();
    source.set_formula("C1", "=B1+5").unwrap();
    let mut engine = Engine::compile(&source, "C1", None).unwrap();

    assert_eq!(number(&mut engine, "C1"), 7.0);

    engine.set_value("A1", 10.0).unwrap();
    assert_eq!(number(&mut engine, "C1"), 25.0);
    assert_eq!(number(&mut engine, "B1"), 20.0);
}

/// Blank cells order as larger than any number
#[test]
fn test_blank_comparison() {
    let mut source = MemorySource::new();
    source.set_formula("B1", "=A1<0").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();
    assert_eq!(engine.evaluate("B1").unwrap(), Value::Logical(false));

    let mut source = MemorySource::new();
    source.set_formula("B1", "=A1>=1000000").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();
    assert_eq!(engine.evaluate("B1").unwrap(), Value::Logical(true));
}

/// A malformed formula fails the whole build
#[test]
fn test_parse_error_aborts_compilation() {
    let mut source = MemorySource::new();
    source.set_formula("B16", "=SUM(B5:B15").unwrap();
    assert!(matches!(
        Engine::compile(&source, "B16", None).unwrap_err(),
        EngineError::Parse(_)
    ));
}

/// Circular references are rejected at build time, not at evaluation
#[test]
fn test_cycle_rejection() {
    let mut source = MemorySource::new();
    source.set_formula("A1", "=C1+1").unwrap();
    source.set_formula("B1", "=A1+1").unwrap();
    source.set_formula("C1", "=B1+1").unwrap();
    assert!(matches!(
        Engine::compile(&source, "A1", None).unwrap_err(),
        EngineError::CircularReference(_)
    ));
}

/// An IF formula flips when its input crosses the threshold
#[test]
fn test_conditional_recalculation() {
    let mut source = MemorySource::new();
    source.set_value("A1", 5.0).unwrap();
    source.set_formula("B1", "=IF(A1>0,\"positive\",\"non-positive\")").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();

    assert_eq!(engine.evaluate("B1").unwrap(), Value::Text("positive".into()));

    engine.set_value("A1", -1.0).unwrap();
    assert_eq!(
        engine.evaluate("B1").unwrap(),
        Value::Text("non-positive".into())
    );
}

/// Union, percent, and concatenation operators
#[test]
fn test_operator_variety() {
    let mut source = MemorySource::new();
    source.set_value("A1", 1.0).unwrap();
    source.set_value("A2", 2.0).unwrap();
    source.set_value("C1", 10.0).unwrap();
    source.set_formula("D1", "=SUM((A1:A2,C1))").unwrap();
    let mut engine = Engine::compile(&source, "D1", None).unwrap();
    assert_eq!(number(&mut engine, "D1"), 13.0);

    let mut source = MemorySource::new();
    source.set_value("A1", 200.0).unwrap();
    source.set_formula("B1", "=A1*25% & \" units\"").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();
    assert_eq!(engine.evaluate("B1").unwrap(), Value::Text("50 units".into()));
}

/// Evaluation failures carry the address and formula of the failing cell
#[test]
fn test_error_attribution() {
    let mut source = MemorySource::new();
    source.set_formula("A1", "=SQRT(0-1)").unwrap();
    source.set_formula("B1", "=A1+1").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();

    match engine.evaluate("B1").unwrap_err() {
        EngineError::Evaluation {
            address, formula, ..
        } => {
            assert_eq!(address, "Sheet1!A1");
            assert_eq!(formula, "=SQRT(0-1)");
        }
        other => panic!("expected Evaluation, got {other:?}"),
    }
}

/// Three cells sharing one LINEST formula report successive coefficients
/// of a quadratic fit
#[test]
fn test_regression_coefficients() {
    let mut source = MemorySource::new();
    // y = x^2 + 1 over x = 0..4
    for (i, x) in (0..5).enumerate() {
        let x = x as f64;
        source.set_value(&format!("A{}", i + 1), x * x + 1.0).unwrap();
        source.set_value(&format!("B{}", i + 1), x).unwrap();
    }
    for col in ["D", "E", "F"] {
        source.set_formula(&format!("{col}1"), "=LINEST(A1:A5,B1:B5)").unwrap();
    }

    let expected = [1.0, 0.0, 1.0]; // x^2, x, constant
    for (col, want) in ["D", "E", "F"].iter().zip(expected) {
        let addr = format!("{col}1");
        let mut engine = Engine::compile(&source, &addr, None).unwrap();
        let got = number(&mut engine, &addr);
        assert!(
            (got - want).abs() < 1e-9,
            "{addr}: expected {want}, got {got}"
        );
    }
}

/// Sheet-qualified references join graphs across sheets
#[test]
fn test_cross_sheet_references() {
    let mut source = MemorySource::new();
    source.set_value("Data!A1", 21.0).unwrap();
    source.set_formula("B1", "=Data!A1*2").unwrap();
    let mut engine = Engine::compile(&source, "B1", None).unwrap();

    assert_eq!(number(&mut engine, "B1"), 42.0);
    assert_eq!(number(&mut engine, "Data!A1"), 21.0);
}

/// A 2-D range evaluates to a row-major array
#[test]
fn test_range_evaluation_shape() {
    let mut source = MemorySource::new();
    source.set_value("A1", 1.0).unwrap();
    source.set_value("B1", 2.0).unwrap();
    source.set_value("A2", 3.0).unwrap();
    source.set_value("B2", 4.0).unwrap();
    source.set_formula("D1", "=SUM(A1:B2)").unwrap();
    let mut engine = Engine::compile(&source, "D1", None).unwrap();

    assert_eq!(number(&mut engine, "D1"), 10.0);
    assert_eq!(
        engine.evaluate("A1:B2").unwrap(),
        Value::Array(vec![
            vec![Value::Number(1.0), Value::Number(2.0)],
            vec![Value::Number(3.0), Value::Number(4.0)],
        ])
    );
}
