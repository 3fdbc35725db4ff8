//! Built-in functions
//!
//! Every function, including the specially-lowered forms, lives in one
//! registered table mapping name -> { arity rule, lowering strategy, eval
//! implementation }. The compiler consults the table uniformly instead of
//! branching on names.

use crate::error::{EngineError, EngineResult};
use ahash::AHashMap;
use cellgraph_core::Value;
use once_cell::sync::Lazy;

/// Evaluation signature for ordinary (non-special-form) functions
pub type EvalFn = fn(&[Value]) -> EngineResult<Value>;

/// How the compiler lowers a call to this function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lowering {
    /// Evaluate arguments, then apply the registered eval fn
    Default,
    /// Zero-argument constant
    Constant,
    /// Two arguments exchanged before the eval fn (host argument order)
    SwapTwo,
    /// Inline conditional; 2- or 3-argument forms only
    Conditional,
    /// Boolean reduction: all scalars truthy
    AllOf,
    /// Boolean reduction: any scalar truthy
    AnyOf,
    /// Array literal rows
    ArrayLiteral,
    /// One row of an array literal
    ArrayRow,
    /// Regression coefficient selection with sibling-shape inference
    Regression,
}

/// A registered function
pub struct FunctionDef {
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    pub lowering: Lowering,
    pub eval: Option<EvalFn>,
}

impl FunctionDef {
    /// Reject argument counts outside this function's supported cases
    pub fn check_arity(&self, actual: usize) -> EngineResult<()> {
        if actual < self.min_args || self.max_args.is_some_and(|max| actual > max) {
            return Err(EngineError::UnsupportedArity {
                function: self.name.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        // special forms
        registry.special("IF", 2, Some(3), Lowering::Conditional);
        registry.special("AND", 1, None, Lowering::AllOf);
        registry.special("OR", 1, None, Lowering::AnyOf);
        // constants fold at compile time through their eval fn
        registry.functions.insert(
            "PI",
            FunctionDef {
                name: "PI",
                min_args: 0,
                max_args: Some(0),
                lowering: Lowering::Constant,
                eval: Some(fn_pi),
            },
        );
        registry.special("ARRAY", 1, None, Lowering::ArrayLiteral);
        registry.special("ARRAYROW", 1, None, Lowering::ArrayRow);
        registry.special("LINEST", 1, Some(4), Lowering::Regression);

        // ATAN2's formula-level argument order is (x, y); the host order is
        // (y, x), so the compiler swaps before fn_atan2 runs
        registry.functions.insert(
            "ATAN2",
            FunctionDef {
                name: "ATAN2",
                min_args: 2,
                max_args: Some(2),
                lowering: Lowering::SwapTwo,
                eval: Some(fn_atan2),
            },
        );

        registry.ordinary("SUM", 1, None, fn_sum);
        registry.ordinary("AVERAGE", 1, None, fn_average);
        registry.ordinary("MIN", 1, None, fn_min);
        registry.ordinary("MAX", 1, None, fn_max);
        registry.ordinary("COUNT", 1, None, fn_count);
        registry.ordinary("ABS", 1, Some(1), fn_abs);
        registry.ordinary("SQRT", 1, Some(1), fn_sqrt);
        registry.ordinary("EXP", 1, Some(1), fn_exp);
        registry.ordinary("LN", 1, Some(1), fn_ln);
        registry.ordinary("LOG", 1, Some(2), fn_log);
        registry.ordinary("LOG10", 1, Some(1), fn_log10);
        registry.ordinary("POWER", 2, Some(2), fn_power);
        registry.ordinary("MOD", 2, Some(2), fn_mod);
        registry.ordinary("INT", 1, Some(1), fn_int);
        registry.ordinary("ROUND", 1, Some(2), fn_round);
        registry.ordinary("SIN", 1, Some(1), fn_sin);
        registry.ordinary("COS", 1, Some(1), fn_cos);
        registry.ordinary("TAN", 1, Some(1), fn_tan);
        registry.ordinary("NOT", 1, Some(1), fn_not);
        registry.ordinary("CONCATENATE", 1, None, fn_concatenate);

        registry
    }

    fn ordinary(&mut self, name: &'static str, min: usize, max: Option<usize>, eval: EvalFn) {
        self.functions.insert(
            name,
            FunctionDef {
                name,
                min_args: min,
                max_args: max,
                lowering: Lowering::Default,
                eval: Some(eval),
            },
        );
    }

    fn special(&mut self, name: &'static str, min: usize, max: Option<usize>, lowering: Lowering) {
        self.functions.insert(
            name,
            FunctionDef {
                name,
                min_args: min,
                max_args: max,
                lowering,
                eval: None,
            },
        );
    }

    /// Look up a function by (case-insensitive) name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_uppercase().as_str())
    }
}

static REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// The global function registry
pub fn registry() -> &'static FunctionRegistry {
    &REGISTRY
}

// === numeric helpers ===

/// Collect every numeric scalar across the arguments, descending into arrays
fn numbers_in(args: &[Value]) -> Vec<f64> {
    let mut out = Vec::new();
    for arg in args {
        arg.for_each_scalar(&mut |v| {
            if let Value::Number(n) = v {
                out.push(*n);
            }
        });
    }
    out
}

fn single_number(args: &[Value], name: &str) -> EngineResult<f64> {
    args[0]
        .as_number()
        .ok_or_else(|| EngineError::Argument(format!("{name} expects a number")))
}

// === implementations ===

fn fn_sum(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(numbers_in(args).iter().sum()))
}

fn fn_average(args: &[Value]) -> EngineResult<Value> {
    let numbers = numbers_in(args);
    if numbers.is_empty() {
        return Err(EngineError::Argument("AVERAGE of no numeric values".into()));
    }
    Ok(Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64))
}

fn fn_min(args: &[Value]) -> EngineResult<Value> {
    let min = numbers_in(args).into_iter().fold(f64::INFINITY, f64::min);
    Ok(Value::Number(if min.is_finite() { min } else { 0.0 }))
}

fn fn_max(args: &[Value]) -> EngineResult<Value> {
    let max = numbers_in(args).into_iter().fold(f64::NEG_INFINITY, f64::max);
    Ok(Value::Number(if max.is_finite() { max } else { 0.0 }))
}

fn fn_count(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(numbers_in(args).len() as f64))
}

fn fn_abs(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(single_number(args, "ABS")?.abs()))
}

fn fn_sqrt(args: &[Value]) -> EngineResult<Value> {
    let n = single_number(args, "SQRT")?;
    if n < 0.0 {
        return Err(EngineError::Argument("SQRT of a negative number".into()));
    }
    Ok(Value::Number(n.sqrt()))
}

fn fn_exp(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(single_number(args, "EXP")?.exp()))
}

fn fn_ln(args: &[Value]) -> EngineResult<Value> {
    let n = single_number(args, "LN")?;
    if n <= 0.0 {
        return Err(EngineError::Argument("LN of a non-positive number".into()));
    }
    Ok(Value::Number(n.ln()))
}

fn fn_log(args: &[Value]) -> EngineResult<Value> {
    let n = single_number(args, "LOG")?;
    let base = match args.get(1) {
        Some(v) => v
            .as_number()
            .ok_or_else(|| EngineError::Argument("LOG base must be a number".into()))?,
        None => 10.0,
    };
    if n <= 0.0 || base <= 0.0 || base == 1.0 {
        return Err(EngineError::Argument("LOG domain error".into()));
    }
    Ok(Value::Number(n.log(base)))
}

fn fn_log10(args: &[Value]) -> EngineResult<Value> {
    let n = single_number(args, "LOG10")?;
    if n <= 0.0 {
        return Err(EngineError::Argument("LOG10 of a non-positive number".into()));
    }
    Ok(Value::Number(n.log10()))
}

fn fn_power(args: &[Value]) -> EngineResult<Value> {
    let base = single_number(args, "POWER")?;
    let exp = args[1]
        .as_number()
        .ok_or_else(|| EngineError::Argument("POWER exponent must be a number".into()))?;
    Ok(Value::Number(base.powf(exp)))
}

fn fn_mod(args: &[Value]) -> EngineResult<Value> {
    let a = single_number(args, "MOD")?;
    let b = args[1]
        .as_number()
        .ok_or_else(|| EngineError::Argument("MOD divisor must be a number".into()))?;
    if b == 0.0 {
        return Err(EngineError::Argument("MOD division by zero".into()));
    }
    // result takes the sign of the divisor
    Ok(Value::Number(a - b * (a / b).floor()))
}

fn fn_int(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(single_number(args, "INT")?.floor()))
}

fn fn_round(args: &[Value]) -> EngineResult<Value> {
    let n = single_number(args, "ROUND")?;
    let digits = match args.get(1) {
        Some(v) => v
            .as_number()
            .ok_or_else(|| EngineError::Argument("ROUND digits must be a number".into()))?
            as i32,
        None => 0,
    };
    let factor = 10f64.powi(digits);
    Ok(Value::Number((n * factor).round() / factor))
}

fn fn_sin(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(single_number(args, "SIN")?.sin()))
}

fn fn_cos(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(single_number(args, "COS")?.cos()))
}

fn fn_tan(args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(single_number(args, "TAN")?.tan()))
}

/// Arguments arrive already swapped to host order (y, x)
fn fn_atan2(args: &[Value]) -> EngineResult<Value> {
    let y = single_number(args, "ATAN2")?;
    let x = args[1]
        .as_number()
        .ok_or_else(|| EngineError::Argument("ATAN2 expects numbers".into()))?;
    Ok(Value::Number(y.atan2(x)))
}

fn fn_pi(_args: &[Value]) -> EngineResult<Value> {
    Ok(Value::Number(std::f64::consts::PI))
}

fn fn_not(args: &[Value]) -> EngineResult<Value> {
    let b = args[0]
        .as_bool()
        .ok_or_else(|| EngineError::Argument("NOT expects a boolean".into()))?;
    Ok(Value::Logical(!b))
}

fn fn_concatenate(args: &[Value]) -> EngineResult<Value> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.as_text());
    }
    Ok(Value::Text(out))
}

// === regression ===

/// Least-squares polynomial fit, returning coefficients highest degree
/// first (the order the originating dialect's LINEST reports them)
pub fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> EngineResult<Vec<f64>> {
    if xs.len() != ys.len() {
        return Err(EngineError::Argument(
            "LINEST known_ys and known_xs must have the same length".into(),
        ));
    }
    let n = degree + 1;
    if xs.len() < n {
        return Err(EngineError::Argument(format!(
            "LINEST needs at least {n} points for degree {degree}"
        )));
    }

    // normal equations: (X^T X) c = X^T y, with X the Vandermonde matrix
    let mut ata = vec![vec![0.0f64; n]; n];
    let mut aty = vec![0.0f64; n];
    for (&x, &y) in xs.iter().zip(ys) {
        let mut powers = vec![1.0f64; 2 * n - 1];
        for i in 1..powers.len() {
            powers[i] = powers[i - 1] * x;
        }
        for i in 0..n {
            for j in 0..n {
                ata[i][j] += powers[i + j];
            }
            aty[i] += powers[i] * y;
        }
    }

    let mut coeffs = solve_linear(ata, aty)?;
    // solved lowest-degree first; report highest first
    coeffs.reverse();
    Ok(coeffs)
}

/// Gaussian elimination with partial pivoting
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> EngineResult<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(EngineError::Argument(
                "LINEST system is singular (degenerate x values)".into(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for col in (row + 1)..n {
            sum -= a[row][col] * x[col];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}
