//! Evaluated cell values

use std::fmt;

/// The result of evaluating a cell, range, or expression
///
/// All numbers are stored as `f64`. A range or array formula evaluates to
/// `Array` (outer `Vec` is rows). `Empty` is a blank cell; most numeric
/// contexts coerce it to 0, while ordering comparisons treat it as +∞
/// (handled by the engine, not here).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Blank cell
    Empty,
    /// Numeric value
    Number(f64),
    /// Text value
    Text(String),
    /// Boolean value (TRUE/FALSE)
    Logical(bool),
    /// Rectangular block of values, row-major
    Array(Vec<Vec<Value>>),
}

impl Value {
    /// Coerce to a number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Logical(true) => Some(1.0),
            Value::Logical(false) => Some(0.0),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Empty => Some(0.0),
            Value::Array(_) => None,
        }
    }

    /// Coerce to a boolean, if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Empty => Some(false),
            Value::Text(s) => match s.to_uppercase().as_str() {
                "TRUE" => Some(true),
                "FALSE" => Some(false),
                _ => None,
            },
            Value::Array(_) => None,
        }
    }

    /// Render as display text (integers without a trailing `.0`)
    pub fn as_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Text(s) => s.clone(),
            Value::Logical(true) => "TRUE".to_string(),
            Value::Logical(false) => "FALSE".to_string(),
            Value::Array(_) => "#ARRAY".to_string(),
        }
    }

    /// True for blank cells
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// True for numeric values
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Visit every scalar inside this value, descending into arrays
    pub fn for_each_scalar<'a>(&'a self, f: &mut impl FnMut(&'a Value)) {
        match self {
            Value::Array(rows) => {
                for row in rows {
                    for v in row {
                        v.for_each_scalar(f);
                    }
                }
            }
            other => f(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Logical(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn number_coercion() {
        assert_eq!(Value::Number(2.5).as_number(), Some(2.5));
        assert_eq!(Value::Logical(true).as_number(), Some(1.0));
        assert_eq!(Value::Text(" 42 ".into()).as_number(), Some(42.0));
        assert_eq!(Value::Empty.as_number(), Some(0.0));
        assert_eq!(Value::Text("abc".into()).as_number(), None);
    }

    #[test]
    fn bool_coercion() {
        assert_eq!(Value::Number(0.0).as_bool(), Some(false));
        assert_eq!(Value::Number(-3.0).as_bool(), Some(true));
        assert_eq!(Value::Text("true".into()).as_bool(), Some(true));
        assert_eq!(Value::Empty.as_bool(), Some(false));
    }

    #[test]
    fn display_text() {
        assert_eq!(Value::Number(3.0).as_text(), "3");
        assert_eq!(Value::Number(3.25).as_text(), "3.25");
        assert_eq!(Value::Logical(false).as_text(), "FALSE");
        assert_eq!(Value::Empty.as_text(), "");
    }

    #[test]
    fn scalar_visitor_flattens_arrays() {
        let v = Value::Array(vec![
            vec![Value::Number(1.0), Value::Number(2.0)],
            vec![Value::Number(3.0)],
        ]);
        let mut sum = 0.0;
        v.for_each_scalar(&mut |s| {
            if let Value::Number(n) = s {
                sum += n;
            }
        });
        assert_eq!(sum, 6.0);
    }
}
