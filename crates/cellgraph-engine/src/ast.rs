//! Expression tree built from the parser's postfix output

use crate::error::{EngineError, EngineResult};
use crate::parser::PostfixItem;
use crate::tokenizer::TokenSubkind;

/// Binary operators at the formula level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `:` joining two endpoint references
    Range,
    /// comma/space joining regions of a union group
    Union,
}

impl BinaryOp {
    fn from_text(text: &str) -> Option<Self> {
        Some(match text {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "^" => BinaryOp::Pow,
            "&" => BinaryOp::Concat,
            "=" => BinaryOp::Eq,
            "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            ":" => BinaryOp::Range,
            " " | "," => BinaryOp::Union,
            _ => return None,
        })
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Prefix minus
    Neg,
    /// Postfix percent (divide by 100)
    Percent,
}

/// A parsed formula expression
///
/// Children are held in ordered `Vec`s; the vector index is the operand's
/// positional index, so argument order is reproducible. Identical
/// subexpressions stay duplicated (a tree, not a shared DAG).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Logical(bool),
    /// Spreadsheet error literal kept verbatim (#REF!, #DIV/0!, ...)
    ErrorLit(String),
    /// Raw reference text, possibly sheet-qualified or a `:` range;
    /// resolved against the referencing cell during compilation
    Reference(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// Build a rooted expression tree from a postfix sequence
///
/// Binary operators pop two operands, unary operators pop one, a function
/// marker pops exactly `arity` operands in call order. The last-pushed node
/// is the root.
pub fn build_tree(postfix: Vec<PostfixItem>) -> EngineResult<Expr> {
    let mut stack: Vec<Expr> = Vec::new();

    for item in postfix {
        match item {
            PostfixItem::Operand(token) => {
                let expr = match token.subkind {
                    TokenSubkind::Number => {
                        let n = token.text.parse::<f64>().map_err(|_| {
                            EngineError::Parse(format!("invalid number literal '{}'", token.text))
                        })?;
                        Expr::Number(n)
                    }
                    TokenSubkind::Text => Expr::Text(token.text),
                    TokenSubkind::Logical => Expr::Logical(token.text == "TRUE"),
                    TokenSubkind::ErrorLit => Expr::ErrorLit(token.text),
                    _ => Expr::Reference(token.text),
                };
                stack.push(expr);
            }

            PostfixItem::Prefix(token) => {
                let operand = pop(&mut stack, &token.text)?;
                stack.push(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                });
            }

            PostfixItem::Postfix(token) => {
                let operand = pop(&mut stack, &token.text)?;
                stack.push(Expr::Unary {
                    op: UnaryOp::Percent,
                    operand: Box::new(operand),
                });
            }

            PostfixItem::Infix(token) => {
                let op = BinaryOp::from_text(&token.text).ok_or_else(|| {
                    EngineError::Parse(format!("unknown operator '{}'", token.text))
                })?;
                let right = pop(&mut stack, &token.text)?;
                let left = pop(&mut stack, &token.text)?;
                stack.push(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }

            PostfixItem::Func { name, arity } => {
                if stack.len() < arity {
                    return Err(EngineError::Parse(format!(
                        "not enough arguments for {name}"
                    )));
                }
                let args = stack.split_off(stack.len() - arity);
                stack.push(Expr::Call { name, args });
            }
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(root), true) => Ok(root),
        _ => Err(EngineError::Parse("malformed expression".into())),
    }
}

fn pop(stack: &mut Vec<Expr>, op: &str) -> EngineResult<Expr> {
    stack
        .pop()
        .ok_or_else(|| EngineError::Parse(format!("missing operand for '{op}'")))
}

/// Parse formula text all the way to an expression tree
pub fn parse_formula(formula: &str) -> EngineResult<Expr> {
    let tokens = crate::tokenizer::tokenize(formula);
    if tokens.is_empty() {
        return Err(EngineError::Parse("empty formula".into()));
    }
    build_tree(crate::parser::to_postfix(&tokens)?)
}
