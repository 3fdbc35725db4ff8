//! Shunting-yard parser
//!
//! Converts the infix token stream into postfix order under a fixed
//! Excel-style precedence table, with the vararg-function extension: two
//! parallel stacks track whether the current call frame has produced a value
//! (`were_values`) and the running argument count per frame (`arg_counts`),
//! so elided and trailing arguments are counted correctly.
//!
//! Every operator resolves left-associatively, including `^` (pop while the
//! incoming operator's precedence is less than or equal to the top of the
//! stack). This matches the engine's originating dialect rather than
//! Excel's right-associative exponent.

use crate::error::{EngineError, EngineResult};
use crate::tokenizer::{Token, TokenKind, TokenSubkind};

/// One item of the postfix output sequence
#[derive(Debug, Clone, PartialEq)]
pub enum PostfixItem {
    Operand(Token),
    Prefix(Token),
    Postfix(Token),
    Infix(Token),
    /// Function marker with its final argument count
    Func { name: String, arity: usize },
}

/// Operator precedence, highest binds tightest
///
/// `:` / union 8, prefix minus 7, `%` 6, `^` 5, `*` `/` 4, `+` `-` 3,
/// `&` 2, comparisons 1.
fn precedence(text: &str, prefix: bool) -> u8 {
    if prefix {
        // unary minus sits under its own key, distinct from binary minus
        return 7;
    }
    match text {
        ":" | " " | "," => 8,
        "%" => 6,
        "^" => 5,
        "*" | "/" => 4,
        "+" | "-" => 3,
        "&" => 2,
        _ => 1, // comparisons
    }
}

/// Operator/bracket stack entries
#[derive(Debug)]
enum StackEntry {
    /// Pending operator (prefix or infix) with its precedence
    Op { token: Token, prec: u8 },
    /// Open function-call frame
    FuncStart { name: String },
    /// Open parenthesized group
    GroupStart,
}

fn mismatched() -> EngineError {
    EngineError::Parse("mismatched or misplaced parentheses".into())
}

/// Convert a token sequence to postfix order
pub fn to_postfix(tokens: &[Token]) -> EngineResult<Vec<PostfixItem>> {
    let mut output: Vec<PostfixItem> = Vec::new();
    let mut stack: Vec<StackEntry> = Vec::new();
    let mut were_values: Vec<bool> = Vec::new();
    let mut arg_counts: Vec<usize> = Vec::new();

    for token in tokens {
        match (token.kind, token.subkind) {
            (TokenKind::Operand, _) => {
                output.push(PostfixItem::Operand(token.clone()));
                if let Some(top) = were_values.last_mut() {
                    *top = true;
                }
            }

            (TokenKind::Function, TokenSubkind::Start) => {
                // the call will produce a value for the enclosing frame
                if let Some(top) = were_values.last_mut() {
                    *top = true;
                }
                stack.push(StackEntry::FuncStart {
                    name: token.text.clone(),
                });
                were_values.push(false);
                arg_counts.push(0);
            }

            (TokenKind::Subexpression, TokenSubkind::Start) => {
                stack.push(StackEntry::GroupStart);
            }

            (TokenKind::ArgSeparator, _) => {
                pop_until_frame_start(&mut stack, &mut output)?;
                let completed = were_values.last_mut().ok_or_else(mismatched)?;
                if *completed {
                    *arg_counts.last_mut().ok_or_else(mismatched)? += 1;
                }
                *completed = false;
            }

            (TokenKind::OperatorPrefix, _) => {
                stack.push(StackEntry::Op {
                    token: token.clone(),
                    prec: precedence(&token.text, true),
                });
            }

            (TokenKind::OperatorInfix, _) => {
                let prec = precedence(&token.text, false);
                pop_ops_while(&mut stack, &mut output, prec);
                stack.push(StackEntry::Op {
                    token: token.clone(),
                    prec,
                });
            }

            (TokenKind::OperatorPostfix, _) => {
                // applies to the just-completed operand; only tighter-binding
                // pending operators must flush first
                pop_ops_while(&mut stack, &mut output, precedence(&token.text, false));
                output.push(PostfixItem::Postfix(token.clone()));
            }

            (TokenKind::Function | TokenKind::Subexpression, TokenSubkind::Stop) => {
                pop_until_frame_start(&mut stack, &mut output)?;
                match stack.pop() {
                    Some(StackEntry::FuncStart { name }) => {
                        let mut arity = arg_counts.pop().ok_or_else(mismatched)?;
                        if were_values.pop().ok_or_else(mismatched)? {
                            arity += 1;
                        }
                        if let Some(top) = were_values.last_mut() {
                            *top = true;
                        }
                        output.push(PostfixItem::Func { name, arity });
                    }
                    Some(StackEntry::GroupStart) => {}
                    _ => return Err(mismatched()),
                }
            }

            _ => {
                return Err(EngineError::Parse(format!(
                    "unexpected token '{}' at offset {}",
                    token.text, token.pos
                )))
            }
        }
    }

    // flush remaining operators; a leftover open frame is a parse failure
    while let Some(entry) = stack.pop() {
        match entry {
            StackEntry::Op { token, .. } => output.push(op_item(token)),
            StackEntry::FuncStart { .. } | StackEntry::GroupStart => return Err(mismatched()),
        }
    }

    Ok(output)
}

/// Pop stacked operators with precedence >= `prec` into the output
fn pop_ops_while(stack: &mut Vec<StackEntry>, output: &mut Vec<PostfixItem>, prec: u8) {
    while let Some(StackEntry::Op { prec: top, .. }) = stack.last() {
        if *top < prec {
            break;
        }
        if let Some(StackEntry::Op { token, .. }) = stack.pop() {
            output.push(op_item(token));
        }
    }
}

/// Pop and emit operators down to the nearest open call/group frame,
/// leaving the frame marker on the stack
fn pop_until_frame_start(
    stack: &mut Vec<StackEntry>,
    output: &mut Vec<PostfixItem>,
) -> EngineResult<()> {
    loop {
        match stack.last() {
            Some(StackEntry::Op { .. }) => {
                if let Some(StackEntry::Op { token, .. }) = stack.pop() {
                    output.push(op_item(token));
                }
            }
            Some(StackEntry::FuncStart { .. } | StackEntry::GroupStart) => return Ok(()),
            None => return Err(mismatched()),
        }
    }
}

fn op_item(token: Token) -> PostfixItem {
    match token.kind {
        TokenKind::OperatorPrefix => PostfixItem::Prefix(token),
        _ => PostfixItem::Infix(token),
    }
}
