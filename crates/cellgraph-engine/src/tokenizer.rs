//! Formula tokenizer
//!
//! Lexes formula text into a flat sequence of typed tokens. Each token
//! carries enough kind/subkind information for the parser to disambiguate
//! function-call frames from parenthesized subexpressions, prefix minus from
//! binary minus, and operand subtypes. No semantic validation happens here;
//! malformed nesting surfaces later as a mismatched-parentheses parse error.
//!
//! Array literals `{1,2;3,4}` are lowered to ARRAY/ARRAYROW function-call
//! frames so the parser can treat them as ordinary vararg calls.

/// A single lexed token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub subkind: TokenSubkind,
    /// Original (for references) or normalized (for literals) text
    pub text: String,
    /// Byte offset of the token start in the stripped formula
    pub pos: usize,
}

impl Token {
    fn new(kind: TokenKind, subkind: TokenSubkind, text: impl Into<String>, pos: usize) -> Self {
        Self {
            kind,
            subkind,
            text: text.into(),
            pos,
        }
    }

    /// True when this token completes a value (an operand, a closing
    /// bracket, or a postfix operator)
    pub fn ends_value(&self) -> bool {
        matches!(self.kind, TokenKind::Operand | TokenKind::OperatorPostfix)
            || self.subkind == TokenSubkind::Stop
    }
}

/// Token category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal or reference
    Operand,
    /// Function-call frame marker (Start carries the name)
    Function,
    /// Parenthesized-group frame marker
    Subexpression,
    /// Comma between function arguments
    ArgSeparator,
    /// Unary prefix operator (minus)
    OperatorPrefix,
    /// Binary infix operator
    OperatorInfix,
    /// Unary postfix operator (percent)
    OperatorPostfix,
}

/// Token subcategory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubkind {
    None,
    /// Opens a function or subexpression frame
    Start,
    /// Closes a function or subexpression frame
    Stop,
    /// Numeric literal
    Number,
    /// String literal (quotes stripped, `""` unescaped)
    Text,
    /// TRUE/FALSE literal
    Logical,
    /// Spreadsheet error literal (#REF!, #DIV/0!, ...)
    ErrorLit,
    /// Cell or range reference, possibly sheet-qualified
    Reference,
    /// Arithmetic operator
    Math,
    /// Text concatenation (&)
    Concat,
    /// Comparison operator
    Comparison,
    /// Range/union operator (:, comma or space between regions)
    Union,
}

/// Open bracket frames tracked while lexing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Function,
    Group,
    Array,
    ArrayRow,
}

/// Tokenize a formula, stripping an optional leading `=`
pub fn tokenize(formula: &str) -> Vec<Token> {
    let stripped = formula.trim();
    let stripped = stripped.strip_prefix('=').unwrap_or(stripped);
    Tokenizer::new(stripped).run()
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    frames: Vec<Frame>,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            frames: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.handle_whitespace();
            if self.is_at_end() {
                break;
            }
            self.scan_token();
        }
        self.tokens
    }

    /// Skip whitespace, emitting a union operator when it separates two
    /// value-producing regions inside a parenthesized union group; anywhere
    /// else the space is plain layout and adjacent values are left for the
    /// parser to reject
    fn handle_whitespace(&mut self) {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
        if self.pos == start {
            return;
        }
        if !matches!(self.frames.last(), Some(Frame::Group)) {
            return;
        }
        let prev_ends_value = self.tokens.last().is_some_and(Token::ends_value);
        let next_starts_value = self.peek().is_some_and(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '$' | '\'' | '"' | '(' | '{' | '.' | '#')
        });
        if prev_ends_value && next_starts_value {
            self.push(TokenKind::OperatorInfix, TokenSubkind::Union, " ", start);
        }
    }

    fn scan_token(&mut self) {
        let start = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => return,
        };

        match c {
            '"' => self.scan_string(start),
            '\'' => self.scan_quoted_sheet_reference(start),
            '#' => self.scan_error_literal(start),
            '{' => {
                self.advance();
                self.frames.push(Frame::Array);
                self.push(TokenKind::Function, TokenSubkind::Start, "ARRAY", start);
                self.frames.push(Frame::ArrayRow);
                self.push(TokenKind::Function, TokenSubkind::Start, "ARRAYROW", start);
            }
            ';' => {
                self.advance();
                // row separator: close the current ARRAYROW, open the next
                self.frames.pop();
                self.push(TokenKind::Function, TokenSubkind::Stop, "", start);
                self.push(TokenKind::ArgSeparator, TokenSubkind::None, ";", start);
                self.frames.push(Frame::ArrayRow);
                self.push(TokenKind::Function, TokenSubkind::Start, "ARRAYROW", start);
            }
            '}' => {
                self.advance();
                self.frames.pop();
                self.push(TokenKind::Function, TokenSubkind::Stop, "", start);
                self.frames.pop();
                self.push(TokenKind::Function, TokenSubkind::Stop, "", start);
            }
            '(' => {
                self.advance();
                self.frames.push(Frame::Group);
                self.push(TokenKind::Subexpression, TokenSubkind::Start, "(", start);
            }
            ')' => {
                self.advance();
                match self.frames.pop() {
                    Some(Frame::Group) => {
                        self.push(TokenKind::Subexpression, TokenSubkind::Stop, ")", start)
                    }
                    // unbalanced input still lexes; the parser rejects it
                    _ => self.push(TokenKind::Function, TokenSubkind::Stop, ")", start),
                }
            }
            ',' => {
                self.advance();
                match self.frames.last() {
                    Some(Frame::Function | Frame::ArrayRow) => {
                        self.push(TokenKind::ArgSeparator, TokenSubkind::None, ",", start)
                    }
                    // comma between regions of a union group
                    _ => self.push(TokenKind::OperatorInfix, TokenSubkind::Union, ",", start),
                }
            }
            '+' | '*' | '/' | '^' => {
                self.advance();
                self.push(TokenKind::OperatorInfix, TokenSubkind::Math, c, start);
            }
            '-' => {
                self.advance();
                if self.tokens.last().is_some_and(Token::ends_value) {
                    self.push(TokenKind::OperatorInfix, TokenSubkind::Math, "-", start);
                } else {
                    self.push(TokenKind::OperatorPrefix, TokenSubkind::Math, "-", start);
                }
            }
            '%' => {
                self.advance();
                self.push(TokenKind::OperatorPostfix, TokenSubkind::Math, "%", start);
            }
            '&' => {
                self.advance();
                self.push(TokenKind::OperatorInfix, TokenSubkind::Concat, "&", start);
            }
            ':' => {
                self.advance();
                self.push(TokenKind::OperatorInfix, TokenSubkind::Union, ":", start);
            }
            '=' => {
                self.advance();
                self.push(TokenKind::OperatorInfix, TokenSubkind::Comparison, "=", start);
            }
            '<' => {
                self.advance();
                let text = match self.peek() {
                    Some('=') => {
                        self.advance();
                        "<="
                    }
                    Some('>') => {
                        self.advance();
                        "<>"
                    }
                    _ => "<",
                };
                self.push(TokenKind::OperatorInfix, TokenSubkind::Comparison, text, start);
            }
            '>' => {
                self.advance();
                let text = if self.peek() == Some('=') {
                    self.advance();
                    ">="
                } else {
                    ">"
                };
                self.push(TokenKind::OperatorInfix, TokenSubkind::Comparison, text, start);
            }
            c if c.is_ascii_digit() || c == '.' => self.scan_number(start),
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' || c == '[' => {
                self.scan_identifier(start)
            }
            _ => {
                // unrecognized character; skip so lexing terminates, the
                // parser reports the malformed expression
                self.advance();
            }
        }
    }

    fn scan_string(&mut self, start: usize) {
        self.advance(); // opening quote
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '"' {
                if self.peek_at(1) == Some('"') {
                    text.push('"');
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    break;
                }
            } else {
                text.push(c);
                self.advance();
            }
        }
        self.push(TokenKind::Operand, TokenSubkind::Text, text, start);
    }

    /// `'My Sheet'!B5` and friends: quoted sheet qualifier plus address
    fn scan_quoted_sheet_reference(&mut self, start: usize) {
        self.advance(); // opening quote
        while let Some(c) = self.peek() {
            self.advance();
            if c == '\'' {
                if self.peek() == Some('\'') {
                    self.advance(); // escaped quote inside the name
                } else {
                    break;
                }
            }
        }
        if self.peek() == Some('!') {
            self.advance();
            self.consume_reference_chunk();
            self.consume_range_tail();
        }
        let text = self.input[start..self.pos].to_string();
        self.push(TokenKind::Operand, TokenSubkind::Reference, text, start);
    }

    fn scan_error_literal(&mut self, start: usize) {
        self.advance(); // '#'
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '!' | '/' | '?'))
        {
            self.advance();
        }
        let text = self.input[start..self.pos].to_string();
        self.push(TokenKind::Operand, TokenSubkind::ErrorLit, text, start);
    }

    fn scan_number(&mut self, start: usize) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek().is_some_and(|c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = self.input[start..self.pos].to_string();
        self.push(TokenKind::Operand, TokenSubkind::Number, text, start);
    }

    /// Function names, booleans, and bare references (optionally
    /// sheet/workbook-qualified, optionally a `:`-joined range)
    fn scan_identifier(&mut self, start: usize) {
        self.consume_reference_chunk();

        // sheet or workbook qualifier
        if self.peek() == Some('!') {
            self.advance();
            self.consume_reference_chunk();
        }
        self.consume_range_tail();

        let text = &self.input[start..self.pos];

        if self.peek() == Some('(') {
            self.advance();
            self.frames.push(Frame::Function);
            let name = text.to_uppercase();
            self.push(TokenKind::Function, TokenSubkind::Start, name, start);
            return;
        }

        let upper = text.to_uppercase();
        if upper == "TRUE" || upper == "FALSE" {
            self.push(TokenKind::Operand, TokenSubkind::Logical, upper, start);
        } else {
            self.push(TokenKind::Operand, TokenSubkind::Reference, text, start);
        }
    }

    /// One address-ish chunk: alphanumerics, `_`, `$`, `.`, and `[..]`
    /// bracket groups (workbook qualifiers, R1C1 offsets)
    fn consume_reference_chunk(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.') {
                self.advance();
            } else if c == '[' {
                while self.peek().is_some_and(|c| c != ']') {
                    self.advance();
                }
                self.advance(); // ']'
            } else {
                break;
            }
        }
    }

    /// Fold `:B15` into the current reference token when present
    fn consume_range_tail(&mut self) {
        if self.peek() == Some(':')
            && self
                .peek_at(1)
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '$' || c == '[')
        {
            self.advance();
            self.consume_reference_chunk();
        }
    }

    fn push(&mut self, kind: TokenKind, subkind: TokenSubkind, text: impl Into<String>, pos: usize) {
        self.tokens.push(Token::new(kind, subkind, text, pos));
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(formula: &str) -> Vec<(TokenKind, TokenSubkind, String)> {
        tokenize(formula)
            .into_iter()
            .map(|t| (t.kind, t.subkind, t.text))
            .collect()
    }

    #[test]
    fn lexes_arithmetic() {
        let tokens = kinds("=1+2*3");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Operand, TokenSubkind::Number, "1".into()),
                (TokenKind::OperatorInfix, TokenSubkind::Math, "+".into()),
                (TokenKind::Operand, TokenSubkind::Number, "2".into()),
                (TokenKind::OperatorInfix, TokenSubkind::Math, "*".into()),
                (TokenKind::Operand, TokenSubkind::Number, "3".into()),
            ]
        );
    }

    #[test]
    fn distinguishes_prefix_minus() {
        let tokens = kinds("=-3--4");
        assert_eq!(tokens[0].0, TokenKind::OperatorPrefix);
        assert_eq!(tokens[2].0, TokenKind::OperatorInfix);
        assert_eq!(tokens[3].0, TokenKind::OperatorPrefix);
    }

    #[test]
    fn lexes_function_call_with_range() {
        let tokens = kinds("=SUM(B5:B15)");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Function, TokenSubkind::Start, "SUM".into()),
                (TokenKind::Operand, TokenSubkind::Reference, "B5:B15".into()),
                (TokenKind::Function, TokenSubkind::Stop, ")".into()),
            ]
        );
    }

    #[test]
    fn lexes_sheet_qualified_reference() {
        let tokens = kinds("=Data!$A$1");
        assert_eq!(tokens[0].2, "Data!$A$1");
        assert_eq!(tokens[0].1, TokenSubkind::Reference);

        let tokens = kinds("='My Sheet'!A1:B2");
        assert_eq!(tokens[0].2, "'My Sheet'!A1:B2");
    }

    #[test]
    fn lexes_string_with_escaped_quotes() {
        let tokens = kinds("=\"he said \"\"hi\"\"\"");
        assert_eq!(tokens[0].2, "he said \"hi\"");
        assert_eq!(tokens[0].1, TokenSubkind::Text);
    }

    #[test]
    fn lexes_booleans_and_errors() {
        let tokens = kinds("=TRUE<>#REF!");
        assert_eq!(tokens[0].1, TokenSubkind::Logical);
        assert_eq!(tokens[1].1, TokenSubkind::Comparison);
        assert_eq!(tokens[2].1, TokenSubkind::ErrorLit);
        assert_eq!(tokens[2].2, "#REF!");
    }

    #[test]
    fn lowers_array_literal_to_call_frames() {
        let tokens = kinds("={1,2;3,4}");
        let texts: Vec<&str> = tokens.iter().map(|(_, _, t)| t.as_str()).collect();
        assert_eq!(
            texts,
            vec!["ARRAY", "ARRAYROW", "1", ",", "2", "", ";", "ARRAYROW", "3", ",", "4", "", ""]
        );
    }

    #[test]
    fn comma_is_union_outside_call_frames() {
        let tokens = kinds("=(A1:A2,B1:B2)");
        let union: Vec<_> = tokens
            .iter()
            .filter(|(k, s, _)| *k == TokenKind::OperatorInfix && *s == TokenSubkind::Union)
            .collect();
        assert_eq!(union.len(), 1);
    }

    #[test]
    fn space_is_union_between_regions() {
        let tokens = kinds("=(A1:B2 B1:C2)");
        assert!(tokens
            .iter()
            .any(|(k, s, t)| *k == TokenKind::OperatorInfix
                && *s == TokenSubkind::Union
                && t == " "));

        // whitespace around operators is not a union
        let tokens = kinds("=1 + 2");
        assert!(!tokens.iter().any(|(_, s, _)| *s == TokenSubkind::Union));
    }

    #[test]
    fn space_outside_a_group_is_not_a_union() {
        let tokens = kinds("=A1 B1");
        assert!(!tokens.iter().any(|(_, s, _)| *s == TokenSubkind::Union));

        let tokens = kinds("=SUM(A1 B1)");
        assert!(!tokens.iter().any(|(_, s, _)| *s == TokenSubkind::Union));
    }

    #[test]
    fn lexes_percent_postfix() {
        let tokens = kinds("=50%");
        assert_eq!(tokens[1].0, TokenKind::OperatorPostfix);
    }

    #[test]
    fn lexes_scientific_numbers() {
        let tokens = kinds("=1.5e-3");
        assert_eq!(tokens, vec![(TokenKind::Operand, TokenSubkind::Number, "1.5e-3".into())]);
    }

    #[test]
    fn records_positions() {
        let tokens = tokenize("=A1+B2");
        assert_eq!(tokens[0].pos, 0);
        assert_eq!(tokens[1].pos, 2);
        assert_eq!(tokens[2].pos, 3);
    }
}
