//! Formula tokenizer
//!
//! Converts formula strings like "=SUM(A1:A3) * 1.1" into a sequence of
//! positioned tokens for the parser.

use super::parser::{ParseError, ParseErrorKind};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A double-quoted string literal
    Text(String),
    /// Function name or cell label such as `SUM`, `B5`, `$A$1`, or a bare sheet name
    Identifier(String),
    /// A single-quoted sheet name: `'First Sheet'`
    QuotedName(String),
    /// Arithmetic/comparison operators: + - * / ^ = <> >= <= < >
    Operator(String),
    OpenParen,
    CloseParen,
    /// Function argument separator
    Comma,
    /// Range operator
    Colon,
    /// Sheet separator in `Sheet!A1`
    Bang,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Text(s) => write!(f, "\"{}\"", s),
            Token::Identifier(s) => f.write_str(s),
            Token::QuotedName(s) => write!(f, "'{}'", s),
            Token::Operator(s) => f.write_str(s),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Colon => f.write_str(":"),
            Token::Bang => f.write_str("!"),
        }
    }
}

/// A token plus the character offset where it starts in the formula source
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        // Formulas may be written with or without the leading '='
        match formula.strip_prefix('=') {
            Some(rest) => Self {
                chars: rest.chars().peekable(),
                position: 1,
            },
            None => Self {
                chars: formula.chars().peekable(),
                position: 0,
            },
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, ParseError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        self.skip_whitespace();

        let start = self.position;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '"' => self.read_quoted('"').map(Token::Text)?,
            '\'' => self.read_quoted('\'').map(Token::QuotedName)?,

            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '!' => self.single(Token::Bang),

            '+' | '-' | '*' | '/' | '^' | '=' => {
                self.advance();
                Token::Operator(c.to_string())
            }
            '<' => self.read_less_than_operator(),
            '>' => self.read_greater_than_operator(),

            c if c.is_ascii_digit() || c == '.' => self.read_number()?,

            c if c.is_alphabetic() || c == '_' || c == '$' => self.read_identifier(),

            c => {
                return Err(ParseError::new(ParseErrorKind::InvalidCharacter(c), start));
            }
        };

        Ok(Some(SpannedToken {
            token,
            position: start,
        }))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read text between `quote` characters; a doubled quote is a literal quote
    fn read_quoted(&mut self, quote: char) -> Result<String, ParseError> {
        let start_pos = self.position;
        self.advance();
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(ParseError::new(
                        ParseErrorKind::UnterminatedString,
                        start_pos,
                    ));
                }
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        value.push(quote);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
            }
        }

        Ok(value)
    }

    fn take_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<Token, ParseError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.take_digits(&mut num_str);

        if self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            self.take_digits(&mut num_str);
        }

        if let Some(e @ ('e' | 'E')) = self.peek() {
            num_str.push(e);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            self.take_digits(&mut num_str);
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber(num_str), start_pos))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }

    fn read_less_than_operator(&mut self) -> Token {
        self.advance();

        match self.peek() {
            Some('=') => {
                self.advance();
                Token::Operator("<=".to_string())
            }
            Some('>') => {
                self.advance();
                Token::Operator("<>".to_string())
            }
            _ => Token::Operator("<".to_string()),
        }
    }

    fn read_greater_than_operator(&mut self) -> Token {
        self.advance();

        match self.peek() {
            Some('=') => {
                self.advance();
                Token::Operator(">=".to_string())
            }
            _ => Token::Operator(">".to_string()),
        }
    }
}

/// Convenience function to tokenize a formula string
pub fn tokenize(formula: &str) -> Result<Vec<SpannedToken>, ParseError> {
    Tokenizer::new(formula).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(formula: &str) -> Vec<Token> {
        tokenize(formula)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    fn ident(s: &str) -> Token {
        Token::Identifier(s.to_string())
    }

    fn op(s: &str) -> Token {
        Token::Operator(s.to_string())
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(kinds("42"), vec![Token::Number(42.0)]);
        assert_eq!(kinds("3.567"), vec![Token::Number(3.567)]);
        assert_eq!(kinds(".5"), vec![Token::Number(0.5)]);
        assert_eq!(kinds("1.5e10"), vec![Token::Number(1.5e10)]);
        assert_eq!(kinds("2E-5"), vec![Token::Number(2e-5)]);
    }

    #[test]
    fn test_tokenize_string_escaped_quotes() {
        assert_eq!(
            kinds("\"say \"\"hi\"\"\""),
            vec![Token::Text("say \"hi\"".to_string())]
        );
    }

    #[test]
    fn test_tokenize_quoted_sheet_reference() {
        assert_eq!(
            kinds("'Laura''s'!B2"),
            vec![
                Token::QuotedName("Laura's".to_string()),
                Token::Bang,
                ident("B2"),
            ]
        );
    }

    #[test]
    fn test_tokenize_range_with_absolute_markers() {
        assert_eq!(
            kinds("SUM($A$1:A3)"),
            vec![
                ident("SUM"),
                Token::OpenParen,
                ident("$A$1"),
                Token::Colon,
                ident("A3"),
                Token::CloseParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("1 + 2 - 3 * 4 / 5 ^ 6"),
            vec![
                Token::Number(1.0),
                op("+"),
                Token::Number(2.0),
                op("-"),
                Token::Number(3.0),
                op("*"),
                Token::Number(4.0),
                op("/"),
                Token::Number(5.0),
                op("^"),
                Token::Number(6.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_comparison_operators() {
        // The leading '=' is the formula prefix, so start with an operand
        assert_eq!(
            kinds("A1 = B1 <> C1 <= D1 >= E1 < F1 > G1"),
            vec![
                ident("A1"),
                op("="),
                ident("B1"),
                op("<>"),
                ident("C1"),
                op("<="),
                ident("D1"),
                op(">="),
                ident("E1"),
                op("<"),
                ident("F1"),
                op(">"),
                ident("G1"),
            ]
        );
    }

    #[test]
    fn test_tokenize_positions_account_for_prefix() {
        let tokens = tokenize("=A1 + 2").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 4, 6]);
    }

    #[test]
    fn test_tokenize_whitespace_only() {
        assert_eq!(kinds("   "), vec![]);
    }

    #[test]
    fn test_tokenize_error_unterminated_string() {
        let err = tokenize("\"hello").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_tokenize_error_unterminated_sheet_name() {
        let err = tokenize("'Data!A1").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
    }

    #[test]
    fn test_tokenize_error_unexpected_char() {
        let err = tokenize("A1 # 2").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidCharacter('#'));
        assert_eq!(err.position, 3);
    }

    #[test]
    fn test_tokenize_error_lone_dot() {
        let err = tokenize(".").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidNumber(_)));
    }
}
