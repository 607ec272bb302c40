//! Formula parser
//!
//! Converts a sequence of tokens into an expression tree using recursive
//! descent with operator precedence. Cell and range references are resolved
//! to typed addresses while parsing, so the tree never holds raw labels.
//! Any other bare identifier is a named expression, looked up when the
//! formula is evaluated.

use super::functions::Function;
use super::tokenizer::{tokenize, SpannedToken, Token};
use super::CompiledFormula;
use crate::types::{
    is_valid_name, parse_a1, quote_sheet_name, CellAddress, RangeAddress, Reference, SheetId,
};

/// Maps sheet names written in formulas to sheet ids
pub trait SheetResolver {
    fn resolve_sheet(&self, name: &str) -> Option<SheetId>;
}

impl<F> SheetResolver for F
where
    F: Fn(&str) -> Option<SheetId>,
{
    fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
        self(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Reference(Reference),
    /// Named expression, resolved at evaluation time
    Name(String),
    /// Function call: NAME(arg1, arg2, ...)
    FunctionCall { function: Function, args: Vec<Expr> },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unbalanced parentheses")]
    UnbalancedParen,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("malformed reference '{0}'")]
    MalformedReference(String),
    #[error("unknown sheet '{0}'")]
    UnknownSheet(String),
    #[error("unexpected input after the end of the expression")]
    TrailingTokens,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("empty formula")]
    EmptyFormula,
    #[error("invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unterminated quoted text")]
    UnterminatedString,
}

/// Error during tokenizing or parsing, with the character offset in the source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} at position {position}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { kind, position }
    }
}

/// `(sheet "!")? LABEL` as written in the source
struct CellPart {
    sheet: SheetId,
    prefix: Option<String>,
    label: String,
    position: usize,
}

impl CellPart {
    fn text(&self) -> String {
        match &self.prefix {
            Some(sheet) => format!("{}!{}", quote_sheet_name(sheet), self.label),
            None => self.label.clone(),
        }
    }

    fn address(&self) -> Result<CellAddress, ParseError> {
        parse_a1(&self.label)
            .map(|(row, col)| CellAddress::new(self.sheet, row, col))
            .ok_or_else(|| {
                ParseError::new(ParseErrorKind::MalformedReference(self.text()), self.position)
            })
    }
}

/// Parser for formula tokens
pub struct Parser<'a> {
    tokens: Vec<SpannedToken>,
    index: usize,
    /// Character length of the source, reported for errors at the end
    end: usize,
    origin_sheet: SheetId,
    sheets: &'a dyn SheetResolver,
    references: Vec<Reference>,
    names: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: Vec<SpannedToken>,
        end: usize,
        origin_sheet: SheetId,
        sheets: &'a dyn SheetResolver,
    ) -> Self {
        Self {
            tokens,
            index: 0,
            end,
            origin_sheet,
            sheets,
            references: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Parse the tokens into an expression plus its distinct references and
    /// names in order of first appearance
    pub fn parse(mut self) -> Result<(Expr, Vec<Reference>, Vec<String>), ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new(ParseErrorKind::EmptyFormula, 0));
        }
        let expr = self.expression()?;

        if let Some(token) = self.peek() {
            let kind = match token {
                Token::CloseParen => ParseErrorKind::UnbalancedParen,
                _ => ParseErrorKind::TrailingTokens,
            };
            return Err(ParseError::new(kind, self.current_position()));
        }

        Ok((expr, self.references, self.names))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|t| &t.token)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.index + 1).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|t| t.token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    /// Source offset of the next token, or the end of the formula
    fn current_position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|t| t.position)
            .unwrap_or(self.end)
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Consume the next token if it is one of `ops`
    fn match_binary(&mut self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        let Some(Token::Operator(symbol)) = self.peek() else {
            return None;
        };
        let op = ops.iter().copied().find(|op| op.symbol() == symbol.as_str())?;
        self.index += 1;
        Some(op)
    }

    fn expect_close(&mut self, open_position: usize) -> Result<(), ParseError> {
        if self.match_token(&Token::CloseParen) {
            return Ok(());
        }
        match self.peek() {
            None => Err(ParseError::new(
                ParseErrorKind::UnbalancedParen,
                open_position,
            )),
            Some(token) => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken(token.to_string()),
                self.current_position(),
            )),
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                ParseErrorKind::UnexpectedToken(token.to_string()),
                self.current_position(),
            ),
            None => ParseError::new(ParseErrorKind::UnexpectedEnd, self.end),
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.comparison()
    }

    /// Comparison: additive (( "=" | "<>" | "<" | "<=" | ">" | ">=" ) additive)*
    fn comparison(&mut self) -> Result<Expr, ParseError> {
        const OPS: [BinaryOp; 6] = [
            BinaryOp::Eq,
            BinaryOp::Ne,
            BinaryOp::Lt,
            BinaryOp::Le,
            BinaryOp::Gt,
            BinaryOp::Ge,
        ];
        let mut left = self.additive()?;

        while let Some(op) = self.match_binary(&OPS) {
            let right = self.additive()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    /// Additive: multiplicative (( "+" | "-" ) multiplicative)*
    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;

        while let Some(op) = self.match_binary(&[BinaryOp::Add, BinaryOp::Sub]) {
            let right = self.multiplicative()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    /// Multiplicative: power (( "*" | "/" ) power)*
    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.power()?;

        while let Some(op) = self.match_binary(&[BinaryOp::Mul, BinaryOp::Div]) {
            let right = self.power()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    /// Power: unary ( "^" power )?   (right-associative)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let left = self.unary()?;

        if self.match_binary(&[BinaryOp::Pow]).is_some() {
            let right = self.power()?;
            Ok(Self::binary(BinaryOp::Pow, left, right))
        } else {
            Ok(left)
        }
    }

    /// Unary: ( "-" | "+" ) unary | primary
    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Operator(s)) if s == "-" => Some(UnaryOp::Neg),
            Some(Token::Operator(s)) if s == "+" => Some(UnaryOp::Plus),
            _ => None,
        };

        match op {
            Some(op) => {
                self.index += 1;
                let operand = self.unary()?;
                Ok(Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.primary(),
        }
    }

    /// Primary: NUMBER | STRING | function | reference | "(" expression ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.current_position();

        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.index += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::Text(s)) => {
                self.index += 1;
                Ok(Expr::Text(s))
            }
            Some(Token::OpenParen) => {
                self.index += 1;
                let expr = self.expression()?;
                self.expect_close(start)?;
                Ok(expr)
            }
            Some(Token::Identifier(_)) if self.peek_next() == Some(&Token::OpenParen) => {
                self.function_call()
            }
            Some(Token::Identifier(name)) if self.is_name(&name) => {
                self.index += 1;
                if !self.names.contains(&name) {
                    self.names.push(name.clone());
                }
                Ok(Expr::Name(name))
            }
            Some(Token::Identifier(_)) | Some(Token::QuotedName(_)) => {
                self.reference().map(Expr::Reference)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// A bare identifier that is neither a cell label nor a sheet prefix
    fn is_name(&self, identifier: &str) -> bool {
        is_valid_name(identifier)
            && !matches!(self.peek_next(), Some(Token::Bang) | Some(Token::Colon))
    }

    /// Function: NAME "(" ( expression ( "," expression )* )? ")"
    fn function_call(&mut self) -> Result<Expr, ParseError> {
        let start = self.current_position();
        let Some(Token::Identifier(name)) = self.advance() else {
            return Err(self.unexpected());
        };
        let function = Function::from_name(&name)
            .ok_or_else(|| ParseError::new(ParseErrorKind::UnknownFunction(name), start))?;

        let open_position = self.current_position();
        self.index += 1;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::CloseParen) {
            args.push(self.expression()?);
            while self.match_token(&Token::Comma) {
                args.push(self.expression()?);
            }
        }
        self.expect_close(open_position)?;

        Ok(Expr::FunctionCall { function, args })
    }

    /// Reference: cell ( ":" cell )?
    fn reference(&mut self) -> Result<Reference, ParseError> {
        let first = self.cell_part()?;
        let first_addr = first.address()?;

        let reference = if self.match_token(&Token::Colon) {
            let last = self.cell_part()?;
            if last.sheet != first.sheet {
                return Err(ParseError::new(
                    ParseErrorKind::MalformedReference(format!(
                        "{}:{}",
                        first.text(),
                        last.text()
                    )),
                    first.position,
                ));
            }
            let last_addr = last.address()?;
            Reference::Range(RangeAddress::new(
                first.sheet,
                (first_addr.row, first_addr.col),
                (last_addr.row, last_addr.col),
            ))
        } else {
            Reference::Cell(first_addr)
        };

        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
        Ok(reference)
    }

    fn cell_part(&mut self) -> Result<CellPart, ParseError> {
        let position = self.current_position();

        let prefix = match self.advance() {
            Some(Token::Identifier(name)) if self.peek() == Some(&Token::Bang) => name,
            Some(Token::Identifier(label)) => {
                return Ok(CellPart {
                    sheet: self.origin_sheet,
                    prefix: None,
                    label,
                    position,
                });
            }
            Some(Token::QuotedName(name)) => name,
            Some(token) => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken(token.to_string()),
                    position,
                ));
            }
            None => return Err(ParseError::new(ParseErrorKind::UnexpectedEnd, self.end)),
        };

        if !self.match_token(&Token::Bang) {
            return Err(ParseError::new(
                ParseErrorKind::MalformedReference(quote_sheet_name(&prefix)),
                position,
            ));
        }

        let sheet = self.sheets.resolve_sheet(&prefix).ok_or_else(|| {
            ParseError::new(ParseErrorKind::UnknownSheet(prefix.clone()), position)
        })?;

        match self.advance() {
            Some(Token::Identifier(label)) => Ok(CellPart {
                sheet,
                prefix: Some(prefix),
                label,
                position,
            }),
            _ => Err(ParseError::new(
                ParseErrorKind::MalformedReference(format!("{}!", quote_sheet_name(&prefix))),
                position,
            )),
        }
    }
}

/// Parse formula source written in `origin`'s sheet.
///
/// Unqualified references resolve to the origin sheet; `Name!A1` and
/// `'Quoted Name'!A1` go through `sheets`.
pub fn parse(
    source: &str,
    origin: CellAddress,
    sheets: &dyn SheetResolver,
) -> Result<CompiledFormula, ParseError> {
    let tokens = tokenize(source)?;
    let end = source.chars().count();
    let (expr, references, names) = Parser::new(tokens, end, origin.sheet, sheets).parse()?;

    Ok(CompiledFormula {
        source: source.to_string(),
        expr,
        references,
        names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DATA: SheetId = SheetId(0);
    const FIRST: SheetId = SheetId(1);
    const LAURA: SheetId = SheetId(2);

    fn sheets(name: &str) -> Option<SheetId> {
        match name {
            "Data" => Some(DATA),
            "First Sheet" => Some(FIRST),
            "Laura's" => Some(LAURA),
            _ => None,
        }
    }

    fn parse_formula(formula: &str) -> Result<CompiledFormula, ParseError> {
        parse(formula, CellAddress::new(DATA, 0, 0), &sheets)
    }

    fn expr(formula: &str) -> Expr {
        parse_formula(formula).unwrap().expr().clone()
    }

    fn kind(formula: &str) -> ParseErrorKind {
        parse_formula(formula).unwrap_err().kind
    }

    fn cell(sheet: SheetId, row: u32, col: u32) -> Expr {
        Expr::Reference(Reference::Cell(CellAddress::new(sheet, row, col)))
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(expr("=42"), Expr::Number(42.0));
    }

    #[test]
    fn test_parse_negative_number() {
        assert_eq!(
            expr("-42"),
            Expr::UnaryOp {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::Number(42.0)),
            }
        );
    }

    #[test]
    fn test_parse_operator_precedence_mul_over_add() {
        // A1 + B1 * C1 should be A1 + (B1 * C1)
        assert_eq!(
            expr("A1 + B1 * C1"),
            Expr::BinaryOp {
                op: BinaryOp::Add,
                left: Box::new(cell(DATA, 0, 0)),
                right: Box::new(Expr::BinaryOp {
                    op: BinaryOp::Mul,
                    left: Box::new(cell(DATA, 0, 1)),
                    right: Box::new(cell(DATA, 0, 2)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_operator_precedence_power() {
        // 2 ^ 3 ^ 2 should be 2 ^ (3 ^ 2) (right-associative)
        assert_eq!(
            expr("2 ^ 3 ^ 2"),
            Expr::BinaryOp {
                op: BinaryOp::Pow,
                left: Box::new(Expr::Number(2.0)),
                right: Box::new(Expr::BinaryOp {
                    op: BinaryOp::Pow,
                    left: Box::new(Expr::Number(3.0)),
                    right: Box::new(Expr::Number(2.0)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_subtraction_is_left_associative() {
        assert_eq!(
            expr("10 - 4 - 3"),
            Expr::BinaryOp {
                op: BinaryOp::Sub,
                left: Box::new(Expr::BinaryOp {
                    op: BinaryOp::Sub,
                    left: Box::new(Expr::Number(10.0)),
                    right: Box::new(Expr::Number(4.0)),
                }),
                right: Box::new(Expr::Number(3.0)),
            }
        );
    }

    #[test]
    fn test_parse_comparison_binds_loosest() {
        let parsed = expr("A1 + 1 > 2 * B1");
        let Expr::BinaryOp { op, .. } = parsed else {
            panic!("expected binary op");
        };
        assert_eq!(op, BinaryOp::Gt);
    }

    #[test]
    fn test_parse_function_call_with_range() {
        let compiled = parse_formula("SUM(A1:A3, 5)").unwrap();
        let range = Reference::Range(RangeAddress::new(DATA, (0, 0), (2, 0)));
        assert_eq!(
            compiled.expr(),
            &Expr::FunctionCall {
                function: Function::Sum,
                args: vec![Expr::Reference(range), Expr::Number(5.0)],
            }
        );
        assert_eq!(compiled.references(), &[range]);
    }

    #[test]
    fn test_parse_function_call_no_args() {
        assert_eq!(
            expr("sum()"),
            Expr::FunctionCall {
                function: Function::Sum,
                args: vec![],
            }
        );
    }

    #[test]
    fn test_parse_range_corners_normalized() {
        let compiled = parse_formula("SUM(B3:A1)").unwrap();
        assert_eq!(
            compiled.references(),
            &[Reference::Range(RangeAddress::new(DATA, (0, 0), (2, 1)))]
        );
    }

    #[test]
    fn test_parse_absolute_markers_ignored() {
        assert_eq!(expr("$B$2"), cell(DATA, 1, 1));
        assert_eq!(expr("b$2"), cell(DATA, 1, 1));
    }

    #[test]
    fn test_parse_sheet_qualified_references() {
        assert_eq!(expr("'First Sheet'!C4"), cell(FIRST, 3, 2));
        assert_eq!(expr("'Laura''s'!A1"), cell(LAURA, 0, 0));
        assert_eq!(expr("Data!A2"), cell(DATA, 1, 0));
    }

    #[test]
    fn test_parse_range_with_sheet_on_both_corners() {
        let compiled = parse_formula("SUM('First Sheet'!A1:'First Sheet'!B2)").unwrap();
        assert_eq!(
            compiled.references(),
            &[Reference::Range(RangeAddress::new(FIRST, (0, 0), (1, 1)))]
        );
    }

    #[test]
    fn test_parse_references_are_distinct_in_first_appearance_order() {
        let compiled = parse_formula("B1 + A1 + B1 * A1").unwrap();
        assert_eq!(
            compiled.references(),
            &[
                Reference::Cell(CellAddress::new(DATA, 0, 1)),
                Reference::Cell(CellAddress::new(DATA, 0, 0)),
            ]
        );
    }

    #[test]
    fn test_parse_error_empty() {
        assert_eq!(kind(""), ParseErrorKind::EmptyFormula);
        assert_eq!(kind("="), ParseErrorKind::EmptyFormula);
    }

    #[test]
    fn test_parse_error_unbalanced_paren() {
        let err = parse_formula("=(A1 + 2").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnbalancedParen);
        assert_eq!(err.position, 1);

        assert_eq!(kind("A1 + 2)"), ParseErrorKind::UnbalancedParen);
        assert_eq!(kind("SUM(A1"), ParseErrorKind::UnbalancedParen);
    }

    #[test]
    fn test_parse_error_unknown_function() {
        let err = parse_formula("1 + FOO(1)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownFunction("FOO".to_string()));
        assert_eq!(err.position, 4);
    }

    #[test]
    fn test_parse_error_malformed_references() {
        assert_eq!(
            kind("A0"),
            ParseErrorKind::MalformedReference("A0".to_string())
        );
        assert_eq!(
            kind("price:A1"),
            ParseErrorKind::MalformedReference("price".to_string())
        );
        assert_eq!(
            kind("'First Sheet' + 1"),
            ParseErrorKind::MalformedReference("'First Sheet'".to_string())
        );
        assert_eq!(
            kind("Data!A1:'First Sheet'!B2"),
            ParseErrorKind::MalformedReference("Data!A1:'First Sheet'!B2".to_string())
        );
    }

    #[test]
    fn test_parse_bare_identifier_is_a_name() {
        assert_eq!(expr("price"), Expr::Name("price".to_string()));
        assert_eq!(
            expr("price * A1"),
            Expr::BinaryOp {
                op: BinaryOp::Mul,
                left: Box::new(Expr::Name("price".to_string())),
                right: Box::new(cell(DATA, 0, 0)),
            }
        );
        let compiled = parse_formula("SUM(totals, totals, A1)").unwrap();
        assert_eq!(compiled.names(), &["totals".to_string()]);
    }

    #[test]
    fn test_parse_sheet_prefix_is_not_a_name() {
        assert_eq!(expr("Data!A2"), cell(DATA, 1, 0));
        assert_eq!(
            kind("Nowhere!A1"),
            ParseErrorKind::UnknownSheet("Nowhere".to_string())
        );
    }

    #[test]
    fn test_parse_error_unknown_sheet() {
        assert_eq!(
            kind("Missing!A1"),
            ParseErrorKind::UnknownSheet("Missing".to_string())
        );
    }

    #[test]
    fn test_parse_error_trailing_and_unexpected() {
        assert_eq!(kind("A1 B1"), ParseErrorKind::TrailingTokens);
        assert_eq!(
            kind("1 + * 2"),
            ParseErrorKind::UnexpectedToken("*".to_string())
        );
        assert_eq!(kind("1 +"), ParseErrorKind::UnexpectedEnd);
        assert_eq!(
            kind("SUM(1 2)"),
            ParseErrorKind::UnexpectedToken("2".to_string())
        );
    }

    #[test]
    fn test_parse_error_display_includes_position() {
        let err = parse_formula("1 +").unwrap_err();
        assert_eq!(err.to_string(), "unexpected end of formula at position 3");
    }
}
