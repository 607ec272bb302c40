//! Formula evaluator
//!
//! Evaluates an expression tree to a value. Cell values come from an
//! [`EvalContext`], so the evaluator never touches the store directly.
//! Ranges are read through [`EvalContext::range_values`], which reports the
//! occupied cells and only a count of the empty ones.

use super::functions::Function;
use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::config::TextPolicy;
use crate::types::{format_number, CellAddress, FormulaError, FormulaResult, RangeAddress, Reference};
use std::cmp::Ordering;

/// Value type produced during evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    /// An unset cell
    Empty,
}

impl Value {
    /// Numeric form for arithmetic: Empty is 0, text is a type mismatch
    pub fn as_number(&self) -> Result<f64, FormulaError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Empty => Ok(0.0),
            Value::Text(_) => Err(FormulaError::TypeMismatch),
        }
    }

    /// Text form used by text functions
    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Empty => String::new(),
        }
    }

    /// The cached form of a final formula value
    pub fn into_result(self) -> FormulaResult {
        match self {
            Value::Number(n) => FormulaResult::Number(n),
            Value::Text(s) => FormulaResult::Text(s),
            Value::Empty => FormulaResult::Number(0.0),
        }
    }
}

/// Contents of a range: values of its non-empty cells in row-major order
/// and the number of cells that are empty
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeValues {
    pub values: Vec<Value>,
    pub empty: u64,
}

/// Source of cell values for evaluation
pub trait EvalContext {
    /// Current value of `cell`.
    ///
    /// A formula cell holding an error result reports that error, except the
    /// cycle marker, which reads as [`FormulaError::RefUnavailable`].
    fn lookup(&self, cell: CellAddress) -> Result<Value, FormulaError>;

    /// How numeric aggregates treat text cells reached through references
    fn text_policy(&self) -> TextPolicy {
        TextPolicy::default()
    }

    /// Values in `range`. The first error met in row-major order wins.
    ///
    /// The default walks every address through [`EvalContext::lookup`];
    /// contexts backed by sparse storage should visit occupied cells only.
    fn range_values(&self, range: &RangeAddress) -> Result<RangeValues, FormulaError> {
        let mut out = RangeValues::default();
        for cell in range.cells() {
            match self.lookup(cell)? {
                Value::Empty => out.empty += 1,
                value => out.values.push(value),
            }
        }
        Ok(out)
    }

    /// Expression bound to a named expression
    fn named_expression(&self, _name: &str) -> Result<&Expr, FormulaError> {
        Err(FormulaError::NameNotFound)
    }
}

/// Follow names until a concrete expression is reached
fn resolve_names<'a, C: EvalContext + ?Sized>(
    mut expr: &'a Expr,
    ctx: &'a C,
) -> Result<&'a Expr, FormulaError> {
    while let Expr::Name(name) = expr {
        expr = ctx.named_expression(name)?;
    }
    Ok(expr)
}

/// Evaluate an expression in the given context
pub fn evaluate<C: EvalContext + ?Sized>(expr: &Expr, ctx: &C) -> Result<Value, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Reference(Reference::Cell(cell)) => ctx.lookup(*cell),
        // A range only has meaning as a function argument
        Expr::Reference(Reference::Range(_)) => Err(FormulaError::TypeMismatch),
        Expr::Name(name) => evaluate(ctx.named_expression(name)?, ctx),
        Expr::UnaryOp { op, operand } => {
            let n = evaluate(operand, ctx)?.as_number()?;
            Ok(Value::Number(match op {
                UnaryOp::Neg => -n,
                UnaryOp::Plus => n,
            }))
        }
        Expr::BinaryOp { op, left, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            if op.is_comparison() {
                Ok(compare(*op, &left, &right))
            } else {
                arithmetic(*op, left.as_number()?, right.as_number()?).map(Value::Number)
            }
        }
        Expr::FunctionCall { function, args } => call_function(*function, args, ctx),
    }
}

/// Evaluate a whole formula to the result stored in its cell
pub fn evaluate_formula<C: EvalContext + ?Sized>(expr: &Expr, ctx: &C) -> FormulaResult {
    match evaluate(expr, ctx) {
        Ok(value) => value.into_result(),
        Err(error) => FormulaResult::Error(error),
    }
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<f64, FormulaError> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                Err(FormulaError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }
        BinaryOp::Pow => {
            let result = a.powf(b);
            if result.is_nan() {
                Err(FormulaError::TypeMismatch)
            } else if result.is_infinite() && a == 0.0 {
                Err(FormulaError::DivisionByZero)
            } else {
                Ok(result)
            }
        }
        _ => Err(FormulaError::TypeMismatch),
    }
}

/// Compare two values: numbers before text, Empty reads as 0 or "" to match
/// the other side
fn compare(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Number(_), Value::Text(_)) => Ordering::Less,
        (Value::Text(_), Value::Number(_)) => Ordering::Greater,
        (Value::Empty, Value::Empty) => Ordering::Equal,
        (Value::Empty, Value::Number(b)) => 0.0_f64.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Number(a), Value::Empty) => a.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
        (Value::Empty, Value::Text(b)) => "".cmp(b.as_str()),
        (Value::Text(a), Value::Empty) => a.as_str().cmp(""),
    };

    let holds = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => false,
    };
    Value::Number(if holds { 1.0 } else { 0.0 })
}

fn call_function<C: EvalContext + ?Sized>(
    function: Function,
    args: &[Expr],
    ctx: &C,
) -> Result<Value, FormulaError> {
    if !function.arity().accepts(args.len()) {
        return Err(FormulaError::InvalidArity);
    }

    match function {
        Function::Sum => {
            let numbers = collect_numbers(args, ctx)?;
            Ok(Value::Number(numbers.values.iter().sum()))
        }
        Function::Average => {
            let numbers = collect_numbers(args, ctx)?;
            let count = numbers.values.len() as f64 + numbers.zeros as f64;
            if count == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            Ok(Value::Number(numbers.values.iter().sum::<f64>() / count))
        }
        Function::Max => {
            let numbers = collect_numbers(args, ctx)?;
            Ok(Value::Number(numbers.fold(f64::max)))
        }
        Function::Min => {
            let numbers = collect_numbers(args, ctx)?;
            Ok(Value::Number(numbers.fold(f64::min)))
        }
        Function::Len => {
            let text = evaluate(&args[0], ctx)?.as_text();
            Ok(Value::Number(text.chars().count() as f64))
        }
        Function::Concatenate => {
            let mut joined = String::new();
            for arg in args {
                match resolve_names(arg, ctx)? {
                    Expr::Reference(reference) => {
                        for value in ctx.range_values(&reference.as_range())?.values {
                            joined.push_str(&value.as_text());
                        }
                    }
                    arg => joined.push_str(&evaluate(arg, ctx)?.as_text()),
                }
            }
            Ok(Value::Text(joined))
        }
    }
}

/// Numbers a numeric aggregate folds over, with empty cells kept as a count
#[derive(Debug, Default)]
struct Numbers {
    values: Vec<f64>,
    /// Empty cells inside referenced ranges, each reading as 0
    zeros: u64,
}

impl Numbers {
    /// Fold with `f`, 0 when there is nothing to fold
    fn fold(self, f: fn(f64, f64) -> f64) -> f64 {
        let zero = (self.zeros > 0).then_some(0.0);
        self.values.into_iter().chain(zero).reduce(f).unwrap_or(0.0)
    }
}

/// Gather the numbers a numeric aggregate folds over.
///
/// Reference arguments are read as ranges. Empty cells count as 0 and text
/// follows the context's [`TextPolicy`]. Any other argument must evaluate
/// to a number.
fn collect_numbers<C: EvalContext + ?Sized>(
    args: &[Expr],
    ctx: &C,
) -> Result<Numbers, FormulaError> {
    let policy = ctx.text_policy();
    let mut numbers = Numbers::default();

    for arg in args {
        match resolve_names(arg, ctx)? {
            Expr::Reference(reference) => {
                let range = ctx.range_values(&reference.as_range())?;
                numbers.zeros += range.empty;
                for value in range.values {
                    match value {
                        Value::Number(n) => numbers.values.push(n),
                        Value::Empty => numbers.zeros += 1,
                        Value::Text(_) => match policy {
                            TextPolicy::Skip => {}
                            TextPolicy::Error => return Err(FormulaError::TypeMismatch),
                        },
                    }
                }
            }
            arg => numbers.values.push(evaluate(arg, ctx)?.as_number()?),
        }
    }

    Ok(numbers)
}
