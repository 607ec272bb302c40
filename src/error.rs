use crate::core::formula::ParseError;
use crate::types::FormulaError;
use thiserror::Error;

pub type CalcResult<T> = Result<T, CalcError>;

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid formula '{formula}': {source}")]
    Parse {
        formula: String,
        #[source]
        source: ParseError,
    },

    #[error("Type mismatch at {cell}: expected {expected}, found {found}")]
    TypeMismatch {
        cell: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Stale value at {cell}: formula has not been calculated since its inputs changed")]
    StaleValue { cell: String },

    #[error("Circular reference at {cell}")]
    CircularReference { cell: String },

    #[error("Formula evaluation error at {cell}: {error} ({})", .error.description())]
    Eval { cell: String, error: FormulaError },

    #[error("Sheet name already exists: {0}")]
    DuplicateSheet(String),

    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Input error at line {line}: {message}")]
    Input { line: usize, message: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CalcError {
    /// The error a cell read reports for a stored formula error result
    pub(crate) fn from_formula_error(cell: String, error: FormulaError) -> Self {
        match error {
            FormulaError::CircularReference => CalcError::CircularReference { cell },
            error => CalcError::Eval { cell, error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_error_mapping() {
        let err = CalcError::from_formula_error("Data!A1".into(), FormulaError::CircularReference);
        assert!(matches!(err, CalcError::CircularReference { .. }));

        let err = CalcError::from_formula_error("Data!A1".into(), FormulaError::DivisionByZero);
        assert!(matches!(
            err,
            CalcError::Eval {
                error: FormulaError::DivisionByZero,
                ..
            }
        ));
        assert!(err.to_string().contains("#DIV/0!"));
        assert!(err.to_string().contains("division by zero"));
    }
}
