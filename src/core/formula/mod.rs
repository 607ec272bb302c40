//! Formula language: tokenizer, parser, function table and evaluator

pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod tokenizer;

pub use evaluator::{evaluate, evaluate_formula, EvalContext, RangeValues, Value};
pub use functions::Function;
pub use parser::{parse, BinaryOp, Expr, ParseError, ParseErrorKind, SheetResolver, UnaryOp};

use crate::types::{CellAddress, RangeAddress, Reference};
use std::collections::HashSet;

/// Ranges with more cells than this are tracked as whole rectangles instead
/// of one dependency edge per cell
pub const EXPANDED_RANGE_LIMIT: u64 = 4096;

/// A parsed formula together with the references and names it reads
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    pub(crate) source: String,
    pub(crate) expr: Expr,
    pub(crate) references: Vec<Reference>,
    pub(crate) names: Vec<String>,
}

impl CompiledFormula {
    /// Source text exactly as it was given
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Distinct references in order of first appearance
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Distinct named expressions used, in order of first appearance
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Dependencies of the references written in this formula
    pub fn dependencies(&self) -> Dependencies {
        Dependencies::from_references(&self.references)
    }
}

/// What a formula reads, split by how the document tracks it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies {
    /// Single cells plus every cell of ranges up to [`EXPANDED_RANGE_LIMIT`],
    /// row-major, without duplicates
    pub cells: Vec<CellAddress>,
    /// Ranges above the limit
    pub ranges: Vec<RangeAddress>,
}

impl Dependencies {
    pub fn from_references(references: &[Reference]) -> Self {
        let mut seen = HashSet::new();
        let mut deps = Dependencies::default();
        for reference in references {
            let range = reference.as_range();
            if range.cell_count() > EXPANDED_RANGE_LIMIT {
                if !deps.ranges.contains(&range) {
                    deps.ranges.push(range);
                }
                continue;
            }
            for cell in range.cells() {
                if seen.insert(cell) {
                    deps.cells.push(cell);
                }
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SheetId;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompiledFormula {
        let no_sheets = |_: &str| -> Option<SheetId> { None };
        parse(source, CellAddress::new(SheetId(0), 9, 9), &no_sheets).unwrap()
    }

    #[test]
    fn test_dependency_cells_expands_ranges() {
        let compiled = compile("SUM(A1:B2) + A1 + C3");
        let deps = compiled.dependencies();
        let labels: Vec<String> = deps.cells.iter().map(|c| c.a1_label()).collect();
        assert_eq!(labels, vec!["A1", "B1", "A2", "B2", "C3"]);
        assert!(deps.ranges.is_empty());
        assert_eq!(compiled.source(), "SUM(A1:B2) + A1 + C3");
    }

    #[test]
    fn test_large_ranges_are_not_expanded() {
        let compiled = compile("SUM(B1:XFD1048576) + SUM(A1:A4096) + A1");
        let deps = compiled.dependencies();
        assert_eq!(deps.cells.len(), 4096);
        assert_eq!(
            deps.ranges,
            vec![RangeAddress::new(SheetId(0), (0, 1), (1_048_575, 16_383))]
        );
    }

    #[test]
    fn test_names_recorded_once() {
        let compiled = compile("rate * A1 + rate - base");
        assert_eq!(compiled.names(), &["rate".to_string(), "base".to_string()]);
        assert_eq!(compiled.references().len(), 1);
    }
}
