//! Named expressions
//!
//! A name binds an identifier to a parsed formula. Formulas that use a name
//! read through it at evaluation time and take dependency edges on
//! everything its expression references. Names that reach themselves
//! through other names are cyclic and evaluate to `#CIRCNAME!`.

use super::formula::{CompiledFormula, Expr};
use super::graph::DependencyGraph;
use crate::types::{FormulaError, Reference};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: BTreeMap<String, CompiledFormula>,
    /// `name -> names its expression uses`
    graph: DependencyGraph<String>,
    cyclic: BTreeSet<String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Define or redefine `name`
    pub fn set(&mut self, name: &str, formula: CompiledFormula) {
        self.graph.set_edges(&name.to_string(), formula.names().iter().cloned());
        self.names.insert(name.to_string(), formula);

        let defined: BTreeSet<String> = self.names.keys().cloned().collect();
        self.cyclic = self
            .graph
            .topological_order(&defined)
            .cycle_members
            .into_iter()
            .collect();
    }

    pub fn source(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(CompiledFormula::source)
    }

    pub fn is_cyclic(&self, name: &str) -> bool {
        self.cyclic.contains(name)
    }

    /// Expression bound to `name`, or the error a formula using it sees
    pub fn expression(&self, name: &str) -> Result<&Expr, FormulaError> {
        if self.cyclic.contains(name) {
            return Err(FormulaError::CircularName);
        }
        self.names
            .get(name)
            .map(CompiledFormula::expr)
            .ok_or(FormulaError::NameNotFound)
    }

    /// `used` plus every name reachable through the definitions, defined or not
    pub fn closure(&self, used: &[String]) -> BTreeSet<String> {
        let mut reached = BTreeSet::new();
        let mut stack: Vec<String> = used.to_vec();
        while let Some(name) = stack.pop() {
            if !reached.insert(name.clone()) {
                continue;
            }
            if let Some(formula) = self.names.get(&name) {
                stack.extend(formula.names().iter().cloned());
            }
        }
        reached
    }

    /// References read by the definitions of every name in the closure of `used`
    pub fn references(&self, used: &[String]) -> Vec<Reference> {
        let mut references = Vec::new();
        for name in self.closure(used) {
            if let Some(formula) = self.names.get(&name) {
                for reference in formula.references() {
                    if !references.contains(reference) {
                        references.push(*reference);
                    }
                }
            }
        }
        references
    }

    /// Defined names with their source text, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(|(name, formula)| (name.as_str(), formula.source()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::parse;
    use crate::types::{CellAddress, SheetId};
    use pretty_assertions::assert_eq;

    fn table(definitions: &[(&str, &str)]) -> NameTable {
        let no_sheets = |_: &str| -> Option<SheetId> { None };
        let mut names = NameTable::new();
        for (name, source) in definitions {
            let formula = parse(source, CellAddress::new(SheetId(0), 0, 0), &no_sheets).unwrap();
            names.set(name, formula);
        }
        names
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_expression_lookup() {
        let names = table(&[("rate", "0.25")]);
        assert_eq!(names.expression("rate"), Ok(&Expr::Number(0.25)));
        assert_eq!(names.expression("other"), Err(FormulaError::NameNotFound));
        assert_eq!(names.source("rate"), Some("0.25"));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_circular_names_detected() {
        let names = table(&[("a", "b + 1"), ("b", "a * 2"), ("c", "a"), ("d", "d")]);
        assert!(names.is_cyclic("a"));
        assert!(names.is_cyclic("b"));
        assert!(names.is_cyclic("d"));
        assert!(!names.is_cyclic("c"));
        assert_eq!(names.expression("a"), Err(FormulaError::CircularName));
        assert_eq!(names.expression("d"), Err(FormulaError::CircularName));
    }

    #[test]
    fn test_redefinition_breaks_cycle() {
        let mut names = table(&[("a", "b"), ("b", "a")]);
        assert!(names.is_cyclic("a"));

        let no_sheets = |_: &str| -> Option<SheetId> { None };
        let formula = parse("5", CellAddress::new(SheetId(0), 0, 0), &no_sheets).unwrap();
        names.set("b", formula);
        assert!(!names.is_cyclic("a"));
        assert!(!names.is_cyclic("b"));
    }

    #[test]
    fn test_closure_and_references() {
        let names = table(&[("total", "SUM(A1:A3) + tax"), ("tax", "B1 * rate")]);
        let expected: BTreeSet<String> = strings(&["rate", "tax", "total"]).into_iter().collect();
        assert_eq!(names.closure(&strings(&["total"])), expected);
        assert_eq!(names.references(&strings(&["total"])).len(), 2);
        assert!(names.references(&strings(&["rate"])).is_empty());
    }

    #[test]
    fn test_closure_terminates_on_cycles() {
        let names = table(&[("a", "b"), ("b", "a")]);
        assert_eq!(names.closure(&strings(&["a"])).len(), 2);
    }
}
