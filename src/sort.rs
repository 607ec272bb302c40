//! Dependency list sorting
//!
//! Reads lines of the form `name: dependency` and orders every name so each
//! one comes after everything it depends on. Blank lines are allowed; a name
//! may appear on several lines to list several dependencies.

use crate::core::graph::DependencyGraph;
use crate::error::{CalcError, CalcResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DependencyList {
    graph: DependencyGraph<String>,
    names: BTreeSet<String>,
}

impl DependencyList {
    pub fn parse(content: &str) -> CalcResult<Self> {
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            if line.trim().is_empty() {
                continue;
            }
            let input_error = |message: &str| CalcError::Input {
                line: line_no,
                message: message.to_string(),
            };

            let mut parts = line.split(':');
            let name = parts.next().unwrap_or_default().trim();
            let dependency = parts.next().map(str::trim);
            if parts.next().is_some() {
                return Err(input_error("more than one separator in a single line"));
            }
            if name.is_empty() {
                return Err(input_error("cell name is empty"));
            }
            let dependency = match dependency {
                Some(dep) if !dep.is_empty() => dep,
                _ => return Err(input_error("dependency name is empty")),
            };

            edges
                .entry(name.to_string())
                .or_default()
                .push(dependency.to_string());
        }

        let mut list = Self::default();
        for (name, dependencies) in edges {
            list.names.insert(name.clone());
            list.names.extend(dependencies.iter().cloned());
            list.graph.set_edges(&name, dependencies);
        }
        debug!(
            names = list.names.len(),
            edges = list.graph.edge_count(),
            "parsed dependency list"
        );
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Every name, dependencies first. Fails if the list contains a cycle.
    pub fn sorted(&self) -> CalcResult<Vec<String>> {
        let plan = self.graph.topological_order(&self.names);
        if !plan.cycle_members.is_empty() {
            return Err(CalcError::CircularDependency(plan.cycle_members.join(", ")));
        }
        Ok(plan.order)
    }
}

/// Read and sort a dependency list file
pub fn sort_file(path: &Path) -> CalcResult<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    DependencyList::parse(&content)?.sorted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_sorts_dependencies_first() {
        let list = DependencyList::parse("C: B\nB: A\n\nD: A\nD: C\n").unwrap();
        let order = list.sorted().unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "A") < position(&order, "B"));
        assert!(position(&order, "B") < position(&order, "C"));
        assert!(position(&order, "C") < position(&order, "D"));
    }

    #[test]
    fn test_whitespace_around_names_is_ignored() {
        let list = DependencyList::parse("  total :  subtotal  \n").unwrap();
        assert_eq!(list.sorted().unwrap(), vec!["subtotal", "total"]);
    }

    #[test]
    fn test_empty_input() {
        let list = DependencyList::parse("\n\n").unwrap();
        assert!(list.is_empty());
        assert!(list.sorted().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines() {
        let err = DependencyList::parse("A: B\n: C\n").unwrap_err();
        assert!(matches!(err, CalcError::Input { line: 2, .. }));
        assert!(err.to_string().contains("cell name is empty"));

        let err = DependencyList::parse("A\n").unwrap_err();
        assert!(err.to_string().contains("dependency name is empty"));

        let err = DependencyList::parse("A: B: C\n").unwrap_err();
        assert!(err.to_string().contains("more than one separator"));
    }

    #[test]
    fn test_cycle_is_an_error() {
        let list = DependencyList::parse("A: B\nB: C\nC: A\nD: A\n").unwrap();
        match list.sorted() {
            Err(CalcError::CircularDependency(members)) => assert_eq!(members, "A, B, C"),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }
}
