//! Recalculation scheduler
//!
//! A pass takes the dirty set, orders the dirty formula cells with
//! [`DependencyGraph::topological_order_with`], marks cycles, and evaluates the
//! rest in order against the value store. Dependencies on large ranges come
//! from [`RangeListeners`] rather than graph edges.

use super::formula::{evaluate_formula, EvalContext, Expr, RangeValues, Value};
use super::graph::DependencyGraph;
use super::names::NameTable;
use super::ranges::RangeListeners;
use super::store::{CellContent, ValueStore};
use crate::config::{CalcConfig, TextPolicy};
use crate::types::{CellAddress, FormulaError, FormulaResult, RangeAddress};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Summary of one calculation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecalcReport {
    /// Dirty cells consumed by the pass, inputs included
    pub dirty_cells: usize,
    /// Formula cells evaluated in dependency order
    pub evaluated: usize,
    /// Formula cells marked as members of a cycle
    pub cycle_members: usize,
    /// Formula cells marked unavailable because they depend on a cycle
    pub cycle_dependents: usize,
    /// Evaluated cells whose result is an error marker
    pub error_results: usize,
    #[serde(serialize_with = "serialize_micros", rename = "elapsed_us")]
    pub elapsed: Duration,
}

fn serialize_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_micros() as u64)
}

impl RecalcReport {
    pub fn had_cycles(&self) -> bool {
        self.cycle_members > 0
    }

    /// One-line summary for logs and CLI output
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} formula(s) evaluated in {:.2}ms",
            self.evaluated,
            self.elapsed.as_secs_f64() * 1000.0
        );
        if self.error_results > 0 {
            line.push_str(&format!(", {} error result(s)", self.error_results));
        }
        if self.had_cycles() {
            line.push_str(&format!(
                ", {} cell(s) in cycles, {} downstream",
                self.cycle_members, self.cycle_dependents
            ));
        }
        line
    }
}

/// Store view handed to the evaluator
struct StoreContext<'a> {
    store: &'a ValueStore,
    names: &'a NameTable,
    policy: TextPolicy,
}

impl EvalContext for StoreContext<'_> {
    fn lookup(&self, cell: CellAddress) -> Result<Value, FormulaError> {
        self.store.value(cell)
    }

    fn text_policy(&self) -> TextPolicy {
        self.policy
    }

    fn range_values(&self, range: &RangeAddress) -> Result<RangeValues, FormulaError> {
        let mut out = RangeValues::default();
        for cell in self.store.occupied_in(range) {
            match self.store.value(cell)? {
                Value::Empty => {}
                value => out.values.push(value),
            }
        }
        out.empty = range.cell_count() - out.values.len() as u64;
        Ok(out)
    }

    fn named_expression(&self, name: &str) -> Result<&Expr, FormulaError> {
        self.names.expression(name)
    }
}

/// Shared state a calculation pass reads
pub(crate) struct Inputs<'a> {
    pub graph: &'a DependencyGraph<CellAddress>,
    pub ranges: &'a RangeListeners,
    pub names: &'a NameTable,
    pub config: &'a CalcConfig,
}

/// Run one calculation pass. The dirty set is empty afterwards.
pub(crate) fn calculate(
    store: &mut ValueStore,
    dirty: &mut BTreeSet<CellAddress>,
    inputs: Inputs<'_>,
) -> RecalcReport {
    let started = Instant::now();
    let mut report = RecalcReport {
        dirty_cells: dirty.len(),
        ..RecalcReport::default()
    };

    // Input cells only carry the dirty flag to their dependents
    dirty.retain(|cell| store.is_formula(*cell));
    let plan = {
        let targets = &*dirty;
        inputs
            .graph
            .topological_order_with(targets, &|cell| inputs.ranges.watched_among(*cell, targets))
    };

    for &cell in &plan.cycle_members {
        warn!(cell = %store.qualified_label(cell), "circular reference");
        store.set_result(cell, FormulaResult::Error(FormulaError::CircularReference));
        dirty.remove(&cell);
    }
    for &cell in &plan.cycle_dependents {
        debug!(cell = %store.qualified_label(cell), "depends on a circular reference");
        store.set_result(cell, FormulaResult::Error(FormulaError::RefUnavailable));
        dirty.remove(&cell);
    }
    report.cycle_members = plan.cycle_members.len();
    report.cycle_dependents = plan.cycle_dependents.len();

    for &cell in &plan.order {
        let result = match store.get(cell) {
            Some(CellContent::Formula(f)) => {
                let ctx = StoreContext {
                    store: &*store,
                    names: inputs.names,
                    policy: inputs.config.text_in_aggregates,
                };
                evaluate_formula(f.formula.expr(), &ctx)
            }
            _ => {
                dirty.remove(&cell);
                continue;
            }
        };

        debug!(
            cell = %store.qualified_label(cell),
            result = %result.display(),
            "evaluated"
        );
        if result.is_error() {
            report.error_results += 1;
        }
        store.set_result(cell, result);
        dirty.remove(&cell);
        report.evaluated += 1;
    }

    // Anything left was not a formula target
    dirty.clear();

    report.elapsed = started.elapsed();
    info!(
        evaluated = report.evaluated,
        cycle_members = report.cycle_members,
        cycle_dependents = report.cycle_dependents,
        error_results = report.error_results,
        elapsed_us = report.elapsed.as_micros() as u64,
        "calculation pass complete"
    );
    report
}
