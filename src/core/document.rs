//! The document: sheets, cells, dependency graph and dirty set
//!
//! Every mutation goes through [`Document`] (directly or through a
//! [`SheetMut`] handle), which keeps the store, the graph and the dirty set
//! consistent. Nothing is recomputed until [`Document::calculate`] runs.
//!
//! A formula's dependencies are its own references plus those of every
//! named expression it reaches. Small ranges become one graph edge per cell;
//! larger ones are watched as rectangles by [`RangeListeners`].

use super::formula::{parse, CompiledFormula, Dependencies};
use super::graph::DependencyGraph;
use super::names::NameTable;
use super::ranges::RangeListeners;
use super::scheduler::{self, Inputs, RecalcReport};
use super::store::{CellContent, FormulaCell, ValueStore};
use crate::config::CalcConfig;
use crate::error::{CalcError, CalcResult};
use crate::types::{is_valid_name, CellAddress, CellKind, FormulaResult, SheetId};
use std::collections::BTreeSet;
use tracing::debug;

/// New content for a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellInput {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Formula source, with or without the leading `=`
    Formula(String),
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    store: ValueStore,
    graph: DependencyGraph<CellAddress>,
    ranges: RangeListeners,
    names: NameTable,
    /// Formula cells that use at least one name
    name_users: BTreeSet<CellAddress>,
    dirty: BTreeSet<CellAddress>,
    config: CalcConfig,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CalcConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &CalcConfig {
        &self.config
    }

    /// Replace the calculation settings. Every formula is dirtied when they
    /// change, since aggregate results may depend on them.
    pub fn set_config(&mut self, config: CalcConfig) {
        if config == self.config {
            return;
        }
        self.config = config;
        let formulas: Vec<CellAddress> = (0..self.store.sheet_count())
            .flat_map(|i| self.store.used_cells(SheetId(i)))
            .filter(|cell| self.store.is_formula(*cell))
            .collect();
        for cell in formulas {
            self.mark_dirty(cell);
        }
    }

    //--------------------------------------------------------------------------
    // Sheets
    //--------------------------------------------------------------------------

    /// Append a sheet. The name must not already be in use.
    pub fn append_sheet(&mut self, name: &str) -> CalcResult<SheetId> {
        if self.store.sheet_id(name).is_some() {
            return Err(CalcError::DuplicateSheet(name.to_string()));
        }
        let id = self.store.add_sheet(name);
        debug!(sheet = name, index = id.index(), "appended sheet");
        Ok(id)
    }

    pub fn sheet(&self, id: SheetId) -> CalcResult<Sheet<'_>> {
        self.check_sheet(id)?;
        Ok(Sheet { doc: self, id })
    }

    pub fn sheet_mut(&mut self, id: SheetId) -> CalcResult<SheetMut<'_>> {
        self.check_sheet(id)?;
        Ok(SheetMut { doc: self, id })
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<SheetId> {
        self.store.sheet_id(name)
    }

    pub fn sheet_count(&self) -> usize {
        self.store.sheet_count()
    }

    /// Sheet names in append order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.store.sheet_names().collect()
    }

    /// Ids of every sheet in append order
    pub fn sheet_ids(&self) -> impl Iterator<Item = SheetId> {
        (0..self.store.sheet_count()).map(SheetId)
    }

    fn check_sheet(&self, id: SheetId) -> CalcResult<()> {
        if self.store.has_sheet(id) {
            Ok(())
        } else {
            Err(CalcError::UnknownSheet(format!("#{}", id.index())))
        }
    }

    //--------------------------------------------------------------------------
    // Mutation
    //--------------------------------------------------------------------------

    /// Write a cell, replacing whatever it held before
    pub fn set_cell(&mut self, cell: CellAddress, input: CellInput) -> CalcResult<()> {
        self.check_sheet(cell.sheet)?;
        match input {
            CellInput::Number(n) => self.write_literal(cell, CellContent::Numeric(n)),
            CellInput::Text(s) => self.write_literal(cell, CellContent::Text(s)),
            CellInput::Boolean(b) => self.write_literal(cell, CellContent::Boolean(b)),
            CellInput::Formula(source) => self.set_formula(cell, &source)?,
        }
        Ok(())
    }

    /// Reset a cell to Empty. Its dependents recalculate against the empty cell.
    pub fn erase_cell(&mut self, cell: CellAddress) -> CalcResult<()> {
        self.check_sheet(cell.sheet)?;
        self.erase(cell);
        Ok(())
    }

    fn erase(&mut self, cell: CellAddress) {
        self.store.erase(cell);
        self.graph.clear_edges(&cell);
        self.ranges.clear(cell);
        self.name_users.remove(&cell);
        self.mark_dirty(cell);
        debug!(cell = %self.store.qualified_label(cell), "erased cell");
    }

    /// Parse, then swap content and edges. A parse error leaves every piece
    /// of state untouched.
    fn set_formula(&mut self, cell: CellAddress, source: &str) -> CalcResult<()> {
        let formula = parse(source, cell, &self.store).map_err(|e| CalcError::Parse {
            formula: source.to_string(),
            source: e,
        })?;
        let dependencies = self.dependencies_of(&formula);
        debug!(
            cell = %self.store.qualified_label(cell),
            formula = source,
            edges = dependencies.cells.len(),
            watched_ranges = dependencies.ranges.len(),
            "installed formula"
        );
        self.write(
            cell,
            CellContent::Formula(FormulaCell {
                formula,
                result: None,
            }),
            dependencies,
        );
        Ok(())
    }

    fn write_literal(&mut self, cell: CellAddress, content: CellContent) {
        self.write(cell, content, Dependencies::default());
    }

    fn write(&mut self, cell: CellAddress, content: CellContent, dependencies: Dependencies) {
        match &content {
            CellContent::Formula(f) if !f.formula.names().is_empty() => {
                self.name_users.insert(cell);
            }
            _ => {
                self.name_users.remove(&cell);
            }
        }
        self.store.set(cell, content);
        self.graph.set_edges(&cell, dependencies.cells);
        self.ranges.set(cell, dependencies.ranges);
        self.mark_dirty(cell);
    }

    /// References of `formula` and of every name it reaches, split for
    /// the graph and the range listeners
    fn dependencies_of(&self, formula: &CompiledFormula) -> Dependencies {
        if formula.names().is_empty() {
            return formula.dependencies();
        }
        let mut references = formula.references().to_vec();
        for reference in self.names.references(formula.names()) {
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
        Dependencies::from_references(&references)
    }

    /// Recompute the edges of the formula at `cell` and dirty it
    fn rewire(&mut self, cell: CellAddress) {
        let Some(CellContent::Formula(f)) = self.store.get(cell) else {
            return;
        };
        let dependencies = self.dependencies_of(&f.formula);
        self.graph.set_edges(&cell, dependencies.cells);
        self.ranges.set(cell, dependencies.ranges);
        self.mark_dirty(cell);
    }

    /// Flag `cell` and its transitive dependents, dropping their cached results
    fn mark_dirty(&mut self, cell: CellAddress) {
        let ranges = &self.ranges;
        let flagged = self
            .graph
            .mark_dirty_with(&cell, &mut self.dirty, &|c| ranges.listeners(*c));
        for flagged in flagged {
            self.store.invalidate(flagged);
        }
    }

    //--------------------------------------------------------------------------
    // Named expressions
    //--------------------------------------------------------------------------

    /// Define or redefine a named expression.
    ///
    /// Unqualified references in `source` resolve to the first sheet. Every
    /// formula that reaches the name, directly or through other names, takes
    /// edges on what it references and is dirtied. A name that reaches
    /// itself evaluates to `#CIRCNAME!` in every formula that uses it.
    pub fn set_named_expression(&mut self, name: &str, source: &str) -> CalcResult<()> {
        if !is_valid_name(name) {
            return Err(CalcError::InvalidName(name.to_string()));
        }
        self.check_sheet(SheetId(0))?;
        let origin = CellAddress::new(SheetId(0), 0, 0);
        let formula = parse(source, origin, &self.store).map_err(|e| CalcError::Parse {
            formula: source.to_string(),
            source: e,
        })?;
        self.names.set(name, formula);

        let users: Vec<CellAddress> = self
            .name_users
            .iter()
            .copied()
            .filter(|cell| match self.store.get(*cell) {
                Some(CellContent::Formula(f)) => {
                    self.names.closure(f.formula.names()).contains(name)
                }
                _ => false,
            })
            .collect();
        debug!(
            formula = source,
            name = name,
            users = users.len(),
            cyclic = self.names.is_cyclic(name),
            "defined name"
        );
        for cell in users {
            self.rewire(cell);
        }
        Ok(())
    }

    /// Source of a named expression
    pub fn named_expression(&self, name: &str) -> Option<&str> {
        self.names.source(name)
    }

    /// Every named expression with its source, sorted by name
    pub fn named_expressions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter()
    }

    //--------------------------------------------------------------------------
    // Calculation
    //--------------------------------------------------------------------------

    /// Evaluate every dirty formula in dependency order.
    ///
    /// Per-cell errors (including cycles) become error results and never fail
    /// the pass.
    pub fn calculate(&mut self) -> CalcResult<RecalcReport> {
        let inputs = Inputs {
            graph: &self.graph,
            ranges: &self.ranges,
            names: &self.names,
            config: &self.config,
        };
        Ok(scheduler::calculate(&mut self.store, &mut self.dirty, inputs))
    }

    pub fn is_dirty(&self, cell: CellAddress) -> bool {
        self.dirty.contains(&cell)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    //--------------------------------------------------------------------------
    // Reads
    //--------------------------------------------------------------------------

    pub fn numeric_value(&self, cell: CellAddress) -> CalcResult<f64> {
        self.check_sheet(cell.sheet)?;
        self.store.get_numeric(cell)
    }

    pub fn string_value(&self, cell: CellAddress) -> CalcResult<String> {
        self.check_sheet(cell.sheet)?;
        self.store.get_string(cell)
    }

    pub fn boolean_value(&self, cell: CellAddress) -> CalcResult<bool> {
        self.check_sheet(cell.sheet)?;
        self.store.get_boolean(cell)
    }

    pub fn cell_kind(&self, cell: CellAddress) -> CellKind {
        self.store.cell_kind(cell)
    }

    pub fn formula_source(&self, cell: CellAddress) -> Option<&str> {
        self.store.formula_source(cell)
    }

    /// Cached result of a formula cell; `None` for other cells and for
    /// formulas that are stale
    pub fn cell_result(&self, cell: CellAddress) -> Option<&FormulaResult> {
        self.store.result(cell)
    }

    /// Occupied cells of a sheet in row-major order
    pub fn used_cells(&self, sheet: SheetId) -> impl Iterator<Item = CellAddress> + '_ {
        self.store.used_cells(sheet)
    }

    /// `Sheet!A1` label, quoting the sheet name when it needs it
    pub fn qualified_label(&self, cell: CellAddress) -> String {
        self.store.qualified_label(cell)
    }

    /// Cells the formula at `cell` reads directly, sorted. Cells of watched
    /// ranges are listed only when occupied.
    pub fn precedents(&self, cell: CellAddress) -> Vec<CellAddress> {
        let mut found: BTreeSet<CellAddress> = self.graph.dependencies(&cell).into_iter().collect();
        for range in self.ranges.ranges(cell) {
            found.extend(self.store.occupied_in(range));
        }
        found.into_iter().collect()
    }

    /// Every cell whose value transitively depends on `cell`, sorted
    pub fn dependents(&self, cell: CellAddress) -> Vec<CellAddress> {
        self.graph
            .transitive_dependents_with(&cell, &|c| self.ranges.listeners(*c))
    }
}

/// Read view of one sheet
#[derive(Clone, Copy)]
pub struct Sheet<'a> {
    doc: &'a Document,
    id: SheetId,
}

impl<'a> Sheet<'a> {
    pub fn id(&self) -> SheetId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        self.doc.store.sheet_name(self.id).unwrap_or_default()
    }

    pub fn get_numeric_value(&self, row: u32, col: u32) -> CalcResult<f64> {
        self.doc.store.get_numeric(CellAddress::new(self.id, row, col))
    }

    pub fn get_string_value(&self, row: u32, col: u32) -> CalcResult<String> {
        self.doc.store.get_string(CellAddress::new(self.id, row, col))
    }

    pub fn get_boolean_value(&self, row: u32, col: u32) -> CalcResult<bool> {
        self.doc.store.get_boolean(CellAddress::new(self.id, row, col))
    }

    pub fn cell_kind(&self, row: u32, col: u32) -> CellKind {
        self.doc.store.cell_kind(CellAddress::new(self.id, row, col))
    }

    pub fn formula_source(&self, row: u32, col: u32) -> Option<&'a str> {
        self.doc.store.formula_source(CellAddress::new(self.id, row, col))
    }

    pub fn used_cells(&self) -> impl Iterator<Item = CellAddress> + 'a {
        self.doc.store.used_cells(self.id)
    }
}

/// Write handle for one sheet
pub struct SheetMut<'a> {
    doc: &'a mut Document,
    id: SheetId,
}

impl SheetMut<'_> {
    fn at(&self, row: u32, col: u32) -> CellAddress {
        CellAddress::new(self.id, row, col)
    }

    pub fn id(&self) -> SheetId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.doc.store.sheet_name(self.id).unwrap_or_default()
    }

    pub fn set_numeric_cell(&mut self, row: u32, col: u32, value: f64) {
        let cell = self.at(row, col);
        self.doc.write_literal(cell, CellContent::Numeric(value));
    }

    pub fn set_string_cell(&mut self, row: u32, col: u32, value: impl Into<String>) {
        let cell = self.at(row, col);
        self.doc.write_literal(cell, CellContent::Text(value.into()));
    }

    pub fn set_boolean_cell(&mut self, row: u32, col: u32, value: bool) {
        let cell = self.at(row, col);
        self.doc.write_literal(cell, CellContent::Boolean(value));
    }

    /// Install a formula. On a parse error the cell keeps its previous content.
    pub fn set_formula_cell(&mut self, row: u32, col: u32, source: &str) -> CalcResult<()> {
        let cell = self.at(row, col);
        self.doc.set_formula(cell, source)
    }

    pub fn erase_cell(&mut self, row: u32, col: u32) {
        let cell = self.at(row, col);
        self.doc.erase(cell);
    }

    pub fn get_numeric_value(&self, row: u32, col: u32) -> CalcResult<f64> {
        self.doc.store.get_numeric(self.at(row, col))
    }

    pub fn get_string_value(&self, row: u32, col: u32) -> CalcResult<String> {
        self.doc.store.get_string(self.at(row, col))
    }

    pub fn get_boolean_value(&self, row: u32, col: u32) -> CalcResult<bool> {
        self.doc.store.get_boolean(self.at(row, col))
    }

    pub fn cell_kind(&self, row: u32, col: u32) -> CellKind {
        self.doc.store.cell_kind(self.at(row, col))
    }
}
