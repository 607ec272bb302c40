//! Value store: per-sheet sparse cell grids
//!
//! Cells are kept in a `BTreeMap` keyed by (row, column), so iteration is
//! row-major. Unset cells are never stored and read as Empty. Boolean cells
//! read as 1 and 0 wherever a number is expected.

use super::formula::{CompiledFormula, SheetResolver, Value};
use crate::error::{CalcError, CalcResult};
use crate::types::{
    quote_sheet_name, CellAddress, CellKind, FormulaError, FormulaResult, RangeAddress, SheetId,
};
use std::collections::BTreeMap;

/// A formula with its cached result. `None` means not yet calculated or stale.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaCell {
    pub formula: CompiledFormula,
    pub result: Option<FormulaResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Numeric(f64),
    Text(String),
    Boolean(bool),
    Formula(FormulaCell),
}

impl CellContent {
    pub fn kind(&self) -> CellKind {
        match self {
            CellContent::Numeric(_) => CellKind::Numeric,
            CellContent::Text(_) => CellKind::String,
            CellContent::Boolean(_) => CellKind::Boolean,
            CellContent::Formula(_) => CellKind::Formula,
        }
    }
}

#[derive(Debug, Clone)]
struct SheetData {
    name: String,
    cells: BTreeMap<(u32, u32), CellContent>,
}

#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    sheets: Vec<SheetData>,
}

impl SheetResolver for ValueStore {
    fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
        self.sheet_id(name)
    }
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sheet. Name uniqueness is checked by the caller.
    pub fn add_sheet(&mut self, name: &str) -> SheetId {
        self.sheets.push(SheetData {
            name: name.to_string(),
            cells: BTreeMap::new(),
        });
        SheetId(self.sheets.len() - 1)
    }

    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheets.iter().position(|s| s.name == name).map(SheetId)
    }

    pub fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.sheets.get(sheet.0).map(|s| s.name.as_str())
    }

    pub fn has_sheet(&self, sheet: SheetId) -> bool {
        sheet.0 < self.sheets.len()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    /// `Sheet!A1` label with the sheet name quoted when needed
    pub fn qualified_label(&self, cell: CellAddress) -> String {
        match self.sheet_name(cell.sheet) {
            Some(name) => format!("{}!{}", quote_sheet_name(name), cell.a1_label()),
            None => cell.a1_label(),
        }
    }

    pub fn get(&self, cell: CellAddress) -> Option<&CellContent> {
        self.sheets
            .get(cell.sheet.0)
            .and_then(|s| s.cells.get(&(cell.row, cell.col)))
    }

    fn get_mut(&mut self, cell: CellAddress) -> Option<&mut CellContent> {
        self.sheets
            .get_mut(cell.sheet.0)
            .and_then(|s| s.cells.get_mut(&(cell.row, cell.col)))
    }

    /// Replace a cell outright, returning the previous content. Writes to
    /// sheets that do not exist are ignored; callers check the id first.
    pub fn set(&mut self, cell: CellAddress, content: CellContent) -> Option<CellContent> {
        self.sheets
            .get_mut(cell.sheet.0)
            .and_then(|s| s.cells.insert((cell.row, cell.col), content))
    }

    /// Reset a cell to Empty, returning the previous content
    pub fn erase(&mut self, cell: CellAddress) -> Option<CellContent> {
        self.sheets
            .get_mut(cell.sheet.0)
            .and_then(|s| s.cells.remove(&(cell.row, cell.col)))
    }

    pub fn is_formula(&self, cell: CellAddress) -> bool {
        matches!(self.get(cell), Some(CellContent::Formula(_)))
    }

    pub fn cell_kind(&self, cell: CellAddress) -> CellKind {
        self.get(cell).map_or(CellKind::Empty, CellContent::kind)
    }

    pub fn formula_source(&self, cell: CellAddress) -> Option<&str> {
        match self.get(cell) {
            Some(CellContent::Formula(f)) => Some(f.formula.source()),
            _ => None,
        }
    }

    /// Cached result of a formula cell, if it has one
    pub fn result(&self, cell: CellAddress) -> Option<&FormulaResult> {
        match self.get(cell) {
            Some(CellContent::Formula(f)) => f.result.as_ref(),
            _ => None,
        }
    }

    pub fn set_result(&mut self, cell: CellAddress, result: FormulaResult) {
        if let Some(CellContent::Formula(f)) = self.get_mut(cell) {
            f.result = Some(result);
        }
    }

    /// Drop a formula's cached result so reads report it as stale
    pub fn invalidate(&mut self, cell: CellAddress) {
        if let Some(CellContent::Formula(f)) = self.get_mut(cell) {
            f.result = None;
        }
    }

    /// Occupied cells of a sheet in row-major order
    pub fn used_cells(&self, sheet: SheetId) -> impl Iterator<Item = CellAddress> + '_ {
        self.sheets
            .get(sheet.0)
            .into_iter()
            .flat_map(move |s| s.cells.keys().map(move |&(row, col)| CellAddress::new(sheet, row, col)))
    }

    /// Occupied cells inside `range`, row-major
    pub fn occupied_in<'a>(
        &'a self,
        range: &'a RangeAddress,
    ) -> impl Iterator<Item = CellAddress> + 'a {
        let bounds = (range.first_row, range.first_col)..=(range.last_row, range.last_col);
        self.sheets
            .get(range.sheet.0)
            .into_iter()
            .flat_map(move |s| s.cells.range(bounds.clone()))
            .filter(move |(key, _)| (range.first_col..=range.last_col).contains(&key.1))
            .map(move |(&(row, col), _)| CellAddress::new(range.sheet, row, col))
    }

    /// Cell value as seen by a formula that references it
    pub fn value(&self, cell: CellAddress) -> Result<Value, FormulaError> {
        match self.get(cell) {
            None => Ok(Value::Empty),
            Some(CellContent::Numeric(n)) => Ok(Value::Number(*n)),
            Some(CellContent::Text(s)) => Ok(Value::Text(s.clone())),
            Some(CellContent::Boolean(b)) => Ok(Value::Number(bool_number(*b))),
            Some(CellContent::Formula(f)) => match &f.result {
                Some(FormulaResult::Number(n)) => Ok(Value::Number(*n)),
                Some(FormulaResult::Text(s)) => Ok(Value::Text(s.clone())),
                Some(FormulaResult::Error(FormulaError::CircularReference)) | None => {
                    Err(FormulaError::RefUnavailable)
                }
                Some(FormulaResult::Error(e)) => Err(*e),
            },
        }
    }

    pub fn get_numeric(&self, cell: CellAddress) -> CalcResult<f64> {
        match self.get(cell) {
            None => Ok(0.0),
            Some(CellContent::Numeric(n)) => Ok(*n),
            Some(CellContent::Boolean(b)) => Ok(bool_number(*b)),
            Some(CellContent::Text(_)) => Err(self.type_mismatch(cell, "numeric", "string")),
            Some(CellContent::Formula(f)) => match &f.result {
                None => Err(CalcError::StaleValue {
                    cell: self.qualified_label(cell),
                }),
                Some(FormulaResult::Number(n)) => Ok(*n),
                Some(FormulaResult::Text(_)) => {
                    Err(self.type_mismatch(cell, "numeric", "string"))
                }
                Some(FormulaResult::Error(e)) => {
                    Err(CalcError::from_formula_error(self.qualified_label(cell), *e))
                }
            },
        }
    }

    pub fn get_string(&self, cell: CellAddress) -> CalcResult<String> {
        match self.get(cell) {
            None => Ok(String::new()),
            Some(CellContent::Text(s)) => Ok(s.clone()),
            Some(CellContent::Numeric(_)) => Err(self.type_mismatch(cell, "string", "numeric")),
            Some(CellContent::Boolean(_)) => Err(self.type_mismatch(cell, "string", "boolean")),
            Some(CellContent::Formula(f)) => match &f.result {
                None => Err(CalcError::StaleValue {
                    cell: self.qualified_label(cell),
                }),
                Some(FormulaResult::Text(s)) => Ok(s.clone()),
                Some(FormulaResult::Number(_)) => {
                    Err(self.type_mismatch(cell, "string", "numeric"))
                }
                Some(FormulaResult::Error(e)) => {
                    Err(CalcError::from_formula_error(self.qualified_label(cell), *e))
                }
            },
        }
    }

    /// Boolean reading: numbers are true when non-zero, Empty is false
    pub fn get_boolean(&self, cell: CellAddress) -> CalcResult<bool> {
        match self.get(cell) {
            None => Ok(false),
            Some(CellContent::Boolean(b)) => Ok(*b),
            Some(CellContent::Text(_)) => Err(self.type_mismatch(cell, "boolean", "string")),
            _ => self.get_numeric(cell).map(|n| n != 0.0),
        }
    }

    fn type_mismatch(&self, cell: CellAddress, expected: &'static str, found: &'static str) -> CalcError {
        CalcError::TypeMismatch {
            cell: self.qualified_label(cell),
            expected,
            found,
        }
    }
}

fn bool_number(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
