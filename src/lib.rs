//! Cellforge - spreadsheet formula engine
//!
//! A document holds named sheets of sparse cells. Formula cells are parsed
//! once, wired into a dependency graph and recalculated in dependency order
//! when [`Document::calculate`] runs. Cells on a reference cycle evaluate to
//! `#CIRCULAR!` and everything downstream of a cycle to `#REF!`.
//!
//! # Features
//!
//! - A1 references, ranges and quoted sheet names (`'Laura''s'!B5`)
//! - Arithmetic, comparison and unary operators
//! - SUM, AVERAGE, MAX, MIN, LEN, CONCATENATE
//! - Named expressions and boolean cells
//! - Ranges of any size; large ones are watched as rectangles
//! - Only cells downstream of an edit are recomputed
//! - YAML model loading and a `cellforge` CLI
//!
//! # Example
//!
//! ```
//! use cellforge::Document;
//!
//! let mut doc = Document::new();
//! let id = doc.append_sheet("Data")?;
//! let mut sheet = doc.sheet_mut(id)?;
//! sheet.set_numeric_cell(0, 0, 3.0);
//! sheet.set_numeric_cell(1, 0, 4.0);
//! sheet.set_formula_cell(2, 0, "=SUM(A1:A2)")?;
//!
//! doc.calculate()?;
//! assert_eq!(doc.sheet(id)?.get_numeric_value(2, 0)?, 7.0);
//! # Ok::<(), cellforge::CalcError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod parser;
pub mod sort;
pub mod types;

// Re-export commonly used types
pub use config::{CalcConfig, TextPolicy};
pub use core::{CellInput, Document, RecalcReport, Sheet, SheetMut};
pub use error::{CalcError, CalcResult};
pub use types::{CellAddress, CellKind, FormulaError, FormulaResult, RangeAddress, SheetId};
