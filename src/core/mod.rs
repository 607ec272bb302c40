//! Core calculation engine with dependency resolution

pub mod document;
pub mod formula;
pub mod graph;
pub mod names;
pub mod ranges;
pub mod scheduler;
pub mod store;

pub use document::{CellInput, Document, Sheet, SheetMut};
pub use graph::{DependencyGraph, EvalPlan};
pub use names::NameTable;
pub use ranges::RangeListeners;
pub use scheduler::RecalcReport;
