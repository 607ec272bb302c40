use serde::{Deserialize, Serialize};
use std::fmt;

//==============================================================================
// Addresses
//==============================================================================

/// Position of a sheet inside its document (append order, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(pub(crate) usize);

impl SheetId {
    /// Zero-based position of the sheet
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single cell: sheet, zero-based row, zero-based column.
///
/// Ordering is sheet first, then row, then column, so ordered collections of
/// addresses iterate row-major within each sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub sheet: SheetId,
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(sheet: SheetId, row: u32, col: u32) -> Self {
        Self { sheet, row, col }
    }

    /// `A1`-style label without the sheet name
    pub fn a1_label(&self) -> String {
        format!("{}{}", column_label(self.col), u64::from(self.row) + 1)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.a1_label())
    }
}

/// Inclusive rectangle of cells on one sheet, stored with the top-left corner first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeAddress {
    pub sheet: SheetId,
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl RangeAddress {
    /// Build a range from two corners in any order
    pub fn new(sheet: SheetId, (row_a, col_a): (u32, u32), (row_b, col_b): (u32, u32)) -> Self {
        Self {
            sheet,
            first_row: row_a.min(row_b),
            first_col: col_a.min(col_b),
            last_row: row_a.max(row_b),
            last_col: col_a.max(col_b),
        }
    }

    /// A 1x1 range covering `cell`
    pub fn single(cell: CellAddress) -> Self {
        Self::new(cell.sheet, (cell.row, cell.col), (cell.row, cell.col))
    }

    pub fn contains(&self, cell: CellAddress) -> bool {
        cell.sheet == self.sheet
            && (self.first_row..=self.last_row).contains(&cell.row)
            && (self.first_col..=self.last_col).contains(&cell.col)
    }

    pub fn row_count(&self) -> u64 {
        u64::from(self.last_row - self.first_row) + 1
    }

    pub fn col_count(&self) -> u64 {
        u64::from(self.last_col - self.first_col) + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.row_count() * self.col_count()
    }

    /// Every address in the rectangle, row-major
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        (self.first_row..=self.last_row).flat_map(move |row| {
            (self.first_col..=self.last_col).map(move |col| CellAddress::new(self.sheet, row, col))
        })
    }
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            column_label(self.first_col),
            u64::from(self.first_row) + 1,
            column_label(self.last_col),
            u64::from(self.last_row) + 1
        )
    }
}

/// A resolved reference found in a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    Cell(CellAddress),
    Range(RangeAddress),
}

impl Reference {
    pub fn sheet(&self) -> SheetId {
        match self {
            Reference::Cell(cell) => cell.sheet,
            Reference::Range(range) => range.sheet,
        }
    }

    /// The reference as a rectangle (a single cell becomes 1x1)
    pub fn as_range(&self) -> RangeAddress {
        match self {
            Reference::Cell(cell) => RangeAddress::single(*cell),
            Reference::Range(range) => *range,
        }
    }
}

/// Convert a zero-based column index to letters: 0=A, 25=Z, 26=AA
pub fn column_label(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = u64::from(col) + 1;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Convert column letters (case-insensitive) to a zero-based index
pub fn parse_column_label(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = u64::from(c.to_ascii_uppercase() as u8 - b'A') + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
        if n > u64::from(u32::MAX) + 1 {
            return None;
        }
    }
    u32::try_from(n - 1).ok()
}

/// Split an `A1` label (optionally with `$` markers) into zero-based (row, col)
pub fn parse_a1(label: &str) -> Option<(u32, u32)> {
    let rest = label.strip_prefix('$').unwrap_or(label);
    let letters_end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let (letters, rest) = rest.split_at(letters_end);
    let digits = rest.strip_prefix('$').unwrap_or(rest);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let col = parse_column_label(letters)?;
    let row_number: u64 = digits.parse().ok()?;
    if row_number == 0 {
        return None;
    }
    let row = u32::try_from(row_number - 1).ok()?;
    Some((row, col))
}

/// True when `text` has the shape of an `A1` label: letters then digits,
/// each optionally preceded by `$`. The label may still be out of range.
fn looks_like_cell_label(text: &str) -> bool {
    let rest = text.strip_prefix('$').unwrap_or(text);
    let letters = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let rest = &rest[letters..];
    let rest = rest.strip_prefix('$').unwrap_or(rest);
    letters > 0 && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Whether `name` can be used as a named expression: a letter or `_`
/// followed by letters, digits or `_`, and not shaped like a cell label
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !looks_like_cell_label(name)
}

/// Quote a sheet name for use in a reference when it needs it: `'Laura''s'`
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

//==============================================================================
// Cell contents and results
//==============================================================================

/// Which variant a cell currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Empty,
    Numeric,
    String,
    Boolean,
    Formula,
}

impl CellKind {
    pub fn name(self) -> &'static str {
        match self {
            CellKind::Empty => "empty",
            CellKind::Numeric => "numeric",
            CellKind::String => "string",
            CellKind::Boolean => "boolean",
            CellKind::Formula => "formula",
        }
    }
}

/// Per-cell error marker stored as a formula's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FormulaError {
    #[error("#DIV/0!")]
    DivisionByZero,
    #[error("#VALUE!")]
    TypeMismatch,
    #[error("#N/A")]
    InvalidArity,
    #[error("#CIRCULAR!")]
    CircularReference,
    #[error("#REF!")]
    RefUnavailable,
    #[error("#NAME?")]
    NameNotFound,
    #[error("#CIRCNAME!")]
    CircularName,
}

impl FormulaError {
    /// Display code, e.g. `#DIV/0!`
    pub fn code(self) -> &'static str {
        match self {
            FormulaError::DivisionByZero => "#DIV/0!",
            FormulaError::TypeMismatch => "#VALUE!",
            FormulaError::InvalidArity => "#N/A",
            FormulaError::CircularReference => "#CIRCULAR!",
            FormulaError::RefUnavailable => "#REF!",
            FormulaError::NameNotFound => "#NAME?",
            FormulaError::CircularName => "#CIRCNAME!",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FormulaError::DivisionByZero => "division by zero",
            FormulaError::TypeMismatch => "operand has the wrong type",
            FormulaError::InvalidArity => "wrong number of function arguments",
            FormulaError::CircularReference => "cell is part of a circular reference",
            FormulaError::RefUnavailable => "referenced result is not available",
            FormulaError::NameNotFound => "named expression is not defined",
            FormulaError::CircularName => "named expression refers back to itself",
        }
    }
}

/// Cached result of a formula cell after a calculation pass
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaResult {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl FormulaResult {
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaResult::Error(_))
    }

    /// Human-readable form: numbers via [`format_number`], errors as their code
    pub fn display(&self) -> String {
        match self {
            FormulaResult::Number(n) => format_number(*n),
            FormulaResult::Text(s) => s.clone(),
            FormulaResult::Error(e) => e.code().to_string(),
        }
    }
}

/// Text form of a number: integral values without a fraction, otherwise
/// the shortest round-trip representation
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_label() {
        assert_eq!(column_label(0), "A");
        assert_eq!(column_label(25), "Z");
        assert_eq!(column_label(26), "AA");
        assert_eq!(column_label(27), "AB");
        assert_eq!(column_label(701), "ZZ");
        assert_eq!(column_label(702), "AAA");
    }

    #[test]
    fn test_parse_column_label() {
        assert_eq!(parse_column_label("A"), Some(0));
        assert_eq!(parse_column_label("z"), Some(25));
        assert_eq!(parse_column_label("AA"), Some(26));
        assert_eq!(parse_column_label("ZZ"), Some(701));
        assert_eq!(parse_column_label(""), None);
        assert_eq!(parse_column_label("A1"), None);
    }

    #[test]
    fn test_parse_a1() {
        assert_eq!(parse_a1("A1"), Some((0, 0)));
        assert_eq!(parse_a1("B5"), Some((4, 1)));
        assert_eq!(parse_a1("$C$10"), Some((9, 2)));
        assert_eq!(parse_a1("aa3"), Some((2, 26)));
        assert_eq!(parse_a1("A0"), None);
        assert_eq!(parse_a1("A"), None);
        assert_eq!(parse_a1("12"), None);
        assert_eq!(parse_a1("A1B"), None);
        assert_eq!(parse_a1("SUM"), None);
    }

    #[test]
    fn test_range_normalizes_corners() {
        let range = RangeAddress::new(SheetId(0), (4, 3), (1, 0));
        assert_eq!((range.first_row, range.first_col), (1, 0));
        assert_eq!((range.last_row, range.last_col), (4, 3));
        assert_eq!(range.cell_count(), 16);
        assert_eq!(range.to_string(), "A2:D5");
    }

    #[test]
    fn test_range_cells_row_major() {
        let range = RangeAddress::new(SheetId(0), (0, 0), (1, 1));
        let labels: Vec<String> = range.cells().map(|c| c.a1_label()).collect();
        assert_eq!(labels, vec!["A1", "B1", "A2", "B2"]);
    }

    #[test]
    fn test_range_contains_checks_sheet() {
        let range = RangeAddress::new(SheetId(0), (0, 0), (2, 0));
        assert!(range.contains(CellAddress::new(SheetId(0), 1, 0)));
        assert!(!range.contains(CellAddress::new(SheetId(1), 1, 0)));
        assert!(!range.contains(CellAddress::new(SheetId(0), 1, 1)));
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("price"));
        assert!(is_valid_name("_tax_rate"));
        assert!(is_valid_name("Q1_total"));
        assert!(is_valid_name("A1B"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("B5"));
        assert!(!is_valid_name("XFD1048577"));
        assert!(!is_valid_name("$A$1"));
        assert!(!is_valid_name("2024"));
        assert!(!is_valid_name("net price"));
        assert!(!is_valid_name("a$b"));
    }

    #[test]
    fn test_range_cell_count_uses_wide_arithmetic() {
        let whole_sheet = RangeAddress::new(SheetId(0), (0, 0), (1_048_575, 16_383));
        assert_eq!(whole_sheet.row_count(), 1_048_576);
        assert_eq!(whole_sheet.col_count(), 16_384);
        assert_eq!(whole_sheet.cell_count(), 17_179_869_184);
    }

    #[test]
    fn test_quote_sheet_name() {
        assert_eq!(quote_sheet_name("Data"), "Data");
        assert_eq!(quote_sheet_name("First Sheet"), "'First Sheet'");
        assert_eq!(quote_sheet_name("Laura's"), "'Laura''s'");
        assert_eq!(quote_sheet_name("2024"), "'2024'");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(36.0), "36");
        assert_eq!(format_number(-12.0), "-12");
        assert_eq!(format_number(11.2), "11.2");
    }

    #[test]
    fn test_formula_error_codes_match_display() {
        for e in [
            FormulaError::DivisionByZero,
            FormulaError::TypeMismatch,
            FormulaError::InvalidArity,
            FormulaError::CircularReference,
            FormulaError::RefUnavailable,
            FormulaError::NameNotFound,
            FormulaError::CircularName,
        ] {
            assert_eq!(e.to_string(), e.code());
        }
    }
}
