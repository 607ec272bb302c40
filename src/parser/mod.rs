//! YAML cell model loading
//!
//! A model file lists sheets, optional named expressions, and the cells to
//! write into them. Loading it replays those writes against a fresh
//! [`Document`]; nothing is calculated.

use crate::config::CalcConfig;
use crate::core::{CellInput, Document};
use crate::error::{CalcError, CalcResult};
use crate::types::{parse_a1, CellAddress};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level layout of a model file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFile {
    #[serde(default)]
    pub config: CalcConfig,
    /// Named expressions, `name: formula`
    #[serde(default)]
    pub names: BTreeMap<String, String>,
    pub sheets: Vec<SheetSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetSpec {
    pub name: String,
    #[serde(default)]
    pub cells: BTreeMap<String, CellSpec>,
}

/// One cell value as written in YAML.
///
/// Plain text starting with `=` is a formula; the explicit forms
/// `{ text: ... }` and `{ formula: ... }` remove the ambiguity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CellSpec {
    Boolean(bool),
    Number(f64),
    Text(String),
    Explicit(ExplicitCell),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplicitCell {
    Text(String),
    Formula(String),
}

impl From<CellSpec> for CellInput {
    fn from(spec: CellSpec) -> Self {
        match spec {
            CellSpec::Boolean(b) => CellInput::Boolean(b),
            CellSpec::Number(n) => CellInput::Number(n),
            CellSpec::Text(s) if s.starts_with('=') => CellInput::Formula(s),
            CellSpec::Text(s) => CellInput::Text(s),
            CellSpec::Explicit(ExplicitCell::Text(s)) => CellInput::Text(s),
            CellSpec::Explicit(ExplicitCell::Formula(s)) => CellInput::Formula(s),
        }
    }
}

/// A cell the loader could not write
#[derive(Debug)]
pub struct CellProblem {
    /// `Sheet!A1` as written in the file, or the name of a named expression
    pub cell: String,
    pub error: CalcError,
}

/// A loaded document plus every cell that failed to load
#[derive(Debug)]
pub struct LoadedModel {
    pub document: Document,
    pub problems: Vec<CellProblem>,
}

impl LoadedModel {
    /// The document, or a validation error if any cell failed to load
    pub fn into_document(self) -> CalcResult<Document> {
        match self.problems.as_slice() {
            [] => Ok(self.document),
            [only] => Err(CalcError::Validation(format!("{}: {}", only.cell, only.error))),
            problems => Err(CalcError::Validation(format!(
                "{} cells failed to load (first: {}: {})",
                problems.len(),
                problems[0].cell,
                problems[0].error
            ))),
        }
    }
}

/// Parse a model file into a document.
///
/// File and YAML errors, and duplicate sheet names, fail the load. Bad cell
/// addresses and formulas that do not parse are collected in
/// [`LoadedModel::problems`] so every one of them can be reported.
///
/// # Example
/// ```no_run
/// use cellforge::parser::parse_model;
/// use std::path::Path;
///
/// let mut doc = parse_model(Path::new("model.yaml"))?.into_document()?;
/// let report = doc.calculate()?;
/// println!("{}", report.summary());
/// # Ok::<(), cellforge::error::CalcError>(())
/// ```
pub fn parse_model(path: &Path) -> CalcResult<LoadedModel> {
    let content = std::fs::read_to_string(path)?;
    parse_model_str(&content)
}

pub fn parse_model_str(content: &str) -> CalcResult<LoadedModel> {
    let model: ModelFile = serde_yaml::from_str(content)?;
    build_document(model)
}

fn build_document(model: ModelFile) -> CalcResult<LoadedModel> {
    let mut document = Document::with_config(model.config);

    // Append every sheet first so formulas may reference later ones
    let mut ids = Vec::with_capacity(model.sheets.len());
    for sheet in &model.sheets {
        ids.push(document.append_sheet(&sheet.name)?);
    }

    let mut problems = Vec::new();
    for (name, source) in &model.names {
        if let Err(error) = document.set_named_expression(name, source) {
            problems.push(CellProblem {
                cell: name.clone(),
                error,
            });
        }
    }

    for (sheet, id) in model.sheets.into_iter().zip(ids) {
        for (key, spec) in sheet.cells {
            let label = format!("{}!{}", sheet.name, key);
            let result = parse_a1(&key)
                .ok_or_else(|| CalcError::InvalidAddress(key.clone()))
                .and_then(|(row, col)| {
                    document.set_cell(CellAddress::new(id, row, col), spec.into())
                });
            if let Err(error) = result {
                problems.push(CellProblem { cell: label, error });
            }
        }
    }

    Ok(LoadedModel { document, problems })
}

/// Resolve `Sheet!B5`, `'My Sheet'!B5` or a bare `B5` (first sheet) in `doc`
pub fn parse_cell_address(text: &str, doc: &Document) -> CalcResult<CellAddress> {
    let pattern = Regex::new(
        r"^(?:(?:'(?P<quoted>(?:[^']|'')+)'|(?P<plain>[^'!]+))!)?(?P<cell>\$?[A-Za-z]+\$?[0-9]+)$",
    )
    .map_err(|e| CalcError::Validation(format!("Regex error: {}", e)))?;

    let captures = pattern
        .captures(text.trim())
        .ok_or_else(|| CalcError::InvalidAddress(text.to_string()))?;

    let sheet = match (captures.name("quoted"), captures.name("plain")) {
        (Some(quoted), _) => {
            let name = quoted.as_str().replace("''", "'");
            doc.sheet_by_name(&name)
                .ok_or(CalcError::UnknownSheet(name))?
        }
        (None, Some(plain)) => doc
            .sheet_by_name(plain.as_str())
            .ok_or_else(|| CalcError::UnknownSheet(plain.as_str().to_string()))?,
        (None, None) => doc
            .sheet_ids()
            .next()
            .ok_or_else(|| CalcError::UnknownSheet(String::new()))?,
    };

    let label = captures
        .name("cell")
        .map(|m| m.as_str())
        .ok_or_else(|| CalcError::InvalidAddress(text.to_string()))?;
    let (row, col) =
        parse_a1(label).ok_or_else(|| CalcError::InvalidAddress(text.to_string()))?;

    Ok(CellAddress::new(sheet, row, col))
}
