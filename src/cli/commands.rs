use crate::config::TextPolicy;
use crate::core::{Document, RecalcReport};
use crate::error::{CalcError, CalcResult};
use crate::parser::{self, parse_cell_address, LoadedModel};
use crate::sort;
use crate::types::{format_number, CellAddress, CellKind, FormulaResult};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Display text for a cell: its value, its result, or its error code
fn cell_value_text(doc: &Document, cell: CellAddress) -> String {
    match doc.cell_kind(cell) {
        CellKind::Empty => String::new(),
        CellKind::Numeric => doc.numeric_value(cell).map(format_number).unwrap_or_default(),
        CellKind::String => doc.string_value(cell).unwrap_or_default(),
        CellKind::Boolean => match doc.boolean_value(cell) {
            Ok(true) => "TRUE".to_string(),
            Ok(false) => "FALSE".to_string(),
            Err(_) => String::new(),
        },
        CellKind::Formula => doc
            .cell_result(cell)
            .map(FormulaResult::display)
            .unwrap_or_else(|| "(not calculated)".to_string()),
    }
}

fn colored_value(doc: &Document, cell: CellAddress) -> String {
    let text = cell_value_text(doc, cell);
    match doc.cell_result(cell) {
        Some(result) if result.is_error() => text.bold().red().to_string(),
        Some(_) => text.bold().to_string(),
        None => text,
    }
}

fn print_problems(file: &Path, loaded: &LoadedModel) {
    for problem in &loaded.problems {
        println!(
            "   {} {} {}: {}",
            "❌".red(),
            file.display(),
            problem.cell.bright_blue(),
            problem.error
        );
    }
}

fn load_document(file: &Path) -> CalcResult<Document> {
    let loaded = parser::parse_model(file)?;
    if !loaded.problems.is_empty() {
        print_problems(file, &loaded);
    }
    loaded.into_document()
}

#[derive(Serialize)]
struct CellOutput {
    cell: String,
    kind: CellKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

#[derive(Serialize)]
struct SheetOutput {
    name: String,
    cells: Vec<CellOutput>,
}

#[derive(Serialize)]
struct NameOutput {
    name: String,
    formula: String,
}

#[derive(Serialize)]
struct CalculateOutput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    names: Vec<NameOutput>,
    sheets: Vec<SheetOutput>,
    report: RecalcReport,
}

fn cell_output(doc: &Document, cell: CellAddress) -> CellOutput {
    let kind = doc.cell_kind(cell);
    let (value, error) = match kind {
        CellKind::Empty => (None, None),
        CellKind::Numeric => (doc.numeric_value(cell).ok().map(serde_json::Value::from), None),
        CellKind::String => (doc.string_value(cell).ok().map(serde_json::Value::from), None),
        CellKind::Boolean => (doc.boolean_value(cell).ok().map(serde_json::Value::from), None),
        CellKind::Formula => match doc.cell_result(cell) {
            Some(FormulaResult::Number(n)) => (Some(serde_json::Value::from(*n)), None),
            Some(FormulaResult::Text(s)) => (Some(serde_json::Value::from(s.as_str())), None),
            Some(FormulaResult::Error(e)) => (None, Some(e.code())),
            None => (None, None),
        },
    };

    CellOutput {
        cell: cell.a1_label(),
        kind,
        formula: doc.formula_source(cell).map(str::to_string),
        value,
        error,
    }
}

/// Execute the calculate command
pub fn calculate(
    file: PathBuf,
    json: bool,
    text_policy: Option<TextPolicy>,
    verbose: bool,
) -> CalcResult<()> {
    if !json {
        println!("{}", "🔥 Cellforge - Calculating formulas".bold().green());
        println!("   File: {}\n", file.display());
    }

    let mut doc = load_document(&file)?;
    if let Some(policy) = text_policy {
        let config = doc.config().with_text_policy(policy);
        doc.set_config(config);
    }

    if verbose && !json {
        println!(
            "   Found {} sheet(s), {} dirty cell(s)",
            doc.sheet_count(),
            doc.dirty_count()
        );
        println!(
            "   Text in aggregates: {:?}\n",
            doc.config().text_in_aggregates
        );
    }

    let report = doc.calculate()?;

    if json {
        let sheets = doc
            .sheet_ids()
            .zip(doc.sheet_names())
            .map(|(id, name)| SheetOutput {
                name: name.to_string(),
                cells: doc.used_cells(id).map(|c| cell_output(&doc, c)).collect(),
            })
            .collect();
        let names = doc
            .named_expressions()
            .map(|(name, formula)| NameOutput {
                name: name.to_string(),
                formula: formula.to_string(),
            })
            .collect();
        let output = CalculateOutput {
            names,
            sheets,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "✅ Calculation Results:".bold().green());
    let names: Vec<(&str, &str)> = doc.named_expressions().collect();
    if !names.is_empty() {
        println!("   🏷️  Names:");
        for (name, formula) in names {
            println!("      {} = {}", name.cyan(), formula.bright_yellow());
        }
    }
    for (id, name) in doc.sheet_ids().zip(doc.sheet_names()) {
        println!("   📊 Sheet: {}", name.bright_blue().bold());
        for cell in doc.used_cells(id) {
            match doc.formula_source(cell) {
                Some(source) => println!(
                    "      {} = {}   {}",
                    cell.a1_label().cyan(),
                    colored_value(&doc, cell),
                    source.bright_yellow()
                ),
                None => println!(
                    "      {} = {}",
                    cell.a1_label().cyan(),
                    colored_value(&doc, cell)
                ),
            }
        }
    }
    println!();

    if report.had_cycles() {
        println!("{}", format!("⚠️  {}", report.summary()).yellow());
    } else {
        println!("   {}", report.summary());
    }

    Ok(())
}

/// Execute the validate command - parse every formula without calculating
pub fn validate(files: Vec<PathBuf>) -> CalcResult<()> {
    println!("{}", "✅ Validating models".bold().green());

    let mut invalid = 0;
    for file in &files {
        println!("   File: {}", file.display());
        let loaded = parser::parse_model(file)?;
        print_problems(file, &loaded);
        invalid += loaded.problems.len();
    }
    println!();

    if invalid == 0 {
        println!("{}", "✅ All formulas are valid!".bold().green());
        Ok(())
    } else {
        let message = format!("Found {} invalid cell(s)", invalid);
        println!("{}", format!("❌ {}", message).bold().red());
        Err(CalcError::Validation(message))
    }
}

/// Execute the audit command - show a cell's formula, value and dependency chain
pub fn audit(file: PathBuf, cell: String) -> CalcResult<()> {
    println!("{}", "🔍 Cellforge - Audit Trail".bold().green());
    println!("   File: {}", file.display());
    println!("   Cell: {}\n", cell.bright_blue().bold());

    let mut doc = load_document(&file)?;
    let address = parse_cell_address(&cell, &doc)?;
    doc.calculate()?;

    println!("{}", "📋 Cell Information:".bold().cyan());
    println!("   Address: {}", doc.qualified_label(address));
    println!("   Type: {}", doc.cell_kind(address).name().cyan());
    if let Some(source) = doc.formula_source(address) {
        println!("   Formula: {}", source.bright_yellow());
    }
    println!("   Value: {}", colored_value(&doc, address));
    println!();

    let precedents = doc.precedents(address);
    println!("{}", "🌳 Precedents:".bold().cyan());
    if precedents.is_empty() {
        println!("   No precedents (literal value)");
    }
    for precedent in &precedents {
        println!(
            "   └─ {} = {}",
            doc.qualified_label(*precedent).bright_blue(),
            colored_value(&doc, *precedent)
        );
    }
    println!();

    let dependents = doc.dependents(address);
    println!("{}", "🔗 Dependents:".bold().cyan());
    if dependents.is_empty() {
        println!("   Nothing depends on this cell");
    }
    for dependent in &dependents {
        println!(
            "   └─ {} = {}",
            doc.qualified_label(*dependent).bright_blue(),
            colored_value(&doc, *dependent)
        );
    }

    Ok(())
}

/// Execute the sort command - print names of a dependency list in order
pub fn sort(file: PathBuf) -> CalcResult<()> {
    for name in sort::sort_file(&file)? {
        println!("{}", name);
    }
    Ok(())
}
