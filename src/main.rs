use cellforge::cli;
use cellforge::config::TextPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cellforge")]
#[command(about = "Spreadsheet formula engine: sheets, dependencies, ordered recalculation.")]
#[command(long_about = "Cellforge - Spreadsheet formula engine
Sparse sheets | A1 references | Cycle detection | Incremental recalculation

COMMANDS:
  calculate   - Load a YAML model and evaluate every formula
  validate    - Parse every formula without calculating
  audit       - Show a cell's formula, value, precedents and dependents
  sort        - Order a 'name: dependency' list, dependencies first

EXAMPLES:
  cellforge calculate model.yaml                 # Evaluate formulas
  cellforge calculate model.yaml --json          # Machine-readable results
  cellforge audit model.yaml \"'Q1 Sales'!B5\"    # Dependency chain of one cell
  cellforge sort deps.txt                        # Topological order

Set RUST_LOG=cellforge=debug for recalculation traces.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Calculate all formulas in a YAML model.

MODEL FORMAT:
  config:
    text_in_aggregates: skip    # or 'error'
  names:
    rate: \"0.2\"
  sheets:
    - name: Data
      cells:
        A1: 10
        A2: \"label\"
        A3: \"=SUM(A1:A2) * rate\"
        A4: { text: \"=kept as text\" }
        A5: true

Formulas are evaluated in dependency order. Cells on a reference cycle
show #CIRCULAR!, cells that read from a cycle show #REF!. Undefined names
show #NAME?, names that refer back to themselves show #CIRCNAME!.")]
    /// Calculate all formulas in a YAML model
    Calculate {
        /// Path to YAML model
        file: PathBuf,

        /// Print results as JSON instead of the colored report
        #[arg(long)]
        json: bool,

        /// How SUM/AVERAGE/MAX/MIN treat text operands (overrides the model's config)
        #[arg(long, value_enum, env = "CELLFORGE_TEXT_POLICY")]
        text_policy: Option<TextPolicy>,

        /// Show verbose calculation steps
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check that every cell address and formula parses
    Validate {
        /// YAML models to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    #[command(long_about = "Show the audit trail of one cell.

CELL FORMAT:
  B5              - first sheet
  Data!B5         - named sheet
  'Q1 Sales'!B5   - quoted sheet name ('' for a literal quote)

Precedents are the cells the formula reads directly. Dependents are every
cell that would be recalculated when this one changes.")]
    /// Show a cell's formula, value and dependency chain
    Audit {
        /// Path to YAML model
        file: PathBuf,

        /// Cell to audit
        cell: String,
    },

    /// Sort a 'name: dependency' list so dependencies come first
    Sort {
        /// Text file, one 'name: dependency' pair per line
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Calculate { verbose: true, .. });
    cli::init_tracing(verbose);

    match cli.command {
        Commands::Calculate {
            file,
            json,
            text_policy,
            verbose,
        } => cli::calculate(file, json, text_policy, verbose)?,

        Commands::Validate { files } => cli::validate(files)?,

        Commands::Audit { file, cell } => cli::audit(file, cell)?,

        Commands::Sort { file } => cli::sort(file)?,
    }

    Ok(())
}
