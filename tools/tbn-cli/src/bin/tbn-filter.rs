//! Filter driver: query the `.tbnpolymat` artifact next to a `.tbn` file by
//! monomer-name constraints.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, ValueHint};

use tbn_cli::{fail, init_tracing, DynError};
use tbn_core::filter::{self, Constraint, FilterLimits};
use tbn_core::{parser, polymat, TbnError};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Filter polymers from a .tbnpolymat artifact by monomer names"
)]
struct Cli {
    /// Input .tbn file; the matching .tbnpolymat artifact must exist
    #[arg(value_hint = ValueHint::FilePath)]
    tbn_file: PathBuf,

    /// Monomer names each polymer must contain; duplicates raise the
    /// required multiplicity. Empty means every polymer.
    monomer_names: Vec<String>,

    /// Read CONTAINS/EXACTLY constraint lines from a file instead
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "monomer_names")]
    constraints_file: Option<PathBuf>,

    /// Keep at most this many polymers
    #[arg(long, short = 'n')]
    max_count: Option<usize>,

    /// Drop polymers below this concentration (declared units)
    #[arg(long)]
    min_concentration: Option<f64>,

    /// Drop polymers below this percentage of the total concentration
    #[arg(long, value_name = "P")]
    percent_limit: Option<f64>,

    /// Write the report here instead of stdout
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Enable debug-level progress output
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(&cli) {
        fail("tbn-filter", err);
    }
}

fn run(cli: &Cli) -> Result<(), DynError> {
    if let Some(percent) = cli.percent_limit {
        if !(0.0..=100.0).contains(&percent) {
            return Err("--percent-limit must be between 0 and 100".into());
        }
    }

    let parsed = parser::parse_file(&cli.tbn_file, &BTreeMap::new())?;
    let tbn = parsed.tbn;
    if tbn.units().is_none() {
        return Err(Box::new(TbnError::Parse {
            line: 0,
            msg: "filtering needs a .tbn with \\UNITS and concentrations".into(),
        }));
    }

    let polymat_path = cli.tbn_file.with_extension("tbnpolymat");
    if !polymat_path.exists() {
        return Err(format!(
            "polymer matrix file '{}' not found; run `tbn` first",
            polymat_path.display()
        )
        .into());
    }
    let data = polymat::read(&polymat_path)?;

    let (constraints, description) = match &cli.constraints_file {
        Some(path) => {
            let constraints = filter::parse_constraints_file(path)?;
            (constraints, format!("constraints from {}", path.display()))
        }
        None if cli.monomer_names.is_empty() => (Vec::new(), "all polymers".to_string()),
        None => (
            vec![Constraint::Contains(cli.monomer_names.clone())],
            format!("containing {}", cli.monomer_names.join(" ")),
        ),
    };

    let limits = FilterLimits {
        max_count: cli.max_count,
        min_concentration: cli.min_concentration,
        percent_limit: cli.percent_limit,
    };
    let matches = filter::filter_polymers(&tbn, &data, &constraints, &limits);
    let report = filter::format_matches(&tbn, &data, &matches, &description, &limits);

    match &cli.output {
        Some(path) => std::fs::write(path, report)?,
        None => print!("{report}"),
    }
    Ok(())
}
