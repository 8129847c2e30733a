//! Primary driver: parse a `.tbn`, check the star-limiting invariant, compute
//! (or reuse) the polymer basis, attach free energies and equilibrium
//! concentrations, and write the `.tbnpolymat` artifact.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueHint};
use tracing::{info, warn};

use tbn_basis::{basis, cache};
use tbn_cli::{fail, init_tracing, parse_assignments, DynError};
use tbn_core::energy::AssocParams;
use tbn_core::polymat::PolymatData;
use tbn_core::tbnpolys::TbnpolysWriter;
use tbn_core::{config::SolverConfig, parser};
use tbn_equilibrium::{Coffee, EquilibriumSolver, Nupack};
use tbn_lattice::{DebugStore, FourTiTwo, LatticeError, LatticeSolver, Normaliz, SolveOptions};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Analyze a Thermodynamic Binding Network: polymer basis, free energies, equilibrium concentrations"
)]
struct Cli {
    /// Input .tbn file
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output file for the user-friendly polymer basis
    /// (default: <input>-polymer-basis.tbnpolys)
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Also write the polymer basis in the friendly .tbnpolys layout
    #[arg(long)]
    user_friendly_basis: bool,

    /// Only check the star-limiting restriction, then exit
    #[arg(long)]
    check_only: bool,

    /// Skip equilibrium concentrations even when monomer concentrations exist
    #[arg(long)]
    no_concentrations: bool,

    /// Skip free energies (also disables concentrations)
    #[arg(long)]
    no_free_energies: bool,

    /// Use 4ti2 instead of Normaliz for the Hilbert basis
    #[arg(long = "use-4ti2")]
    use_4ti2: bool,

    /// Path to the Normaliz executable
    #[arg(long, value_hint = ValueHint::FilePath)]
    normaliz_path: Option<PathBuf>,

    /// Path to the 4ti2 installation directory
    #[arg(long = "4ti2-path", value_hint = ValueHint::DirPath)]
    fourtitwo_path: Option<PathBuf>,

    /// Path to the COFFEE executable
    #[arg(long, value_hint = ValueHint::FilePath)]
    coffee_path: Option<PathBuf>,

    /// Path to the NUPACK concentrations executable
    #[arg(long, value_hint = ValueHint::FilePath)]
    nupack_path: Option<PathBuf>,

    /// Use the NUPACK concentrations backend instead of COFFEE
    #[arg(long)]
    nupack: bool,

    /// Association penalty dG_assoc in kcal/mol (pairs with --deltah-assoc)
    #[arg(long, requires = "deltah_assoc", allow_negative_numbers = true)]
    deltag_assoc: Option<f64>,

    /// Association penalty dH_assoc in kcal/mol (pairs with --deltag-assoc)
    #[arg(long, requires = "deltag_assoc", allow_negative_numbers = true)]
    deltah_assoc: Option<f64>,

    /// Temperature in degrees Celsius
    #[arg(long, default_value_t = 37.0, allow_negative_numbers = true)]
    temperature: f64,

    /// Variable assignments for parametrized .tbn files, e.g. x=20 y=10.4
    #[arg(long, num_args = 0.., value_name = "VAR=VALUE")]
    parametrized: Vec<String>,

    /// Preserve raw solver inputs under solver-inputs/
    #[arg(long)]
    store_solver_inputs: bool,

    /// Subprocess deadline in seconds (overrides TBN_SOLVER_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Enable debug-level progress output
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(&cli) {
        fail("tbn", err);
    }
}

fn run(cli: &Cli) -> Result<(), DynError> {
    let variables = parse_assignments(&cli.parametrized)?;
    let parsed = parser::parse_file(&cli.input, &variables)?;
    let tbn = parsed.tbn;
    info!(
        monomers = tbn.n_monomers(),
        binding_sites = tbn.n_sites(),
        "parsed {}",
        cli.input.display()
    );

    tbn.check_star_limiting()?;
    if cli.check_only {
        println!("Star-limiting check passed");
        return Ok(());
    }

    let mut solver_config = SolverConfig::from_env();
    if let Some(path) = &cli.normaliz_path {
        solver_config.normaliz_path = path.clone();
    }
    if let Some(path) = &cli.fourtitwo_path {
        solver_config.fourtitwo_path = path.clone();
    }
    if let Some(path) = &cli.coffee_path {
        solver_config.coffee_path = path.clone();
    }
    if let Some(path) = &cli.nupack_path {
        solver_config.nupack_path = path.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        solver_config.timeout = Some(Duration::from_secs(secs));
    }

    let solver: Box<dyn LatticeSolver> = if cli.use_4ti2 {
        Box::new(FourTiTwo::new(solver_config.fourtitwo_path.clone()))
    } else {
        Box::new(Normaliz::new(solver_config.normaliz_path.clone()))
    };

    let base_name = cli
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tbn".to_string());
    let debug_store = cli
        .store_solver_inputs
        .then(|| DebugStore::new(base_name.clone()));
    let opts = SolveOptions {
        deadline: solver_config.timeout,
        debug: debug_store.as_ref(),
        purpose: "polymer-basis",
    };

    let matrix_hash = tbn.canonical_hash();
    let polymat_path = cli.input.with_extension("tbnpolymat");

    let cached = cache::load_cached_basis(&polymat_path, &matrix_hash, tbn.n_monomers());
    let used_cache = cached.is_some();
    let polymer_basis = match cached {
        Some(basis) => basis,
        None => {
            if !solver.is_available() {
                return Err(Box::new(missing_solver_error(
                    solver.as_ref(),
                    &solver_config,
                )));
            }
            info!(backend = solver.backend_name(), "computing polymer basis");
            basis::compute_polymer_basis(&tbn, solver.as_ref(), &opts)?
        }
    };

    if cli.user_friendly_basis {
        let output = cli.output.clone().unwrap_or_else(|| {
            cli.input
                .with_file_name(format!("{base_name}-polymer-basis.tbnpolys"))
        });
        let writer = TbnpolysWriter::new(&tbn);
        writer.write_polymers(
            &polymer_basis.to_rows(),
            &output,
            Some(&format!("Polymer basis - {} polymers", polymer_basis.len())),
        )?;
        println!("Polymer basis written to {}", output.display());
    }

    let assoc = cli.deltag_assoc.zip(cli.deltah_assoc).map(|(dg, dh)| AssocParams {
        dg_assoc: dg,
        dh_assoc: dh,
    });

    let compute_energies = !cli.no_free_energies;
    let free_energies = compute_energies
        .then(|| basis::free_energies(&tbn, &polymer_basis, assoc.as_ref(), cli.temperature))
        .transpose()?;

    let mut concentrations: Option<Vec<f64>> = None;
    if compute_energies && !cli.no_concentrations && tbn.units().is_some() {
        let equilibrium: Box<dyn EquilibriumSolver> = if cli.nupack {
            Box::new(Nupack::new(solver_config.nupack_path.clone()))
        } else {
            Box::new(Coffee::new(solver_config.coffee_path.clone()))
        };
        if equilibrium.is_available() {
            concentrations = Some(tbn_equilibrium::solve_in_declared_units(
                equilibrium.as_ref(),
                &tbn,
                &polymer_basis.to_rows(),
                free_energies.as_deref().expect("energies computed"),
                cli.temperature,
                solver_config.timeout,
            )?);
            info!("equilibrium concentrations computed");
        } else {
            warn!(
                backend = equilibrium.backend_name(),
                "equilibrium solver unavailable, skipping concentrations"
            );
        }
    }

    let data = assemble_artifact(
        &polymer_basis,
        free_energies,
        concentrations,
        &tbn,
        matrix_hash,
        parsed.used_variables,
    );
    cache::write_artifact(&polymat_path, &data)?;

    if used_cache {
        println!(
            "Polymer basis: {} polymers (cached, matrix hashes match)",
            polymer_basis.len()
        );
    } else {
        println!("Polymer basis: {} polymers", polymer_basis.len());
    }
    if let Some(units) = tbn.units() {
        println!("Concentration units: {}", units.display_name());
    }
    println!("Polymer matrix written to {}", polymat_path.display());
    Ok(())
}

/// Rows are emitted in descending concentration order when concentrations
/// exist (ties in lexicographic row order), basis order otherwise.
fn assemble_artifact(
    polymer_basis: &basis::PolymerBasis,
    free_energies: Option<Vec<f64>>,
    concentrations: Option<Vec<f64>>,
    tbn: &tbn_core::Tbn,
    matrix_hash: String,
    parameters: std::collections::BTreeMap<String, f64>,
) -> PolymatData {
    let rows = polymer_basis.to_rows();
    let mut order: Vec<usize> = (0..rows.len()).collect();
    if let Some(conc) = &concentrations {
        order.sort_by(|&a, &b| {
            conc[b]
                .partial_cmp(&conc[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| rows[a].cmp(&rows[b]))
        });
    }
    PolymatData {
        polymers: order.iter().map(|&i| rows[i].clone()).collect(),
        free_energies: free_energies.map(|e| order.iter().map(|&i| e[i]).collect()),
        concentrations: concentrations.map(|c| order.iter().map(|&i| c[i]).collect()),
        units: tbn.units(),
        matrix_hash: Some(matrix_hash),
        parameters,
    }
}

fn missing_solver_error(solver: &dyn LatticeSolver, config: &SolverConfig) -> LatticeError {
    if solver.backend_name() == "4ti2" {
        LatticeError::MissingSolver {
            backend: "4ti2",
            path: config.fourtitwo_path.display().to_string(),
            env_var: "TBN_FOURTI2_PATH",
        }
    } else {
        LatticeError::MissingSolver {
            backend: "normaliz",
            path: config.normaliz_path.display().to_string(),
            env_var: "TBN_NORMALIZ_PATH",
        }
    }
}
