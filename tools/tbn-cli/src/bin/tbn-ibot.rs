//! IBOT driver: polymer basis, canonical reactions, detailed-balance check,
//! exponent assignment, and optional balanced-concentration `.tbn` synthesis.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueHint};
use tracing::info;

use tbn_basis::basis;
use tbn_cli::{fail, init_tracing, DynError};
use tbn_core::{config::SolverConfig, parser, tbnpolys, TbnError, Unit};
use tbn_lattice::{DebugStore, FourTiTwo, LatticeSolver, Normaliz, SolveOptions};
use tbn_reactions::{ibot, ReactionEngine};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Assign concentration exponents to off-target polymers (IBOT)"
)]
struct Cli {
    /// Input .tbn file (must not declare \UNITS or concentrations)
    #[arg(value_hint = ValueHint::FilePath)]
    tbn_file: PathBuf,

    /// .tbnpolys file listing the on-target polymers
    #[arg(value_hint = ValueHint::FilePath)]
    on_target_file: PathBuf,

    /// Use 4ti2 instead of Normaliz for both Hilbert basis computations
    #[arg(long = "use-4ti2")]
    use_4ti2: bool,

    /// Generate a .tbn with balanced concentrations from base value C
    #[arg(long, num_args = 2, value_names = ["C", "UNITS"], conflicts_with = "upper_bound_on_polymers")]
    generate_tbn: Option<Vec<String>>,

    /// Prefix for output files (default: input filename stem)
    #[arg(long)]
    output_prefix: Option<String>,

    /// Also write the canonical reactions ordered by IBOT iteration
    #[arg(long)]
    output_canonical_reactions: bool,

    /// Bounded-target mode: compute upper bounds only for the off-target
    /// polymers listed in this .tbnpolys file
    #[arg(long, value_name = "TBNPOLYS_FILE", value_hint = ValueHint::FilePath)]
    upper_bound_on_polymers: Option<PathBuf>,

    /// Path to the Normaliz executable
    #[arg(long, value_hint = ValueHint::FilePath)]
    normaliz_path: Option<PathBuf>,

    /// Path to the 4ti2 installation directory
    #[arg(long = "4ti2-path", value_hint = ValueHint::DirPath)]
    fourtitwo_path: Option<PathBuf>,

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
        fail("tbn-ibot", err);
    }
}

fn run(cli: &Cli) -> Result<(), DynError> {
    // Validate --generate-tbn before doing any work.
    let generate: Option<(f64, Unit)> = match &cli.generate_tbn {
        Some(args) => {
            let c: f64 = args[0]
                .parse()
                .map_err(|_| format!("invalid base concentration '{}'", args[0]))?;
            let units: Unit = args[1].parse::<Unit>().map_err(|e| e.to_string())?;
            Some((c, units))
        }
        None => None,
    };

    let parsed = parser::parse_file(&cli.tbn_file, &BTreeMap::new())?;
    let tbn = parsed.tbn;
    if tbn.units().is_some() {
        return Err(Box::new(TbnError::Parse {
            line: 0,
            msg: "IBOT input must not declare \\UNITS or concentrations".into(),
        }));
    }
    tbn.check_star_limiting()?;

    let mut solver_config = SolverConfig::from_env();
    if let Some(path) = &cli.normaliz_path {
        solver_config.normaliz_path = path.clone();
    }
    if let Some(path) = &cli.fourtitwo_path {
        solver_config.fourtitwo_path = path.clone();
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
        .tbn_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tbn".to_string());
    let output_prefix = cli.output_prefix.clone().unwrap_or_else(|| base_name.clone());
    let debug_store = cli
        .store_solver_inputs
        .then(|| DebugStore::new(base_name.clone()));

    let basis_opts = SolveOptions {
        deadline: solver_config.timeout,
        debug: debug_store.as_ref(),
        purpose: "polymer-basis",
    };
    info!(backend = solver.backend_name(), "computing polymer basis");
    let polymer_basis = basis::compute_polymer_basis(&tbn, solver.as_ref(), &basis_opts)?;
    info!(polymers = polymer_basis.len(), "polymer basis ready");

    let on_target_vectors = tbnpolys::parse_file(&cli.on_target_file, &tbn)?;
    let on_target = ReactionEngine::resolve_polymer_indices(&polymer_basis, &on_target_vectors)?;
    info!(on_target = on_target.len(), "on-target polymers resolved");

    let engine = ReactionEngine::new(&polymer_basis, &on_target);
    let reaction_opts = SolveOptions {
        deadline: solver_config.timeout,
        debug: debug_store.as_ref(),
        purpose: "canonical-reactions",
    };

    let bounded = cli.upper_bound_on_polymers.is_some();
    let reactions = match &cli.upper_bound_on_polymers {
        Some(targets_file) => {
            let target_vectors = tbnpolys::parse_file(targets_file, &tbn)?;
            let targets = ReactionEngine::resolve_polymer_indices(&polymer_basis, &target_vectors)?;
            // Strict slices need module generators, which only 4ti2 provides.
            let fourtitwo = FourTiTwo::new(solver_config.fourtitwo_path.clone());
            engine.enumerate_bounded(&fourtitwo, &targets, &reaction_opts)?
        }
        None => engine.enumerate(solver.as_ref(), &reaction_opts)?,
    };
    info!(reactions = reactions.len(), "irreducible canonical reactions");

    let label = polymer_label_fn(&tbn, &polymer_basis);
    engine.check_on_target_balance(&reactions, &label)?;
    info!("on-target polymers are in detailed balance");

    let outcome = ibot::run_ibot(polymer_basis.len(), &on_target, &reactions);

    let suffix = if bounded { "-upper-bounds" } else { "" };
    let tbnpolys_out = PathBuf::from(format!("{output_prefix}-ibot{suffix}.tbnpolys"));
    std::fs::write(
        &tbnpolys_out,
        ibot::format_ibot_tbnpolys(&tbn, &polymer_basis, &outcome),
    )?;
    println!("IBOT exponents written to {}", tbnpolys_out.display());

    if cli.output_canonical_reactions {
        let reactions_out =
            PathBuf::from(format!("{output_prefix}-ibot{suffix}-reactions.txt"));
        std::fs::write(
            &reactions_out,
            ibot::format_reactions_report(&reactions, &outcome, &label),
        )?;
        println!("Canonical reactions written to {}", reactions_out.display());
    }

    if let Some((c, units)) = generate {
        let concentrations =
            ibot::synthesize_monomer_concentrations(&polymer_basis, &outcome, c, units);
        let tbn_out = PathBuf::from(format!("{output_prefix}-ibot-c{c}.tbn"));
        std::fs::write(
            &tbn_out,
            parser::format_tbn(tbn.monomers(), units, &concentrations),
        )?;
        println!("Balanced .tbn written to {} (c = {c} {units})", tbn_out.display());
    }

    let n_off = polymer_basis.len() - on_target.len();
    println!("Total polymers: {}", polymer_basis.len());
    println!("On-target polymers: {}", on_target.len());
    println!("Off-target polymers: {n_off}");
    if !bounded && !outcome.unreachable.is_empty() {
        println!(
            "Off-target polymers unreachable by canonical reactions (excluded): {}",
            outcome.unreachable.len()
        );
    }
    Ok(())
}

/// Labels a polymer by its monomer composition, e.g. `[A + 2 B]`.
fn polymer_label_fn<'a>(
    tbn: &'a tbn_core::Tbn,
    basis: &'a basis::PolymerBasis,
) -> impl Fn(u32) -> String + 'a {
    move |p: u32| {
        let counts = basis.polymer(p as usize);
        let mut parts = Vec::new();
        for (i, &count) in counts.iter().enumerate() {
            if count <= 0 {
                continue;
            }
            let monomer = &tbn.monomers()[i];
            let name = monomer
                .name
                .clone()
                .unwrap_or_else(|| monomer.sites_str());
            if count == 1 {
                parts.push(name);
            } else {
                parts.push(format!("{count} {name}"));
            }
        }
        format!("[{}]", parts.join(" + "))
    }
}
