//! Shared driver plumbing: tracing setup and the exit-code taxonomy.

use std::error::Error;
use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use tbn_basis::BasisError;
use tbn_core::TbnError;
use tbn_equilibrium::EquilibriumError;
use tbn_lattice::LatticeError;
use tbn_reactions::ReactionsError;

pub type DynError = Box<dyn Error>;

pub type Result<T> = std::result::Result<T, DynError>;

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Configures the global tracing subscriber. `verbose` lowers the default
/// filter to `debug`; `RUST_LOG` still wins when set.
pub fn init_tracing(verbose: bool) {
    if INITIALISED.set(()).is_err() {
        return;
    }
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());
    Registry::default().with(filter).with(fmt_layer).init();
}

/// Exit codes, one per error kind.
pub mod exit_codes {
    pub const PARSE: i32 = 1;
    pub const INVARIANT: i32 = 2;
    pub const MISSING_SOLVER: i32 = 3;
    pub const LATTICE: i32 = 4;
    pub const LATTICE_TIMEOUT: i32 = 5;
    pub const EQUILIBRIUM: i32 = 6;
    pub const ON_TARGET_IMBALANCE: i32 = 7;
    pub const OVERFLOW: i32 = 8;
    pub const OTHER: i32 = 9;
}

fn core_exit_code(err: &TbnError) -> i32 {
    match err {
        TbnError::Overflow { .. } => exit_codes::OVERFLOW,
        TbnError::Io(_) => exit_codes::OTHER,
        e if e.is_invariant_violation() => exit_codes::INVARIANT,
        _ => exit_codes::PARSE,
    }
}

fn lattice_exit_code(err: &LatticeError) -> i32 {
    match err {
        LatticeError::MissingSolver { .. } => exit_codes::MISSING_SOLVER,
        LatticeError::Timeout { .. } => exit_codes::LATTICE_TIMEOUT,
        LatticeError::Io(_) => exit_codes::OTHER,
        _ => exit_codes::LATTICE,
    }
}

/// Maps an error to its exit code by walking the concrete kinds.
pub fn exit_code_for(err: &(dyn Error + 'static)) -> i32 {
    if let Some(e) = err.downcast_ref::<TbnError>() {
        return core_exit_code(e);
    }
    if let Some(e) = err.downcast_ref::<LatticeError>() {
        return lattice_exit_code(e);
    }
    if let Some(e) = err.downcast_ref::<BasisError>() {
        return match e {
            BasisError::Lattice(inner) => lattice_exit_code(inner),
            BasisError::Core(inner) => core_exit_code(inner),
            BasisError::EmptyBasis => exit_codes::LATTICE,
            BasisError::Io(_) => exit_codes::OTHER,
        };
    }
    if let Some(e) = err.downcast_ref::<ReactionsError>() {
        return match e {
            ReactionsError::OnTargetImbalance { .. } => exit_codes::ON_TARGET_IMBALANCE,
            ReactionsError::UnknownOnTarget { .. }
            | ReactionsError::TargetNotOffTarget { .. } => exit_codes::INVARIANT,
            ReactionsError::Overflow { .. } => exit_codes::OVERFLOW,
            ReactionsError::Lattice(inner) => lattice_exit_code(inner),
            ReactionsError::Core(inner) => core_exit_code(inner),
        };
    }
    if let Some(e) = err.downcast_ref::<EquilibriumError>() {
        return match e {
            EquilibriumError::MissingSolver { .. } => exit_codes::MISSING_SOLVER,
            EquilibriumError::Io(_) => exit_codes::OTHER,
            _ => exit_codes::EQUILIBRIUM,
        };
    }
    exit_codes::OTHER
}

/// Prints the single user-facing error line with its component tag and exits.
pub fn fail(component: &str, err: DynError) -> ! {
    eprintln!("{component}: error: {err}");
    std::process::exit(exit_code_for(err.as_ref()));
}

/// Parses `k=v` parameter assignments for parametrized `.tbn` files.
pub fn parse_assignments(
    assignments: &[String],
) -> Result<std::collections::BTreeMap<String, f64>> {
    let mut variables = std::collections::BTreeMap::new();
    for assignment in assignments {
        let Some((name, value)) = assignment.split_once('=') else {
            return Err(format!(
                "invalid parameter assignment '{assignment}' (expected VAR=VALUE)"
            )
            .into());
        };
        let value: f64 = value.trim().parse().map_err(|_| {
            format!("invalid numeric value '{}' for parameter '{}'", value.trim(), name.trim())
        })?;
        variables.insert(name.trim().to_string(), value);
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let parse = TbnError::Parse {
            line: 1,
            msg: "x".into(),
        };
        assert_eq!(exit_code_for(&parse), exit_codes::PARSE);

        let invariant = TbnError::NotStarLimited {
            site: "a".into(),
            excess: -1.0,
        };
        assert_eq!(exit_code_for(&invariant), exit_codes::INVARIANT);

        let missing = LatticeError::MissingSolver {
            backend: "normaliz",
            path: "normaliz".into(),
            env_var: "TBN_NORMALIZ_PATH",
        };
        assert_eq!(exit_code_for(&missing), exit_codes::MISSING_SOLVER);

        let timeout = LatticeError::Timeout {
            backend: "normaliz",
            timeout: std::time::Duration::from_secs(1),
        };
        assert_eq!(exit_code_for(&timeout), exit_codes::LATTICE_TIMEOUT);

        let imbalance = ReactionsError::OnTargetImbalance {
            reaction: "2 A -> 3 B".into(),
        };
        assert_eq!(exit_code_for(&imbalance), exit_codes::ON_TARGET_IMBALANCE);

        let overflow = TbnError::Overflow {
            context: "total sites",
        };
        assert_eq!(exit_code_for(&overflow), exit_codes::OVERFLOW);
    }

    #[test]
    fn nested_errors_unwrap_to_inner_code() {
        let nested = BasisError::Lattice(LatticeError::Timeout {
            backend: "4ti2",
            timeout: std::time::Duration::from_secs(1),
        });
        assert_eq!(exit_code_for(&nested), exit_codes::LATTICE_TIMEOUT);
    }

    #[test]
    fn assignments_parse_and_reject() {
        let vars = parse_assignments(&["x=20".into(), "y = 1.5".into()]).unwrap();
        assert_eq!(vars["x"], 20.0);
        assert_eq!(vars["y"], 1.5);
        assert!(parse_assignments(&["nope".into()]).is_err());
        assert!(parse_assignments(&["x=abc".into()]).is_err());
    }
}
