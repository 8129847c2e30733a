// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Equilibrium bridge.
//!
//! Stages the polymer matrix (with its free-energy column) and the monomer
//! concentrations in Molar for an external equilibrium solver, and re-scales
//! the answer back into the declared units. Two backends share the seam:
//! COFFEE (primary) and NUPACK's `concentrations` (alternate).

use std::time::Duration;

use thiserror::Error;

use tbn_core::model::Tbn;

mod coffee;
mod nupack;

pub use coffee::Coffee;
pub use nupack::Nupack;

pub type Result<T> = std::result::Result<T, EquilibriumError>;

#[derive(Debug, Error)]
pub enum EquilibriumError {
    #[error("{backend} not found at '{path}'; install it or set {env_var}")]
    MissingSolver {
        backend: &'static str,
        path: String,
        env_var: &'static str,
    },
    #[error("{backend} failed: {stderr}")]
    SolverFailed {
        backend: &'static str,
        stderr: String,
    },
    #[error("{backend} timed out after {timeout:?}")]
    Timeout {
        backend: &'static str,
        timeout: Duration,
    },
    #[error("{backend} produced malformed output: {msg}")]
    MalformedOutput {
        backend: &'static str,
        msg: String,
    },
    #[error("solver returned {found} concentrations for {expected} polymers")]
    RowCountMismatch { expected: usize, found: usize },
    #[error("TBN has no monomer concentrations")]
    MissingConcentrations,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One equilibrium computation, all concentrations in Molar.
pub struct EquilibriumProblem<'a> {
    /// Polymer rows (monomer counts), one per polymer.
    pub polymers: &'a [Vec<i64>],
    /// Free energy per polymer, same order.
    pub free_energies: &'a [f64],
    /// Monomer concentrations in Molar.
    pub concentrations_molar: &'a [f64],
    pub temperature_c: f64,
}

pub trait EquilibriumSolver {
    fn backend_name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    /// Equilibrium concentration per polymer, in Molar, input row order.
    fn equilibrium_concentrations(
        &self,
        problem: &EquilibriumProblem<'_>,
        deadline: Option<Duration>,
    ) -> Result<Vec<f64>>;
}

/// Runs the solver for a TBN with declared units and returns the polymer
/// concentrations re-expressed in those units.
pub fn solve_in_declared_units(
    solver: &dyn EquilibriumSolver,
    tbn: &Tbn,
    polymers: &[Vec<i64>],
    free_energies: &[f64],
    temperature_c: f64,
    deadline: Option<Duration>,
) -> Result<Vec<f64>> {
    let units = tbn.units().ok_or(EquilibriumError::MissingConcentrations)?;
    let concentrations_molar = tbn
        .concentrations_molar()
        .ok_or(EquilibriumError::MissingConcentrations)?;
    let problem = EquilibriumProblem {
        polymers,
        free_energies,
        concentrations_molar: &concentrations_molar,
        temperature_c,
    };
    let molar = solver.equilibrium_concentrations(&problem, deadline)?;
    if molar.len() != polymers.len() {
        return Err(EquilibriumError::RowCountMismatch {
            expected: polymers.len(),
            found: molar.len(),
        });
    }
    Ok(molar.iter().map(|&c| units.from_molar(c)).collect())
}

/// Parses a whitespace-separated concentration list (decimal or scientific,
/// `0.00e0` included).
fn parse_concentration_list(text: &str, backend: &'static str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>().map_err(|_| EquilibriumError::MalformedOutput {
                backend,
                msg: format!("cannot parse concentration value '{tok}'"),
            })
        })
        .collect()
}

fn map_process_error(
    e: tbn_core::process::ProcessError,
    backend: &'static str,
    path: String,
    env_var: &'static str,
) -> EquilibriumError {
    use tbn_core::process::ProcessError;
    match e {
        ProcessError::TimedOut { timeout, .. } => EquilibriumError::Timeout { backend, timeout },
        ProcessError::Spawn { .. } => EquilibriumError::MissingSolver {
            backend,
            path,
            env_var,
        },
        ProcessError::Io(e) => EquilibriumError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_scientific() {
        let values = parse_concentration_list("1.5e-9 0.00e0 2.0\n4.47e-53", "coffee").unwrap();
        assert_eq!(values, vec![1.5e-9, 0.0, 2.0, 4.47e-53]);
    }

    #[test]
    fn rejects_non_numeric_tokens() {
        assert!(matches!(
            parse_concentration_list("1.0 oops", "coffee"),
            Err(EquilibriumError::MalformedOutput { .. })
        ));
    }
}
