// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! COFFEE backend (primary): `.cfe` polymer matrix + `.con` concentrations,
//! output requested with `-o`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tbn_core::process;
use tempfile::TempDir;
use tracing::debug;

use crate::{
    map_process_error, parse_concentration_list, EquilibriumError, EquilibriumProblem,
    EquilibriumSolver, Result,
};

const BACKEND: &str = "coffee";

pub struct Coffee {
    path: PathBuf,
}

impl Coffee {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config() -> Self {
        Self::new(tbn_core::config::config().coffee_path.clone())
    }

    /// One `.cfe` row per polymer: monomer counts followed by free energy.
    fn format_cfe(problem: &EquilibriumProblem<'_>) -> String {
        let mut out = String::new();
        for (counts, energy) in problem.polymers.iter().zip(problem.free_energies) {
            for &c in counts {
                let _ = write!(out, "{c} ");
            }
            let _ = writeln!(out, "{energy}");
        }
        out
    }

    fn format_con(problem: &EquilibriumProblem<'_>) -> String {
        let mut out = String::new();
        for conc in problem.concentrations_molar {
            let _ = writeln!(out, "{conc}");
        }
        out
    }
}

impl EquilibriumSolver for Coffee {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn is_available(&self) -> bool {
        is_executable(&self.path)
    }

    fn equilibrium_concentrations(
        &self,
        problem: &EquilibriumProblem<'_>,
        deadline: Option<Duration>,
    ) -> Result<Vec<f64>> {
        let workdir = TempDir::new()?;
        let cfe_path = workdir.path().join("polymers.cfe");
        let con_path = workdir.path().join("monomers.con");
        let out_path = workdir.path().join("equilibrium.txt");
        std::fs::write(&cfe_path, Self::format_cfe(problem))?;
        std::fs::write(&con_path, Self::format_con(problem))?;

        debug!(
            polymers = problem.polymers.len(),
            temperature_c = problem.temperature_c,
            "invoking coffee"
        );
        // Temperature is already baked into the free-energy column; the
        // coffee-cli invocation takes only the two inputs and the output path.
        let mut cmd = Command::new(&self.path);
        cmd.arg(&cfe_path).arg(&con_path).arg("-o").arg(&out_path);
        let output = process::run_with_deadline(cmd, workdir.path(), deadline).map_err(|e| {
            map_process_error(e, BACKEND, self.path.display().to_string(), "TBN_COFFEE_PATH")
        })?;
        if !output.status.success() {
            return Err(EquilibriumError::SolverFailed {
                backend: BACKEND,
                stderr: output.stderr_excerpt(),
            });
        }

        let text = std::fs::read_to_string(&out_path)?;
        let concentrations = parse_concentration_list(&text, BACKEND)?;
        if concentrations.len() != problem.polymers.len() {
            return Err(EquilibriumError::RowCountMismatch {
                expected: problem.polymers.len(),
                found: concentrations.len(),
            });
        }
        Ok(concentrations)
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfe_rows_carry_counts_and_energy() {
        let problem = EquilibriumProblem {
            polymers: &[vec![1, 0], vec![1, 1]],
            free_energies: &[0.0, -3.0],
            concentrations_molar: &[1e-9, 2e-9],
            temperature_c: 37.0,
        };
        assert_eq!(Coffee::format_cfe(&problem), "1 0 0\n1 1 -3\n");
        assert_eq!(Coffee::format_con(&problem), "0.000000001\n0.000000002\n");
    }
}
