// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! NUPACK `concentrations` backend (alternate).
//!
//! Stages the tab-delimited `.ocx` layout (id, a literal 1, monomer counts,
//! free energy) plus a `.con` file, runs with `-sort 0` so the row order is
//! preserved, and reads the row-augmented `.eq` file whose last column is the
//! equilibrium concentration.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tbn_core::process;
use tempfile::TempDir;
use tracing::debug;

use crate::{
    map_process_error, EquilibriumError, EquilibriumProblem, EquilibriumSolver, Result,
};

const BACKEND: &str = "nupack";

pub struct Nupack {
    path: PathBuf,
}

impl Nupack {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config() -> Self {
        Self::new(tbn_core::config::config().nupack_path.clone())
    }

    fn format_ocx(problem: &EquilibriumProblem<'_>) -> String {
        let mut out = String::new();
        for (idx, (counts, energy)) in problem
            .polymers
            .iter()
            .zip(problem.free_energies)
            .enumerate()
        {
            let _ = write!(out, "{}\t1", idx + 1);
            for &c in counts {
                let _ = write!(out, "\t{c}");
            }
            let _ = writeln!(out, "\t{energy}");
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

    /// The `.eq` file repeats the `.ocx` rows with the concentration appended
    /// as the last tab-delimited column.
    fn parse_eq(text: &str) -> Result<Vec<f64>> {
        let mut concentrations = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 2 {
                continue;
            }
            if let Ok(conc) = parts[parts.len() - 1].trim().parse::<f64>() {
                concentrations.push(conc);
            }
        }
        if concentrations.is_empty() {
            return Err(EquilibriumError::MalformedOutput {
                backend: BACKEND,
                msg: "no concentration data in .eq file".into(),
            });
        }
        Ok(concentrations)
    }
}

impl EquilibriumSolver for Nupack {
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
        let base = workdir.path().join("nupack_input");
        std::fs::write(base.with_extension("ocx"), Self::format_ocx(problem))?;
        std::fs::write(base.with_extension("con"), Self::format_con(problem))?;

        debug!(
            polymers = problem.polymers.len(),
            temperature_c = problem.temperature_c,
            "invoking nupack concentrations"
        );
        let mut cmd = Command::new(&self.path);
        cmd.args(["-sort", "0", "-T"])
            .arg(problem.temperature_c.to_string())
            .arg(&base)
            .current_dir(workdir.path());
        let output = process::run_with_deadline(cmd, workdir.path(), deadline).map_err(|e| {
            map_process_error(e, BACKEND, self.path.display().to_string(), "TBN_NUPACK_PATH")
        })?;
        if !output.status.success() {
            return Err(EquilibriumError::SolverFailed {
                backend: BACKEND,
                stderr: output.stderr_excerpt(),
            });
        }

        let text = std::fs::read_to_string(base.with_extension("eq"))?;
        let concentrations = Self::parse_eq(&text)?;
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
    fn ocx_layout_has_id_and_literal_one() {
        let problem = EquilibriumProblem {
            polymers: &[vec![2, 1]],
            free_energies: &[-1.5],
            concentrations_molar: &[1e-6, 1e-6],
            temperature_c: 37.0,
        };
        assert_eq!(Nupack::format_ocx(&problem), "1\t1\t2\t1\t-1.5\n");
    }

    #[test]
    fn eq_parse_skips_headers_and_takes_last_column() {
        let text = "% NUPACK 3.2.2\n1\t1\t2\t1\t-1.5\t4.47e-9\n2\t1\t0\t1\t0\t0.00e0\n";
        assert_eq!(Nupack::parse_eq(text).unwrap(), vec![4.47e-9, 0.0]);
    }

    #[test]
    fn empty_eq_is_malformed() {
        assert!(matches!(
            Nupack::parse_eq("% header only\n"),
            Err(EquilibriumError::MalformedOutput { .. })
        ));
    }
}
