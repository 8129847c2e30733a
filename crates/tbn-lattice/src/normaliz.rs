// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Normaliz backend (primary).
//!
//! Emits a `.in` problem file with `amb_space` / `equations` / `inequalities`
//! sections and the `HilbertBasis` goal, runs the binary, and streams the
//! Hilbert-basis section out of the `.out` report.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tbn_core::process::{self, ProcessError};
use tempfile::TempDir;
use tracing::debug;

use crate::{
    parse_int_row, HomogeneousSystem, LatticeError, LatticeSolver, Result, SliceSolutions,
    SolveOptions, StrictSlice,
};

const BACKEND: &str = "normaliz";

/// Section headers that introduce basis vectors in a Normaliz report.
const BASIS_HEADERS: &[&str] = &[
    "lattice points in polytope (Hilbert basis elements of degree 1):",
    "Hilbert basis elements:",
    "module generators:",
];

/// Markers that terminate the basis section.
const SECTION_TERMINATORS: &[&str] = &[
    "extreme rays:",
    "support hyperplanes:",
    "equations:",
    "basis elements of generated",
    "***",
];

pub struct Normaliz {
    path: PathBuf,
}

impl Normaliz {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config() -> Self {
        Self::new(tbn_core::config::config().normaliz_path.clone())
    }

    fn format_input(system: &HomogeneousSystem) -> String {
        let mut out = String::new();
        out.push_str("/* Normaliz input for Hilbert basis computation */\n\n");
        let _ = writeln!(out, "amb_space {}\n", system.dim);
        if !system.equations.is_empty() {
            let _ = writeln!(out, "equations {}", system.equations.len());
            for row in &system.equations {
                push_row(&mut out, row);
            }
            out.push('\n');
        }
        if !system.inequalities.is_empty() {
            let _ = writeln!(out, "inequalities {}", system.inequalities.len());
            for row in &system.inequalities {
                push_row(&mut out, row);
            }
            out.push('\n');
        }
        out.push_str("HilbertBasis\n");
        out
    }

    fn run(&self, input_file: &Path, workdir: &Path, deadline: Option<Duration>) -> Result<PathBuf> {
        let mut cmd = Command::new(&self.path);
        cmd.arg(input_file);
        let output = process::run_with_deadline(cmd, workdir, deadline).map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => LatticeError::Timeout {
                backend: BACKEND,
                timeout,
            },
            ProcessError::Spawn { .. } => LatticeError::MissingSolver {
                backend: BACKEND,
                path: self.path.display().to_string(),
                env_var: "TBN_NORMALIZ_PATH",
            },
            ProcessError::Io(e) => LatticeError::Io(e),
        })?;
        if !output.status.success() {
            return Err(LatticeError::SolverFailed {
                backend: BACKEND,
                stderr: output.stderr_excerpt(),
            });
        }
        let output_file = input_file.with_extension("out");
        if !output_file.exists() {
            return Err(LatticeError::MalformedOutput {
                backend: BACKEND,
                msg: format!("report '{}' not produced", output_file.display()),
            });
        }
        Ok(output_file)
    }

    /// Streams the basis vectors out of a Normaliz report. The working set is
    /// one line plus the growing result vector.
    fn parse_report(path: &Path, dim: usize) -> Result<Vec<Vec<i64>>> {
        let reader = BufReader::new(File::open(path)?);
        let mut vectors = Vec::new();
        let mut in_section = false;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if BASIS_HEADERS.iter().any(|h| line.contains(h)) {
                in_section = true;
                continue;
            }
            if in_section {
                if SECTION_TERMINATORS.iter().any(|t| line.contains(t)) {
                    break;
                }
                if line.is_empty()
                    || !line
                        .chars()
                        .all(|c| c.is_ascii_digit() || c == '-' || c == ' ')
                {
                    continue;
                }
                vectors.push(parse_int_row(line, dim, BACKEND)?);
            }
        }
        Ok(vectors)
    }
}

impl LatticeSolver for Normaliz {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn is_available(&self) -> bool {
        let Ok(dir) = TempDir::new() else {
            return false;
        };
        let mut cmd = Command::new(&self.path);
        cmd.arg("--version");
        matches!(
            process::run_with_deadline(cmd, dir.path(), Some(Duration::from_secs(5))),
            Ok(out) if out.status.success()
        )
    }

    fn hilbert_basis(
        &self,
        system: &HomogeneousSystem,
        opts: &SolveOptions<'_>,
    ) -> Result<Vec<Vec<i64>>> {
        let workdir = TempDir::new()?;
        let input_file = workdir.path().join("problem.in");
        std::fs::write(&input_file, Self::format_input(system))?;
        if let Some(store) = opts.debug {
            store.preserve(&input_file, opts.purpose)?;
        }
        debug!(
            dim = system.dim,
            equations = system.equations.len(),
            inequalities = system.inequalities.len(),
            "invoking normaliz"
        );
        let report = self.run(&input_file, workdir.path(), opts.deadline)?;
        Self::parse_report(&report, system.dim)
    }

    /// Normaliz does not compute module generators over the original monoid
    /// for strict-slice problems; bounded-target mode needs 4ti2.
    fn strict_slice(
        &self,
        _slice: &StrictSlice,
        _opts: &SolveOptions<'_>,
    ) -> Result<SliceSolutions> {
        Err(LatticeError::Unsupported {
            backend: BACKEND,
            what: "minimal inhomogeneous solutions of a strict slice",
        })
    }
}

fn push_row(out: &mut String, row: &[i64]) {
    for (i, v) in row.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{v}");
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_equations_and_goal() {
        let system = HomogeneousSystem::from_equations(3, vec![vec![1, -1, 0], vec![0, 2, -1]]);
        let input = Normaliz::format_input(&system);
        assert!(input.contains("amb_space 3"));
        assert!(input.contains("equations 2\n1 -1 0\n0 2 -1\n"));
        assert!(input.trim_end().ends_with("HilbertBasis"));
        assert!(!input.contains("inequalities"));
    }

    #[test]
    fn formats_inequalities_when_present() {
        let system = HomogeneousSystem {
            dim: 2,
            equations: vec![vec![1, -1]],
            inequalities: vec![vec![1, 0]],
        };
        let input = Normaliz::format_input(&system);
        assert!(input.contains("inequalities 1\n1 0\n"));
    }

    #[test]
    fn parses_hilbert_basis_section() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("problem.out");
        std::fs::write(
            &report,
            "4 Hilbert basis elements\n\
             embedding dimension = 3\n\n\
             ***********************************************************************\n\n\
             4 Hilbert basis elements:\n\
             1 0 1\n\
             0 1 0\n\
             1 1 2\n\
             2 0 2\n\n\
             2 extreme rays:\n\
             1 0 1\n\
             0 1 0\n",
        )
        .unwrap();
        let basis = Normaliz::parse_report(&report, 3).unwrap();
        assert_eq!(
            basis,
            vec![vec![1, 0, 1], vec![0, 1, 0], vec![1, 1, 2], vec![2, 0, 2]]
        );
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("problem.out");
        std::fs::write(&report, "Hilbert basis elements:\n1 0\n").unwrap();
        assert!(matches!(
            Normaliz::parse_report(&report, 3),
            Err(LatticeError::MalformedOutput { .. })
        ));
    }
}
