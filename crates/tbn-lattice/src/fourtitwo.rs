// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! 4ti2 backend (alternate).
//!
//! Problems are staged as the `.mat`/`.rel`/`.sign` (and `.rhs`) file family
//! next to a shared base name. `hilbert` answers the homogeneous shape, with
//! `zsolve` as a fallback; `zsolve` answers the strict-slice shape, whose
//! minimal inhomogeneous solutions land in `.zinhom` and whose recession-cone
//! generators land in `.zhom`.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tbn_core::process::{self, ProcessError};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::{
    parse_int_row, HomogeneousSystem, LatticeError, LatticeSolver, Result, SliceSolutions,
    SolveOptions, StrictSlice,
};

const BACKEND: &str = "4ti2";

pub struct FourTiTwo {
    /// Installation directory; executables live under `bin/`.
    dir: PathBuf,
}

impl FourTiTwo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config() -> Self {
        Self::new(tbn_core::config::config().fourtitwo_path.clone())
    }

    fn hilbert_exe(&self) -> PathBuf {
        self.dir.join("bin").join("hilbert")
    }

    fn zsolve_exe(&self) -> PathBuf {
        self.dir.join("bin").join("zsolve")
    }

    fn write_inputs(
        &self,
        base: &Path,
        system: &HomogeneousSystem,
        strict_index: Option<usize>,
    ) -> std::io::Result<Vec<PathBuf>> {
        let n_eq = system.equations.len();
        let n_ineq = system.inequalities.len();
        let n_rows = n_eq + n_ineq + strict_index.is_some() as usize;
        let mut written = Vec::new();

        let mut mat = format!("{n_rows} {}\n", system.dim);
        for row in system.equations.iter().chain(&system.inequalities) {
            push_row(&mut mat, row);
        }
        if let Some(i) = strict_index {
            let mut unit = vec![0i64; system.dim];
            unit[i] = 1;
            push_row(&mut mat, &unit);
        }
        let mat_path = base.with_extension("mat");
        std::fs::write(&mat_path, mat)?;
        written.push(mat_path);

        let mut rel = format!("1 {n_rows}\n");
        let mut symbols: Vec<&str> = Vec::with_capacity(n_rows);
        symbols.extend(std::iter::repeat("=").take(n_eq));
        symbols.extend(std::iter::repeat(">").take(n_ineq));
        if strict_index.is_some() {
            symbols.push(">");
        }
        rel.push_str(&symbols.join(" "));
        rel.push('\n');
        let rel_path = base.with_extension("rel");
        std::fs::write(&rel_path, rel)?;
        written.push(rel_path);

        let mut sign = format!("1 {}\n", system.dim);
        sign.push_str(&vec!["+"; system.dim].join(" "));
        sign.push('\n');
        let sign_path = base.with_extension("sign");
        std::fs::write(&sign_path, sign)?;
        written.push(sign_path);

        if strict_index.is_some() {
            // Right-hand side: zero except 1 on the strict row.
            let mut rhs = format!("1 {n_rows}\n");
            let mut values = vec!["0"; n_rows];
            values[n_rows - 1] = "1";
            rhs.push_str(&values.join(" "));
            rhs.push('\n');
            let rhs_path = base.with_extension("rhs");
            std::fs::write(&rhs_path, rhs)?;
            written.push(rhs_path);
        }
        Ok(written)
    }

    fn run_tool(
        &self,
        exe: &Path,
        base: &Path,
        workdir: &Path,
        deadline: Option<Duration>,
        env_hint: &'static str,
    ) -> Result<()> {
        let mut cmd = Command::new(exe);
        cmd.arg(base);
        let output = process::run_with_deadline(cmd, workdir, deadline).map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => LatticeError::Timeout {
                backend: BACKEND,
                timeout,
            },
            ProcessError::Spawn { .. } => LatticeError::MissingSolver {
                backend: BACKEND,
                path: exe.display().to_string(),
                env_var: env_hint,
            },
            ProcessError::Io(e) => LatticeError::Io(e),
        })?;
        if !output.status.success() {
            return Err(LatticeError::SolverFailed {
                backend: BACKEND,
                stderr: output.stderr_excerpt(),
            });
        }
        Ok(())
    }

    /// Parses the `rows cols` header plus `rows` integer rows used by every
    /// 4ti2 output file.
    fn parse_matrix_file(path: &Path, dim: usize) -> Result<Vec<Vec<i64>>> {
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();
        let header = loop {
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => {
                    return Err(LatticeError::MalformedOutput {
                        backend: BACKEND,
                        msg: format!("empty output file '{}'", path.display()),
                    })
                }
            }
        };
        let dims: Vec<usize> = header
            .split_whitespace()
            .map(|t| t.parse::<usize>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| LatticeError::MalformedOutput {
                backend: BACKEND,
                msg: format!("invalid header '{header}'"),
            })?;
        let &[n_rows, n_cols] = dims.as_slice() else {
            return Err(LatticeError::MalformedOutput {
                backend: BACKEND,
                msg: format!("invalid header '{header}'"),
            });
        };
        if n_cols != dim {
            return Err(LatticeError::MalformedOutput {
                backend: BACKEND,
                msg: format!("expected {dim} columns, header says {n_cols}"),
            });
        }
        let mut vectors = Vec::with_capacity(n_rows);
        for line in lines {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            vectors.push(parse_int_row(line, dim, BACKEND)?);
            if vectors.len() == n_rows {
                break;
            }
        }
        if vectors.len() != n_rows {
            return Err(LatticeError::MalformedOutput {
                backend: BACKEND,
                msg: format!(
                    "header promised {n_rows} rows, found {}",
                    vectors.len()
                ),
            });
        }
        Ok(vectors)
    }

    fn preserve_inputs(opts: &SolveOptions<'_>, files: &[PathBuf]) -> Result<()> {
        if let Some(store) = opts.debug {
            for file in files {
                store.preserve(file, opts.purpose)?;
            }
        }
        Ok(())
    }
}

impl LatticeSolver for FourTiTwo {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn is_available(&self) -> bool {
        is_executable(&self.hilbert_exe()) || is_executable(&self.zsolve_exe())
    }

    fn hilbert_basis(
        &self,
        system: &HomogeneousSystem,
        opts: &SolveOptions<'_>,
    ) -> Result<Vec<Vec<i64>>> {
        let workdir = TempDir::new()?;
        let base = workdir.path().join("problem");
        let files = self.write_inputs(&base, system, None)?;
        Self::preserve_inputs(opts, &files)?;
        debug!(
            dim = system.dim,
            equations = system.equations.len(),
            inequalities = system.inequalities.len(),
            "invoking 4ti2 hilbert"
        );

        match self.run_tool(
            &self.hilbert_exe(),
            &base,
            workdir.path(),
            opts.deadline,
            "TBN_FOURTI2_PATH",
        ) {
            Ok(()) => Self::parse_matrix_file(&base.with_extension("hil"), system.dim),
            Err(err @ LatticeError::Timeout { .. }) => Err(err),
            Err(first) => {
                // hilbert rejects some relation mixes; zsolve covers them.
                warn!(error = %first, "4ti2 hilbert failed, falling back to zsolve");
                self.run_tool(
                    &self.zsolve_exe(),
                    &base,
                    workdir.path(),
                    opts.deadline,
                    "TBN_FOURTI2_PATH",
                )?;
                Self::parse_matrix_file(&base.with_extension("zhom"), system.dim)
            }
        }
    }

    fn strict_slice(
        &self,
        slice: &StrictSlice,
        opts: &SolveOptions<'_>,
    ) -> Result<SliceSolutions> {
        let system = &slice.system;
        let workdir = TempDir::new()?;
        let base = workdir.path().join("problem");
        let files = self.write_inputs(&base, system, Some(slice.strict_index))?;
        Self::preserve_inputs(opts, &files)?;
        debug!(
            dim = system.dim,
            strict_index = slice.strict_index,
            "invoking 4ti2 zsolve for strict slice"
        );

        self.run_tool(
            &self.zsolve_exe(),
            &base,
            workdir.path(),
            opts.deadline,
            "TBN_FOURTI2_PATH",
        )?;

        let minimal_inhomogeneous =
            Self::parse_matrix_file(&base.with_extension("zinhom"), system.dim)?;
        // The recession cone is reported separately; absence means the slice
        // has no homogeneous directions.
        let zhom = base.with_extension("zhom");
        let recession_basis = if zhom.exists() {
            Self::parse_matrix_file(&zhom, system.dim)?
        } else {
            Vec::new()
        };
        Ok(SliceSolutions {
            minimal_inhomogeneous,
            recession_basis,
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
    use tempfile::tempdir;

    #[test]
    fn writes_homogeneous_input_family() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("problem");
        let solver = FourTiTwo::new("/opt/4ti2");
        let system = HomogeneousSystem::from_equations(3, vec![vec![1, -1, 0], vec![0, 1, -2]]);
        solver.write_inputs(&base, &system, None).unwrap();

        let mat = std::fs::read_to_string(base.with_extension("mat")).unwrap();
        assert_eq!(mat, "2 3\n1 -1 0\n0 1 -2\n");
        let rel = std::fs::read_to_string(base.with_extension("rel")).unwrap();
        assert_eq!(rel, "1 2\n= =\n");
        let sign = std::fs::read_to_string(base.with_extension("sign")).unwrap();
        assert_eq!(sign, "1 3\n+ + +\n");
        assert!(!base.with_extension("rhs").exists());
    }

    #[test]
    fn writes_strict_slice_rhs() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("problem");
        let solver = FourTiTwo::new("/opt/4ti2");
        let system = HomogeneousSystem::from_equations(3, vec![vec![1, -1, 0]]);
        solver.write_inputs(&base, &system, Some(2)).unwrap();

        let mat = std::fs::read_to_string(base.with_extension("mat")).unwrap();
        assert_eq!(mat, "2 3\n1 -1 0\n0 0 1\n");
        let rel = std::fs::read_to_string(base.with_extension("rel")).unwrap();
        assert_eq!(rel, "1 2\n= >\n");
        let rhs = std::fs::read_to_string(base.with_extension("rhs")).unwrap();
        assert_eq!(rhs, "1 2\n0 1\n");
    }

    #[test]
    fn parses_matrix_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("problem.hil");
        std::fs::write(&path, "3 2\n1 0\n0 1\n2 3\n").unwrap();
        let rows = FourTiTwo::parse_matrix_file(&path, 2).unwrap();
        assert_eq!(rows, vec![vec![1, 0], vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn header_row_count_is_enforced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("problem.hil");
        std::fs::write(&path, "3 2\n1 0\n").unwrap();
        assert!(matches!(
            FourTiTwo::parse_matrix_file(&path, 2),
            Err(LatticeError::MalformedOutput { .. })
        ));
    }
}
