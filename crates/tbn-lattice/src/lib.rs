// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Lattice oracle adapters.
//!
//! Two problem shapes reach the external solvers: the Hilbert basis of a
//! homogeneous pointed cone `{x >= 0 : E x = 0, I x >= 0}`, and the minimal
//! inhomogeneous solutions of a strict slice `{x >= 0 : E x = 0, I x >= 0,
//! x_i >= 1}`. Both backends speak text files over a subprocess boundary;
//! everything stays integer-exact.

use std::time::Duration;

use thiserror::Error;

mod debug_store;
mod fourtitwo;
mod normaliz;

pub use debug_store::DebugStore;
pub use fourtitwo::FourTiTwo;
pub use normaliz::Normaliz;

pub type Result<T> = std::result::Result<T, LatticeError>;

#[derive(Debug, Error)]
pub enum LatticeError {
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
    #[error("{backend} does not support {what}; use the alternate backend")]
    Unsupported {
        backend: &'static str,
        what: &'static str,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A homogeneous cone `{x >= 0 : equations·x = 0, inequalities·x >= 0}` in
/// `dim` ambient dimensions.
#[derive(Clone, Debug)]
pub struct HomogeneousSystem {
    pub dim: usize,
    pub equations: Vec<Vec<i64>>,
    pub inequalities: Vec<Vec<i64>>,
}

impl HomogeneousSystem {
    pub fn from_equations(dim: usize, equations: Vec<Vec<i64>>) -> Self {
        Self {
            dim,
            equations,
            inequalities: Vec::new(),
        }
    }
}

/// A strict slice of a homogeneous system: additionally `x[strict_index] >= 1`.
#[derive(Clone, Debug)]
pub struct StrictSlice {
    pub system: HomogeneousSystem,
    pub strict_index: usize,
}

/// Indecomposable solutions of a strict slice. The full set of slice
/// indecomposables is the union of the minimal inhomogeneous solutions and
/// the recession-cone Hilbert basis restricted to the strict coordinate.
#[derive(Clone, Debug, Default)]
pub struct SliceSolutions {
    pub minimal_inhomogeneous: Vec<Vec<i64>>,
    pub recession_basis: Vec<Vec<i64>>,
}

/// Per-invocation options: subprocess deadline plus optional preservation of
/// the raw solver inputs for debugging.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolveOptions<'a> {
    pub deadline: Option<Duration>,
    pub debug: Option<&'a DebugStore>,
    /// Label used in preserved input filenames, e.g. `polymer-basis`.
    pub purpose: &'a str,
}

/// The abstract lattice-solver seam. `Normaliz` is the primary backend and
/// `FourTiTwo` the alternate; they emit different wire formats but expose
/// the same two operations.
pub trait LatticeSolver {
    fn backend_name(&self) -> &'static str;

    /// Cheap availability probe, used for actionable configuration errors.
    fn is_available(&self) -> bool;

    /// All minimal non-negative integer solutions of the homogeneous system.
    fn hilbert_basis(
        &self,
        system: &HomogeneousSystem,
        opts: &SolveOptions<'_>,
    ) -> Result<Vec<Vec<i64>>>;

    /// Indecomposables of the strict slice.
    fn strict_slice(
        &self,
        slice: &StrictSlice,
        opts: &SolveOptions<'_>,
    ) -> Result<SliceSolutions>;
}

/// Parses one whitespace-separated integer row, enforcing the expected width.
fn parse_int_row(
    line: &str,
    expected: usize,
    backend: &'static str,
) -> Result<Vec<i64>> {
    let row = line
        .split_whitespace()
        .map(|tok| tok.parse::<i64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| LatticeError::MalformedOutput {
            backend,
            msg: format!("non-integer row '{line}'"),
        })?;
    if row.len() != expected {
        return Err(LatticeError::MalformedOutput {
            backend,
            msg: format!("expected {expected} entries per row, found {}", row.len()),
        });
    }
    Ok(row)
}
