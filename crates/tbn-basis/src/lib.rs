//! tbn-basis: the polymer-basis engine.
//! - basis: augment A, call the lattice oracle, project, dedup, sort
//! - cache: hash-checked reuse of the `.tbnpolymat` artifact

use thiserror::Error;

pub mod basis;
pub mod cache;

pub use basis::{compute_polymer_basis, PolymerBasis};

pub type Result<T> = std::result::Result<T, BasisError>;

#[derive(Debug, Error)]
pub enum BasisError {
    #[error("lattice solver returned no Hilbert basis vectors")]
    EmptyBasis,
    #[error(transparent)]
    Lattice(#[from] tbn_lattice::LatticeError),
    #[error(transparent)]
    Core(#[from] tbn_core::TbnError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
