//! tbn-reactions: canonical reactions and the IBOT scheduler.
//! - reaction: sparse signed reaction vectors with the no-catalyst invariant
//! - engine: the cone `B r = 0, S r >= 0` via variable splitting, plus
//!   bounded-target strict slices
//! - ibot: min-ratio assignment of concentration exponents

use thiserror::Error;

pub mod engine;
pub mod ibot;
pub mod reaction;

pub use engine::ReactionEngine;
pub use ibot::{run_ibot, IbotOutcome};
pub use reaction::Reaction;

pub type Result<T> = std::result::Result<T, ReactionsError>;

#[derive(Debug, Error)]
pub enum ReactionsError {
    #[error("on-target polymer [{polymer}] not found in the polymer basis")]
    UnknownOnTarget { polymer: String },
    #[error("target polymer at basis index {index} is on-target; bounds apply to off-target polymers")]
    TargetNotOffTarget { index: usize },
    #[error("on-target polymers are not in detailed balance; violating reaction: {reaction}")]
    OnTargetImbalance { reaction: String },
    #[error("integer overflow in {context}")]
    Overflow { context: &'static str },
    #[error(transparent)]
    Lattice(#[from] tbn_lattice::LatticeError),
    #[error(transparent)]
    Core(#[from] tbn_core::TbnError),
}
