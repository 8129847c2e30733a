// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

use crate::expr::ExprError;

pub type Result<T> = std::result::Result<T, TbnError>;

#[derive(Debug, Error)]
pub enum TbnError {
    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("TBN is not star-limited: binding site '{site}' has excess {excess}")]
    NotStarLimited { site: String, excess: f64 },
    #[error("monomer '{name}' sums to a negative concentration ({total})")]
    NegativeConcentration { name: String, total: f64 },
    #[error("identical monomers carry conflicting names '{first}' and '{second}'")]
    ConflictingNames { first: String, second: String },
    #[error("'{token}' is used both as a monomer name and a binding-site name")]
    NameSiteCollision { token: String },
    #[error("monomers mix declared and missing concentrations")]
    MixedConcentrations,
    #[error("unknown concentration unit '{0}' (expected pM, nM, uM, mM or M)")]
    UnknownUnit(String),
    #[error("integer overflow in {context}")]
    Overflow { context: &'static str },
    #[error("bond parity violated: total sites {total}, unpaired excess {excess}")]
    BondParity { total: i64, excess: i64 },
    #[error("cannot resolve monomer '{spec}'")]
    UnknownMonomer { spec: String },
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TbnError {
    /// True for violations of the model invariants (as opposed to syntax or IO).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            TbnError::NotStarLimited { .. }
                | TbnError::NegativeConcentration { .. }
                | TbnError::ConflictingNames { .. }
                | TbnError::NameSiteCollision { .. }
                | TbnError::MixedConcentrations
                | TbnError::BondParity { .. }
        )
    }
}
