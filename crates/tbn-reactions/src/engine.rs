// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Canonical reactions engine.
//!
//! The cone `{r : B r = 0, S r >= 0}` is posed through variable splitting:
//! on-target coordinates split into positive and negative parts while
//! off-target coordinates stay single and non-negative, so `S r >= 0` holds
//! implicitly and the lifted problem is a plain homogeneous kernel.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::info;

use tbn_basis::PolymerBasis;
use tbn_lattice::{HomogeneousSystem, LatticeSolver, SolveOptions, StrictSlice};

use crate::reaction::Reaction;
use crate::{ReactionsError, Result};

pub struct ReactionEngine<'a> {
    basis: &'a PolymerBasis,
    on_target: Vec<usize>,
    off_target: Vec<usize>,
}

impl<'a> ReactionEngine<'a> {
    pub fn new(basis: &'a PolymerBasis, on_target_indices: &BTreeSet<usize>) -> Self {
        let on_target: Vec<usize> = on_target_indices.iter().copied().collect();
        let off_target: Vec<usize> = (0..basis.len())
            .filter(|i| !on_target_indices.contains(i))
            .collect();
        Self {
            basis,
            on_target,
            off_target,
        }
    }

    /// Matches user-supplied on-target polymer vectors against the basis by
    /// exact equality. A row missing from the basis is a hard error.
    pub fn resolve_polymer_indices(
        basis: &PolymerBasis,
        vectors: &[Vec<i64>],
    ) -> Result<BTreeSet<usize>> {
        let mut indices = BTreeSet::new();
        for counts in vectors {
            let idx = basis.position(counts).ok_or_else(|| {
                ReactionsError::UnknownOnTarget {
                    polymer: counts
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(" "),
                }
            })?;
            indices.insert(idx);
        }
        Ok(indices)
    }

    pub fn on_target(&self) -> &[usize] {
        &self.on_target
    }

    pub fn off_target(&self) -> &[usize] {
        &self.off_target
    }

    pub fn is_on_target(&self, index: usize) -> bool {
        self.on_target.binary_search(&index).is_ok()
    }

    fn lifted_dim(&self) -> usize {
        2 * self.on_target.len() + self.off_target.len()
    }

    /// Rows of the lifted B matrix: one equation per monomer over
    /// `[r_on+, r_on-, r_off]`.
    fn lifted_system(&self) -> HomogeneousSystem {
        let n_on = self.on_target.len();
        let n_monomers = self.basis.n_monomers();
        let dim = self.lifted_dim();
        let mut equations = Vec::with_capacity(n_monomers);
        for monomer in 0..n_monomers {
            let mut row = vec![0i64; dim];
            for (k, &p) in self.on_target.iter().enumerate() {
                let count = self.basis.polymer(p)[monomer];
                row[k] = count;
                row[n_on + k] = -count;
            }
            for (k, &p) in self.off_target.iter().enumerate() {
                row[2 * n_on + k] = self.basis.polymer(p)[monomer];
            }
            equations.push(row);
        }
        HomogeneousSystem::from_equations(dim, equations)
    }

    /// Folds a lifted vector back into a signed reaction over the basis.
    fn fold_back(&self, h: &[i64]) -> Option<Reaction> {
        let n_on = self.on_target.len();
        let mut dense = vec![0i64; self.basis.len()];
        for (k, &p) in self.on_target.iter().enumerate() {
            dense[p] = h[k] - h[n_on + k];
        }
        for (k, &p) in self.off_target.iter().enumerate() {
            dense[p] = h[2 * n_on + k];
        }
        Reaction::from_dense(&dense)
    }

    /// Enumerates the irreducible canonical reactions: the Hilbert basis of
    /// the lifted kernel, folded back and stripped of the zero reaction.
    pub fn enumerate(
        &self,
        solver: &dyn LatticeSolver,
        opts: &SolveOptions<'_>,
    ) -> Result<Vec<Reaction>> {
        let system = self.lifted_system();
        let vectors = solver.hilbert_basis(&system, opts)?;
        let mut reactions: Vec<Reaction> = vectors
            .iter()
            .filter_map(|h| self.fold_back(h))
            .collect();
        // The split-variable lift can map distinct lifted vectors to one
        // reaction (pos/neg slack pairs); dedup keeps the set exact.
        reactions.sort_unstable();
        reactions.dedup();
        info!(reactions = reactions.len(), "canonical reactions enumerated");
        Ok(reactions)
    }

    /// Bounded-target mode: for each undesired off-target polymer, the strict
    /// slice `B r = 0, S r >= 0, r_p >= 1` is solved for its indecomposables
    /// (minimal inhomogeneous solutions plus the recession basis restricted
    /// to `r_p > 0`). The reduced reaction set is the deduplicated union.
    pub fn enumerate_bounded(
        &self,
        solver: &(dyn LatticeSolver + Sync),
        targets: &BTreeSet<usize>,
        opts: &SolveOptions<'_>,
    ) -> Result<Vec<Reaction>> {
        let n_on = self.on_target.len();
        for &target in targets {
            if self.is_on_target(target) {
                return Err(ReactionsError::TargetNotOffTarget { index: target });
            }
        }
        let system = self.lifted_system();

        let per_target: Vec<Vec<Reaction>> = targets
            .par_iter()
            .map(|&target| -> Result<Vec<Reaction>> {
                let k = self
                    .off_target
                    .binary_search(&target)
                    .expect("target verified off-target");
                let slice = StrictSlice {
                    system: system.clone(),
                    strict_index: 2 * n_on + k,
                };
                let solutions = solver.strict_slice(&slice, opts)?;
                let strict = slice.strict_index;
                let folded = solutions
                    .minimal_inhomogeneous
                    .iter()
                    .chain(
                        solutions
                            .recession_basis
                            .iter()
                            .filter(|h| h[strict] > 0),
                    )
                    .filter_map(|h| self.fold_back(h))
                    .collect();
                Ok(folded)
            })
            .collect::<Result<_>>()?;

        // Deterministic union across targets.
        let mut union: BTreeSet<Reaction> = BTreeSet::new();
        for reactions in per_target {
            union.extend(reactions);
        }
        let reactions: Vec<Reaction> = union.into_iter().collect();
        info!(
            targets = targets.len(),
            reactions = reactions.len(),
            "bounded-target reactions enumerated"
        );
        Ok(reactions)
    }

    /// Detailed-balance pre-check: every irreducible reaction supported
    /// entirely on on-target polymers must have `1ᵀr = 0`.
    pub fn check_on_target_balance(
        &self,
        reactions: &[Reaction],
        label: &dyn Fn(u32) -> String,
    ) -> Result<()> {
        for reaction in reactions {
            let all_on_target = reaction
                .terms()
                .iter()
                .all(|&(p, _)| self.is_on_target(p as usize));
            if all_on_target && !reaction.is_balanced() {
                return Err(ReactionsError::OnTargetImbalance {
                    reaction: reaction.render(label),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbn_lattice::{LatticeError, Result as LatticeResult, SliceSolutions};

    struct FakeSolver {
        hilbert: Vec<Vec<i64>>,
        slices: Vec<(usize, SliceSolutions)>,
    }

    impl LatticeSolver for FakeSolver {
        fn backend_name(&self) -> &'static str {
            "fake"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn hilbert_basis(
            &self,
            _system: &HomogeneousSystem,
            _opts: &SolveOptions<'_>,
        ) -> LatticeResult<Vec<Vec<i64>>> {
            Ok(self.hilbert.clone())
        }
        fn strict_slice(
            &self,
            slice: &StrictSlice,
            _opts: &SolveOptions<'_>,
        ) -> LatticeResult<SliceSolutions> {
            self.slices
                .iter()
                .find(|(idx, _)| *idx == slice.strict_index)
                .map(|(_, s)| s.clone())
                .ok_or(LatticeError::Unsupported {
                    backend: "fake",
                    what: "unexpected slice",
                })
        }
    }

    /// Basis over 2 monomers: P0 = A, P1 = B, P2 = A+B.
    fn basis() -> PolymerBasis {
        PolymerBasis::from_rows(vec![vec![1, 0], vec![0, 1], vec![1, 1]], 2)
    }

    #[test]
    fn resolve_polymer_indices_exact_match() {
        let b = basis();
        let indices =
            ReactionEngine::resolve_polymer_indices(&b, &[vec![1, 1]]).unwrap();
        assert_eq!(indices, BTreeSet::from([2]));
        assert!(matches!(
            ReactionEngine::resolve_polymer_indices(&b, &[vec![2, 2]]),
            Err(ReactionsError::UnknownOnTarget { .. })
        ));
    }

    #[test]
    fn lifted_system_splits_on_target() {
        let b = basis();
        let on = BTreeSet::from([2]);
        let engine = ReactionEngine::new(&b, &on);
        let system = engine.lifted_system();
        // Variables: [P2+, P2-, P0, P1]; rows per monomer.
        assert_eq!(system.dim, 4);
        assert_eq!(system.equations, vec![vec![1, -1, 1, 0], vec![1, -1, 0, 1]]);
    }

    #[test]
    fn enumerate_folds_back_and_dedups() {
        let b = basis();
        let on = BTreeSet::from([2]);
        let engine = ReactionEngine::new(&b, &on);
        let solver = FakeSolver {
            // A + B -> A+B reversed: {A+B} decomposes into A + B is not
            // canonical (off-target products only); the lifted vector
            // [0,1,1,1] folds to -P2 + P0 + P1.
            hilbert: vec![
                vec![0, 1, 1, 1],
                vec![1, 1, 0, 0], // pos/neg slack pair folds to zero
            ],
            slices: vec![],
        };
        let reactions = engine.enumerate(&solver, &SolveOptions::default()).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].terms(), &[(0, 1), (1, 1), (2, -1)]);
    }

    #[test]
    fn on_target_imbalance_is_rendered() {
        let b = basis();
        let on = BTreeSet::from([0, 1, 2]);
        let engine = ReactionEngine::new(&b, &on);
        // 2 P0 -> 3 P2 is on-target-only and unbalanced.
        let bad = Reaction::from_dense(&[-2, 0, 3]).unwrap();
        let err = engine
            .check_on_target_balance(&[bad], &|p| format!("P{}", p + 1))
            .unwrap_err();
        match err {
            ReactionsError::OnTargetImbalance { reaction } => {
                assert_eq!(reaction, "2 P1 -> 3 P3");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn balanced_or_off_target_reactions_pass() {
        let b = basis();
        let on = BTreeSet::from([2]);
        let engine = ReactionEngine::new(&b, &on);
        let balanced = Reaction::from_dense(&[0, 0, 0]).is_none();
        assert!(balanced);
        // Off-target support exempts the reaction from the balance check.
        let with_off = Reaction::from_dense(&[1, 1, -1]).unwrap();
        assert!(engine
            .check_on_target_balance(&[with_off], &|p| format!("P{p}"))
            .is_ok());
    }

    #[test]
    fn bounded_mode_unions_slices() {
        let b = basis();
        let on = BTreeSet::from([2]);
        let engine = ReactionEngine::new(&b, &on);
        // Off-target order: [P0, P1]; lifted vars [P2+, P2-, P0, P1].
        let solver = FakeSolver {
            hilbert: vec![],
            slices: vec![
                (
                    2,
                    SliceSolutions {
                        minimal_inhomogeneous: vec![vec![0, 1, 1, 1]],
                        recession_basis: vec![vec![0, 0, 0, 0]],
                    },
                ),
                (
                    3,
                    SliceSolutions {
                        minimal_inhomogeneous: vec![vec![0, 1, 1, 1]],
                        recession_basis: vec![],
                    },
                ),
            ],
        };
        let targets = BTreeSet::from([0, 1]);
        let reactions = engine
            .enumerate_bounded(&solver, &targets, &SolveOptions::default())
            .unwrap();
        // The same reaction reached from both targets appears once.
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].terms(), &[(0, 1), (1, 1), (2, -1)]);
    }

    #[test]
    fn bounded_mode_rejects_on_target_targets() {
        let b = basis();
        let on = BTreeSet::from([2]);
        let engine = ReactionEngine::new(&b, &on);
        let solver = FakeSolver {
            hilbert: vec![],
            slices: vec![],
        };
        assert!(matches!(
            engine.enumerate_bounded(&solver, &BTreeSet::from([2]), &SolveOptions::default()),
            Err(ReactionsError::TargetNotOffTarget { index: 2 })
        ));
    }
}
