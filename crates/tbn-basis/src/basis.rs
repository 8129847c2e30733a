// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Polymer-basis computation.
//!
//! The Hilbert basis of `{x >= 0 : A' x = 0}` is fetched from the lattice
//! oracle over the augmented matrix A', projected back onto the original
//! monomer coordinates, deduplicated exactly, and sorted into the stable
//! polymer index order used everywhere downstream.

use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::Hasher;

use rayon::prelude::*;
use tracing::info;

use tbn_core::model::Tbn;
use tbn_lattice::{HomogeneousSystem, LatticeSolver, SolveOptions};

use crate::{BasisError, Result};

/// The polymer basis: a dense row-major buffer of `len() x n_monomers`
/// monomer counts, in the stable (lexicographic) index order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolymerBasis {
    n_monomers: usize,
    data: Vec<i64>,
}

impl PolymerBasis {
    /// Rows must already be deduplicated and sorted.
    pub fn from_rows(rows: Vec<Vec<i64>>, n_monomers: usize) -> Self {
        let mut data = Vec::with_capacity(rows.len() * n_monomers);
        for row in rows {
            debug_assert_eq!(row.len(), n_monomers);
            data.extend_from_slice(&row);
        }
        Self { n_monomers, data }
    }

    pub fn len(&self) -> usize {
        if self.n_monomers == 0 {
            0
        } else {
            self.data.len() / self.n_monomers
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn n_monomers(&self) -> usize {
        self.n_monomers
    }

    pub fn polymer(&self, i: usize) -> &[i64] {
        &self.data[i * self.n_monomers..(i + 1) * self.n_monomers]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[i64]> {
        self.data.chunks_exact(self.n_monomers)
    }

    /// Index of the polymer with exactly these monomer counts.
    pub fn position(&self, counts: &[i64]) -> Option<usize> {
        self.iter().position(|row| row == counts)
    }

    pub fn to_rows(&self) -> Vec<Vec<i64>> {
        self.iter().map(|row| row.to_vec()).collect()
    }
}

/// Builds A', poses the cone to the lattice oracle, and post-processes the
/// answer into the polymer basis.
pub fn compute_polymer_basis(
    tbn: &Tbn,
    solver: &dyn LatticeSolver,
    opts: &SolveOptions<'_>,
) -> Result<PolymerBasis> {
    let (augmented, n_original) = tbn.augmented_columns();
    let n_sites = tbn.n_sites();
    let dim = augmented.len();

    // Equations are the rows of A'.
    let equations: Vec<Vec<i64>> = (0..n_sites)
        .map(|i| augmented.iter().map(|col| col[i]).collect())
        .collect();
    let system = HomogeneousSystem::from_equations(dim, equations);

    let vectors = solver.hilbert_basis(&system, opts)?;
    if vectors.is_empty() {
        return Err(BasisError::EmptyBasis);
    }
    info!(
        raw_vectors = vectors.len(),
        fake_columns = dim - n_original,
        "hilbert basis received"
    );

    let rows = project_and_dedup(vectors, n_original);
    info!(polymers = rows.len(), "polymer basis ready");
    Ok(PolymerBasis::from_rows(rows, n_original))
}

/// Projects each vector onto the first `n_original` coordinates, removes the
/// zero vector and exact duplicates, and sorts lexicographically. Hashing is
/// shard-parallel; the bucket insert carries a secondary equality check so
/// hash collisions cannot merge distinct polymers.
pub(crate) fn project_and_dedup(vectors: Vec<Vec<i64>>, n_original: usize) -> Vec<Vec<i64>> {
    let keyed: Vec<(u64, Vec<i64>)> = vectors
        .into_par_iter()
        .map(|mut v| {
            v.truncate(n_original);
            (hash_row(&v), v)
        })
        .collect();

    let mut rows: Vec<Vec<i64>> = Vec::with_capacity(keyed.len());
    let mut buckets: HashMap<u64, Vec<usize>> = HashMap::with_capacity(keyed.len());
    for (key, row) in keyed {
        if row.iter().all(|&c| c == 0) {
            continue;
        }
        match buckets.entry(key) {
            Entry::Occupied(mut bucket) => {
                if bucket.get().iter().any(|&i| rows[i] == row) {
                    continue;
                }
                bucket.get_mut().push(rows.len());
                rows.push(row);
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![rows.len()]);
                rows.push(row);
            }
        }
    }

    rows.par_sort_unstable();
    rows
}

/// Free energy per basis polymer, evaluated in parallel; the indexed map
/// keeps the output order identical to the basis order.
pub fn free_energies(
    tbn: &Tbn,
    basis: &PolymerBasis,
    assoc: Option<&tbn_core::energy::AssocParams>,
    temp_c: f64,
) -> tbn_core::Result<Vec<f64>> {
    (0..basis.len())
        .into_par_iter()
        .map(|i| tbn_core::energy::free_energy(tbn, basis.polymer(i), assoc, temp_c))
        .collect()
}

fn hash_row(row: &[i64]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for &v in row {
        hasher.write_i64(v);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tbn_lattice::{LatticeError, SliceSolutions, StrictSlice};

    /// Canned oracle: returns a fixed vector list regardless of the system.
    struct FakeSolver {
        vectors: Vec<Vec<i64>>,
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
        ) -> tbn_lattice::Result<Vec<Vec<i64>>> {
            Ok(self.vectors.clone())
        }
        fn strict_slice(
            &self,
            _slice: &StrictSlice,
            _opts: &SolveOptions<'_>,
        ) -> tbn_lattice::Result<SliceSolutions> {
            Err(LatticeError::Unsupported {
                backend: "fake",
                what: "strict slices",
            })
        }
    }

    fn tbn(text: &str) -> Tbn {
        tbn_core::parser::parse_str(text, &BTreeMap::new())
            .unwrap()
            .tbn
    }

    #[test]
    fn projection_dedup_and_order() {
        // Projections of the fake-column coordinates collapse duplicates.
        let vectors = vec![
            vec![1, 1, 0],
            vec![1, 1, 2],
            vec![0, 1, 0],
            vec![1, 0, 1],
            vec![0, 0, 3],
        ];
        let rows = project_and_dedup(vectors, 2);
        assert_eq!(rows, vec![vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn basis_soundness_on_balanced_pair() {
        // S1: A: a b c, B: a* b* c* — basis is both singletons plus {A + B}.
        let t = tbn("A: a b c\nB: a* b* c*\n");
        let solver = FakeSolver {
            // Oracle answers in the augmented space (2 original + 3 fakes).
            vectors: vec![
                vec![0, 1, 0, 0, 0],
                vec![1, 1, 0, 0, 0],
                vec![1, 0, 1, 1, 1],
            ],
        };
        let basis =
            compute_polymer_basis(&t, &solver, &SolveOptions::default()).unwrap();
        assert_eq!(basis.len(), 3);
        assert_eq!(basis.polymer(0), &[0, 1]);
        assert_eq!(basis.polymer(1), &[1, 0]);
        assert_eq!(basis.polymer(2), &[1, 1]);

        // Soundness: x >= 0 and A x >= 0 componentwise.
        for row in basis.iter() {
            assert!(row.iter().all(|&c| c >= 0));
            for site in 0..t.n_sites() {
                let excess: i64 = t
                    .columns()
                    .iter()
                    .zip(row)
                    .map(|(col, &c)| col[site] * c)
                    .sum();
                assert!(excess >= 0);
            }
        }
        assert_eq!(basis.position(&[1, 1]), Some(2));
        assert_eq!(basis.position(&[2, 1]), None);
    }

    #[test]
    fn empty_oracle_answer_is_an_error() {
        let t = tbn("A: a\nB: a*\n");
        let solver = FakeSolver { vectors: vec![] };
        assert!(matches!(
            compute_polymer_basis(&t, &solver, &SolveOptions::default()),
            Err(BasisError::EmptyBasis)
        ));
    }

    #[test]
    fn dense_storage_round_trips() {
        let basis = PolymerBasis::from_rows(vec![vec![1, 2], vec![3, 4]], 2);
        assert_eq!(basis.len(), 2);
        assert_eq!(basis.to_rows(), vec![vec![1, 2], vec![3, 4]]);
    }
}
