// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The TBN model: monomer matrix A, star-limiting invariant, augmented
//! matrix for the polymer-basis cone, and the canonical matrix hash.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Result, TbnError};
use crate::monomer::Monomer;
use crate::units::Unit;

/// A complete TBN: the collapsed monomer list, the ordered binding-site
/// alphabet, and the signed monomer matrix A whose columns are the monomer
/// vectors in input order.
#[derive(Clone, Debug)]
pub struct Tbn {
    monomers: Vec<Monomer>,
    site_names: Vec<String>,
    site_index: HashMap<String, usize>,
    units: Option<Unit>,
    /// One signed vector per (collapsed) monomer, each of length `n_sites`.
    columns: Vec<Vec<i64>>,
}

impl Tbn {
    /// Builds the model from parsed records. Assigns a stable column index to
    /// each distinct monomer vector; when units are declared, records with
    /// equal vectors collapse into one column with summed concentration.
    pub fn build(
        records: Vec<Monomer>,
        site_names: Vec<String>,
        units: Option<Unit>,
    ) -> Result<Self> {
        let site_index: HashMap<String, usize> = site_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        // A token may not serve as both a monomer name and a site base name.
        for record in &records {
            if let Some(name) = &record.name {
                if site_index.contains_key(name) {
                    return Err(TbnError::NameSiteCollision {
                        token: name.clone(),
                    });
                }
            }
        }

        let with_conc = records.iter().filter(|r| r.concentration.is_some()).count();
        if with_conc != 0 && with_conc != records.len() {
            return Err(TbnError::MixedConcentrations);
        }

        let n_sites = site_names.len();
        let mut monomers: Vec<Monomer> = Vec::new();
        let mut columns: Vec<Vec<i64>> = Vec::new();

        if units.is_some() {
            // Collapse duplicates by signed vector, summing concentrations.
            let mut by_vector: HashMap<Vec<i64>, usize> = HashMap::new();
            for record in records {
                let v = record.signed_vector(&site_index, n_sites);
                match by_vector.get(&v) {
                    Some(&idx) => {
                        let kept = &mut monomers[idx];
                        match (&kept.name, &record.name) {
                            (Some(a), Some(b)) if a != b => {
                                return Err(TbnError::ConflictingNames {
                                    first: a.clone(),
                                    second: b.clone(),
                                });
                            }
                            (None, Some(b)) => kept.name = Some(b.clone()),
                            _ => {}
                        }
                        let total = kept.concentration.unwrap_or(0.0)
                            + record.concentration.unwrap_or(0.0);
                        kept.concentration = Some(total);
                    }
                    None => {
                        by_vector.insert(v.clone(), monomers.len());
                        monomers.push(record);
                        columns.push(v);
                    }
                }
            }
            for monomer in &monomers {
                if let Some(total) = monomer.concentration {
                    if total < 0.0 {
                        return Err(TbnError::NegativeConcentration {
                            name: monomer
                                .name
                                .clone()
                                .unwrap_or_else(|| monomer.sites_str()),
                            total,
                        });
                    }
                }
            }
        } else {
            for record in records {
                let v = record.signed_vector(&site_index, n_sites);
                monomers.push(record);
                columns.push(v);
            }
        }

        Ok(Self {
            monomers,
            site_names,
            site_index,
            units,
            columns,
        })
    }

    pub fn n_monomers(&self) -> usize {
        self.monomers.len()
    }

    pub fn n_sites(&self) -> usize {
        self.site_names.len()
    }

    pub fn monomers(&self) -> &[Monomer] {
        &self.monomers
    }

    pub fn site_names(&self) -> &[String] {
        &self.site_names
    }

    pub fn units(&self) -> Option<Unit> {
        self.units
    }

    /// Column j of A: the signed vector of monomer j.
    pub fn column(&self, j: usize) -> &[i64] {
        &self.columns[j]
    }

    pub fn columns(&self) -> &[Vec<i64>] {
        &self.columns
    }

    /// Concentrations in the declared units, if every monomer has one.
    pub fn concentrations(&self) -> Option<Vec<f64>> {
        self.monomers.iter().map(|m| m.concentration).collect()
    }

    /// Concentrations converted to Molar.
    pub fn concentrations_molar(&self) -> Option<Vec<f64>> {
        let units = self.units?;
        let raw = self.concentrations()?;
        Some(raw.iter().map(|&c| units.to_molar(c)).collect())
    }

    pub fn monomer_index_by_name(&self, name: &str) -> Option<usize> {
        self.monomers
            .iter()
            .position(|m| m.name.as_deref() == Some(name))
    }

    /// Checks the star-limiting invariant `A · c ≥ 0` componentwise, with `c`
    /// the concentration vector or all-ones when concentrations are absent.
    pub fn check_star_limiting(&self) -> Result<()> {
        let c: Vec<f64> = match self.concentrations() {
            Some(conc) => conc,
            None => vec![1.0; self.n_monomers()],
        };
        for (i, site) in self.site_names.iter().enumerate() {
            let excess: f64 = self
                .columns
                .iter()
                .zip(&c)
                .map(|(col, &cj)| col[i] as f64 * cj)
                .sum();
            if excess < 0.0 {
                return Err(TbnError::NotStarLimited {
                    site: site.clone(),
                    excess,
                });
            }
        }
        Ok(())
    }

    /// The augmented matrix A' for the polymer-basis cone: for every site row
    /// without a singleton-star column `-e_i`, append one. Returns the full
    /// column set and the number of original columns.
    pub fn augmented_columns(&self) -> (Vec<Vec<i64>>, usize) {
        let n_original = self.columns.len();
        let n_sites = self.n_sites();
        let mut augmented = self.columns.clone();
        for i in 0..n_sites {
            let has_singleton = self.columns.iter().any(|col| {
                col[i] == -1 && col.iter().map(|v| v.abs()).sum::<i64>() == 1
            });
            if !has_singleton {
                let mut fake = vec![0i64; n_sites];
                fake[i] = -1;
                augmented.push(fake);
            }
        }
        (augmented, n_original)
    }

    /// Canonical hash of A: blake3 over a canonical serialization of the
    /// content-sorted column multiset together with the ordered site names.
    /// Invariant under column permutation, sensitive to any column change and
    /// to the binding-site ordering.
    pub fn canonical_hash(&self) -> String {
        #[derive(Serialize)]
        struct MatrixFingerprint<'a> {
            sites: &'a [String],
            columns: Vec<&'a [i64]>,
        }

        let mut columns: Vec<&[i64]> = self.columns.iter().map(|c| c.as_slice()).collect();
        columns.sort();
        let fp = MatrixFingerprint {
            sites: &self.site_names,
            columns,
        };
        let bytes = serde_json::to_vec(&fp).expect("fingerprint serialize");
        blake3::hash(&bytes).to_hex().to_string()
    }
}
