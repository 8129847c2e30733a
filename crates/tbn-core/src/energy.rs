// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Free-energy functional over polymers.
//! - total_sites(x) = 1ᵀ|A|x, unpaired_excess(x) = 1ᵀAx
//! - bonds(x) = (total_sites - unpaired_excess) / 2 (parity invariant)
//! - ΔG(x) = -bonds(x) + optional association penalty

use crate::error::{Result, TbnError};
use crate::model::Tbn;

/// Boltzmann constant in kcal/mol/K.
pub const KB: f64 = 0.001987204259;

/// Moles of water per liter at 37 °C, the mole-fraction reference density.
pub const RHO_WATER_MOLAR: f64 = 55.14;

/// Empirical bimolecular association parameters (kcal/mol).
/// NUPACK uses dG = 1.96, dH = 0.20.
#[derive(Clone, Copy, Debug)]
pub struct AssocParams {
    pub dg_assoc: f64,
    pub dh_assoc: f64,
}

fn celsius_to_kelvin(temp_c: f64) -> f64 {
    temp_c + 273.15
}

/// Moles of water per liter at the given temperature, per the Tanaka et al.
/// (2001) density correlation.
pub fn water_density_mol_per_l(temp_c: f64) -> f64 {
    let a1 = -3.983035;
    let a2 = 301.797;
    let a3 = 522_528.9;
    let a4 = 69.34881;
    let a5 = 999.974950;

    let t = temp_c;
    let density_g_per_l = a5 * (1.0 - (t + a1) * (t + a1) * (t + a2) / a3 / (t + a4));
    density_g_per_l / 18.0152
}

/// Bimolecular association term (kcal/mol) at the given temperature.
pub fn bimolecular(temp_c: f64, params: &AssocParams) -> f64 {
    let water_density = water_density_mol_per_l(temp_c);
    let temp_k = celsius_to_kelvin(temp_c);
    (params.dg_assoc - params.dh_assoc) * temp_k / 310.15 + params.dh_assoc
        - KB * temp_k * water_density.ln()
}

/// Association energy penalty for a complex of `size` monomers.
pub fn assoc_penalty(size: i64, temp_c: f64, params: &AssocParams) -> f64 {
    bimolecular(temp_c, params) * (size - 1) as f64
}

/// Number of monomers in the polymer, 1ᵀx.
pub fn polymer_size(x: &[i64]) -> Result<i64> {
    let mut total = 0i64;
    for &count in x {
        total = total
            .checked_add(count)
            .ok_or(TbnError::Overflow { context: "polymer size" })?;
    }
    Ok(total)
}

/// 1ᵀ|A|x: total binding-site occurrences, absolute values per matrix entry
/// so intra-monomer occurrences do not cancel.
pub fn total_sites(tbn: &Tbn, x: &[i64]) -> Result<i64> {
    let mut total = 0i64;
    for (col, &count) in tbn.columns().iter().zip(x) {
        if count == 0 {
            continue;
        }
        let col_abs: i64 = col.iter().map(|v| v.abs()).sum();
        let term = col_abs
            .checked_mul(count)
            .ok_or(TbnError::Overflow { context: "total sites" })?;
        total = total
            .checked_add(term)
            .ok_or(TbnError::Overflow { context: "total sites" })?;
    }
    Ok(total)
}

/// 1ᵀAx: signed site excess; zero iff the polymer is saturated.
pub fn unpaired_excess(tbn: &Tbn, x: &[i64]) -> Result<i64> {
    let mut total = 0i64;
    for (col, &count) in tbn.columns().iter().zip(x) {
        if count == 0 {
            continue;
        }
        let col_sum: i64 = col.iter().sum();
        let term = col_sum
            .checked_mul(count)
            .ok_or(TbnError::Overflow { context: "unpaired excess" })?;
        total = total
            .checked_add(term)
            .ok_or(TbnError::Overflow { context: "unpaired excess" })?;
    }
    Ok(total)
}

/// Number of inter- and intra-monomer bonds when bonding is maximized.
pub fn bonds(tbn: &Tbn, x: &[i64]) -> Result<i64> {
    let total = total_sites(tbn, x)?;
    let excess = unpaired_excess(tbn, x)?;
    let paired = total
        .checked_sub(excess)
        .ok_or(TbnError::Overflow { context: "bond count" })?;
    if paired % 2 != 0 {
        return Err(TbnError::BondParity { total, excess });
    }
    Ok(paired / 2)
}

/// ΔG(x) = -bonds(x) + penalty(size(x), T); the penalty is exactly zero when
/// association parameters are not supplied.
pub fn free_energy(
    tbn: &Tbn,
    x: &[i64],
    assoc: Option<&AssocParams>,
    temp_c: f64,
) -> Result<f64> {
    let bond_count = bonds(tbn, x)?;
    let penalty = match assoc {
        Some(params) => assoc_penalty(polymer_size(x)?, temp_c, params),
        None => 0.0,
    };
    Ok(-(bond_count as f64) + penalty)
}
