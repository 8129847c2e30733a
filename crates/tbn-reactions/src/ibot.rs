// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! IBOT: iterative min-ratio assignment of concentration exponents.
//!
//! Every on-target polymer starts at μ = 1, off-target polymers at the
//! unassigned sentinel. Each iteration takes the global minimum of the
//! imbalance/novelty ratio over the surviving reactions, assigns it to every
//! unassigned off-target polymer in the support of every minimum-attaining
//! reaction, and incrementally refreshes only the reactions touching the
//! newly assigned polymers. Ratios are exact rationals; the min-heap is lazy
//! (stale entries carry an old version and are skipped on pop).

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use num_rational::Ratio;
use num_traits::Zero;
use tracing::info;

use tbn_basis::PolymerBasis;
use tbn_core::energy::RHO_WATER_MOLAR;
use tbn_core::model::Tbn;
use tbn_core::numfmt;
use tbn_core::tbnpolys::TbnpolysWriter;
use tbn_core::units::Unit;

use crate::reaction::Reaction;

/// Concentration exponents are exact rationals; i128 components keep the
/// cross-multiplied comparisons far from overflow.
pub type Mu = Ratio<i128>;

/// Result of an IBOT run.
#[derive(Clone, Debug)]
pub struct IbotOutcome {
    /// Exponent per basis polymer: 1 for on-target, the assigned value for
    /// reachable off-target polymers, `None` for unreachable ones.
    pub mu: Vec<Option<Mu>>,
    /// Sorted on-target indices.
    pub on_target: Vec<usize>,
    /// Off-target polymers never reached by a canonical reaction.
    pub unreachable: Vec<usize>,
    /// μ_min per iteration; non-decreasing.
    pub mu_min_sequence: Vec<Mu>,
    /// Per reaction, the iteration (1-based) at which it attained the
    /// minimum ratio, or `None` if it never did.
    pub reaction_iteration: Vec<Option<usize>>,
}

impl IbotOutcome {
    pub fn mu_f64(&self, polymer: usize) -> Option<f64> {
        self.mu[polymer].map(ratio_to_f64)
    }

    /// Emission order: on-target polymers first in basis order, then
    /// assigned off-target polymers by μ ascending, ties in basis order.
    pub fn output_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = self.on_target.clone();
        let mut off: Vec<usize> = (0..self.mu.len())
            .filter(|i| !self.on_target.contains(i) && self.mu[*i].is_some())
            .collect();
        off.sort_by_key(|&i| (self.mu[i].expect("assigned"), i));
        order.extend(off);
        order
    }
}

pub fn ratio_to_f64(r: Mu) -> f64 {
    *r.numer() as f64 / *r.denom() as f64
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    ratio: Mu,
    reaction: u32,
    version: u32,
}

/// Runs the scheduler. `reactions` are the irreducible canonical reactions
/// over a basis of `n_polymers` polymers.
pub fn run_ibot(
    n_polymers: usize,
    on_target: &BTreeSet<usize>,
    reactions: &[Reaction],
) -> IbotOutcome {
    let one = Mu::from_integer(1);
    let mut mu = vec![Mu::zero(); n_polymers];
    let mut assigned = vec![false; n_polymers];
    for &p in on_target {
        mu[p] = one;
        assigned[p] = true;
    }
    let is_off_target = |p: usize| !on_target.contains(&p);

    // Inverted index over off-target support only; built once, touched per
    // assignment.
    let mut inverted: Vec<Vec<u32>> = vec![Vec::new(); n_polymers];
    let mut novelty = vec![0usize; reactions.len()];
    let mut imbalance = vec![Mu::zero(); reactions.len()];
    let mut version = vec![0u32; reactions.len()];
    let mut reaction_iteration = vec![None; reactions.len()];

    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
    for (rid, reaction) in reactions.iter().enumerate() {
        let mut ell = 0usize;
        let mut k = Mu::zero();
        for &(p, coeff) in reaction.terms() {
            let p = p as usize;
            if is_off_target(p) {
                inverted[p].push(rid as u32);
                if !assigned[p] {
                    ell += 1;
                }
            }
            // mu is 1 on on-target, 0 elsewhere at this point.
            if coeff < 0 {
                k += Mu::from_integer((-coeff) as i128) * mu[p];
            } else {
                k -= Mu::from_integer(coeff as i128) * mu[p];
            }
        }
        novelty[rid] = ell;
        imbalance[rid] = k;
        if ell > 0 {
            heap.push(Reverse(HeapEntry {
                ratio: k / Mu::from_integer(ell as i128),
                reaction: rid as u32,
                version: 0,
            }));
        }
    }

    let mut mu_min_sequence = Vec::new();
    let mut iteration = 0usize;

    while let Some(Reverse(top)) = heap.pop() {
        let rid = top.reaction as usize;
        if top.version != version[rid] || novelty[rid] == 0 {
            continue;
        }
        iteration += 1;
        let mu_min = top.ratio;
        mu_min_sequence.push(mu_min);

        // Gather every reaction attaining the minimum before assigning.
        let mut batch = vec![rid];
        loop {
            let Some(Reverse(next)) = heap.peek() else {
                break;
            };
            let (next_rid, next_version, next_ratio) =
                (next.reaction as usize, next.version, next.ratio);
            if next_version != version[next_rid] || novelty[next_rid] == 0 {
                heap.pop();
                continue;
            }
            if next_ratio != mu_min {
                break;
            }
            batch.push(next_rid);
            heap.pop();
        }

        let mut newly: Vec<usize> = Vec::new();
        for &rid in &batch {
            reaction_iteration[rid].get_or_insert(iteration);
            for &(p, _) in reactions[rid].terms() {
                let p = p as usize;
                if is_off_target(p) && !assigned[p] {
                    assigned[p] = true;
                    mu[p] = mu_min;
                    newly.push(p);
                }
            }
        }

        // Incremental refresh of the reactions touching new assignments.
        let mut touched: BTreeSet<u32> = BTreeSet::new();
        for &p in &newly {
            for &rid in &inverted[p] {
                let rid_usize = rid as usize;
                let coeff = reactions[rid_usize].coefficient(p as u32);
                novelty[rid_usize] -= 1;
                if coeff < 0 {
                    imbalance[rid_usize] += Mu::from_integer((-coeff) as i128) * mu_min;
                } else {
                    imbalance[rid_usize] -= Mu::from_integer(coeff as i128) * mu_min;
                }
                touched.insert(rid);
            }
        }
        for rid in touched {
            let rid = rid as usize;
            version[rid] += 1;
            if novelty[rid] > 0 {
                heap.push(Reverse(HeapEntry {
                    ratio: imbalance[rid] / Mu::from_integer(novelty[rid] as i128),
                    reaction: rid as u32,
                    version: version[rid],
                }));
            }
        }

        info!(
            iteration,
            mu_min = ratio_to_f64(mu_min),
            assigned = newly.len(),
            "ibot iteration"
        );
    }

    let unreachable: Vec<usize> = (0..n_polymers)
        .filter(|&p| is_off_target(p) && !assigned[p])
        .collect();
    if !unreachable.is_empty() {
        info!(
            count = unreachable.len(),
            "off-target polymers unreachable by canonical reactions"
        );
    }

    IbotOutcome {
        mu: (0..n_polymers)
            .map(|p| if assigned[p] { Some(mu[p]) } else { None })
            .collect(),
        on_target: on_target.iter().copied().collect(),
        unreachable,
        mu_min_sequence,
        reaction_iteration,
    }
}

/// Formats the IBOT `.tbnpolys` output: on-target polymers first, then
/// off-target polymers sorted by μ ascending, each with a `# μ:` trailer.
pub fn format_ibot_tbnpolys(tbn: &Tbn, basis: &PolymerBasis, outcome: &IbotOutcome) -> String {
    let writer = TbnpolysWriter::new(tbn);
    let n_off_assigned = outcome
        .mu
        .iter()
        .enumerate()
        .filter(|(i, m)| !outcome.on_target.contains(i) && m.is_some())
        .count();

    let mut lines = Vec::new();
    lines.push("# IBOT concentration exponents".to_string());
    lines.push(format!("# Total polymers: {}", basis.len()));
    lines.push(format!("# On-target polymers: {}", outcome.on_target.len()));
    lines.push(format!("# Off-target polymers: {n_off_assigned}"));
    if !outcome.unreachable.is_empty() {
        lines.push(format!(
            "# Off-target polymers without an assigned exponent excluded: {}",
            outcome.unreachable.len()
        ));
    }
    lines.push(String::new());

    for &p in &outcome.output_order() {
        lines.extend(writer.format_polymer(basis.polymer(p)));
        let value = outcome.mu_f64(p).expect("ordered polymers are assigned");
        lines.push(format!("# μ: {}", numfmt::format_sig(value, 6)));
        lines.push(String::new());
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Formats the canonical reactions ordered by the IBOT iteration that used
/// them; reactions never attaining the minimum come last in index order.
pub fn format_reactions_report(
    reactions: &[Reaction],
    outcome: &IbotOutcome,
    label: &dyn Fn(u32) -> String,
) -> String {
    let mut order: Vec<usize> = (0..reactions.len()).collect();
    order.sort_by_key(|&rid| (outcome.reaction_iteration[rid].unwrap_or(usize::MAX), rid));

    let mut lines = Vec::new();
    lines.push("# Irreducible canonical reactions, ordered by IBOT iteration".to_string());
    lines.push(String::new());
    for rid in order {
        match outcome.reaction_iteration[rid] {
            Some(iteration) => {
                lines.push(format!("[iteration {iteration}] {}", reactions[rid].render(label)))
            }
            None => lines.push(reactions[rid].render(label)),
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Monomer concentration synthesis for `--generate-tbn c units`: with
/// f = c'/ρ_H₂O, monomer i totals `ρ_H₂O · Σ_p x_p[i] · f^μ(p)` over the
/// assigned polymers, re-expressed in the requested units.
pub fn synthesize_monomer_concentrations(
    basis: &PolymerBasis,
    outcome: &IbotOutcome,
    c: f64,
    units: Unit,
) -> Vec<f64> {
    let c_molar = units.to_molar(c);
    let fraction = c_molar / RHO_WATER_MOLAR;
    let mut totals_molar = vec![0.0f64; basis.n_monomers()];
    for (p, counts) in basis.iter().enumerate() {
        let Some(mu_p) = outcome.mu[p] else {
            continue;
        };
        let weight = fraction.powf(ratio_to_f64(mu_p));
        for (m, &count) in counts.iter().enumerate() {
            if count > 0 {
                totals_molar[m] += count as f64 * weight;
            }
        }
    }
    totals_molar
        .iter()
        .map(|&t| units.from_molar(RHO_WATER_MOLAR * t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(n: i128, d: i128) -> Mu {
        Ratio::new(n, d)
    }

    /// Basis P0 = A, P1 = B, P2 = A+B; on-target {P2}.
    /// Single canonical reaction: P2 -> P0 + P1.
    fn simple_case() -> (usize, BTreeSet<usize>, Vec<Reaction>) {
        let reactions = vec![Reaction::from_dense(&[1, 1, -1]).unwrap()];
        (3, BTreeSet::from([2]), reactions)
    }

    #[test]
    fn splits_imbalance_across_novel_polymers() {
        let (n, on, reactions) = simple_case();
        let outcome = run_ibot(n, &on, &reactions);
        // k = 1 (one on-target reactant), l = 2 -> mu = 1/2 for both.
        assert_eq!(outcome.mu[0], Some(ratio(1, 2)));
        assert_eq!(outcome.mu[1], Some(ratio(1, 2)));
        assert_eq!(outcome.mu[2], Some(ratio(1, 1)));
        assert!(outcome.unreachable.is_empty());
        assert_eq!(outcome.mu_min_sequence, vec![ratio(1, 2)]);
        assert_eq!(outcome.reaction_iteration, vec![Some(1)]);
    }

    #[test]
    fn cascades_through_dependent_reactions() {
        // P3 is reachable only after P0 is assigned:
        //   r0: P2 -> P0 + P1          (k=1, l=2, ratio 1/2)
        //   r1: P0 + 2 P2 -> 3 P3      (k=2, l=2, ratio 1)
        // Iteration 1 assigns P0 = P1 = 1/2; the refresh leaves r1 with
        // l=1 and k = 2 + 1/2, so iteration 2 assigns P3 = 5/2.
        let reactions = vec![
            Reaction::from_dense(&[1, 1, -1, 0]).unwrap(),
            Reaction::from_dense(&[-1, 0, -2, 3]).unwrap(),
        ];
        let on = BTreeSet::from([2]);
        let outcome = run_ibot(4, &on, &reactions);
        assert_eq!(outcome.mu[0], Some(ratio(1, 2)));
        assert_eq!(outcome.mu[1], Some(ratio(1, 2)));
        assert_eq!(outcome.mu[3], Some(ratio(5, 2)));
        assert_eq!(outcome.mu_min_sequence, vec![ratio(1, 2), ratio(5, 2)]);
        assert_eq!(outcome.reaction_iteration, vec![Some(1), Some(2)]);
    }

    #[test]
    fn ties_assign_all_minimum_reactions() {
        // Two disjoint reactions with the same ratio assign in one iteration.
        let reactions = vec![
            Reaction::from_dense(&[1, 0, -1, 0]).unwrap(),
            Reaction::from_dense(&[0, 1, 0, -1]).unwrap(),
        ];
        let on = BTreeSet::from([2, 3]);
        let outcome = run_ibot(4, &on, &reactions);
        assert_eq!(outcome.mu_min_sequence.len(), 1);
        assert_eq!(outcome.mu[0], Some(ratio(1, 1)));
        assert_eq!(outcome.mu[1], Some(ratio(1, 1)));
    }

    #[test]
    fn unreachable_polymers_are_reported_not_assigned() {
        // P3 appears in no reaction.
        let reactions = vec![Reaction::from_dense(&[1, 1, -1, 0]).unwrap()];
        let on = BTreeSet::from([2]);
        let outcome = run_ibot(4, &on, &reactions);
        assert_eq!(outcome.mu[3], None);
        assert_eq!(outcome.unreachable, vec![3]);
    }

    #[test]
    fn every_iteration_assigns_something() {
        let reactions = vec![
            Reaction::from_dense(&[1, 1, -1, 0, 0]).unwrap(),
            Reaction::from_dense(&[-1, 0, -1, 2, 0]).unwrap(),
            Reaction::from_dense(&[0, -1, -1, 0, 3]).unwrap(),
        ];
        let on = BTreeSet::from([2]);
        let outcome = run_ibot(5, &on, &reactions);
        let assigned_off = outcome
            .mu
            .iter()
            .enumerate()
            .filter(|(i, m)| *i != 2 && m.is_some())
            .count();
        assert_eq!(assigned_off, 4);
        assert!(outcome.mu_min_sequence.len() <= assigned_off);
        assert!(!outcome.mu_min_sequence.is_empty());
    }

    #[test]
    fn output_order_is_on_target_then_mu_ascending() {
        let reactions = vec![
            Reaction::from_dense(&[1, 1, -1, 0]).unwrap(),
            Reaction::from_dense(&[-1, 0, -2, 3]).unwrap(),
        ];
        let on = BTreeSet::from([2]);
        let outcome = run_ibot(4, &on, &reactions);
        // On-target P2 first; then P0, P1 (mu 1/2, basis order); then P3 (5/2).
        assert_eq!(outcome.output_order(), vec![2, 0, 1, 3]);
    }

    #[test]
    fn synthesis_uses_mole_fractions() {
        let basis = tbn_basis::PolymerBasis::from_rows(
            vec![vec![1, 0], vec![0, 1], vec![1, 1]],
            2,
        );
        let outcome = IbotOutcome {
            mu: vec![Some(ratio(1, 2)), Some(ratio(1, 2)), Some(ratio(1, 1))],
            on_target: vec![2],
            unreachable: vec![],
            mu_min_sequence: vec![ratio(1, 2)],
            reaction_iteration: vec![Some(1)],
        };
        let conc = synthesize_monomer_concentrations(&basis, &outcome, 55.14, Unit::Molar);
        // c' = rho, so f = 1 and every weight is 1: each monomer totals
        // rho * (its count across polymers).
        assert!((conc[0] - 2.0 * RHO_WATER_MOLAR).abs() < 1e-9);
        assert!((conc[1] - 2.0 * RHO_WATER_MOLAR).abs() < 1e-9);
    }
}
