// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fmt::Write as _;

/// A reaction over the polymer basis, stored as sparse signed terms sorted by
/// polymer index. Negative coefficients are reactants, positive are products;
/// one term per polymer makes the no-catalyst invariant structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reaction {
    terms: Vec<(u32, i64)>,
}

impl Reaction {
    /// Builds from a dense signed vector; `None` for the zero reaction.
    pub fn from_dense(vector: &[i64]) -> Option<Self> {
        let terms: Vec<(u32, i64)> = vector
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != 0)
            .map(|(i, &c)| (i as u32, c))
            .collect();
        if terms.is_empty() {
            None
        } else {
            Some(Self { terms })
        }
    }

    pub fn terms(&self) -> &[(u32, i64)] {
        &self.terms
    }

    pub fn coefficient(&self, polymer: u32) -> i64 {
        self.terms
            .binary_search_by_key(&polymer, |&(p, _)| p)
            .map(|i| self.terms[i].1)
            .unwrap_or(0)
    }

    /// Reactants as (polymer index, positive multiplicity).
    pub fn reactants(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.terms
            .iter()
            .filter(|&&(_, c)| c < 0)
            .map(|&(p, c)| (p, -c))
    }

    /// Products as (polymer index, positive multiplicity).
    pub fn products(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.terms
            .iter()
            .filter(|&&(_, c)| c > 0)
            .map(|&(p, c)| (p, c))
    }

    /// 1ᵀr: positive when products outnumber reactants.
    pub fn net_multiplicity(&self) -> i64 {
        self.terms.iter().map(|&(_, c)| c).sum()
    }

    /// Total reactant multiplicity equals total product multiplicity.
    pub fn is_balanced(&self) -> bool {
        self.net_multiplicity() == 0
    }

    /// Human form, e.g. `2 P1 + P3 -> P4`.
    pub fn render(&self, label: &dyn Fn(u32) -> String) -> String {
        let format_side = |side: &mut dyn Iterator<Item = (u32, i64)>| {
            let mut out = String::new();
            let mut first = true;
            for (p, mult) in side {
                if !first {
                    out.push_str(" + ");
                }
                first = false;
                if mult == 1 {
                    let _ = write!(out, "{}", label(p));
                } else {
                    let _ = write!(out, "{} {}", mult, label(p));
                }
            }
            if out.is_empty() {
                out.push('0');
            }
            out
        };
        let lhs = format_side(&mut self.reactants());
        let rhs = format_side(&mut self.products());
        format!("{lhs} -> {rhs}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_reactants_and_products() {
        let r = Reaction::from_dense(&[-2, 0, 1, 3]).unwrap();
        assert_eq!(r.reactants().collect::<Vec<_>>(), vec![(0, 2)]);
        assert_eq!(r.products().collect::<Vec<_>>(), vec![(2, 1), (3, 3)]);
        assert_eq!(r.net_multiplicity(), 2);
        assert!(!r.is_balanced());
        assert_eq!(r.coefficient(0), -2);
        assert_eq!(r.coefficient(1), 0);
    }

    #[test]
    fn zero_reaction_is_none() {
        assert!(Reaction::from_dense(&[0, 0, 0]).is_none());
    }

    #[test]
    fn renders_human_form() {
        let r = Reaction::from_dense(&[-2, -1, 3, 0]).unwrap();
        let label = |p: u32| format!("P{}", p + 1);
        assert_eq!(r.render(&label), "2 P1 + P2 -> 3 P3");

        let consume_only = Reaction::from_dense(&[-1, 0, 0, 0]).unwrap();
        assert_eq!(consume_only.render(&label), "P1 -> 0");
    }

    #[test]
    fn supports_are_disjoint_by_construction() {
        let r = Reaction::from_dense(&[-1, 2, 0, -3, 4]).unwrap();
        let reactants: Vec<u32> = r.reactants().map(|(p, _)| p).collect();
        let products: Vec<u32> = r.products().map(|(p, _)| p).collect();
        assert!(reactants.iter().all(|p| !products.contains(p)));
    }
}
