// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::collections::HashMap;
use std::fmt;

use crate::site::BindingSite;

/// A monomer record: optional name, ordered site occurrence list, optional
/// concentration in the declared units. Two monomers are equal *as monomers*
/// iff their signed count vectors are equal, even when the raw site lists
/// differ by intra-monomer cancellation.
#[derive(Clone, Debug)]
pub struct Monomer {
    pub name: Option<String>,
    pub sites: Vec<BindingSite>,
    pub concentration: Option<f64>,
    /// True when the source line used the `site ... > name` form.
    pub name_trailing: bool,
}

impl Monomer {
    pub fn new(name: Option<String>, sites: Vec<BindingSite>, concentration: Option<f64>) -> Self {
        Self {
            name,
            sites,
            concentration,
            name_trailing: false,
        }
    }

    /// Signed count vector over the ordered base-site set: +1 per unstar
    /// occurrence, -1 per star occurrence.
    pub fn signed_vector(&self, site_index: &HashMap<String, usize>, n_sites: usize) -> Vec<i64> {
        let mut v = vec![0i64; n_sites];
        for site in &self.sites {
            let idx = site_index[&site.name];
            if site.star {
                v[idx] -= 1;
            } else {
                v[idx] += 1;
            }
        }
        v
    }

    /// The raw site list in source order, e.g. `a b* c`.
    pub fn sites_str(&self) -> String {
        let mut out = String::new();
        for (i, site) in self.sites.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&site.to_string());
        }
        out
    }

    /// Sorted site tokens, used for order-insensitive matching.
    pub fn sorted_site_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.sites.iter().map(|s| s.to_string()).collect();
        tokens.sort();
        tokens
    }
}

impl fmt::Display for Monomer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if self.name_trailing => write!(f, "{} > {}", self.sites_str(), name),
            Some(name) => write!(f, "{}: {}", name, self.sites_str()),
            None => f.write_str(&self.sites_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(names: &[&str]) -> HashMap<String, usize> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i))
            .collect()
    }

    #[test]
    fn signed_vector_counts_with_cancellation() {
        let m = Monomer::new(
            None,
            vec![
                BindingSite::new("a", false),
                BindingSite::new("a", true),
                BindingSite::new("b", false),
                BindingSite::new("b", false),
                BindingSite::new("c", true),
            ],
            None,
        );
        let v = m.signed_vector(&index(&["a", "b", "c"]), 3);
        assert_eq!(v, vec![0, 2, -1]);
    }

    #[test]
    fn display_forms() {
        let mut m = Monomer::new(
            Some("A".into()),
            vec![BindingSite::new("a", false), BindingSite::new("b", true)],
            None,
        );
        assert_eq!(m.to_string(), "A: a b*");
        m.name_trailing = true;
        assert_eq!(m.to_string(), "a b* > A");
        m.name = None;
        assert_eq!(m.to_string(), "a b*");
    }
}
