// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Constraint-driven filtering of polymer × concentration records.
//!
//! `CONTAINS m1 m2 ...` requires each listed monomer with at least the listed
//! multiplicity (repetition raises the lower bound); `EXACTLY m1 m2 ...`
//! requires the exact monomer vector over named monomers and nothing else.
//! Constraint lines combine via OR.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, TbnError};
use crate::model::Tbn;
use crate::numfmt;
use crate::polymat::PolymatData;

#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    Contains(Vec<String>),
    Exactly(Vec<String>),
}

/// Truncation limits, applied together (AND) after the constraint match.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterLimits {
    /// Hard cap on the number of returned polymers.
    pub max_count: Option<usize>,
    /// Minimum concentration, in the declared units.
    pub min_concentration: Option<f64>,
    /// Minimum share of the total concentration, in percent.
    pub percent_limit: Option<f64>,
}

/// A polymer record that survived filtering.
#[derive(Clone, Debug)]
pub struct FilterMatch {
    pub polymer_index: usize,
    pub counts: Vec<i64>,
    pub free_energy: Option<f64>,
    pub concentration: Option<f64>,
}

/// Parses a constraints file: one constraint per line, `#` comments, names
/// optionally double-quoted.
pub fn parse_constraints_file(path: &Path) -> Result<Vec<Constraint>> {
    let text = std::fs::read_to_string(path)?;
    parse_constraints(&text)
}

pub fn parse_constraints(text: &str) -> Result<Vec<Constraint>> {
    let mut constraints = Vec::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens = split_quoted(line, line_no)?;
        let Some((keyword, names)) = tokens.split_first() else {
            continue;
        };
        let names = names.to_vec();
        match keyword.to_ascii_uppercase().as_str() {
            "CONTAINS" => constraints.push(Constraint::Contains(names)),
            "EXACTLY" => constraints.push(Constraint::Exactly(names)),
            other => {
                return Err(TbnError::Parse {
                    line: line_no,
                    msg: format!("invalid constraint type '{other}' (expected CONTAINS or EXACTLY)"),
                })
            }
        }
    }
    Ok(constraints)
}

fn split_quoted(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(TbnError::Parse {
            line: line_no,
            msg: "unterminated quote".into(),
        });
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Filters the artifact's polymers. Matches are returned in descending
/// concentration order, truncated by the limits.
pub fn filter_polymers(
    tbn: &Tbn,
    data: &PolymatData,
    constraints: &[Constraint],
    limits: &FilterLimits,
) -> Vec<FilterMatch> {
    let name_to_indices = named_monomer_indices(tbn);
    let total_concentration: Option<f64> = data
        .concentrations
        .as_ref()
        .map(|conc| conc.iter().sum());

    let mut matches = Vec::new();
    for (i, counts) in data.polymers.iter().enumerate() {
        let selected = if constraints.is_empty() {
            true
        } else {
            constraints
                .iter()
                .any(|c| matches_constraint(counts, c, &name_to_indices))
        };
        if !selected {
            continue;
        }

        let concentration = data.concentrations.as_ref().map(|c| c[i]);
        if let (Some(floor), Some(conc)) = (limits.min_concentration, concentration) {
            if conc < floor {
                continue;
            }
        }
        if let (Some(percent), Some(conc), Some(total)) =
            (limits.percent_limit, concentration, total_concentration)
        {
            if total > 0.0 && conc / total * 100.0 < percent {
                continue;
            }
        }

        matches.push(FilterMatch {
            polymer_index: i,
            counts: counts.clone(),
            free_energy: data.free_energies.as_ref().map(|e| e[i]),
            concentration,
        });
    }

    if data.concentrations.is_some() {
        matches.sort_by(|a, b| {
            let ca = a.concentration.unwrap_or(0.0);
            let cb = b.concentration.unwrap_or(0.0);
            cb.partial_cmp(&ca)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.polymer_index.cmp(&b.polymer_index))
        });
    }
    if let Some(cap) = limits.max_count {
        matches.truncate(cap);
    }
    matches
}

fn named_monomer_indices(tbn: &Tbn) -> HashMap<String, Vec<usize>> {
    let mut map: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, monomer) in tbn.monomers().iter().enumerate() {
        if let Some(name) = &monomer.name {
            map.entry(name.clone()).or_default().push(i);
        }
    }
    map
}

fn matches_constraint(
    counts: &[i64],
    constraint: &Constraint,
    name_to_indices: &HashMap<String, Vec<usize>>,
) -> bool {
    let names = match constraint {
        Constraint::Contains(names) | Constraint::Exactly(names) => names,
    };
    let mut required: HashMap<&str, i64> = HashMap::new();
    for name in names {
        *required.entry(name.as_str()).or_insert(0) += 1;
    }
    // Only named monomers are addressable; an unknown name matches nothing.
    for name in required.keys() {
        if !name_to_indices.contains_key(*name) {
            return false;
        }
    }

    let count_for = |name: &str| -> i64 {
        name_to_indices[name].iter().map(|&i| counts[i]).sum()
    };

    match constraint {
        Constraint::Contains(_) => required
            .iter()
            .all(|(name, &needed)| count_for(name) >= needed),
        Constraint::Exactly(_) => {
            if !required
                .iter()
                .all(|(name, &needed)| count_for(name) == needed)
            {
                return false;
            }
            let mut accounted = vec![false; counts.len()];
            for name in required.keys() {
                for &i in &name_to_indices[*name] {
                    accounted[i] = true;
                }
            }
            counts
                .iter()
                .enumerate()
                .all(|(i, &c)| accounted[i] || c == 0)
        }
    }
}

/// User-facing report of the filtered polymers.
pub fn format_matches(
    tbn: &Tbn,
    data: &PolymatData,
    matches: &[FilterMatch],
    description: &str,
    limits: &FilterLimits,
) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# Filtered polymers: {description}"));
    if let Some(percent) = limits.percent_limit {
        lines.push(format!("# Percent limit: {percent}%"));
    }
    if let Some(floor) = limits.min_concentration {
        lines.push(format!("# Minimum concentration: {floor}"));
    }
    if let Some(cap) = limits.max_count {
        lines.push(format!("# Maximum count limit: {cap}"));
    }
    lines.push(format!("# Number of matching polymers: {}", matches.len()));

    if let Some(conc) = &data.concentrations {
        let total: f64 = conc.iter().sum();
        let matched: f64 = matches.iter().filter_map(|m| m.concentration).sum();
        let percentage = if total > 0.0 { matched / total * 100.0 } else { 0.0 };
        lines.push(format!("# Total concentration fraction: {percentage:.2}%"));
        if let Some(units) = data.units {
            lines.push(format!("# Concentration units: {units}"));
        }
    }
    lines.push("#".to_string());

    for (rank, m) in matches.iter().enumerate() {
        lines.push(format!("# Polymer {}", rank + 1));
        for (i, &count) in m.counts.iter().enumerate() {
            if count <= 0 {
                continue;
            }
            let monomer = &tbn.monomers()[i];
            let spec = monomer
                .name
                .clone()
                .unwrap_or_else(|| monomer.sites_str());
            lines.push(format!("{count} | {spec}"));
        }
        if let Some(conc) = m.concentration {
            let formatted = numfmt::format_concentration(conc);
            match data.units {
                Some(units) => lines.push(format!("Concentration: {formatted} {units}")),
                None => lines.push(format!("Concentration: {formatted}")),
            }
        }
        lines.push(String::new());
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::units::Unit;
    use std::collections::BTreeMap;

    fn setup() -> (Tbn, PolymatData) {
        let tbn = parser::parse_str(
            "\\UNITS: nM\nA: a b, 10\nB: a* b*, 10\nc c, 1\n",
            &BTreeMap::new(),
        )
        .unwrap()
        .tbn;
        let data = PolymatData {
            polymers: vec![vec![1, 0, 0], vec![0, 1, 0], vec![1, 1, 0], vec![2, 1, 1]],
            concentrations: Some(vec![5.0, 2.0, 80.0, 0.5]),
            units: Some(Unit::NanoMolar),
            ..Default::default()
        };
        (tbn, data)
    }

    #[test]
    fn contains_respects_multiplicity() {
        let (tbn, data) = setup();
        let constraints = parse_constraints("CONTAINS A A\n").unwrap();
        let matches = filter_polymers(&tbn, &data, &constraints, &FilterLimits::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].counts, vec![2, 1, 1]);
    }

    #[test]
    fn exactly_excludes_unlisted_monomers() {
        let (tbn, data) = setup();
        let constraints = parse_constraints("EXACTLY A B\n").unwrap();
        let matches = filter_polymers(&tbn, &data, &constraints, &FilterLimits::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].counts, vec![1, 1, 0]);
    }

    #[test]
    fn constraint_lines_combine_via_or() {
        let (tbn, data) = setup();
        let constraints = parse_constraints("EXACTLY A\nEXACTLY B\n").unwrap();
        let matches = filter_polymers(&tbn, &data, &constraints, &FilterLimits::default());
        // Sorted by descending concentration: A (5.0) then B (2.0).
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].counts, vec![1, 0, 0]);
        assert_eq!(matches[1].counts, vec![0, 1, 0]);
    }

    #[test]
    fn limits_apply_together() {
        let (tbn, data) = setup();
        let limits = FilterLimits {
            max_count: Some(2),
            min_concentration: Some(1.0),
            percent_limit: Some(3.0),
        };
        let matches = filter_polymers(&tbn, &data, &[], &limits);
        // 0.5 nM fails the floor, 2.0 nM fails the percent limit (2.3%),
        // and the cap keeps the top two of the remainder.
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].counts, vec![1, 1, 0]);
        assert_eq!(matches[1].counts, vec![1, 0, 0]);
    }

    #[test]
    fn unknown_name_matches_nothing() {
        let (tbn, data) = setup();
        let constraints = parse_constraints("CONTAINS Z\n").unwrap();
        assert!(filter_polymers(&tbn, &data, &constraints, &FilterLimits::default()).is_empty());
    }

    #[test]
    fn quoted_names_parse() {
        let parsed = parse_constraints("CONTAINS \"A\" B\n").unwrap();
        assert_eq!(
            parsed,
            vec![Constraint::Contains(vec!["A".into(), "B".into()])]
        );
        assert!(parse_constraints("NEARBY A\n").is_err());
    }
}
