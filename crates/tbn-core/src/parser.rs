// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! `.tbn` parser and writer.
//!
//! A `.tbn` file is UTF-8 text; `#` begins a line comment. An optional header
//! line `\UNITS: {nM|pM|uM|mM|M}` activates concentration mode. Monomer lines
//! are `name: site ...[, conc]`, `site ... > name[, conc]` or
//! `site ...[, conc]`; `{{expr}}` tokens in the concentration field are
//! substituted from a variable map.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Result, TbnError};
use crate::expr::Expr;
use crate::model::Tbn;
use crate::monomer::Monomer;
use crate::numfmt;
use crate::site::{validate_name, BindingSite};
use crate::units::Unit;

/// Result of parsing a `.tbn` file: the built model plus the parameter
/// assignments that were actually referenced by `{{expr}}` fields.
#[derive(Debug)]
pub struct ParsedTbn {
    pub tbn: Tbn,
    pub used_variables: BTreeMap<String, f64>,
}

pub fn parse_file(path: &Path, variables: &BTreeMap<String, f64>) -> Result<ParsedTbn> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text, variables)
}

pub fn parse_str(text: &str, variables: &BTreeMap<String, f64>) -> Result<ParsedTbn> {
    let mut units: Option<Unit> = None;
    let mut records: Vec<Monomer> = Vec::new();
    let mut site_names: Vec<String> = Vec::new();
    let mut site_seen: HashSet<String> = HashSet::new();
    let mut monomer_names: HashSet<String> = HashSet::new();
    let mut used_variables = BTreeMap::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("\\UNITS:") {
            if units.is_some() {
                return Err(TbnError::Parse {
                    line: line_no,
                    msg: "multiple \\UNITS specifications".into(),
                });
            }
            if !records.is_empty() {
                return Err(TbnError::Parse {
                    line: line_no,
                    msg: "\\UNITS must precede the first monomer".into(),
                });
            }
            units = Some(rest.trim().parse().map_err(|e| TbnError::Parse {
                line: line_no,
                msg: format!("{e}"),
            })?);
            continue;
        }

        let mut monomer = parse_monomer_line(line, line_no, variables, &mut used_variables)?;

        match (units.is_some(), monomer.concentration.is_some()) {
            (true, false) => {
                return Err(TbnError::Parse {
                    line: line_no,
                    msg: "\\UNITS declared but monomer lacks a concentration".into(),
                })
            }
            (false, true) => {
                return Err(TbnError::Parse {
                    line: line_no,
                    msg: "monomer has a concentration but no \\UNITS header".into(),
                })
            }
            _ => {}
        }

        if let Some(conc) = monomer.concentration {
            if conc < 0.0 {
                return Err(TbnError::Parse {
                    line: line_no,
                    msg: format!("negative concentration {conc}"),
                });
            }
        }

        if let Some(name) = &monomer.name {
            if site_seen.contains(name) {
                return Err(TbnError::NameSiteCollision {
                    token: name.clone(),
                });
            }
            monomer_names.insert(name.clone());
        }
        for site in &mut monomer.sites {
            if monomer_names.contains(&site.name) {
                return Err(TbnError::NameSiteCollision {
                    token: site.name.clone(),
                });
            }
            if site_seen.insert(site.name.clone()) {
                site_names.push(site.name.clone());
            }
        }

        records.push(monomer);
    }

    if records.is_empty() {
        return Err(TbnError::Parse {
            line: 0,
            msg: "no monomers found".into(),
        });
    }

    let tbn = Tbn::build(records, site_names, units)?;
    Ok(ParsedTbn {
        tbn,
        used_variables,
    })
}

fn parse_monomer_line(
    line: &str,
    line_no: usize,
    variables: &BTreeMap<String, f64>,
    used: &mut BTreeMap<String, f64>,
) -> Result<Monomer> {
    // Concentration follows the last comma, if any.
    let (body, concentration) = match line.rsplit_once(',') {
        Some((body, conc_field)) => {
            let value = eval_concentration(conc_field.trim(), line_no, variables, used)?;
            (body.trim(), Some(value))
        }
        None => (line, None),
    };

    // Three name forms: `name: sites`, `sites > name`, bare `sites`.
    let (name, sites_str, name_trailing) = if let Some((name, rest)) = body.split_once(':') {
        (Some(name.trim()), rest.trim(), false)
    } else if let Some((rest, name)) = body.rsplit_once('>') {
        (Some(name.trim()), rest.trim(), true)
    } else {
        (None, body, false)
    };

    if let Some(name) = name {
        validate_name(name, "monomer", line_no)?;
    }

    let tokens: Vec<&str> = sites_str.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(TbnError::Parse {
            line: line_no,
            msg: "monomer has no binding sites".into(),
        });
    }
    let sites = tokens
        .iter()
        .map(|t| BindingSite::parse(t, line_no))
        .collect::<Result<Vec<_>>>()?;

    let mut monomer = Monomer::new(name.map(str::to_string), sites, concentration);
    monomer.name_trailing = name_trailing;
    Ok(monomer)
}

/// Evaluates a concentration field, substituting each `{{expr}}` token from
/// the variable map before the final numeric parse.
fn eval_concentration(
    field: &str,
    line_no: usize,
    variables: &BTreeMap<String, f64>,
    used: &mut BTreeMap<String, f64>,
) -> Result<f64> {
    let mut out = String::new();
    let mut rest = field;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| TbnError::Parse {
            line: line_no,
            msg: format!("unterminated '{{{{' in concentration field '{field}'"),
        })?;
        out.push_str(&rest[..start]);

        let src = &after[..end];
        let expr = Expr::parse(src).map_err(|e| TbnError::Parse {
            line: line_no,
            msg: format!("in '{{{{{src}}}}}': {e}"),
        })?;
        let mut names = BTreeSet::new();
        expr.variables(&mut names);
        for name in names {
            match variables.get(&name) {
                Some(&v) => {
                    used.insert(name, v);
                }
                None => {
                    return Err(TbnError::Parse {
                        line: line_no,
                        msg: format!("undefined parameter '{name}'"),
                    })
                }
            }
        }
        let value = expr.eval(variables).map_err(|e| TbnError::Parse {
            line: line_no,
            msg: format!("in '{{{{{src}}}}}': {e}"),
        })?;
        let _ = write!(out, "{value}");
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    out.trim().parse::<f64>().map_err(|_| TbnError::Parse {
        line: line_no,
        msg: format!("invalid concentration value '{}'", out.trim()),
    })
}

/// Formats a complete `.tbn` file with the given per-monomer concentrations,
/// preserving each monomer's original name placement.
pub fn format_tbn(monomers: &[Monomer], units: Unit, concentrations: &[f64]) -> String {
    let mut lines = Vec::with_capacity(monomers.len() + 2);
    lines.push(format!("\\UNITS: {units}"));
    lines.push(String::new());
    for (monomer, &conc) in monomers.iter().zip(concentrations) {
        lines.push(format!("{monomer}, {}", numfmt::format_sig(conc, 6)));
    }
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn parses_all_three_monomer_forms() {
        let parsed = parse_str("A: a b\nc d > B\ne f*\n", &BTreeMap::new()).unwrap();
        let monomers = parsed.tbn.monomers();
        assert_eq!(monomers[0].name.as_deref(), Some("A"));
        assert!(!monomers[0].name_trailing);
        assert_eq!(monomers[1].name.as_deref(), Some("B"));
        assert!(monomers[1].name_trailing);
        assert_eq!(monomers[2].name, None);
        assert_eq!(parsed.tbn.site_names(), ["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let parsed = parse_str("# header\n\nA: a b # inline\n", &BTreeMap::new()).unwrap();
        assert_eq!(parsed.tbn.n_monomers(), 1);
    }

    #[test]
    fn units_gate_concentrations_both_ways() {
        assert!(matches!(
            parse_str("\\UNITS: nM\nA: a\n", &BTreeMap::new()),
            Err(TbnError::Parse { .. })
        ));
        assert!(matches!(
            parse_str("A: a, 5\n", &BTreeMap::new()),
            Err(TbnError::Parse { .. })
        ));
    }

    #[test]
    fn parametrized_concentrations() {
        let parsed = parse_str(
            "\\UNITS: nM\nm1: a, {{x}}\nm2: a*, {{y+5}}\n",
            &vars(&[("x", 20.0), ("y", 10.0)]),
        )
        .unwrap();
        let conc = parsed.tbn.concentrations().unwrap();
        assert_eq!(conc, vec![20.0, 15.0]);
        assert_eq!(parsed.used_variables.len(), 2);
        assert_eq!(parsed.used_variables["y"], 10.0);
    }

    #[test]
    fn undefined_parameter_is_an_error() {
        let err = parse_str("\\UNITS: nM\nm1: a, {{q}}\n", &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("undefined parameter 'q'"));
    }

    #[test]
    fn name_site_collisions_rejected() {
        assert!(matches!(
            parse_str("a: a b\n", &BTreeMap::new()),
            Err(TbnError::NameSiteCollision { .. })
        ));
        assert!(matches!(
            parse_str("M: a b\nx M\n", &BTreeMap::new()),
            Err(TbnError::NameSiteCollision { .. })
        ));
    }

    #[test]
    fn round_trip_preserves_vectors_and_concentrations() {
        let text = "\\UNITS: nM\nA: a b, 3\nc d* > B, 2\na b, 4\n";
        let parsed = parse_str(text, &BTreeMap::new()).unwrap();
        let conc = parsed.tbn.concentrations().unwrap();
        let emitted = format_tbn(parsed.tbn.monomers(), Unit::NanoMolar, &conc);
        let reparsed = parse_str(&emitted, &BTreeMap::new()).unwrap();
        assert_eq!(reparsed.tbn.n_monomers(), parsed.tbn.n_monomers());
        assert_eq!(reparsed.tbn.columns(), parsed.tbn.columns());
        assert_eq!(reparsed.tbn.concentrations(), parsed.tbn.concentrations());
        // A and the unnamed duplicate merged with summed concentration.
        assert_eq!(reparsed.tbn.concentrations().unwrap()[0], 7.0);
    }

    #[test]
    fn units_after_monomers_rejected() {
        assert!(parse_str("A: a\n\\UNITS: nM\n", &BTreeMap::new()).is_err());
    }
}
