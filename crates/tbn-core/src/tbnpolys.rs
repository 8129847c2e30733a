// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! `.tbnpolys` reader/writer: one polymer per paragraph, each line
//! `n | <name-or-sites>` with an optional multiplicity prefix. Binding sites
//! may appear in any order; they are canonicalized against the model.

use std::path::Path;

use crate::error::{Result, TbnError};
use crate::model::Tbn;
use crate::numfmt;
use crate::units::Unit;

/// Parses a `.tbnpolys` file into monomer-count vectors resolved against the
/// model. Each returned vector has length `tbn.n_monomers()`.
pub fn parse_file(path: &Path, tbn: &Tbn) -> Result<Vec<Vec<i64>>> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text, tbn)
}

pub fn parse_str(text: &str, tbn: &Tbn) -> Result<Vec<Vec<i64>>> {
    let mut polymers = Vec::new();
    let mut current: Option<Vec<i64>> = None;

    for (line_no, raw) in text.lines().enumerate() {
        let line_no = line_no + 1;
        // Comment-only lines do not terminate a paragraph.
        let trimmed = raw.trim();
        if trimmed.starts_with('#') {
            continue;
        }
        let line = match trimmed.find('#') {
            Some(pos) => trimmed[..pos].trim(),
            None => trimmed,
        };
        if line.is_empty() {
            if let Some(counts) = current.take() {
                polymers.push(counts);
            }
            continue;
        }

        let (multiplicity, spec) = split_multiplicity(line, line_no)?;
        let monomer_idx = resolve_monomer(spec, tbn)?;
        let counts = current.get_or_insert_with(|| vec![0i64; tbn.n_monomers()]);
        counts[monomer_idx] += multiplicity;
    }
    if let Some(counts) = current.take() {
        polymers.push(counts);
    }
    Ok(polymers)
}

fn split_multiplicity(line: &str, line_no: usize) -> Result<(i64, &str)> {
    match line.split_once('|') {
        Some((count, spec)) => {
            let multiplicity = count.trim().parse::<i64>().map_err(|_| TbnError::Parse {
                line: line_no,
                msg: format!("invalid multiplicity '{}'", count.trim()),
            })?;
            if multiplicity < 1 {
                return Err(TbnError::Parse {
                    line: line_no,
                    msg: format!("multiplicity must be positive, got {multiplicity}"),
                });
            }
            Ok((multiplicity, spec.trim()))
        }
        None => Ok((1, line)),
    }
}

/// Resolves a monomer spec: a name, `name: sites` (sites verified), or an
/// order-insensitive binding-site list.
fn resolve_monomer(spec: &str, tbn: &Tbn) -> Result<usize> {
    if let Some((name, sites_str)) = spec.split_once(':') {
        let name = name.trim();
        let idx = tbn
            .monomer_index_by_name(name)
            .ok_or_else(|| TbnError::UnknownMonomer {
                spec: name.to_string(),
            })?;
        let mut provided: Vec<&str> = sites_str.split_whitespace().collect();
        provided.sort_unstable();
        let expected = tbn.monomers()[idx].sorted_site_tokens();
        if provided != expected {
            return Err(TbnError::UnknownMonomer {
                spec: format!("{name}: {} (sites do not match '{name}')", sites_str.trim()),
            });
        }
        return Ok(idx);
    }

    if let Some(idx) = tbn.monomer_index_by_name(spec) {
        return Ok(idx);
    }

    let mut provided: Vec<&str> = spec.split_whitespace().collect();
    provided.sort_unstable();
    tbn.monomers()
        .iter()
        .position(|m| m.sorted_site_tokens() == provided)
        .ok_or_else(|| TbnError::UnknownMonomer {
            spec: spec.to_string(),
        })
}

/// Writer for the user-friendly polymer listing.
pub struct TbnpolysWriter<'a> {
    tbn: &'a Tbn,
}

impl<'a> TbnpolysWriter<'a> {
    pub fn new(tbn: &'a Tbn) -> Self {
        Self { tbn }
    }

    /// Lines for a single polymer: one monomer per line with an `n | ` prefix
    /// for multiplicities above one.
    pub fn format_polymer(&self, counts: &[i64]) -> Vec<String> {
        let mut lines = Vec::new();
        for (idx, &count) in counts.iter().enumerate() {
            if count <= 0 {
                continue;
            }
            let monomer = &self.tbn.monomers()[idx];
            let spec = match &monomer.name {
                Some(name) => name.clone(),
                None => monomer.sites_str(),
            };
            if count == 1 {
                lines.push(spec);
            } else {
                lines.push(format!("{count} | {spec}"));
            }
        }
        lines
    }

    /// Formats a full `.tbnpolys` document, with optional per-polymer
    /// concentration comments.
    pub fn format_polymers(
        &self,
        polymers: &[Vec<i64>],
        concentrations: Option<&[f64]>,
        units: Option<Unit>,
        header_comment: Option<&str>,
    ) -> String {
        let mut lines = Vec::new();
        if let Some(header) = header_comment {
            for line in header.lines() {
                lines.push(format!("# {line}"));
            }
            lines.push(String::new());
        }
        for (i, polymer) in polymers.iter().enumerate() {
            lines.extend(self.format_polymer(polymer));
            if let Some(conc) = concentrations {
                let formatted = numfmt::format_concentration(conc[i]);
                match units {
                    Some(u) => lines.push(format!("# Concentration: {formatted} {u}")),
                    None => lines.push(format!("# Concentration: {formatted}")),
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

    pub fn write_polymers(
        &self,
        polymers: &[Vec<i64>],
        path: &Path,
        header_comment: Option<&str>,
    ) -> Result<()> {
        let content = self.format_polymers(polymers, None, None, header_comment);
        std::fs::write(path, content)?;
        Ok(())
    }
}
