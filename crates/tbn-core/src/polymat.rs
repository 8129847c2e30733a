// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! `.tbnpolymat` artifact reader/writer.
//!
//! Header comments plus keyword lines without a comment prefix:
//! `\MATRIX-HASH: <hash>`, optional `\PARAMETERS: k=v ...` and, when
//! concentrations exist, `\UNITS: <unit>`. Body rows are
//! `c1 .. cn [dG] [concentration]` separated by whitespace.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{Result, TbnError};
use crate::numfmt;
use crate::units::Unit;

#[derive(Clone, Debug, Default)]
pub struct PolymatData {
    /// Monomer-count rows, one per polymer, each of length `n_monomers`.
    pub polymers: Vec<Vec<i64>>,
    pub free_energies: Option<Vec<f64>>,
    /// Concentrations in the declared units.
    pub concentrations: Option<Vec<f64>>,
    pub units: Option<Unit>,
    pub matrix_hash: Option<String>,
    pub parameters: BTreeMap<String, f64>,
}

impl PolymatData {
    pub fn n_polymers(&self) -> usize {
        self.polymers.len()
    }

    pub fn n_monomers(&self) -> usize {
        self.polymers.first().map_or(0, Vec::len)
    }
}

/// Writes the artifact atomically (temp file + rename).
pub fn write(path: &Path, data: &PolymatData) -> Result<()> {
    let tmp = path.with_extension("tbnpolymat.tmp");
    {
        let mut f = File::create(&tmp)?;
        write_header(&mut f, data)?;
        let energies = data.free_energies.as_deref();
        let concentrations = data.concentrations.as_deref();
        for (i, counts) in data.polymers.iter().enumerate() {
            let mut row = counts
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            if let Some(energies) = energies {
                row.push(' ');
                row.push_str(&numfmt::format_sig(energies[i], 6));
            }
            if let Some(conc) = concentrations {
                row.push(' ');
                row.push_str(&numfmt::format_concentration(conc[i]));
            }
            writeln!(f, "{row}")?;
        }
        f.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_header(f: &mut File, data: &PolymatData) -> Result<()> {
    writeln!(f, "# TBN polymer matrix")?;
    writeln!(f, "# Number of polymers: {}", data.n_polymers())?;
    writeln!(f, "# Number of monomers: {}", data.n_monomers())?;
    if let Some(hash) = &data.matrix_hash {
        writeln!(f, "\\MATRIX-HASH: {hash}")?;
    }
    if !data.parameters.is_empty() {
        let params = data
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(f, "\\PARAMETERS: {params}")?;
    }
    if data.concentrations.is_some() {
        if let Some(units) = data.units {
            writeln!(f, "\\UNITS: {units}")?;
        }
    }
    let mut columns = format!("monomer_counts[1..{}]", data.n_monomers());
    if data.free_energies.is_some() {
        columns.push_str(" free_energy");
    }
    if data.concentrations.is_some() {
        columns.push_str(" concentration");
    }
    writeln!(f, "# Columns: {columns}")?;
    writeln!(f, "#")?;
    Ok(())
}

/// Reads the whole artifact. A malformed body is an error; callers that use
/// the artifact as a cache treat any error as a miss.
pub fn read(path: &Path) -> Result<PolymatData> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut data = PolymatData::default();
    let mut n_monomers: Option<usize> = None;
    let mut has_energies = false;
    let mut has_concentrations = false;
    let mut energies = Vec::new();
    let mut concentrations = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') || line.starts_with('\\') {
            parse_header_line(line, &mut data, &mut n_monomers, &mut has_energies, &mut has_concentrations);
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let n = n_monomers.unwrap_or_else(|| {
            // No header metadata: infer the count layout from the first row.
            parts.len() - has_energies as usize - has_concentrations as usize
        });
        n_monomers = Some(n);
        let expected = n + has_energies as usize + has_concentrations as usize;
        if parts.len() != expected {
            return Err(TbnError::Parse {
                line: line_no,
                msg: format!("expected {expected} columns, found {}", parts.len()),
            });
        }

        let counts = parts[..n]
            .iter()
            .map(|p| p.parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| TbnError::Parse {
                line: line_no,
                msg: "non-integer monomer count".into(),
            })?;
        let mut col = n;
        if has_energies {
            energies.push(parse_float(parts[col], line_no)?);
            col += 1;
        }
        if has_concentrations {
            concentrations.push(parse_float(parts[col], line_no)?);
        }
        data.polymers.push(counts);
    }

    if has_energies {
        data.free_energies = Some(energies);
    }
    if has_concentrations {
        data.concentrations = Some(concentrations);
    }
    Ok(data)
}

fn parse_float(s: &str, line_no: usize) -> Result<f64> {
    s.parse::<f64>().map_err(|_| TbnError::Parse {
        line: line_no,
        msg: format!("invalid numeric value '{s}'"),
    })
}

fn parse_header_line(
    line: &str,
    data: &mut PolymatData,
    n_monomers: &mut Option<usize>,
    has_energies: &mut bool,
    has_concentrations: &mut bool,
) {
    let body = line.trim_start_matches('#').trim();
    if let Some(rest) = body.strip_prefix("\\MATRIX-HASH:") {
        data.matrix_hash = Some(rest.trim().to_string());
    } else if let Some(rest) = body.strip_prefix("\\UNITS:") {
        data.units = rest.trim().parse().ok();
    } else if let Some(rest) = body.strip_prefix("\\PARAMETERS:") {
        for assignment in rest.split_whitespace() {
            if let Some((name, value)) = assignment.split_once('=') {
                if let Ok(v) = value.parse::<f64>() {
                    data.parameters.insert(name.to_string(), v);
                }
            }
        }
    } else if let Some(rest) = body.strip_prefix("Number of monomers:") {
        *n_monomers = rest.trim().parse().ok();
    } else if let Some(rest) = body.strip_prefix("Columns:") {
        *has_energies = rest.contains("free_energy");
        *has_concentrations = rest.contains("concentration");
    }
}

/// Reads only the `\MATRIX-HASH:` keyword, for cache validation.
pub fn read_matrix_hash(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    for line in BufReader::new(file).lines() {
        let line = line.ok()?;
        let trimmed = line.trim();
        if let Some(rest) = trimmed
            .trim_start_matches('#')
            .trim()
            .strip_prefix("\\MATRIX-HASH:")
        {
            return Some(rest.trim().to_string());
        }
        if !trimmed.is_empty() && !trimmed.starts_with('#') && !trimmed.starts_with('\\') {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> PolymatData {
        PolymatData {
            polymers: vec![vec![1, 0], vec![0, 1], vec![1, 1]],
            free_energies: Some(vec![0.0, 0.0, -3.0]),
            concentrations: Some(vec![0.05, 4.47e-9, 99.94]),
            units: Some(Unit::NanoMolar),
            matrix_hash: Some("deadbeef".to_string()),
            parameters: BTreeMap::from([("x".to_string(), 20.0)]),
        }
    }

    #[test]
    fn write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbnpolymat");
        write(&path, &sample()).unwrap();

        let back = read(&path).unwrap();
        assert_eq!(back.polymers, sample().polymers);
        assert_eq!(back.matrix_hash.as_deref(), Some("deadbeef"));
        assert_eq!(back.units, Some(Unit::NanoMolar));
        assert_eq!(back.parameters["x"], 20.0);
        let conc = back.concentrations.unwrap();
        assert_eq!(conc.len(), 3);
        assert!((conc[2] - 99.9).abs() < 1e-9);
    }

    #[test]
    fn hash_only_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbnpolymat");
        write(&path, &sample()).unwrap();
        assert_eq!(read_matrix_hash(&path).as_deref(), Some("deadbeef"));
        assert_eq!(read_matrix_hash(&dir.path().join("missing")), None);
    }

    #[test]
    fn counts_only_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbnpolymat");
        let data = PolymatData {
            polymers: vec![vec![2, 3]],
            matrix_hash: Some("abc".into()),
            ..Default::default()
        };
        write(&path, &data).unwrap();
        let back = read(&path).unwrap();
        assert_eq!(back.polymers, vec![vec![2, 3]]);
        assert!(back.free_energies.is_none());
        assert!(back.concentrations.is_none());
    }

    #[test]
    fn malformed_rows_are_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.tbnpolymat");
        std::fs::write(&path, "# Columns: monomer_counts[1..2]\n1 nope\n").unwrap();
        assert!(read(&path).is_err());
    }
}
