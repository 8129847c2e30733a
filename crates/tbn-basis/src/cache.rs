// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Content-addressed reuse of the `.tbnpolymat` artifact.
//!
//! The artifact stores the canonical hash of A next to the basis; a matching
//! hash lets a run skip the lattice solver entirely. Corruption or a stale
//! hash is never fatal: the caller recomputes and rewrites. Writes hold an
//! advisory `.lock` file and go through a temp-file rename.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use tbn_core::polymat::{self, PolymatData};

use crate::basis::PolymerBasis;
use crate::Result;

/// Loads the cached polymer basis when the stored matrix hash matches.
/// Any read or shape problem is treated as a cache miss.
pub fn load_cached_basis(
    artifact: &Path,
    expected_hash: &str,
    n_monomers: usize,
) -> Option<PolymerBasis> {
    if !artifact.exists() {
        return None;
    }
    match polymat::read_matrix_hash(artifact) {
        Some(stored) if stored == expected_hash => {}
        Some(_) => {
            info!(artifact = %artifact.display(), "matrix hash changed, recomputing basis");
            return None;
        }
        None => {
            info!(artifact = %artifact.display(), "artifact carries no matrix hash, recomputing");
            return None;
        }
    }

    let data = match polymat::read(artifact) {
        Ok(data) => data,
        Err(err) => {
            warn!(artifact = %artifact.display(), error = %err, "stale artifact, recomputing basis");
            return None;
        }
    };
    if data.polymers.is_empty() || data.polymers.iter().any(|row| row.len() != n_monomers) {
        warn!(artifact = %artifact.display(), "artifact shape mismatch, recomputing basis");
        return None;
    }
    info!(
        artifact = %artifact.display(),
        polymers = data.polymers.len(),
        "matrix hashes match, using cached polymer basis"
    );
    Some(PolymerBasis::from_rows(data.polymers, n_monomers))
}

/// Advisory lock guarding artifact writes. Readers never take it; a crashed
/// writer's lock is taken over after a grace period.
pub struct CacheLock {
    path: PathBuf,
}

const LOCK_RETRY: Duration = Duration::from_millis(50);
const LOCK_GRACE: Duration = Duration::from_secs(10);

impl CacheLock {
    pub fn acquire(artifact: &Path) -> std::io::Result<Self> {
        let path = artifact.with_extension("tbnpolymat.lock");
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= LOCK_GRACE {
                        warn!(lock = %path.display(), "taking over stale artifact lock");
                        std::fs::remove_file(&path).ok();
                        continue;
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}

/// Writes the artifact under the advisory lock.
pub fn write_artifact(artifact: &Path, data: &PolymatData) -> Result<()> {
    let _lock = CacheLock::acquire(artifact)?;
    polymat::write(artifact, data)?;
    Ok(())
}
