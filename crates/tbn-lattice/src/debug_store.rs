// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Preserves raw solver input files under `solver-inputs/` so a failed run
/// can be replayed against the solver by hand.
#[derive(Clone, Debug)]
pub struct DebugStore {
    dir: PathBuf,
    base: String,
}

impl DebugStore {
    /// `base` is usually the input TBN filename stem.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            dir: PathBuf::from("solver-inputs"),
            base: base.into(),
        }
    }

    pub fn with_dir(dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
        }
    }

    /// Copies `src` to `solver-inputs/<base>-<purpose>.<ext>`.
    pub fn preserve(&self, src: &Path, purpose: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let ext = src
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("in");
        let dest = self.dir.join(format!("{}-{}.{}", self.base, purpose, ext));
        fs::copy(src, &dest)?;
        debug!(src = %src.display(), dest = %dest.display(), "preserved solver input");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn preserves_with_base_and_purpose_naming() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("problem.mat");
        fs::write(&src, "1 2\n").unwrap();

        let store = DebugStore::with_dir(dir.path().join("solver-inputs"), "triangle");
        let dest = store.preserve(&src, "polymer-basis").unwrap();
        assert_eq!(
            dest.file_name().unwrap().to_str().unwrap(),
            "triangle-polymer-basis.mat"
        );
        assert_eq!(fs::read_to_string(dest).unwrap(), "1 2\n");
    }
}
