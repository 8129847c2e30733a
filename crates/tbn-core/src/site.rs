// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fmt;

use crate::error::{Result, TbnError};

/// Characters that may not appear in binding-site or monomer names.
pub const RESERVED_CHARS: &[char] = &[',', '>', '*', '|', ':', '\\'];

/// A typed binding-site occurrence. `a` and `a*` are the complementary pair
/// on the base name `a`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingSite {
    pub name: String,
    pub star: bool,
}

impl BindingSite {
    pub fn new(name: impl Into<String>, star: bool) -> Self {
        Self {
            name: name.into(),
            star,
        }
    }

    /// Parses a site token such as `a` or `a*`.
    pub fn parse(token: &str, line: usize) -> Result<Self> {
        let (base, star) = match token.strip_suffix('*') {
            Some(base) => (base, true),
            None => (token, false),
        };
        if base.is_empty() {
            return Err(TbnError::Parse {
                line,
                msg: format!("invalid binding site '{token}'"),
            });
        }
        validate_name(base, "binding site", line)?;
        Ok(Self::new(base, star))
    }
}

impl fmt::Display for BindingSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.star {
            write!(f, "{}*", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Rejects names containing reserved characters or whitespace.
pub fn validate_name(name: &str, what: &str, line: usize) -> Result<()> {
    if name.is_empty() {
        return Err(TbnError::Parse {
            line,
            msg: format!("empty {what} name"),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| RESERVED_CHARS.contains(c) || c.is_whitespace())
    {
        return Err(TbnError::Parse {
            line,
            msg: format!("{what} name '{name}' contains reserved character '{c}'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_star_and_unstar() {
        let a = BindingSite::parse("a", 1).unwrap();
        assert!(!a.star);
        let astar = BindingSite::parse("a*", 1).unwrap();
        assert!(astar.star);
        assert_eq!(astar.name, "a");
        assert_eq!(astar.to_string(), "a*");
    }

    #[test]
    fn rejects_reserved_characters() {
        for bad in ["a|b", "x,y", "p:q", "back\\slash", "gt>lt", ""] {
            assert!(BindingSite::parse(bad, 3).is_err(), "{bad:?} accepted");
        }
    }
}
