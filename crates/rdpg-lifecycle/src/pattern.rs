//! Matchers over raw probe text
//!
//! The test application answers in untyped text: a marker line, a JSON
//! array of string-typed rows, or nothing at all for a zero-row SELECT.
//! Matchers are substring checks against that text.

use std::fmt;

/// Literal emitted by the application when an operation succeeds
pub const SUCCESS_MARKER: &str = "SUCCESS";

/// Literal emitted by the application on any internal or database error
pub const FAILURE_MARKER: &str = "FAILURE";

/// Matches probe text containing any of its fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    fragments: Vec<String>,
}

impl Matcher {
    /// Match text containing `fragment`
    #[must_use]
    pub fn literal(fragment: impl Into<String>) -> Self {
        Self {
            fragments: vec![fragment.into()],
        }
    }

    /// Match text satisfying either matcher
    #[must_use]
    pub fn or(mut self, other: Matcher) -> Self {
        self.fragments.extend(other.fragments);
        self
    }

    /// Check probe text
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.fragments.iter().any(|f| text.contains(f.as_str()))
    }

    /// Fragments this matcher looks for
    #[must_use]
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fragment) in self.fragments.iter().enumerate() {
            if i > 0 {
                f.write_str(" or ")?;
            }
            write!(f, "`{fragment}`")?;
        }
        Ok(())
    }
}

/// Serialized single-row result for `(key, value)`: `[["key","value"]]`
///
/// The application renders every cell as a JSON string, so the value is
/// quoted.
#[must_use]
pub fn expected_row(key: &str, value: i64) -> Matcher {
    Matcher::literal(format!("[[\"{key}\",\"{value}\"]]"))
}

/// Same fragment as [`expected_row`], for asserting a stale row is gone
#[must_use]
pub fn absence(key: &str, value: i64) -> Matcher {
    expected_row(key, value)
}

/// Opening bracket of any result set
///
/// A zero-row SELECT prints nothing at all, so an empty table is proven by
/// this never matching.
#[must_use]
pub fn empty_result() -> Matcher {
    Matcher::literal("[")
}

/// Application failure marker
#[must_use]
pub fn failure() -> Matcher {
    Matcher::literal(FAILURE_MARKER)
}

/// Application success marker
#[must_use]
pub fn success() -> Matcher {
    Matcher::literal(SUCCESS_MARKER)
}
