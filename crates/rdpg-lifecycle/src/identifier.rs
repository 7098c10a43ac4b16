//! Random identifier generation
//!
//! Produces the schema, table and key names used by a lifecycle pass.
//! Every identifier is 1..=`max_len` characters drawn from the 62-symbol
//! alphanumeric alphabet. Batches never contain two equal identifiers.

use crate::error::IdentifierError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default upper bound on identifier length
pub const MAX_KEY_LENGTH: usize = 30;

/// Letters first so the letter-only prefix is `ALPHABET[..LETTERS]`
const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LETTERS: usize = 52;

/// PostgreSQL reserved key words that fit the alphabet
///
/// Unquoted, any of these is a syntax error where a relation name goes.
pub const SQL_RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "default", "deferrable",
    "desc", "distinct", "do", "else", "end", "except", "false", "fetch", "for", "foreign",
    "freeze", "from", "full", "grant", "group", "having", "ilike", "in", "initially",
    "inner", "intersect", "into", "is", "isnull", "join", "lateral", "leading", "left",
    "like", "limit", "localtime", "localtimestamp", "natural", "not", "notnull", "null",
    "offset", "on", "only", "or", "order", "outer", "overlaps", "placing", "primary",
    "references", "returning", "right", "select", "similar", "some", "symmetric", "table",
    "tablesample", "then", "to", "trailing", "true", "union", "unique", "user", "using",
    "variadic", "verbose", "when", "where", "window", "with",
];

/// Whether `name` is a reserved SQL key word, ignoring case
#[must_use]
pub fn is_sql_reserved(name: &str) -> bool {
    SQL_RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(name))
}

/// A random alphanumeric identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    /// Borrow as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters (all characters are single-byte ASCII)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; identifiers have at least one character
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Constraint on the first character of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirstChar {
    /// Any alphanumeric character
    #[default]
    Any,
    /// A letter; needed for unquoted SQL identifiers
    Letter,
}

/// Seedable random identifier generator
#[derive(Debug)]
pub struct IdentifierGenerator {
    rng: StdRng,
    max_len: usize,
}

impl IdentifierGenerator {
    /// Create a generator seeded from OS entropy
    ///
    /// A `max_len` of zero is treated as one.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            max_len: max_len.max(1),
        }
    }

    /// Create a reproducible generator
    #[must_use]
    pub fn with_seed(max_len: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_len: max_len.max(1),
        }
    }

    /// Maximum identifier length
    #[inline]
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Generate one identifier
    pub fn generate(&mut self, first: FirstChar) -> Identifier {
        let length = self.rng.gen_range(1..=self.max_len);
        let mut out = String::with_capacity(length);

        let head = match first {
            FirstChar::Any => ALPHABET.len(),
            FirstChar::Letter => LETTERS,
        };
        out.push(char::from(ALPHABET[self.rng.gen_range(0..head)]));

        for _ in 1..length {
            out.push(char::from(ALPHABET[self.rng.gen_range(0..ALPHABET.len())]));
        }

        Identifier(out)
    }

    /// Generate `n` pairwise-distinct identifiers, in generation order
    ///
    /// # Errors
    /// `IdentifierError::SpaceExhausted` if fewer than `n` distinct
    /// identifiers exist for the configured length.
    pub fn generate_batch(
        &mut self,
        n: usize,
        first: FirstChar,
    ) -> Result<Vec<Identifier>, IdentifierError> {
        let capacity = self.capacity(first);
        if n as u128 > capacity {
            return Err(IdentifierError::SpaceExhausted {
                requested: n,
                capacity,
            });
        }

        let mut seen = HashSet::with_capacity(n);
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            let candidate = self.generate(first);
            if seen.insert(candidate.clone()) {
                batch.push(candidate);
            }
        }
        Ok(batch)
    }

    /// Generate a letter-first namespace name that is not reserved
    ///
    /// Reserved names and SQL key words are compared case-insensitively,
    /// since unquoted SQL identifiers fold case.
    pub fn generate_namespace<S: AsRef<str>>(&mut self, reserved: &[S]) -> Identifier {
        loop {
            let candidate = self.generate(FirstChar::Letter);
            let taken = is_sql_reserved(candidate.as_str())
                || reserved
                    .iter()
                    .any(|name| name.as_ref().eq_ignore_ascii_case(candidate.as_str()));
            if !taken {
                return candidate;
            }
            tracing::debug!("Regenerating reserved namespace name: {}", candidate);
        }
    }

    /// Generate a table name usable unquoted
    pub fn generate_relation(&mut self) -> Identifier {
        self.generate_namespace::<&str>(&[])
    }

    /// Random v4 UUID string drawn from this generator
    ///
    /// Seeded generators yield the same sequence of names.
    pub fn uuid_name(&mut self) -> String {
        uuid::Builder::from_random_bytes(self.rng.gen())
            .into_uuid()
            .to_string()
    }

    /// Number of distinct identifiers this generator can produce
    ///
    /// Saturates at `u128::MAX` for long identifiers.
    #[must_use]
    pub fn capacity(&self, first: FirstChar) -> u128 {
        let head: u128 = match first {
            FirstChar::Any => ALPHABET.len() as u128,
            FirstChar::Letter => LETTERS as u128,
        };
        let mut total: u128 = 0;
        let mut per_length = head;
        for _ in 0..self.max_len {
            total = total.saturating_add(per_length);
            if total == u128::MAX {
                break;
            }
            per_length = per_length.saturating_mul(ALPHABET.len() as u128);
        }
        total
    }
}
