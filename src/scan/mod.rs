//! Pattern matching and match unification. Pure functions, no buffer access.

pub mod patterns;
pub mod unify;

pub use patterns::{PatternKind, PatternSet};
pub use unify::{RawMatch, UnifiedMatch, unify};

/// Runs `patterns` over `text` and unifies the result.
pub fn scan_text(patterns: &PatternSet, text: &str) -> Vec<UnifiedMatch> {
    unify(&patterns.find_all(text), patterns.email_threshold())
}
