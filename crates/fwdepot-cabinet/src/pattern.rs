//! Shell-style member name matching
//!
//! Patterns use [`glob`] syntax (`*`, `?`, `[...]`). Member names are plain
//! strings rather than paths: `*` also crosses `/` and `\`, a leading dot needs
//! no literal match, and matching is case-sensitive. So `*.inf` matches
//! `drivers\device.inf`.

use glob::{MatchOptions, Pattern, PatternError};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled member name pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPattern(Pattern);

impl MemberPattern {
    /// Compile `pattern`
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        Pattern::new(pattern).map(Self)
    }

    /// Whether `name` matches
    pub fn matches(&self, name: &str) -> bool {
        self.0.matches_with(name, OPTIONS)
    }

    /// Pattern text
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Match `name` against `pattern`
///
/// A malformed pattern matches nothing.
pub fn matches(pattern: &str, name: &str) -> bool {
    MemberPattern::new(pattern).is_ok_and(|p| p.matches(name))
}
