//! Feed audiences
//!
//! An audience is the set of clients reading one feed: a vendor group, or one
//! of the two global tiers.

use crate::model::{FirmwarePackage, Target};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feed visibility scope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "group", rename_all = "snake_case")]
pub enum Audience {
    /// Non-private packages of one group
    Group(String),
    /// Every package in testing or stable
    StableAndTesting,
    /// Every package in testing
    Testing,
}

impl Audience {
    /// The global audiences
    pub const GLOBAL: [Audience; 2] = [Self::StableAndTesting, Self::Testing];

    /// Whether a package of `group` in `target` is published to this audience
    pub fn includes(&self, group: &str, target: Target) -> bool {
        match self {
            Self::Group(g) => g == group && target != Target::Private,
            Self::StableAndTesting => matches!(target, Target::Stable | Target::Testing),
            Self::Testing => target == Target::Testing,
        }
    }

    /// Whether `package` is published to this audience
    pub fn includes_package(&self, package: &FirmwarePackage) -> bool {
        self.includes(&package.owning_group, package.target)
    }

    /// Audiences whose feed may change when a package of `group` moves from
    /// `before` to `after`
    ///
    /// `None` stands for "not in the repository". The group audience is always
    /// included; a global audience is included when it covers either state.
    pub fn affected(group: &str, before: Option<Target>, after: Option<Target>) -> Vec<Audience> {
        let mut audiences = vec![Self::Group(group.to_string())];
        for global in Self::GLOBAL {
            let covers = |state: Option<Target>| state.is_some_and(|t| global.includes(group, t));
            if covers(before) || covers(after) {
                audiences.push(global);
            }
        }
        audiences
    }

    /// Group name for group audiences
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Group(g) => Some(g),
            Self::StableAndTesting | Self::Testing => None,
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(g) => write!(f, "group:{g}"),
            Self::StableAndTesting => f.write_str("stable+testing"),
            Self::Testing => f.write_str("testing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_includes() {
        let group = Audience::Group("acme".into());
        assert!(!group.includes("acme", Target::Private));
        assert!(group.includes("acme", Target::Embargo));
        assert!(group.includes("acme", Target::Stable));
        assert!(!group.includes("other", Target::Stable));

        assert!(Audience::StableAndTesting.includes("any", Target::Stable));
        assert!(Audience::StableAndTesting.includes("any", Target::Testing));
        assert!(!Audience::StableAndTesting.includes("any", Target::Embargo));

        assert!(Audience::Testing.includes("any", Target::Testing));
        assert!(!Audience::Testing.includes("any", Target::Stable));
    }

    #[test]
    fn test_affected_on_promotion() {
        let group = Audience::Group("acme".into());

        assert_eq!(
            Audience::affected("acme", None, Some(Target::Private)),
            vec![group.clone()]
        );
        assert_eq!(
            Audience::affected("acme", Some(Target::Private), Some(Target::Stable)),
            vec![group.clone(), Audience::StableAndTesting]
        );
        assert_eq!(
            Audience::affected("acme", Some(Target::Testing), Some(Target::Stable)),
            vec![group.clone(), Audience::StableAndTesting, Audience::Testing]
        );
        assert_eq!(
            Audience::affected("acme", Some(Target::Testing), None),
            vec![group, Audience::StableAndTesting, Audience::Testing]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Audience::Group("acme".into()).to_string(), "group:acme");
        assert_eq!(Audience::StableAndTesting.to_string(), "stable+testing");
        assert_eq!(Audience::Testing.group(), None);
    }
}
