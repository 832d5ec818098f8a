//! Accumulated constraints over package identities.

use harbor_package::{Constraint, PackageIdentity, Requirement};
use std::collections::BTreeMap;

/// A mapping from package identity to the requirement so far placed on it.
///
/// The set has value semantics: merging returns a new set and leaves the
/// receiver untouched, which is what makes the resolver's backtracking
/// cheap to reason about. Looking up an identity with no entry yields the
/// requirement admitting any version, and no stored entry is ever an empty
/// version set — an empty intersection makes the merge unsatisfiable
/// instead.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    entries: BTreeMap<PackageIdentity, Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The requirement currently placed on `identity`.
    pub fn requirement_for(&self, identity: &PackageIdentity) -> Requirement {
        self.entries
            .get(identity)
            .map(|c| c.requirement.clone())
            .unwrap_or_else(Requirement::any)
    }

    /// Whether any requirement has been placed on `identity`.
    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Merge one constraint, returning the combined set or `None` when the
    /// result is unsatisfiable.
    pub fn merging(&self, constraint: &Constraint) -> Option<ConstraintSet> {
        let identity = &constraint.package.identity;
        let merged = match self.entries.get(identity) {
            Some(existing) => existing.requirement.merging(&constraint.requirement)?,
            None => match &constraint.requirement {
                Requirement::VersionSet(set) if set.is_empty() => return None,
                requirement => requirement.clone(),
            },
        };
        let mut entries = self.entries.clone();
        entries.insert(
            identity.clone(),
            Constraint::new(constraint.package.clone(), merged),
        );
        Some(ConstraintSet { entries })
    }

    /// Merge a whole list of constraints, short-circuiting on the first
    /// unsatisfiable combination.
    pub fn merging_all<'c>(
        &self,
        constraints: impl IntoIterator<Item = &'c Constraint>,
    ) -> Option<ConstraintSet> {
        let mut result = self.clone();
        for constraint in constraints {
            result = result.merging(constraint)?;
        }
        Some(result)
    }

    /// The identities that have an entry, in sorted order.
    pub fn identities(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.entries.keys()
    }

    /// The constraints in the set, ordered by identity.
    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_package::{MirrorConfig, PackageRef};
    use harbor_semver::{Version, VersionSet};

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn constraint(url: &str, lo: &str, hi: &str) -> Constraint {
        Constraint::versioned(
            PackageRef::remote(url, &MirrorConfig::new()),
            VersionSet::range(v(lo), v(hi)),
        )
    }

    #[test]
    fn test_missing_entry_admits_any() {
        let set = ConstraintSet::new();
        let identity = PackageIdentity::from_location("https://host/foo");
        assert!(set.requirement_for(&identity).is_any());
        assert!(!set.contains(&identity));
    }

    #[test]
    fn test_merge_intersects() {
        let set = ConstraintSet::new()
            .merging(&constraint("https://host/foo", "1.0.0", "2.0.0"))
            .unwrap();
        let set = set
            .merging(&constraint("https://host/foo", "1.5.0", "3.0.0"))
            .unwrap();

        let identity = PackageIdentity::from_location("https://host/foo");
        assert_eq!(
            set.requirement_for(&identity),
            Requirement::VersionSet(VersionSet::range(v("1.5.0"), v("2.0.0")))
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_merge_unsatisfiable() {
        let set = ConstraintSet::new()
            .merging(&constraint("https://host/foo", "1.0.0", "1.1.0"))
            .unwrap();
        assert!(set.merging(&constraint("https://host/foo", "1.2.0", "2.0.0")).is_none());
    }

    #[test]
    fn test_merge_rejects_empty_set() {
        let package = PackageRef::remote("https://host/foo", &MirrorConfig::new());
        let empty = Constraint::versioned(package, VersionSet::Empty);
        assert!(ConstraintSet::new().merging(&empty).is_none());
    }

    // Once a pair of constraints is unsatisfiable, no interleaving of other
    // merges can make it satisfiable again.
    #[test]
    fn test_unsatisfiability_is_monotone() {
        let a = constraint("https://host/foo", "1.0.0", "1.1.0");
        let b = constraint("https://host/foo", "1.2.0", "2.0.0");
        let unrelated = constraint("https://host/bar", "0.1.0", "0.2.0");
        let narrowing = constraint("https://host/foo", "1.0.0", "1.0.5");

        let base = ConstraintSet::new().merging(&a).unwrap();
        assert!(base.merging(&b).is_none());

        for extra in [&unrelated, &narrowing] {
            let extended = base.merging(extra).unwrap();
            assert!(extended.merging(&b).is_none());
        }
    }

    #[test]
    fn test_merging_all_short_circuits() {
        let constraints = vec![
            constraint("https://host/foo", "1.0.0", "1.1.0"),
            constraint("https://host/foo", "1.2.0", "2.0.0"),
            constraint("https://host/bar", "1.0.0", "2.0.0"),
        ];
        assert!(ConstraintSet::new().merging_all(&constraints).is_none());
    }
}
