//! Version assignments produced by the resolver.

use crate::{Container, ConstraintSet, ResolveError};
use harbor_package::PackageIdentity;
use harbor_semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The resolver's chosen outcome for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundVersion {
    /// The package is not included in the assignment. Only legal while no
    /// other package constrains it.
    Excluded,
    /// The package is pinned to a version.
    Version(Version),
    /// The package is used in place, ignoring version constraints.
    Unversioned,
}

impl fmt::Display for BoundVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundVersion::Excluded => write!(f, "excluded"),
            BoundVersion::Version(v) => write!(f, "{}", v),
            BoundVersion::Unversioned => write!(f, "unversioned"),
        }
    }
}

/// A partial or complete mapping from package identity to bound version.
///
/// Like [`ConstraintSet`], the set has value semantics: combination via
/// [`merging`](AssignmentSet::merging) builds a new set. Every combination
/// re-derives the constraints induced by the bound versions and validates
/// all bindings against them, so an invalid combination can never escape
/// the resolver.
#[derive(Clone, Default)]
pub struct AssignmentSet {
    assignments: BTreeMap<PackageIdentity, (Arc<dyn Container>, BoundVersion)>,
}

impl AssignmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The binding for `identity`, if one has been made.
    pub fn binding_for(&self, identity: &PackageIdentity) -> Option<&BoundVersion> {
        self.assignments.get(identity).map(|(_, binding)| binding)
    }

    /// Bind `container` to `binding`.
    pub fn bind(&mut self, container: Arc<dyn Container>, binding: BoundVersion) {
        self.assignments
            .insert(container.identity().clone(), (container, binding));
    }

    /// The constraints induced by this assignment: the merge of every bound
    /// version's declared dependencies. `Unversioned` and `Excluded`
    /// bindings contribute nothing. Returns `Ok(None)` when the induced
    /// constraints do not merge.
    pub fn induced_constraints(&self) -> Result<Option<ConstraintSet>, ResolveError> {
        let mut result = ConstraintSet::new();
        for (container, binding) in self.assignments.values() {
            let version = match binding {
                BoundVersion::Version(v) => v,
                BoundVersion::Unversioned | BoundVersion::Excluded => continue,
            };
            for constraint in container.dependencies(version)? {
                match result.merging(&constraint) {
                    Some(merged) => result = merged,
                    None => return Ok(None),
                }
            }
        }
        Ok(Some(result))
    }

    /// Combine two assignments.
    ///
    /// Fails (returns `Ok(None)`) when any identity is bound differently in
    /// the two sets, when the induced constraints do not merge, or when any
    /// binding violates the merged induced constraints.
    pub fn merging(&self, other: &AssignmentSet) -> Result<Option<AssignmentSet>, ResolveError> {
        let mut combined = self.clone();
        for (identity, (container, binding)) in &other.assignments {
            match combined.binding_for(identity) {
                Some(existing) if existing != binding => return Ok(None),
                Some(_) => {}
                None => combined.bind(container.clone(), binding.clone()),
            }
        }

        let constraints = match combined.induced_constraints()? {
            Some(c) => c,
            None => return Ok(None),
        };
        for (identity, (_, binding)) in &combined.assignments {
            if !binding_is_valid(binding, identity, &constraints) {
                return Ok(None);
            }
        }
        Ok(Some(combined))
    }

    /// Iterate bindings in identity order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&PackageIdentity, &Arc<dyn Container>, &BoundVersion)> {
        self.assignments
            .iter()
            .map(|(identity, (container, binding))| (identity, container, binding))
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Whether `binding` satisfies the requirement `constraints` places on
/// `identity`.
pub(crate) fn binding_is_valid(
    binding: &BoundVersion,
    identity: &PackageIdentity,
    constraints: &ConstraintSet,
) -> bool {
    use harbor_package::Requirement;

    match binding {
        // An in-place package satisfies any requirement on it.
        BoundVersion::Unversioned => true,
        // Exclusion is only legal while nothing constrains the identity.
        BoundVersion::Excluded => constraints.requirement_for(identity).is_any(),
        BoundVersion::Version(version) => match constraints.requirement_for(identity) {
            Requirement::VersionSet(set) => set.contains(version),
            Requirement::Unversioned(_) => false,
        },
    }
}

impl fmt::Debug for AssignmentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (identity, (_, binding)) in &self.assignments {
            map.entry(&identity.as_str(), &binding.to_string());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryContainer;
    use harbor_package::{Constraint, MirrorConfig, PackageRef, Requirement};
    use harbor_semver::VersionSet;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn pkg(url: &str) -> PackageRef {
        PackageRef::remote(url, &MirrorConfig::new())
    }

    fn container(url: &str, versions: &[(&str, Vec<Constraint>)]) -> Arc<dyn Container> {
        let mut container = MemoryContainer::new(pkg(url));
        for (version, deps) in versions {
            container.add_version(v(version), deps.clone());
        }
        Arc::new(container)
    }

    #[test]
    fn test_induced_constraints() {
        let dep = Constraint::versioned(pkg("https://host/c"), VersionSet::range(v("1.0.0"), v("2.0.0")));
        let a = container("https://host/a", &[("1.0.0", vec![dep.clone()])]);
        let c = container("https://host/c", &[("1.5.0", vec![])]);

        let mut assignment = AssignmentSet::new();
        assignment.bind(a, BoundVersion::Version(v("1.0.0")));
        assignment.bind(c.clone(), BoundVersion::Version(v("1.5.0")));

        let induced = assignment.induced_constraints().unwrap().unwrap();
        assert_eq!(
            induced.requirement_for(c.identity()),
            Requirement::VersionSet(VersionSet::range(v("1.0.0"), v("2.0.0")))
        );
        // Unversioned bindings contribute nothing.
        assert_eq!(induced.len(), 1);
    }

    #[test]
    fn test_merging_agrees() {
        let a = container("https://host/a", &[("1.0.0", vec![])]);
        let b = container("https://host/b", &[("2.0.0", vec![])]);

        let mut lhs = AssignmentSet::new();
        lhs.bind(a.clone(), BoundVersion::Version(v("1.0.0")));
        let mut rhs = AssignmentSet::new();
        rhs.bind(b, BoundVersion::Version(v("2.0.0")));
        rhs.bind(a, BoundVersion::Version(v("1.0.0")));

        let combined = lhs.merging(&rhs).unwrap().unwrap();
        assert_eq!(combined.len(), 2);
    }

    #[test]
    fn test_merging_conflicting_bindings_fails() {
        let a1 = container("https://host/a", &[("1.0.0", vec![]), ("1.1.0", vec![])]);

        let mut lhs = AssignmentSet::new();
        lhs.bind(a1.clone(), BoundVersion::Version(v("1.0.0")));
        let mut rhs = AssignmentSet::new();
        rhs.bind(a1, BoundVersion::Version(v("1.1.0")));

        assert!(lhs.merging(&rhs).unwrap().is_none());
    }

    #[test]
    fn test_merging_validates_against_induced() {
        // a@1.0.0 requires c = 1.0.0 exactly; binding c to 1.5.0 must fail.
        let dep = Constraint::versioned(pkg("https://host/c"), VersionSet::exact(v("1.0.0")));
        let a = container("https://host/a", &[("1.0.0", vec![dep])]);
        let c = container("https://host/c", &[("1.5.0", vec![]), ("1.0.0", vec![])]);

        let mut lhs = AssignmentSet::new();
        lhs.bind(a, BoundVersion::Version(v("1.0.0")));
        let mut rhs = AssignmentSet::new();
        rhs.bind(c.clone(), BoundVersion::Version(v("1.5.0")));

        assert!(lhs.merging(&rhs).unwrap().is_none());

        let mut ok = AssignmentSet::new();
        ok.bind(c, BoundVersion::Version(v("1.0.0")));
        assert!(lhs.merging(&ok).unwrap().is_some());
    }

    #[test]
    fn test_excluded_only_without_constraints() {
        let constraints = ConstraintSet::new();
        let identity = PackageIdentity::from_location("https://host/a");
        assert!(binding_is_valid(&BoundVersion::Excluded, &identity, &constraints));

        let constrained = constraints
            .merging(&Constraint::versioned(
                pkg("https://host/a"),
                VersionSet::range(v("1.0.0"), v("2.0.0")),
            ))
            .unwrap();
        assert!(!binding_is_valid(&BoundVersion::Excluded, &identity, &constrained));
    }
}
