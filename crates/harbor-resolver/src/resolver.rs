//! The backtracking dependency resolver.

use crate::assignment::binding_is_valid;
use crate::{
    AssignmentSet, BoundVersion, ConstraintSet, Container, ContainerProvider, ResolveError,
};
use harbor_package::{Constraint, PackageIdentity, PackageRef, Requirement};
use harbor_semver::Version;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

/// A satisfying partial assignment paired with the constraints accumulated
/// while building it.
type Solution = (AssignmentSet, ConstraintSet);

/// The lazy stream of satisfying assignments for one subproblem.
type SolutionIter<'a> = Box<dyn Iterator<Item = Solution> + 'a>;

/// One package in the resolver's output.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub package: PackageRef,
    pub binding: BoundVersion,
    /// Source-control revision backing a version binding, when known.
    pub revision: Option<String>,
}

/// The dependency resolver.
///
/// Produces the first element of a lazy, depth-first, newest-first sequence
/// of satisfying assignments. The walk is single-threaded; the only
/// parallelism is whatever the provider performs behind `prefetch`.
pub struct Resolver<'p> {
    provider: &'p dyn ContainerProvider,
    /// Versions that must not be chosen, per identity.
    exclusions: BTreeMap<PackageIdentity, BTreeSet<Version>>,
    /// First non-recoverable error observed during the walk. Surfaced only
    /// if the walk fails to produce a solution.
    error: RefCell<Option<ResolveError>>,
}

impl<'p> Resolver<'p> {
    pub fn new(provider: &'p dyn ContainerProvider) -> Self {
        Self {
            provider,
            exclusions: BTreeMap::new(),
            error: RefCell::new(None),
        }
    }

    /// Exclude specific versions from consideration.
    pub fn with_exclusions(
        mut self,
        exclusions: BTreeMap<PackageIdentity, BTreeSet<Version>>,
    ) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Resolve `constraints` to a complete assignment.
    ///
    /// Conflicts among the inputs themselves are reported eagerly as
    /// [`ResolveError::UnsatisfiableRequirement`]; an exhausted search
    /// surfaces the first error recorded during the walk, or
    /// [`ResolveError::Unsatisfiable`] when the walk saw none.
    pub fn resolve(&self, constraints: &[Constraint]) -> Result<Vec<ResolvedPackage>, ResolveError> {
        *self.error.borrow_mut() = None;

        // Up-front merge: a conflict here names the offending requirement.
        let mut merged = ConstraintSet::new();
        for constraint in constraints {
            merged = merged.merging(constraint).ok_or_else(|| {
                ResolveError::UnsatisfiableRequirement {
                    identity: constraint.package.identity.clone(),
                    requirement: constraint.requirement.clone(),
                }
            })?;
        }

        let solutions = self.merge_constraints(
            constraints.to_vec(),
            AssignmentSet::new(),
            ConstraintSet::new(),
            Rc::new(BTreeSet::new()),
        );

        for (assignment, _) in solutions {
            match self.is_complete(&assignment) {
                Ok(true) => return self.bindings(&assignment),
                Ok(false) => continue,
                Err(error) => {
                    self.record(error);
                    continue;
                }
            }
        }

        Err(self
            .error
            .borrow_mut()
            .take()
            .unwrap_or(ResolveError::Unsatisfiable))
    }

    /// Resolve the subproblem rooted at one container: enumerate its
    /// admissible bindings, newest first, and recursively satisfy the
    /// dependencies each binding brings in.
    fn resolve_subtree<'s>(
        &'s self,
        container: Arc<dyn Container>,
        constraints: ConstraintSet,
        visiting: &Rc<BTreeSet<PackageIdentity>>,
    ) -> SolutionIter<'s> {
        let identity = container.identity().clone();
        let mut path = (**visiting).clone();
        path.insert(identity.clone());
        let visiting = Rc::new(path);

        match constraints.requirement_for(&identity) {
            Requirement::Unversioned(extras) => {
                // The package is used in place; bind it unversioned and keep
                // its currently-declared dependencies in play.
                let mut assignment = AssignmentSet::new();
                assignment.bind(container, BoundVersion::Unversioned);
                self.merge_constraints(extras, assignment, constraints, visiting)
            }
            Requirement::VersionSet(admissible) => {
                let versions = match container.versions() {
                    Ok(versions) => versions,
                    Err(error) => {
                        self.record(error);
                        return Box::new(std::iter::empty());
                    }
                };
                let excluded = self.exclusions.get(&identity).cloned().unwrap_or_default();

                Box::new(
                    versions
                        .into_iter()
                        .filter(move |v| admissible.contains(v) && !excluded.contains(v))
                        .flat_map(move |version| -> SolutionIter<'s> {
                            let dependencies = match container.dependencies(&version) {
                                Ok(dependencies) => dependencies,
                                Err(error) => {
                                    self.record(error);
                                    return Box::new(std::iter::empty());
                                }
                            };
                            let mut assignment = AssignmentSet::new();
                            assignment.bind(container.clone(), BoundVersion::Version(version));
                            self.merge_constraints(
                                dependencies,
                                assignment,
                                constraints.clone(),
                                visiting.clone(),
                            )
                        }),
                )
            }
        }
    }

    /// Merge a list of constraints into the running state, then satisfy each
    /// constrained package in declared order.
    ///
    /// The returned stream is the flat-map of every partial solution so far
    /// through the subtree resolver of the next package, so exhausting a
    /// later package's options implicitly backtracks into earlier ones.
    fn merge_constraints<'s>(
        &'s self,
        constraints: Vec<Constraint>,
        assignment: AssignmentSet,
        all_constraints: ConstraintSet,
        visiting: Rc<BTreeSet<PackageIdentity>>,
    ) -> SolutionIter<'s> {
        let merged = match all_constraints.merging_all(&constraints) {
            Some(merged) => merged,
            None => return Box::new(std::iter::empty()),
        };

        // Start fetching everything this list names; lookups below will find
        // the work already underway.
        let packages: Vec<PackageRef> = constraints.iter().map(|c| c.package.clone()).collect();
        self.provider.prefetch(&packages);

        let mut solutions: SolutionIter<'s> = Box::new(std::iter::once((assignment, merged)));
        for constraint in constraints {
            let package = constraint.package;
            let visiting = visiting.clone();
            solutions = Box::new(solutions.flat_map(move |(assignment, all)| -> SolutionIter<'s> {
                // An identity the running assignment has already bound is a
                // consistency check, not a new search.
                if let Some(binding) = assignment.binding_for(&package.identity) {
                    let valid = binding_is_valid(binding, &package.identity, &all);
                    return if valid {
                        Box::new(std::iter::once((assignment, all)))
                    } else {
                        Box::new(std::iter::empty())
                    };
                }
                // An identity still being decided further up this path is a
                // cycle; its candidate binding is validated when the
                // assignments merge.
                if visiting.contains(&package.identity) {
                    return Box::new(std::iter::once((assignment, all)));
                }

                let container = match self.provider.get_container(&package) {
                    Ok(container) => container,
                    Err(error) => {
                        self.record(error);
                        return Box::new(std::iter::empty());
                    }
                };

                let subtrees = self.resolve_subtree(container, all, &visiting);
                Box::new(subtrees.filter_map(move |(subtree_assignment, subtree_constraints)| {
                    match assignment.merging(&subtree_assignment) {
                        Ok(Some(combined)) => Some((combined, subtree_constraints)),
                        Ok(None) => None,
                        Err(error) => {
                            self.record(error);
                            None
                        }
                    }
                }))
            }));
        }
        solutions
    }

    /// Every identity the induced constraints mention must carry a version
    /// or unversioned binding; `Excluded` is tolerated only for identities
    /// nothing actually constrains. The search preserves this by
    /// construction, so a failure here discards the candidate.
    fn is_complete(&self, assignment: &AssignmentSet) -> Result<bool, ResolveError> {
        let induced = match assignment.induced_constraints()? {
            Some(induced) => induced,
            None => return Ok(false),
        };
        for identity in induced.identities() {
            match assignment.binding_for(identity) {
                Some(BoundVersion::Version(_)) | Some(BoundVersion::Unversioned) => {}
                Some(BoundVersion::Excluded) => {
                    if !induced.requirement_for(identity).is_any() {
                        return Ok(false);
                    }
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn bindings(&self, assignment: &AssignmentSet) -> Result<Vec<ResolvedPackage>, ResolveError> {
        let mut result = Vec::with_capacity(assignment.len());
        for (_, container, binding) in assignment.iter() {
            let revision = match binding {
                BoundVersion::Version(version) => container.revision_for(version)?,
                _ => None,
            };
            result.push(ResolvedPackage {
                package: container.package_ref().clone(),
                binding: binding.clone(),
                revision,
            });
        }
        Ok(result)
    }

    /// Keep the first error observed during the walk.
    fn record(&self, error: ResolveError) {
        let mut slot = self.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}
