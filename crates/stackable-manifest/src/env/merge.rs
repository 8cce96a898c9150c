//! Consolidation of [`Declaration`]s from independent producers.
//!
//! The merge is a pure function of the input multiset: which producer ran
//! first never decides the outcome. For every name the following rules are
//! applied:
//!
//! - Exact duplicates collapse into one declaration, silently.
//! - A [`Generation::Current`] declaration supersedes every
//!   [`Generation::Legacy`] declaration of the same kind. The legacy
//!   declarations are dropped and a [`Diagnostic::Superseded`] is recorded.
//! - Declarations whose kind [allows multiple definitions][am] coexist.
//! - If a single-definition declaration survives, same-named bulk imports are
//!   dropped and a [`Diagnostic::IgnoredDuplicate`] is recorded.
//! - If more than one single-definition declaration survives, the name is in
//!   conflict. All conflicts of the whole input are collected into one
//!   [`ConflictError`].
//!
//! [am]: crate::env::EnvKind::allows_multiple
use std::{
    collections::{BTreeSet, HashSet},
    fmt::Display,
};

use indexmap::IndexMap;
use snafu::Snafu;
use tracing::{debug, info, warn};

use crate::env::{Declaration, EnvKind, Generation};

type Result<T, E = ConflictError> = std::result::Result<T, E>;

/// Two or more single-definition declarations that cannot be reconciled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    name: String,
    declarations: Vec<Declaration>,
}

impl Conflict {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The contributing declarations, in the order they were encountered.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Returns the distinct kinds of the conflicting declarations.
    pub fn kinds(&self) -> HashSet<EnvKind> {
        self.declarations.iter().map(Declaration::kind).collect()
    }
}

impl Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{name:?} is declared as ", name = self.name)?;
        for (i, declaration) in self.declarations.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => " and ",
            };
            write!(
                f,
                "{prefix}{kind} {value:?} ({generation})",
                kind = declaration.kind(),
                value = declaration.value(),
                generation = declaration.generation(),
            )?;
        }
        Ok(())
    }
}

/// The error returned if any name is in conflict.
///
/// Contains every conflicting name of the input, not only the first one, so
/// that all problems can be fixed at once.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(display(
    "conflicting environment variable declarations: {}",
    join_conflicts(conflicts)
))]
pub struct ConflictError {
    conflicts: Vec<Conflict>,
}

impl ConflictError {
    /// The conflicts, ordered by the first appearance of their name.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Returns the conflict for `name`, if there is one.
    pub fn get(&self, name: &str) -> Option<&Conflict> {
        self.conflicts.iter().find(|conflict| conflict.name == name)
    }
}

fn join_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A non-fatal observation made while merging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A legacy declaration was dropped in favour of a current one of the
    /// same kind.
    Superseded {
        superseded: Declaration,
        by: Declaration,
    },

    /// A bulk import was dropped because a single-definition declaration
    /// already uses its name.
    IgnoredDuplicate {
        ignored: Declaration,
        kept: Declaration,
    },
}

impl Diagnostic {
    pub fn name(&self) -> &str {
        match self {
            Self::Superseded { superseded, .. } => superseded.name(),
            Self::IgnoredDuplicate { ignored, .. } => ignored.name(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Superseded { superseded, by } => write!(
                f,
                "{superseded} is superseded by {by_value:?} from the {by_generation} syntax",
                by_value = by.value(),
                by_generation = by.generation(),
            ),
            Self::IgnoredDuplicate { ignored, kept } => write!(
                f,
                "{ignored} is ignored, {name:?} is already declared as {kind} {value:?}",
                name = kept.name(),
                kind = kept.kind(),
                value = kept.value(),
            ),
        }
    }
}

/// The conflict-free outcome of [`DeclarationMerger::resolve`].
///
/// The declarations form a set: iteration order is derived from the
/// declarations themselves, never from the order they were contributed in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    declarations: BTreeSet<Declaration>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn contains(&self, declaration: &Declaration) -> bool {
        self.declarations.contains(declaration)
    }

    /// Returns the single-definition declaration with the given name, if any.
    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|declaration| declaration.name() == name && !declaration.allows_multiple())
    }

    pub fn declarations(&self) -> &BTreeSet<Declaration> {
        &self.declarations
    }

    pub fn into_declarations(self) -> BTreeSet<Declaration> {
        self.declarations
    }

    /// The diagnostics recorded while resolving, in processing order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Emits all diagnostics as `tracing` events.
    pub fn log_diagnostics(&self) {
        for diagnostic in &self.diagnostics {
            match diagnostic {
                Diagnostic::Superseded { .. } => {
                    info!(env.name = diagnostic.name(), "{diagnostic}");
                }
                Diagnostic::IgnoredDuplicate { .. } => {
                    warn!(env.name = diagnostic.name(), "{diagnostic}");
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a Resolution {
    type IntoIter = std::collections::btree_set::Iter<'a, Declaration>;
    type Item = &'a Declaration;

    fn into_iter(self) -> Self::IntoIter {
        self.declarations.iter()
    }
}

/// Merges declarations from independent producers into a [`Resolution`].
///
/// The merger holds no state between calls: every call to
/// [`DeclarationMerger::resolve`] starts from scratch, so resolving the same
/// declarations (in any order) always yields the same set.
///
/// ```
/// use stackable_manifest::env::{Declaration, DeclarationMerger};
///
/// let error = DeclarationMerger::new()
///     .resolve([
///         Declaration::var("DB_URL", "a").legacy(),
///         Declaration::var("DB_URL", "b"),
///         Declaration::key_from_secret("DB_URL", "creds", "url"),
///     ])
///     .unwrap_err();
///
/// let conflict = error.get("DB_URL").unwrap();
/// assert_eq!(conflict.declarations().len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeclarationMerger {
    target: Option<String>,
}

impl DeclarationMerger {
    /// Creates a merger considering declarations for every target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a merger which only considers declarations applying to
    /// `target`, either explicitly or through the `*` wildcard.
    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }

    /// Resolves `declarations` into a conflict-free set.
    ///
    /// Fails only after the whole input has been processed, reporting every
    /// conflicting name.
    pub fn resolve(
        &self,
        declarations: impl IntoIterator<Item = Declaration>,
    ) -> Result<Resolution> {
        let mut by_name = IndexMap::<String, Vec<Declaration>>::new();
        let mut considered = 0usize;

        for declaration in declarations {
            if !self.applies(&declaration) {
                continue;
            }

            considered += 1;
            by_name
                .entry(declaration.name().to_owned())
                .or_default()
                .push(declaration);
        }

        let mut resolution = Resolution::default();
        let mut conflicts = Vec::new();

        for (name, group) in by_name {
            let outcome = resolve_name(group);
            resolution.diagnostics.extend(outcome.diagnostics);

            if outcome.conflicting {
                conflicts.push(Conflict {
                    name,
                    declarations: outcome.accepted,
                });
            } else {
                resolution.declarations.extend(outcome.accepted);
            }
        }

        if !conflicts.is_empty() {
            debug!(
                declarations = considered,
                conflicts = conflicts.len(),
                "environment declarations are in conflict"
            );
            return ConflictSnafu { conflicts }.fail();
        }

        debug!(
            declarations = considered,
            resolved = resolution.len(),
            diagnostics = resolution.diagnostics.len(),
            "resolved environment declarations"
        );
        Ok(resolution)
    }

    fn applies(&self, declaration: &Declaration) -> bool {
        self.target
            .as_deref()
            .is_none_or(|target| declaration.target().matches(target))
    }
}

#[derive(Debug, Default)]
struct NameOutcome {
    /// The surviving declarations, or the conflicting ones if `conflicting`.
    accepted: Vec<Declaration>,
    diagnostics: Vec<Diagnostic>,
    conflicting: bool,
}

/// Decides the outcome for a group of declarations sharing one name.
fn resolve_name(group: Vec<Declaration>) -> NameOutcome {
    let mut outcome = NameOutcome::default();

    let (multiple, single): (Vec<_>, Vec<_>) = deduplicate(group)
        .into_iter()
        .partition(Declaration::allows_multiple);

    let single = drop_superseded(
        single,
        |legacy, current| legacy.kind() == current.kind(),
        &mut outcome,
    );
    let multiple = drop_superseded(
        multiple,
        |legacy, current| legacy.source() == current.source(),
        &mut outcome,
    );

    if single.len() > 1 {
        outcome.conflicting = true;
        outcome.accepted = single;
    } else if let Some(kept) = single.first().cloned() {
        outcome
            .diagnostics
            .extend(multiple.into_iter().map(|ignored| Diagnostic::IgnoredDuplicate {
                ignored,
                kept: kept.clone(),
            }));
        outcome.accepted = single;
    } else {
        outcome.accepted = multiple;
    }

    outcome
}

/// Collapses equivalent declarations, keeping the position of the first one.
///
/// Equivalent declarations only differ in their target, the smallest target
/// is kept so that the survivor does not depend on the input order.
fn deduplicate(group: Vec<Declaration>) -> Vec<Declaration> {
    let mut unique: Vec<Declaration> = Vec::with_capacity(group.len());

    for declaration in group {
        match unique.iter_mut().find(|existing| existing.is_equivalent(&declaration)) {
            Some(existing) if declaration < *existing => *existing = declaration,
            Some(_) => {}
            None => unique.push(declaration),
        }
    }

    unique
}

/// Drops every legacy declaration for which `supersedes` finds a current
/// counterpart, recording a [`Diagnostic::Superseded`] for each.
fn drop_superseded(
    declarations: Vec<Declaration>,
    supersedes: impl Fn(&Declaration, &Declaration) -> bool,
    outcome: &mut NameOutcome,
) -> Vec<Declaration> {
    let current = declarations
        .iter()
        .filter(|declaration| declaration.generation() == Generation::Current)
        .cloned()
        .collect::<Vec<_>>();

    declarations
        .into_iter()
        .filter(|declaration| {
            if declaration.generation() != Generation::Legacy {
                return true;
            }

            match current.iter().find(|by| supersedes(declaration, by)) {
                Some(by) => {
                    outcome.diagnostics.push(Diagnostic::Superseded {
                        superseded: declaration.clone(),
                        by: by.clone(),
                    });
                    false
                }
                None => true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use rstest::rstest;

    use super::*;
    use crate::env::{EnvSource, Target};

    fn resolve(declarations: Vec<Declaration>) -> Result<Resolution> {
        DeclarationMerger::new().resolve(declarations)
    }

    fn set(declarations: impl IntoIterator<Item = Declaration>) -> BTreeSet<Declaration> {
        declarations.into_iter().collect()
    }

    #[test]
    fn empty_input() {
        let resolution = resolve(vec![]).unwrap();

        assert!(resolution.is_empty());
        assert!(resolution.diagnostics().is_empty());
    }

    #[test]
    fn distinct_names_are_accepted() {
        let declarations = vec![
            Declaration::var("A", "1"),
            Declaration::field("B", "metadata.name").legacy(),
            Declaration::key_from_secret("C", "creds", "c"),
            Declaration::config_map("settings"),
        ];

        let resolution = resolve(declarations.clone()).unwrap();

        assert_eq!(resolution.declarations(), &set(declarations));
        assert!(resolution.diagnostics().is_empty());
    }

    #[rstest]
    #[case::current_first(vec![Declaration::var("X", "1"), Declaration::var("X", "1").legacy()])]
    #[case::legacy_first(vec![Declaration::var("X", "1").legacy(), Declaration::var("X", "1")])]
    #[case::different_values(vec![Declaration::var("X", "2").legacy(), Declaration::var("X", "1")])]
    fn current_supersedes_legacy(#[case] declarations: Vec<Declaration>) {
        let resolution = resolve(declarations).unwrap();

        assert_eq!(resolution.declarations(), &set([Declaration::var("X", "1")]));
        assert_eq!(resolution.diagnostics().len(), 1);
        assert!(matches!(
            &resolution.diagnostics()[0],
            Diagnostic::Superseded { superseded, by }
                if superseded.generation() == Generation::Legacy
                    && by == &Declaration::var("X", "1")
        ));
    }

    #[test]
    fn every_legacy_declaration_of_the_kind_is_superseded() {
        let resolution = resolve(vec![
            Declaration::var("X", "a").legacy(),
            Declaration::var("X", "b").legacy(),
            Declaration::var("X", "c"),
        ])
        .unwrap();

        assert_eq!(resolution.declarations(), &set([Declaration::var("X", "c")]));
        assert_eq!(resolution.diagnostics().len(), 2);
    }

    #[test]
    fn identical_declarations_collapse_silently() {
        let declaration = Declaration::var("X", "1");
        let resolution = resolve(vec![declaration.clone(), declaration.clone()]).unwrap();

        assert_eq!(resolution.declarations(), &set([declaration]));
        assert!(resolution.diagnostics().is_empty());
    }

    #[test]
    fn identical_legacy_declarations_produce_one_diagnostic() {
        let resolution = resolve(vec![
            Declaration::var("X", "1").legacy(),
            Declaration::var("X", "1").legacy(),
            Declaration::var("X", "1"),
        ])
        .unwrap();

        assert_eq!(resolution.len(), 1);
        assert_eq!(resolution.diagnostics().len(), 1);
    }

    #[test]
    fn equivalent_declarations_for_different_targets_collapse() {
        let openshift =
            Declaration::var("X", "1").with_target(Target::Named("openshift".to_owned()));

        let forward = resolve(vec![openshift.clone(), Declaration::var("X", "1")]).unwrap();
        let backward = resolve(vec![Declaration::var("X", "1"), openshift]).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.declarations(), &set([Declaration::var("X", "1")]));
    }

    #[rstest]
    #[case::var_and_secret_key(
        Declaration::var("X", "1"),
        Declaration::key_from_secret("X", "creds", "x")
    )]
    #[case::field_and_config_map_key(
        Declaration::field("X", "metadata.name"),
        Declaration::key_from_config_map("X", "cm", "x")
    )]
    #[case::different_generations(
        Declaration::var("X", "1").legacy(),
        Declaration::field("X", "status.podIP")
    )]
    #[case::same_kind_same_generation(Declaration::var("X", "1"), Declaration::var("X", "2"))]
    fn incompatible_declarations_conflict(#[case] first: Declaration, #[case] second: Declaration) {
        let error = resolve(vec![first.clone(), second.clone()]).unwrap_err();

        assert_eq!(error.conflicts().len(), 1);
        let conflict = error.get("X").unwrap();
        assert_eq!(conflict.declarations(), &[first, second]);
    }

    #[test]
    fn conflict_lists_every_contributor() {
        let declarations = vec![
            Declaration::var("X", "1"),
            Declaration::field("X", "metadata.name"),
            Declaration::key_from_secret("X", "creds", "x"),
        ];

        let error = resolve(declarations.clone()).unwrap_err();
        let conflict = error.get("X").unwrap();

        assert_eq!(conflict.declarations(), declarations.as_slice());
        assert_eq!(conflict.kinds().len(), 3);
    }

    #[test]
    fn all_conflicting_names_are_reported() {
        let error = resolve(vec![
            Declaration::var("A", "1"),
            Declaration::var("B", "1"),
            Declaration::field("A", "metadata.name"),
            Declaration::var("OK", "1"),
            Declaration::key_from_config_map("B", "cm", "b"),
        ])
        .unwrap_err();

        let names = error.conflicts().iter().map(Conflict::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn bulk_imports_coexist() {
        let declarations = vec![Declaration::secret("shared"), Declaration::config_map("shared")];

        let resolution = resolve(declarations.clone()).unwrap();

        assert_eq!(resolution.declarations(), &set(declarations));
        assert!(resolution.diagnostics().is_empty());
    }

    #[test]
    fn bulk_imports_with_different_prefixes_coexist() {
        let prefixed = Declaration::new("shared", EnvSource::Secret {
            secret: "shared".to_owned(),
            prefix: Some("APP_".to_owned()),
        });

        let resolution = resolve(vec![Declaration::secret("shared"), prefixed.legacy()]).unwrap();

        assert_eq!(resolution.len(), 2);
        assert!(resolution.diagnostics().is_empty());
    }

    #[test]
    fn legacy_bulk_import_is_superseded_by_identical_current_one() {
        let resolution = resolve(vec![
            Declaration::secret("shared").legacy(),
            Declaration::secret("shared"),
        ])
        .unwrap();

        assert_eq!(resolution.declarations(), &set([Declaration::secret("shared")]));
        assert!(matches!(resolution.diagnostics(), [Diagnostic::Superseded { .. }]));
    }

    #[rstest]
    #[case::bulk_first(vec![Declaration::secret("X"), Declaration::var("X", "1")])]
    #[case::bulk_last(vec![Declaration::var("X", "1"), Declaration::secret("X")])]
    fn bulk_import_colliding_with_single_definition_is_ignored(
        #[case] declarations: Vec<Declaration>,
    ) {
        let resolution = resolve(declarations).unwrap();

        assert_eq!(resolution.declarations(), &set([Declaration::var("X", "1")]));
        assert_eq!(resolution.diagnostics(), &[Diagnostic::IgnoredDuplicate {
            ignored: Declaration::secret("X"),
            kept: Declaration::var("X", "1"),
        }]);
    }

    #[test]
    fn current_declaration_wins_after_supersession_against_bulk_import() {
        let resolution = resolve(vec![
            Declaration::config_map("X"),
            Declaration::var("X", "old").legacy(),
            Declaration::var("X", "new"),
        ])
        .unwrap();

        assert_eq!(resolution.get("X"), Some(&Declaration::var("X", "new")));
        assert_eq!(resolution.diagnostics().len(), 2);
    }

    #[test]
    fn target_filter() {
        let knative = Target::Named("knative".to_owned());
        let openshift = Target::Named("openshift".to_owned());

        let declarations = vec![
            Declaration::var("A", "any"),
            Declaration::var("B", "knative").with_target(knative.clone()),
            Declaration::var("B", "openshift").with_target(openshift.clone()),
        ];

        let resolution = DeclarationMerger::for_target("knative")
            .resolve(declarations.clone())
            .unwrap();
        assert_eq!(
            resolution.declarations(),
            &set([
                Declaration::var("A", "any"),
                Declaration::var("B", "knative").with_target(knative)
            ])
        );

        // Without a filter both B declarations are considered
        assert!(DeclarationMerger::new().resolve(declarations).is_err());
    }

    #[test]
    fn resolution_is_independent_of_input_order() {
        let declarations = vec![
            Declaration::var("A", "1").legacy(),
            Declaration::var("A", "1"),
            Declaration::secret("A"),
            Declaration::config_map("B"),
            Declaration::secret("B"),
            Declaration::field("C", "metadata.namespace").legacy(),
            Declaration::var("D", "d"),
        ];

        let expected = resolve(declarations.clone()).unwrap();

        for permutation in declarations.iter().cloned().permutations(declarations.len()) {
            let resolution = resolve(permutation).unwrap();
            assert_eq!(resolution.declarations(), expected.declarations());
            assert_eq!(resolution.diagnostics().len(), expected.diagnostics().len());
        }
    }

    #[test]
    fn conflicts_are_independent_of_input_order() {
        let declarations = vec![
            Declaration::var("X", "a").legacy(),
            Declaration::var("X", "b"),
            Declaration::key_from_secret("X", "creds", "x"),
            Declaration::var("Y", "y"),
        ];

        for permutation in declarations.iter().cloned().permutations(declarations.len()) {
            let error = resolve(permutation).unwrap_err();
            let conflict = error.get("X").unwrap();

            assert_eq!(
                set(conflict.declarations().iter().cloned()),
                set([Declaration::var("X", "b"), Declaration::key_from_secret("X", "creds", "x")])
            );
        }
    }

    #[test]
    fn resolving_twice_yields_the_same_result() {
        let merger = DeclarationMerger::new();
        let declarations = vec![Declaration::var("A", "1").legacy(), Declaration::var("A", "2")];

        assert_eq!(
            merger.resolve(declarations.clone()).unwrap(),
            merger.resolve(declarations).unwrap()
        );
    }

    #[test]
    fn error_display() {
        let error = resolve(vec![
            Declaration::var("DB_URL", "b"),
            Declaration::key_from_secret("DB_URL", "creds", "url"),
        ])
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            r#"conflicting environment variable declarations: "DB_URL" is declared as var "b" (current) and keyFromSecret "creds/url" (current)"#
        );
    }

    #[test]
    fn error_lists_all_conflicts() {
        let error = resolve(vec![
            Declaration::var("A", "1"),
            Declaration::field("A", "metadata.name"),
            Declaration::var("B", "1").legacy(),
            Declaration::key_from_config_map("B", "cm", "b").legacy(),
        ])
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            r#"conflicting environment variable declarations: "A" is declared as var "1" (current) and field "metadata.name" (current); "B" is declared as var "1" (legacy) and keyFromConfigmap "cm/b" (legacy)"#
        );

        let error: Box<dyn std::error::Error> = Box::new(error);
        assert!(error.source().is_none());
    }
}
