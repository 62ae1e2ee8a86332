//! Capability flags, feature support, and source/target negotiation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::mapping::{ExportOperation, Gate};
use crate::platform::Platform;

/// Well-known optional feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Flag {
    /// Discussion records carry the first post's body.
    HasDiscussionBody,
}

impl Flag {
    pub const ALL: [Flag; 1] = [Flag::HasDiscussionBody];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::HasDiscussionBody => "hasDiscussionBody",
        }
    }

    /// Parse a declared flag name. Unknown names are `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A platform's declared flags. Absent flags read as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    flags: BTreeMap<Flag, bool>,
}

impl CapabilityFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: Flag, value: bool) -> Self {
        self.flags.insert(flag, value);
        self
    }

    /// Build from named declarations, ignoring names outside the vocabulary.
    pub fn from_names<'a, I>(declared: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut flags = Self::new();
        for (name, value) in declared {
            match Flag::parse(name) {
                Some(flag) => flags = flags.with(flag, value),
                None => warn!("Ignoring unknown capability flag '{}'", name),
            }
        }
        flags
    }

    pub fn get(&self, flag: Flag) -> bool {
        self.flags.get(&flag).copied().unwrap_or(false)
    }

    /// The explicit declaration, if any.
    pub fn declared(&self, flag: Flag) -> Option<bool> {
        self.flags.get(&flag).copied()
    }
}

/// Features that suppression decisions apply to in this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modes {
    suppressed: BTreeSet<Flag>,
}

impl Modes {
    pub fn suppressing<I: IntoIterator<Item = Flag>>(flags: I) -> Self {
        Self {
            suppressed: flags.into_iter().collect(),
        }
    }

    pub fn is_suppressed(&self, flag: Flag) -> bool {
        self.suppressed.contains(&flag)
    }

    pub fn suppressed(&self) -> impl Iterator<Item = Flag> + '_ {
        self.suppressed.iter().copied()
    }

    /// Operations admitted under these modes, in declared order.
    pub fn select(&self, ops: Vec<ExportOperation>) -> Vec<ExportOperation> {
        ops.into_iter().filter(|op| op.gate.admits(self)).collect()
    }
}

/// Decide which features both sides skip.
///
/// A feature is suppressed only when both platforms explicitly declare its
/// flag `false`, and the suppression would not starve a surviving target
/// operation of an entity only a suppressed source operation produces.
pub fn negotiate(source: &dyn Platform, target: &dyn Platform) -> Result<Modes> {
    let source_flags = source.flags();
    let target_flags = target.flags();
    let mut suppressed = BTreeSet::new();

    for flag in Flag::ALL {
        if source_flags.declared(flag) != Some(false) || target_flags.declared(flag) != Some(false) {
            continue;
        }

        let candidate = Modes::suppressing(suppressed.iter().copied().chain([flag]));
        match starved_entity(source, target, &candidate)? {
            None => {
                info!("Suppressing {} on {} and {}", flag, source.id(), target.id());
                suppressed.insert(flag);
            }
            Some(entity) => warn!(
                "Not suppressing {}: {} reads {} which only suppressed operations produce",
                flag,
                target.id(),
                entity
            ),
        }
    }

    Ok(Modes { suppressed })
}

fn starved_entity(
    source: &dyn Platform,
    target: &dyn Platform,
    candidate: &Modes,
) -> Result<Option<String>> {
    let produced_by = |ops: &[ExportOperation], modes: &Modes| -> HashSet<String> {
        ops.iter()
            .filter(|op| op.gate.admits(modes))
            .map(|op| op.entity.clone())
            .collect()
    };

    let source_ops = source.operations()?;
    let full = produced_by(&source_ops, &Modes::default());
    let kept = produced_by(&source_ops, candidate);

    Ok(target
        .operations()?
        .iter()
        .filter(|op| op.gate.admits(candidate))
        .flat_map(|op| op.reads.iter())
        .find(|entity| full.contains(*entity) && !kept.contains(*entity))
        .cloned())
}

/// Whether an operation is tied to a feature flag at all.
pub fn tied_flag(op: &ExportOperation) -> Option<Flag> {
    match op.gate {
        Gate::Always => None,
        Gate::Unless(flag) | Gate::When(flag) => Some(flag),
    }
}

/// Migratable data kinds shown in the support matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Feature {
    Users,
    Passwords,
    Categories,
    Discussions,
    Comments,
    Polls,
    Roles,
    Avatars,
    PrivateMessages,
    Signatures,
    Attachments,
    Bookmarks,
    Permissions,
    Badges,
    UserNotes,
    Ranks,
    Groups,
    Tags,
    Reactions,
    Articles,
}

impl Feature {
    pub const ALL: [Feature; 20] = [
        Feature::Users,
        Feature::Passwords,
        Feature::Categories,
        Feature::Discussions,
        Feature::Comments,
        Feature::Polls,
        Feature::Roles,
        Feature::Avatars,
        Feature::PrivateMessages,
        Feature::Signatures,
        Feature::Attachments,
        Feature::Bookmarks,
        Feature::Permissions,
        Feature::Badges,
        Feature::UserNotes,
        Feature::Ranks,
        Feature::Groups,
        Feature::Tags,
        Feature::Reactions,
        Feature::Articles,
    ];

    /// Human label with spaces between words ("PrivateMessages" to "Private Messages").
    pub fn label(&self) -> String {
        let name = format!("{:?}", self);
        let mut label = String::with_capacity(name.len() + 4);
        for (i, c) in name.chars().enumerate() {
            if i > 0 && c.is_ascii_uppercase() {
                label.push(' ');
            }
            label.push(c);
        }
        label
    }
}

/// Support level of a feature: 0 none, 1 supported, 2 partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    #[default]
    No,
    Yes,
    Partial,
}

impl Support {
    pub fn level(&self) -> u8 {
        match self {
            Support::No => 0,
            Support::Yes => 1,
            Support::Partial => 2,
        }
    }
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Support::No => "no",
            Support::Yes => "yes",
            Support::Partial => "partial",
        })
    }
}

/// Declared feature support. Undeclared features are unsupported.
#[derive(Debug, Clone, Default)]
pub struct FeatureSupport {
    levels: BTreeMap<Feature, Support>,
}

impl FeatureSupport {
    pub fn new<I: IntoIterator<Item = (Feature, Support)>>(levels: I) -> Self {
        Self {
            levels: levels.into_iter().collect(),
        }
    }

    pub fn get(&self, feature: Feature) -> Support {
        self.levels.get(&feature).copied().unwrap_or_default()
    }

    /// Every feature with its level, in display order.
    pub fn matrix(&self) -> Vec<(Feature, Support)> {
        Feature::ALL.iter().map(|f| (*f, self.get(*f))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Flag::HasDiscussionBody;
    use crate::core::TableStructure;
    use crate::platform::Platform;

    struct Stub {
        id: &'static str,
        flags: CapabilityFlags,
        ops: Vec<ExportOperation>,
    }

    impl Platform for Stub {
        fn id(&self) -> &'static str {
            self.id
        }
        fn name(&self) -> &'static str {
            self.id
        }
        fn prefix(&self) -> &'static str {
            ""
        }
        fn flags(&self) -> CapabilityFlags {
            self.flags.clone()
        }
        fn features(&self) -> FeatureSupport {
            FeatureSupport::default()
        }
        fn operations(&self) -> Result<Vec<ExportOperation>> {
            Ok(self.ops.clone())
        }
    }

    fn op(entity: &str, gate: Gate) -> ExportOperation {
        ExportOperation::new(entity, "select 1", TableStructure::new()).gated(gate)
    }

    fn stub(id: &'static str, flags: CapabilityFlags, ops: Vec<ExportOperation>) -> Stub {
        Stub { id, flags, ops }
    }

    #[test]
    fn test_absent_flags_read_false() {
        let flags = CapabilityFlags::from_names([("hasDiscussionBody", true), ("bogus", true)]);
        assert!(flags.get(HasDiscussionBody));
        assert!(!CapabilityFlags::new().get(HasDiscussionBody));
        assert_eq!(CapabilityFlags::new().declared(HasDiscussionBody), None);
    }

    #[test]
    fn test_both_false_suppresses() {
        let off = CapabilityFlags::new().with(HasDiscussionBody, false);
        let source = stub("a", off.clone(), vec![op("Discussion", Gate::Always)]);
        let target = stub("b", off, vec![op("posts", Gate::Unless(HasDiscussionBody))]);
        assert!(negotiate(&source, &target).unwrap().is_suppressed(HasDiscussionBody));
    }

    #[test]
    fn test_either_true_or_undeclared_keeps() {
        let off = CapabilityFlags::new().with(HasDiscussionBody, false);
        let on = CapabilityFlags::new().with(HasDiscussionBody, true);
        let source = stub("a", on, vec![]);
        let target = stub("b", off.clone(), vec![]);
        assert_eq!(negotiate(&source, &target).unwrap(), Modes::default());

        let source = stub("a", CapabilityFlags::new(), vec![]);
        let target = stub("b", off, vec![]);
        assert_eq!(negotiate(&source, &target).unwrap(), Modes::default());
    }

    #[test]
    fn test_unsafe_suppression_is_skipped() {
        let off = CapabilityFlags::new().with(HasDiscussionBody, false);
        let source = stub(
            "a",
            off.clone(),
            vec![op("DiscussionBody", Gate::Unless(HasDiscussionBody))],
        );
        let target = stub(
            "b",
            off,
            vec![op("posts", Gate::Always).reading(["DiscussionBody"])],
        );
        assert!(!negotiate(&source, &target).unwrap().is_suppressed(HasDiscussionBody));
    }

    #[test]
    fn test_feature_label_and_matrix() {
        assert_eq!(Feature::PrivateMessages.label(), "Private Messages");
        let support = FeatureSupport::new([(Feature::Users, Support::Yes)]);
        let matrix = support.matrix();
        assert_eq!(matrix.len(), Feature::ALL.len());
        assert_eq!(matrix[0], (Feature::Users, Support::Yes));
        assert_eq!(support.get(Feature::Polls).level(), 0);
    }
}
