//! Multi-model status resolution.
//!
//! Each note is scored by several independent models. The resolver walks a
//! fixed priority table of tier slots and adopts the first decided status
//! from a tier that is eligible for the note:
//!
//! ```text
//!   core -> group (core groups) -> group (expansion groups) -> topic (confident)
//!        -> expansion -> group (expansionPlus groups) -> expansionPlus -> coverage
//! ```
//!
//! A tier that produced no output for the note is skipped exactly like a
//! tier that reported "needs more ratings". Harassment output never decides
//! status.

use notescore_core::{
    ModelingGroup, NoteId, NoteStatus, ScorerOutput, ScoringConfig, StatusHistoryRecord, Tier,
};
use tracing::debug;

/// All scorer outputs available for one note.
#[derive(Debug, Clone)]
pub struct NoteCandidates<'a> {
    pub note_id: NoteId,
    /// Group assignment from the group models, if any covered the note.
    pub modeling_group: Option<ModelingGroup>,
    pub topic: Option<&'a str>,
    pub outputs: Vec<&'a ScorerOutput>,
}

impl<'a> NoteCandidates<'a> {
    pub fn output_for(&self, tier: &Tier) -> Option<&'a ScorerOutput> {
        self.outputs.iter().copied().find(|o| &o.tier == tier)
    }
}

/// Which tiers may decide a note, given its lock state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierGate {
    Unlocked,
    /// The note is locked; only the tier that decided the locked status stays eligible.
    LockedTo(Option<Tier>),
}

impl TierGate {
    pub fn for_history(record: Option<&StatusHistoryRecord>) -> Self {
        match record {
            Some(record) if record.is_locked() => Self::LockedTo(record.current_decided_by.clone()),
            _ => Self::Unlocked,
        }
    }

    pub fn admits(&self, tier: &Tier) -> bool {
        match self {
            Self::Unlocked => true,
            Self::LockedTo(decided_by) => decided_by.as_ref() == Some(tier),
        }
    }
}

/// Outcome of resolving one note, before locks are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: NoteStatus,
    pub decided_by: Tier,
    pub active_rules: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Core,
    CoreGroup,
    ExpansionGroup,
    Topic,
    Expansion,
    ExpansionPlusGroup,
    ExpansionPlus,
    Coverage,
}

const PRIORITY: [Slot; 8] = [
    Slot::Core,
    Slot::CoreGroup,
    Slot::ExpansionGroup,
    Slot::Topic,
    Slot::Expansion,
    Slot::ExpansionPlusGroup,
    Slot::ExpansionPlus,
    Slot::Coverage,
];

impl Slot {
    fn matches(self, output: &ScorerOutput, note: &NoteCandidates<'_>, config: &ScoringConfig) -> bool {
        let assigned = |group: &ModelingGroup| note.modeling_group == Some(*group);
        match (self, &output.tier) {
            (Self::Core, Tier::Core) => true,
            (Self::CoreGroup, Tier::Group(group)) => {
                assigned(group) && config.core_groups.contains(group)
            }
            (Self::ExpansionGroup, Tier::Group(group)) => {
                assigned(group) && config.expansion_groups.contains(group)
            }
            (Self::Topic, Tier::Topic(topic)) => {
                note.topic == Some(topic.as_str()) && output.confident == Some(true)
            }
            (Self::Expansion, Tier::Expansion) => true,
            (Self::ExpansionPlusGroup, Tier::Group(group)) => {
                assigned(group) && config.expansion_plus_groups.contains(group)
            }
            (Self::ExpansionPlus, Tier::ExpansionPlus) => true,
            (Self::Coverage, Tier::Coverage) => true,
            _ => false,
        }
    }
}

/// Pick the authoritative status for one note.
///
/// Pure function of the candidates, the gate, and the config.
pub fn resolve_note(
    note: &NoteCandidates<'_>,
    gate: &TierGate,
    config: &ScoringConfig,
) -> Resolution {
    for slot in PRIORITY {
        let Some(output) = note
            .outputs
            .iter()
            .copied()
            .find(|output| slot.matches(output, note, config))
        else {
            continue;
        };
        if !output.status.is_rated() || !gate.admits(&output.tier) {
            continue;
        }
        return Resolution {
            status: output.status,
            decided_by: output.tier.clone(),
            active_rules: dedup_rules(&output.active_rules),
        };
    }

    debug!(note_id = note.note_id, "no tier decided the note");
    let core_rules = note
        .output_for(&Tier::Core)
        .map(|output| dedup_rules(&output.active_rules))
        .unwrap_or_default();
    Resolution {
        status: NoteStatus::NeedsMoreRatings,
        decided_by: Tier::Core,
        active_rules: core_rules,
    }
}

/// Drop repeated rule ids, keeping first-seen order.
fn dedup_rules(rules: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(rules.len());
    for rule in rules {
        if !merged.contains(rule) {
            merged.push(rule.clone());
        }
    }
    merged
}

/// Choose the modeling group for a note from the group models that scored it:
/// the one with the most final-round ratings, lowest group id on ties.
pub fn assign_modeling_group(outputs: &[&ScorerOutput]) -> Option<ModelingGroup> {
    outputs
        .iter()
        .filter_map(|output| match output.tier {
            Tier::Group(group) => Some((output.num_final_round_ratings, group)),
            _ => None,
        })
        .max_by(|(a_count, a_group), (b_count, b_group)| {
            a_count.cmp(b_count).then(b_group.cmp(a_group))
        })
        .map(|(_, group)| group)
}
