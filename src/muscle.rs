use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Side of the ergometer a muscle drives, and therefore the power channel it is judged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Every muscle that can be stimulated. Declaration order is hardware channel order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MuscleKey {
    BicepsR,
    TricepsR,
    BicepsL,
    TricepsL,
    DeltPostR,
    DeltAntR,
    DeltPostL,
    DeltAntL,
}

impl MuscleKey {
    /// Stimulator channel wired to this muscle (1-based, fixed for the rig)
    pub fn channel(self) -> u8 {
        match self {
            MuscleKey::BicepsR => 1,
            MuscleKey::TricepsR => 2,
            MuscleKey::BicepsL => 3,
            MuscleKey::TricepsL => 4,
            MuscleKey::DeltPostR => 5,
            MuscleKey::DeltAntR => 6,
            MuscleKey::DeltPostL => 7,
            MuscleKey::DeltAntL => 8,
        }
    }

    pub fn side(self) -> Side {
        match self {
            MuscleKey::BicepsR
            | MuscleKey::TricepsR
            | MuscleKey::DeltPostR
            | MuscleKey::DeltAntR => Side::Right,
            MuscleKey::BicepsL
            | MuscleKey::TricepsL
            | MuscleKey::DeltPostL
            | MuscleKey::DeltAntL => Side::Left,
        }
    }
}

/// The channel groupings available on the rig.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MuscleSet {
    #[default]
    BicepsTriceps,
    Deltoids,
    Both,
}

/// A muscle together with the stimulator channel it is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuscleChannel {
    pub muscle: MuscleKey,
    pub channel: u8,
}

/// A muscle set resolved once at session start. Everything downstream iterates this list.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMuscleSet {
    pub set: MuscleSet,
    pub entries: Vec<MuscleChannel>,
}

impl MuscleSet {
    fn includes(self, muscle: MuscleKey) -> bool {
        match self {
            MuscleSet::BicepsTriceps => muscle.channel() <= 4,
            MuscleSet::Deltoids => muscle.channel() > 4,
            MuscleSet::Both => true,
        }
    }

    pub fn resolve(self) -> ResolvedMuscleSet {
        let entries = MuscleKey::iter()
            .filter(|&muscle| self.includes(muscle))
            .map(|muscle| MuscleChannel {
                muscle,
                channel: muscle.channel(),
            })
            .collect();
        ResolvedMuscleSet { set: self, entries }
    }
}

impl ResolvedMuscleSet {
    pub fn muscles(&self) -> impl Iterator<Item = MuscleKey> + '_ {
        self.entries.iter().map(|entry| entry.muscle)
    }

    pub fn channels(&self) -> Vec<u8> {
        self.entries.iter().map(|entry| entry.channel).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, muscle: MuscleKey) -> bool {
        self.entries.iter().any(|entry| entry.muscle == muscle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::str::FromStr;

    #[test]
    fn test_resolved_sets() {
        let arms = MuscleSet::BicepsTriceps.resolve();
        assert_eq!(arms.channels(), vec![1, 2, 3, 4]);
        assert_eq!(
            arms.muscles().collect::<Vec<_>>(),
            vec![MuscleKey::BicepsR, MuscleKey::TricepsR, MuscleKey::BicepsL, MuscleKey::TricepsL]
        );
        assert_eq!(MuscleSet::Deltoids.resolve().channels(), vec![5, 6, 7, 8]);
        assert_eq!(MuscleSet::Both.resolve().len(), 8);
    }

    #[test]
    fn test_channels_unique() {
        for set in MuscleSet::iter() {
            let resolved = set.resolve();
            let unique: HashSet<u8> = resolved.channels().into_iter().collect();
            assert_eq!(unique.len(), resolved.len(), "{set} has duplicate channels");
        }
    }

    #[test]
    fn test_names_parse() {
        assert_eq!(MuscleSet::from_str("deltoids").unwrap(), MuscleSet::Deltoids);
        assert_eq!(MuscleKey::from_str("delt_post_l").unwrap(), MuscleKey::DeltPostL);
        assert_eq!(MuscleKey::TricepsR.to_string(), "triceps_r");
        assert_eq!(MuscleKey::TricepsL.side(), Side::Left);
    }
}
