// SPDX-License-Identifier: MIT OR Apache-2.0
//! The structured fictional-world document a team converges upon.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The structured canon document for one team.
///
/// Field layout mirrors `spec.md` §3 exactly; the write-scope for each field
/// is enforced by `wa-canon`, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Canon {
    /// The world's name.
    pub world_name: String,
    /// The rule or force that governs how the world works.
    pub governing_logic: String,
    /// The dominant aesthetic/emotional register.
    pub aesthetic_mood: String,
    /// Exactly 3 landmarks once Phase 2 completes; fewer while in progress.
    pub landmarks: Vec<Landmark>,
    /// The inhabitants of the world.
    pub inhabitants: Inhabitants,
    /// The central conflict of the world.
    pub tension: Tension,
    /// A free-text description used to seed the hero image prompt.
    pub hero_image_description: String,
}

/// One of exactly three landmarks in a completed [`Canon`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Landmark {
    /// The landmark's name.
    pub name: String,
    /// A description of the landmark.
    pub description: String,
    /// Why the landmark matters to the world or its inhabitants.
    pub significance: String,
    /// A short phrase capturing the landmark's visual identity.
    pub visual_key: String,
}

/// The inhabitants of a [`Canon`]'s world.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Inhabitants {
    /// Physical appearance.
    pub appearance: String,
    /// A snapshot of their culture.
    pub culture_snapshot: String,
    /// How they relate to the place they inhabit.
    pub relationship_to_place: String,
}

/// The central conflict of a [`Canon`]'s world.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Tension {
    /// The conflict itself.
    pub conflict: String,
    /// What's at stake.
    pub stakes: String,
    /// How the tension visibly manifests.
    pub visual_manifestation: String,
}

impl Canon {
    /// The default placeholder canon a team starts Phase 1 with.
    ///
    /// All string fields are empty and `landmarks` is empty; the Canon
    /// Store's Phase 1 write-restriction allows writes to the placeholder
    /// subtrees so the Architect/Lorekeeper can fill them in.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// Returns `true` once the canon satisfies the full schema required at
    /// the end of Phase 4: exactly 3 landmarks and no empty required field.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.world_name.is_empty()
            && !self.governing_logic.is_empty()
            && !self.aesthetic_mood.is_empty()
            && self.landmarks.len() == 3
            && self.landmarks.iter().all(|l| {
                !l.name.is_empty()
                    && !l.description.is_empty()
                    && !l.significance.is_empty()
                    && !l.visual_key.is_empty()
            })
            && !self.inhabitants.appearance.is_empty()
            && !self.inhabitants.culture_snapshot.is_empty()
            && !self.inhabitants.relationship_to_place.is_empty()
            && !self.tension.conflict.is_empty()
            && !self.tension.stakes.is_empty()
            && !self.tension.visual_manifestation.is_empty()
            && !self.hero_image_description.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_incomplete() {
        assert!(!Canon::placeholder().is_complete());
    }

    #[test]
    fn complete_requires_exactly_three_landmarks() {
        let mut canon = Canon {
            world_name: "Kaelveth".into(),
            governing_logic: "Tides obey grief, not gravity.".into(),
            aesthetic_mood: "bioluminescent dusk".into(),
            landmarks: vec![Landmark {
                name: "The Weeping Causeway".into(),
                description: "d".into(),
                significance: "s".into(),
                visual_key: "v".into(),
            }],
            inhabitants: Inhabitants {
                appearance: "a".into(),
                culture_snapshot: "c".into(),
                relationship_to_place: "r".into(),
            },
            tension: Tension {
                conflict: "c".into(),
                stakes: "s".into(),
                visual_manifestation: "v".into(),
            },
            hero_image_description: "h".into(),
        };
        assert!(!canon.is_complete());
        canon.landmarks.push(canon.landmarks[0].clone());
        canon.landmarks.push(canon.landmarks[0].clone());
        assert!(canon.is_complete());
    }
}
