// SPDX-License-Identifier: MIT OR Apache-2.0
//! The downstream image-prompt pack generated from a completed [`crate::canon::Canon`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single image-generation prompt entry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PromptEntry {
    /// Short human-readable title for this prompt.
    pub title: String,
    /// The prompt text itself.
    pub prompt: String,
    /// Optional negative prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Optional aspect ratio hint (e.g. `"16:9"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

/// The full set of image prompts generated for one team's completed canon.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PromptPack {
    /// The single hero image prompt.
    pub hero_image: PromptEntry,
    /// Exactly 3 landmark prompts, one per landmark, position-significant.
    pub landmark_triptych: Vec<PromptEntry>,
    /// The inhabitant portrait prompt.
    pub inhabitant_portrait: PromptEntry,
    /// The tension snapshot prompt.
    pub tension_snapshot: PromptEntry,
}

impl PromptPack {
    /// Returns `true` if this pack has exactly 3 landmark prompts and no
    /// field is empty, the shape required before `prompt_pack_generated`
    /// may be emitted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.landmark_triptych.len() == 3
            && !self.hero_image.prompt.is_empty()
            && !self.inhabitant_portrait.prompt.is_empty()
            && !self.tension_snapshot.prompt.is_empty()
            && self.landmark_triptych.iter().all(|p| !p.prompt.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> PromptEntry {
        PromptEntry {
            title: title.into(),
            prompt: format!("{title} prompt"),
            negative_prompt: None,
            aspect_ratio: None,
        }
    }

    #[test]
    fn requires_exactly_three_landmarks() {
        let mut pack = PromptPack {
            hero_image: entry("hero"),
            landmark_triptych: vec![entry("l1"), entry("l2")],
            inhabitant_portrait: entry("portrait"),
            tension_snapshot: entry("tension"),
        };
        assert!(!pack.is_valid());
        pack.landmark_triptych.push(entry("l3"));
        assert!(pack.is_valid());
    }
}
