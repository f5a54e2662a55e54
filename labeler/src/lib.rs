//! Keyword-based stance labeling.
//!
//! A comment is scored against two phrase lists; each phrase found as a
//! contiguous substring of the lower-cased text adds one point to its group,
//! however often it repeats. The higher score wins, and equal scores (zero
//! included) fall back to the neutral label.

use redlabel_core::{KeywordGroup, Label, LabelerConfig};
use serde::Serialize;
use tracing::debug;

/// Per-group phrase hits for one text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelScores {
    pub group_a: usize,
    pub group_b: usize,
}

impl LabelScores {
    /// Both groups matched equally often, with at least one hit each.
    pub fn is_tie(&self) -> bool {
        self.group_a == self.group_b && self.group_a > 0
    }

    pub fn has_signal(&self) -> bool {
        self.group_a > 0 || self.group_b > 0
    }

    pub fn label(&self) -> Label {
        use std::cmp::Ordering;
        match self.group_a.cmp(&self.group_b) {
            Ordering::Greater => Label::GroupA,
            Ordering::Less => Label::GroupB,
            Ordering::Equal => Label::Neutral,
        }
    }
}

#[derive(Debug, Clone)]
struct PhraseSet {
    name: String,
    phrases: Vec<String>,
}

impl PhraseSet {
    fn from_group(group: &KeywordGroup) -> Self {
        Self {
            name: group.name.clone(),
            phrases: group
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn hits(&self, lowered: &str) -> usize {
        self.phrases
            .iter()
            .filter(|phrase| lowered.contains(phrase.as_str()))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct Labeler {
    neutral: String,
    group_a: PhraseSet,
    group_b: PhraseSet,
}

impl Default for Labeler {
    fn default() -> Self {
        Self::new(&LabelerConfig::default())
    }
}

impl Labeler {
    pub fn new(config: &LabelerConfig) -> Self {
        let labeler = Self {
            neutral: config.neutral.clone(),
            group_a: PhraseSet::from_group(&config.group_a),
            group_b: PhraseSet::from_group(&config.group_b),
        };
        debug!(
            "Labeler ready: {} '{}' phrases, {} '{}' phrases",
            labeler.group_a.phrases.len(),
            labeler.group_a.name,
            labeler.group_b.phrases.len(),
            labeler.group_b.name
        );
        labeler
    }

    pub fn score(&self, text: &str) -> LabelScores {
        let lowered = text.to_lowercase();
        LabelScores {
            group_a: self.group_a.hits(&lowered),
            group_b: self.group_b.hits(&lowered),
        }
    }

    pub fn label(&self, text: &str) -> Label {
        self.score(text).label()
    }

    /// The configured name written to output for `label`.
    pub fn label_name(&self, label: Label) -> &str {
        match label {
            Label::GroupA => &self.group_a.name,
            Label::GroupB => &self.group_b.name,
            Label::Neutral => &self.neutral,
        }
    }

    /// Label `text` and return the configured name in one step.
    pub fn label_text(&self, text: &str) -> &str {
        self.label_name(self.label(text))
    }
}
