use crate::ForumHarvest;
use redlabel_core::{CoreError, Record};
use std::collections::BTreeMap;

/// How one forum fared during a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct ForumOutcome {
    pub forum: String,
    pub posts: usize,
    pub comments_examined: usize,
    pub records: usize,
    pub attempts: u32,
    /// Final error when every attempt failed.
    pub error: Option<String>,
}

impl ForumOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one workflow run: the records in visiting order plus per-forum stats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionReport {
    pub workflow: String,
    pub records: Vec<Record>,
    pub forums: Vec<ForumOutcome>,
    /// Number of records per label value; unlabeled records are not counted.
    pub label_counts: BTreeMap<String, usize>,
}

impl CollectionReport {
    pub fn new(workflow: &str) -> Self {
        Self {
            workflow: workflow.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn add_harvest(&mut self, forum: String, harvest: ForumHarvest, attempts: u32) {
        for record in &harvest.records {
            if let Some(label) = &record.label {
                *self.label_counts.entry(label.clone()).or_default() += 1;
            }
        }

        self.forums.push(ForumOutcome {
            forum,
            posts: harvest.posts,
            comments_examined: harvest.comments_examined,
            records: harvest.records.len(),
            attempts,
            error: None,
        });
        self.records.extend(harvest.records);
    }

    pub(crate) fn add_failure(&mut self, forum: String, error: &CoreError, attempts: u32) {
        self.forums.push(ForumOutcome {
            forum,
            posts: 0,
            comments_examined: 0,
            records: 0,
            attempts,
            error: Some(error.to_string()),
        });
    }

    pub fn failed_forums(&self) -> impl Iterator<Item = &ForumOutcome> {
        self.forums.iter().filter(|outcome| !outcome.succeeded())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
