use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Normalize a subreddit name: trim whitespace and strip a leading `r/`.
pub fn normalize_forum(name: &str) -> String {
    let trimmed = name.trim();
    trimmed
        .strip_prefix("r/")
        .or_else(|| trimmed.strip_prefix("/r/"))
        .unwrap_or(trimmed)
        .to_string()
}

/// Ranking requested from the platform's search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    #[default]
    Relevance,
    Hot,
    Top,
    New,
    Comments,
}

impl SearchSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSort::Relevance => "relevance",
            SearchSort::Hot => "hot",
            SearchSort::Top => "top",
            SearchSort::New => "new",
            SearchSort::Comments => "comments",
        }
    }
}

/// What to do with "load more comments" placeholders when expanding a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceMore {
    /// Remove placeholders without fetching what they hide.
    Drop,
    /// Resolve every placeholder, however deep.
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub score: i64,
    pub num_comments: u64,
}

impl RedditPost {
    /// Fullname used by the API to reference the post (`t3_<id>`).
    pub fn fullname(&self) -> String {
        format!("t3_{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedditComment {
    pub id: String,
    /// Fullname of the parent: `t3_<post>` for root comments, `t1_<comment>` otherwise.
    pub parent_id: String,
    pub body: String,
    pub score: i64,
    pub depth: u32,
    pub replies: Vec<RedditComment>,
}

/// The comment forest of one post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree {
    pub roots: Vec<RedditComment>,
}

impl CommentTree {
    pub fn new(roots: Vec<RedditComment>) -> Self {
        Self { roots }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        fn count(comments: &[RedditComment]) -> usize {
            comments.iter().map(|c| 1 + count(&c.replies)).sum()
        }
        count(&self.roots)
    }

    pub fn top_level(&self) -> impl Iterator<Item = &RedditComment> {
        self.roots.iter()
    }

    /// Every comment in breadth-first order: all roots first, then their
    /// replies level by level.
    pub fn flatten(&self) -> Vec<&RedditComment> {
        let mut out = Vec::new();
        let mut queue: VecDeque<&RedditComment> = self.roots.iter().collect();
        while let Some(comment) = queue.pop_front() {
            queue.extend(comment.replies.iter());
            out.push(comment);
        }
        out
    }
}

/// A column-addressable field of an exported record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Text,
    Subreddit,
    PostTitle,
    Url,
    SubmissionId,
    Label,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Text => "text",
            Field::Subreddit => "subreddit",
            Field::PostTitle => "post_title",
            Field::Url => "url",
            Field::SubmissionId => "submission_id",
            Field::Label => "label",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub field: Field,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl Column {
    pub fn new(field: Field) -> Self {
        Self {
            field,
            header: None,
        }
    }

    pub fn renamed(field: Field, header: impl Into<String>) -> Self {
        Self {
            field,
            header: Some(header.into()),
        }
    }

    pub fn header(&self) -> &str {
        self.header.as_deref().unwrap_or_else(|| self.field.name())
    }
}

/// Ordered column list shared by every row of one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSchema {
    columns: Vec<Column>,
}

impl RecordSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn from_fields(fields: &[Field]) -> Self {
        Self::new(fields.iter().copied().map(Column::new).collect())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(Column::header).collect()
    }

    /// Project a record into row values in column order.
    pub fn row<'a>(&self, record: &'a Record) -> Vec<&'a str> {
        self.columns.iter().map(|c| record.get(c.field)).collect()
    }
}

/// One normalized output row produced from a qualifying comment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub text: String,
    pub subreddit: String,
    pub post_title: String,
    pub url: String,
    pub submission_id: String,
    pub label: Option<String>,
}

impl Record {
    /// `forum` is the subreddit as configured, which is what the row reports
    /// regardless of how the platform spells it on the post.
    pub fn from_comment(
        forum: &str,
        post: &RedditPost,
        comment: &RedditComment,
        label: Option<String>,
    ) -> Self {
        Self {
            text: comment.body.clone(),
            subreddit: forum.to_string(),
            post_title: post.title.clone(),
            url: post.url.clone(),
            submission_id: post.id.clone(),
            label,
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Text => &self.text,
            Field::Subreddit => &self.subreddit,
            Field::PostTitle => &self.post_title,
            Field::Url => &self.url,
            Field::SubmissionId => &self.submission_id,
            Field::Label => self.label.as_deref().unwrap_or(""),
        }
    }
}

/// Closed set of heuristic stance labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    GroupA,
    GroupB,
    Neutral,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::GroupA, Label::GroupB, Label::Neutral];
}
