//! Startup configuration.
//!
//! Everything the collection run needs (forums, query keywords, limits, score
//! thresholds, labeler keyword lists) lives in [`CollectorConfig`]. The
//! defaults reproduce the two stock workflows, so a run without a config
//! file still does something useful once credentials are present.

use crate::error::ConfigError;
use crate::types::{normalize_forum, Column, Field, RecordSchema, ReplaceMore, SearchSort};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_USER_AGENT: &str = "REDDIT_USER_AGENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub run: RunConfig,
    pub labeler: LabelerConfig,
    pub credentials: CredentialsConfig,
    pub workflows: WorkflowList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowList(pub Vec<WorkflowConfig>);

impl Default for WorkflowList {
    fn default() -> Self {
        Self(vec![
            WorkflowConfig::auto_labeled(),
            WorkflowConfig::war_comments(),
        ])
    }
}

impl std::ops::Deref for WorkflowList {
    type Target = Vec<WorkflowConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Courtesy pause before every forum visit.
    pub pause_between_forums_secs: u64,
    /// Cool-down before retrying a forum that failed.
    pub retry_cooldown_secs: u64,
    /// Total attempts per forum, the first one included.
    pub max_attempts: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pause_between_forums_secs: 2,
            retry_cooldown_secs: 120,
            max_attempts: 2,
        }
    }
}

impl RunConfig {
    pub fn pause_between_forums(&self) -> Duration {
        Duration::from_secs(self.pause_between_forums_secs)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    pub neutral: String,
    pub group_a: KeywordGroup,
    pub group_b: KeywordGroup,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            neutral: "neutral".to_string(),
            group_a: KeywordGroup {
                name: "pro_israel".to_string(),
                keywords: strings(&[
                    "idf",
                    "hamas is a terrorist",
                    "support israel",
                    "stand with israel",
                    "defend israel",
                    "anti-semitism",
                    "hezbollah",
                    "rockets from gaza",
                    "terrorist",
                ]),
            },
            group_b: KeywordGroup {
                name: "pro_palestine".to_string(),
                keywords: strings(&[
                    "free palestine",
                    "end the occupation",
                    "zionist",
                    "genocide",
                    "apartheid",
                    "israel is the aggressor",
                    "resistance",
                    "colonialism",
                    "israeli war crimes",
                ]),
            },
        }
    }
}

/// Credentials as written in the config file. Environment variables win.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
}

/// Opaque application credentials for the Reddit API.
#[derive(Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl CredentialsConfig {
    /// Resolve credentials from the process environment (and `.env`), falling
    /// back to the config file values.
    pub fn resolve(&self) -> Result<RedditCredentials, ConfigError> {
        self.resolve_with(|key| dotenvy::var(key).ok())
    }

    pub fn resolve_with<F>(&self, lookup: F) -> Result<RedditCredentials, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |var_name: &str, file_value: &Option<String>| {
            lookup(var_name)
                .or_else(|| file_value.clone())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                    var_name: var_name.to_string(),
                })
        };

        Ok(RedditCredentials {
            client_id: pick(ENV_CLIENT_ID, &self.client_id)?,
            client_secret: pick(ENV_CLIENT_SECRET, &self.client_secret)?,
            user_agent: pick(ENV_USER_AGENT, &self.user_agent)?,
        })
    }
}

/// Which comments of an expanded tree are examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentScope {
    /// Root comments only, in tree order.
    TopLevel,
    /// Every comment, breadth-first.
    #[default]
    All,
}

/// Per-comment predicate applied before a record is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentFilter {
    #[default]
    None,
    /// Keep comments whose score is strictly greater than the threshold.
    ScoreAbove(i64),
}

impl CommentFilter {
    pub fn accepts(&self, score: i64) -> bool {
        match self {
            CommentFilter::None => true,
            CommentFilter::ScoreAbove(threshold) => score > *threshold,
        }
    }
}

/// Where a forum group's records get their label from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Keyword-scoring labeler.
    Heuristic,
    /// Leave the label column empty.
    #[default]
    None,
    /// The same caller-supplied label for every record of the group.
    Static(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumGroup {
    #[serde(alias = "subreddits")]
    pub forums: Vec<String>,
    #[serde(default)]
    pub label: LabelSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    pub output: PathBuf,
    #[serde(alias = "keywords")]
    pub query_keywords: Vec<String>,
    #[serde(default)]
    pub sort: SearchSort,
    pub limit_posts: u32,
    #[serde(default)]
    pub comments_per_post: Option<usize>,
    #[serde(default)]
    pub score_threshold: Option<i64>,
    #[serde(default)]
    pub comment_scope: CommentScope,
    #[serde(default)]
    pub replace_more: ReplaceMore,
    pub columns: RecordSchema,
    #[serde(default)]
    pub groups: Vec<ForumGroup>,
}

impl WorkflowConfig {
    /// Keyword-labeled sample of top posts across general news forums.
    pub fn auto_labeled() -> Self {
        Self {
            name: "auto_labeled".to_string(),
            output: PathBuf::from("reddit_comments_auto_labeled.csv"),
            query_keywords: strings(&[
                "israel",
                "palestine",
                "gaza",
                "idf",
                "hamas",
                "zionism",
                "occupation",
            ]),
            sort: SearchSort::Top,
            limit_posts: 50,
            comments_per_post: Some(20),
            score_threshold: None,
            comment_scope: CommentScope::TopLevel,
            replace_more: ReplaceMore::Drop,
            columns: RecordSchema::from_fields(&[
                Field::Text,
                Field::Subreddit,
                Field::PostTitle,
                Field::Url,
                Field::Label,
            ]),
            groups: vec![ForumGroup {
                forums: strings(&["israel", "palestine", "worldnews", "news", "politics"]),
                label: LabelSource::Heuristic,
            }],
        }
    }

    /// Popular comments on "war" posts, labeled by the community they came from.
    pub fn war_comments() -> Self {
        Self {
            name: "war_comments".to_string(),
            output: PathBuf::from("self_collected_war_subreddit_comments.csv"),
            query_keywords: strings(&["war"]),
            sort: SearchSort::Relevance,
            limit_posts: 10_000,
            comments_per_post: None,
            score_threshold: Some(25),
            comment_scope: CommentScope::All,
            replace_more: ReplaceMore::All,
            columns: RecordSchema::new(vec![
                Column::new(Field::SubmissionId),
                Column::renamed(Field::Text, "comment_body"),
                Column::new(Field::Label),
            ]),
            groups: vec![
                ForumGroup {
                    forums: strings(&["Israel", "Jewish", "Judaism", "IDF"]),
                    label: LabelSource::Static("with israel".to_string()),
                },
                ForumGroup {
                    forums: strings(&["Palestine", "MiddleEastNews", "AskMiddleEast", "Gaza"]),
                    label: LabelSource::Static("with palestine".to_string()),
                },
            ],
        }
    }

    /// Search query sent to every forum: the keywords joined with `OR`.
    pub fn query(&self) -> String {
        self.query_keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    pub fn comment_filter(&self) -> CommentFilter {
        match self.score_threshold {
            Some(threshold) => CommentFilter::ScoreAbove(threshold),
            None => CommentFilter::None,
        }
    }

    /// All forums of all groups, in visiting order, with their label source.
    pub fn forums(&self) -> impl Iterator<Item = (String, &LabelSource)> {
        self.groups.iter().flat_map(|group| {
            group
                .forums
                .iter()
                .map(move |forum| (normalize_forum(forum), &group.label))
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "workflows.name".to_string(),
            });
        }
        if self.query().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: format!("workflow '{}' has no query keywords", self.name),
            });
        }
        if self.limit_posts == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.limit_posts", self.name),
                value: "0".to_string(),
            });
        }
        if self.comments_per_post == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.comments_per_post", self.name),
                value: "0".to_string(),
            });
        }
        if self.columns.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: format!("workflow '{}' declares no columns", self.name),
            });
        }
        let mut headers = HashSet::new();
        for header in self.columns.headers() {
            if !headers.insert(header) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("workflow '{}' repeats column '{}'", self.name, header),
                });
            }
        }
        for (forum, label) in self.forums() {
            if forum.is_empty() {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("workflow '{}' lists an empty forum name", self.name),
                });
            }
            if matches!(label, LabelSource::Static(name) if name.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.groups.label", self.name),
                    value: String::new(),
                });
            }
        }
        Ok(())
    }
}

impl LabelerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let names = [&self.neutral, &self.group_a.name, &self.group_b.name];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                field: "labeler.name".to_string(),
            });
        }
        if names.iter().collect::<HashSet<_>>().len() != names.len() {
            return Err(ConfigError::ValidationFailed {
                reason: "labeler label names must be distinct".to_string(),
            });
        }

        let lowered = |group: &KeywordGroup| -> Result<HashSet<String>, ConfigError> {
            group
                .keywords
                .iter()
                .map(|k| {
                    let k = k.trim().to_lowercase();
                    if k.is_empty() {
                        Err(ConfigError::InvalidValue {
                            field: format!("labeler.{}.keywords", group.name),
                            value: String::new(),
                        })
                    } else {
                        Ok(k)
                    }
                })
                .collect()
        };
        let a = lowered(&self.group_a)?;
        let b = lowered(&self.group_b)?;
        if let Some(shared) = a.intersection(&b).next() {
            return Err(ConfigError::ValidationFailed {
                reason: format!("keyword '{}' appears in both labeler groups", shared),
            });
        }
        Ok(())
    }
}

impl CollectorConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: CollectorConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::ReadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            }
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Load from `path` when given, otherwise use the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "run.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        if self.workflows.is_empty() {
            return Err(ConfigError::MissingField {
                field: "workflows".to_string(),
            });
        }
        let mut names = HashSet::new();
        for workflow in self.workflows.iter() {
            workflow.validate()?;
            if !names.insert(workflow.name.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("workflow name '{}' is used twice", workflow.name),
                });
            }
        }
        self.labeler.validate()
    }

    pub fn workflow(&self, name: &str) -> Option<&WorkflowConfig> {
        self.workflows.iter().find(|w| w.name == name)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
