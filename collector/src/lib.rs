//! Sequential per-forum collection: search, expand, select, filter, label.

mod report;

pub use report::{CollectionReport, ForumOutcome};

use labeler::Labeler;
use reddit_client::{ForumClient, RetryExecutor, RetryMetrics, RetryPolicy, SearchQuery};
use redlabel_core::{
    CommentScope, CoreError, LabelSource, Record, RedditComment, RunConfig, WorkflowConfig,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Everything one successful attempt at a forum produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForumHarvest {
    pub posts: usize,
    pub comments_examined: usize,
    pub records: Vec<Record>,
}

pub struct Collector<C> {
    client: C,
    retry: RetryExecutor,
    pause_between_forums: Duration,
    labeler: Labeler,
}

impl<C: ForumClient> Collector<C> {
    pub fn new(client: C, run: &RunConfig, labeler: Labeler) -> Self {
        Self {
            client,
            retry: RetryExecutor::new(RetryPolicy::from_run_config(run)),
            pause_between_forums: run.pause_between_forums(),
            labeler,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause_between_forums = pause;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.retry.get_metrics()
    }

    /// Run one workflow over all of its forums, in order.
    ///
    /// A forum that fails every attempt is recorded in the report and skipped.
    pub async fn run(&self, workflow: &WorkflowConfig) -> CollectionReport {
        let mut report = CollectionReport::new(&workflow.name);
        info!(
            "Starting workflow {} with query {:?}",
            workflow.name,
            workflow.query()
        );

        for (forum, label_source) in workflow.forums() {
            if !self.pause_between_forums.is_zero() {
                sleep(self.pause_between_forums).await;
            }

            let forum_name = forum.as_str();
            let operation = format!("collect r/{}", forum_name);
            let attempted = self
                .retry
                .run(&operation, move || {
                    self.collect_forum(forum_name, workflow, label_source)
                })
                .await;

            match attempted.result {
                Ok(harvest) => {
                    info!(
                        "r/{}: {} posts, {} comments examined, {} records",
                        forum_name,
                        harvest.posts,
                        harvest.comments_examined,
                        harvest.records.len()
                    );
                    report.add_harvest(forum, harvest, attempted.attempts);
                }
                Err(err) => {
                    warn!(
                        "Skipping r/{} after {} attempts: {}",
                        forum_name, attempted.attempts, err
                    );
                    report.add_failure(forum, &err, attempted.attempts);
                }
            }
        }

        info!(
            "Workflow {} finished: {} records from {} forums ({} skipped)",
            workflow.name,
            report.records.len(),
            report.forums.len(),
            report.failed_forums().count()
        );
        report
    }

    /// Collect the qualifying comments of one forum.
    pub async fn collect_forum(
        &self,
        forum: &str,
        workflow: &WorkflowConfig,
        label_source: &LabelSource,
    ) -> Result<ForumHarvest, CoreError> {
        let query = SearchQuery::new(
            workflow.query(),
            workflow.sort,
            workflow.limit_posts as usize,
        );
        let filter = workflow.comment_filter();

        let posts = self.client.search(forum, &query).await?;
        debug!("r/{} search returned {} posts", forum, posts.len());

        let mut harvest = ForumHarvest {
            posts: posts.len(),
            ..ForumHarvest::default()
        };

        for post in &posts {
            let tree = self
                .client
                .expand_comments(post, workflow.replace_more)
                .await?;

            let selected: Vec<&RedditComment> = match workflow.comment_scope {
                CommentScope::TopLevel => tree.top_level().collect(),
                CommentScope::All => tree.flatten(),
            };
            let cap = workflow.comments_per_post.unwrap_or(usize::MAX);

            let mut kept = 0;
            for comment in selected.into_iter().take(cap) {
                harvest.comments_examined += 1;
                if !filter.accepts(comment.score) {
                    continue;
                }
                let label = self.label_for(label_source, &comment.body);
                harvest.records.push(Record::from_comment(forum, post, comment, label));
                kept += 1;
            }
            debug!(
                "Post {} ({} comments): kept {}",
                post.id,
                tree.len(),
                kept
            );
        }

        Ok(harvest)
    }

    fn label_for(&self, source: &LabelSource, text: &str) -> Option<String> {
        match source {
            LabelSource::Heuristic => Some(self.labeler.label_text(text).to_string()),
            LabelSource::Static(label) => Some(label.clone()),
            LabelSource::None => None,
        }
    }
}
