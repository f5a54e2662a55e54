use async_trait::async_trait;
use collector::Collector;
use labeler::Labeler;
use reddit_client::{ForumClient, SearchQuery};
use redlabel_core::{
    CommentScope, CommentTree, ConfigError, CoreError, Field, ForumGroup, LabelSource,
    RecordSchema, RedditApiError, RedditComment, RedditPost, ReplaceMore, RunConfig, SearchSort,
    WorkflowConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// In-memory forum: canned posts and trees, with scripted failures.
#[derive(Default)]
struct StubForum {
    posts: HashMap<String, Vec<RedditPost>>,
    trees: HashMap<String, CommentTree>,
    search_failures: Mutex<HashMap<String, u32>>,
    expand_failures: Mutex<HashMap<String, u32>>,
    config_error_forums: Vec<String>,
    searched: Mutex<Vec<String>>,
    last_query: Mutex<Option<SearchQuery>>,
}

impl StubForum {
    fn with_post(mut self, forum: &str, post: RedditPost, roots: Vec<RedditComment>) -> Self {
        self.trees.insert(post.id.clone(), CommentTree::new(roots));
        self.posts.entry(forum.to_string()).or_default().push(post);
        self
    }

    fn failing_search(self, forum: &str, times: u32) -> Self {
        self.search_failures
            .lock()
            .unwrap()
            .insert(forum.to_string(), times);
        self
    }

    fn failing_expand(self, post_id: &str, times: u32) -> Self {
        self.expand_failures
            .lock()
            .unwrap()
            .insert(post_id.to_string(), times);
        self
    }

    fn take_failure(failures: &Mutex<HashMap<String, u32>>, key: &str) -> bool {
        let mut failures = failures.lock().unwrap();
        match failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ForumClient for StubForum {
    async fn search(&self, forum: &str, query: &SearchQuery) -> Result<Vec<RedditPost>, CoreError> {
        self.searched.lock().unwrap().push(forum.to_string());
        *self.last_query.lock().unwrap() = Some(query.clone());

        if self.config_error_forums.iter().any(|f| f == forum) {
            return Err(CoreError::Config(ConfigError::MissingField {
                field: "client_id".to_string(),
            }));
        }
        if Self::take_failure(&self.search_failures, forum) {
            return Err(CoreError::RedditApi(RedditApiError::ServerError {
                status_code: 503,
            }));
        }

        let mut posts = self.posts.get(forum).cloned().unwrap_or_default();
        posts.truncate(query.limit);
        Ok(posts)
    }

    async fn expand_comments(
        &self,
        post: &RedditPost,
        _replace_more: ReplaceMore,
    ) -> Result<CommentTree, CoreError> {
        if Self::take_failure(&self.expand_failures, &post.id) {
            return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
        }
        Ok(self.trees.get(&post.id).cloned().unwrap_or_default())
    }
}

fn post(id: &str, forum: &str) -> RedditPost {
    RedditPost {
        id: id.to_string(),
        title: format!("Post {id}"),
        subreddit: forum.to_string(),
        url: format!("https://example.com/{id}"),
        permalink: format!("/r/{forum}/comments/{id}"),
        score: 100,
        num_comments: 3,
    }
}

fn comment(id: &str, body: &str, score: i64, replies: Vec<RedditComment>) -> RedditComment {
    RedditComment {
        id: id.to_string(),
        parent_id: "t3_p".to_string(),
        body: body.to_string(),
        score,
        depth: 0,
        replies,
    }
}

fn workflow(groups: Vec<ForumGroup>) -> WorkflowConfig {
    WorkflowConfig {
        name: "test".to_string(),
        output: PathBuf::from("out.csv"),
        query_keywords: vec!["war".to_string()],
        sort: SearchSort::Relevance,
        limit_posts: 10,
        comments_per_post: None,
        score_threshold: None,
        comment_scope: CommentScope::All,
        replace_more: ReplaceMore::All,
        columns: RecordSchema::from_fields(&[Field::SubmissionId, Field::Text, Field::Label]),
        groups,
    }
}

fn group(forums: &[&str], label: LabelSource) -> ForumGroup {
    ForumGroup {
        forums: forums.iter().map(|f| f.to_string()).collect(),
        label,
    }
}

fn collector(stub: StubForum) -> Collector<StubForum> {
    let run = RunConfig {
        pause_between_forums_secs: 0,
        retry_cooldown_secs: 0,
        max_attempts: 2,
    };
    Collector::new(stub, &run, Labeler::default())
}

#[tokio::test]
async fn test_score_threshold_is_strict() {
    let stub = StubForum::default().with_post(
        "Israel",
        post("p1", "Israel"),
        vec![
            comment("a", "low", 10, vec![]),
            comment("b", "high", 30, vec![comment("b1", "edge", 25, vec![])]),
            comment("c", "also high", 26, vec![]),
        ],
    );
    let mut wf = workflow(vec![group(
        &["Israel"],
        LabelSource::Static("with israel".to_string()),
    )]);
    wf.score_threshold = Some(25);

    let report = collector(stub).run(&wf).await;

    let texts: Vec<&str> = report.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["high", "also high"]);
    assert!(report
        .records
        .iter()
        .all(|r| r.label.as_deref() == Some("with israel") && r.submission_id == "p1"));
    assert_eq!(report.forums[0].comments_examined, 4);
    assert_eq!(report.label_counts.get("with israel"), Some(&2));
}

#[tokio::test]
async fn test_retry_after_partial_failure_does_not_duplicate() {
    let stub = StubForum::default()
        .with_post("one", post("p1", "one"), vec![comment("a", "first", 5, vec![])])
        .with_post("one", post("p2", "one"), vec![comment("b", "second", 5, vec![])])
        .failing_expand("p2", 1);
    let wf = workflow(vec![group(&["one"], LabelSource::None)]);

    let collector = collector(stub);
    let report = collector.run(&wf).await;

    let texts: Vec<&str> = report.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(report.forums[0].attempts, 2);
    assert!(report.forums[0].succeeded());
    assert_eq!(collector.retry_metrics().recovered_operations, 1);
}

#[tokio::test]
async fn test_persistent_failure_skips_forum() {
    let stub = StubForum::default()
        .with_post("bad", post("p1", "bad"), vec![comment("a", "never", 50, vec![])])
        .with_post("good", post("p2", "good"), vec![comment("b", "kept", 50, vec![])])
        .failing_search("bad", 5);
    let wf = workflow(vec![group(&["bad", "good"], LabelSource::None)]);

    let collector = collector(stub);
    let report = collector.run(&wf).await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].text, "kept");
    assert_eq!(report.records[0].label, None);

    let failed: Vec<_> = report.failed_forums().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].forum, "bad");
    assert_eq!(failed[0].attempts, 2);
    assert!(failed[0].error.as_deref().unwrap().contains("503"));

    let searched = collector.client().searched.lock().unwrap().clone();
    assert_eq!(searched, vec!["bad", "bad", "good"]);
}

#[tokio::test]
async fn test_config_error_is_not_retried() {
    let stub = StubForum {
        config_error_forums: vec!["one".to_string()],
        ..StubForum::default()
    };
    let wf = workflow(vec![group(&["one"], LabelSource::None)]);

    let collector = collector(stub);
    let report = collector.run(&wf).await;

    assert_eq!(report.forums[0].attempts, 1);
    assert!(!report.forums[0].succeeded());
}

#[tokio::test]
async fn test_empty_forum_list_yields_nothing() {
    let collector = collector(StubForum::default());
    let report = collector.run(&workflow(Vec::new())).await;

    assert!(report.is_empty());
    assert!(report.forums.is_empty());
    assert!(report.label_counts.is_empty());
}

#[tokio::test]
async fn test_forum_without_posts_yields_nothing() {
    let wf = workflow(vec![group(&["quiet"], LabelSource::Heuristic)]);
    let report = collector(StubForum::default()).run(&wf).await;

    assert!(report.is_empty());
    assert_eq!(report.forums.len(), 1);
    assert_eq!(report.forums[0].posts, 0);
    assert!(report.forums[0].succeeded());
}

#[tokio::test]
async fn test_top_level_scope_with_cap_and_heuristic_labels() {
    let stub = StubForum::default().with_post(
        "worldnews",
        post("p1", "worldnews"),
        vec![
            comment("a", "I support Israel", 1, vec![comment("a1", "free palestine", 1, vec![])]),
            comment("b", "this is genocide", 1, vec![]),
            comment("c", "what a nice day", 1, vec![]),
        ],
    );
    let mut wf = workflow(vec![group(&["r/worldnews"], LabelSource::Heuristic)]);
    wf.comment_scope = CommentScope::TopLevel;
    wf.comments_per_post = Some(2);

    let collector = collector(stub);
    let report = collector.run(&wf).await;

    let labels: Vec<&str> = report
        .records
        .iter()
        .map(|r| r.label.as_deref().unwrap())
        .collect();
    assert_eq!(labels, vec!["pro_israel", "pro_palestine"]);
    assert_eq!(report.forums[0].forum, "worldnews");
    assert_eq!(report.forums[0].comments_examined, 2);
    assert_eq!(report.records[0].subreddit, "worldnews");
    assert_eq!(report.records[0].post_title, "Post p1");
}

#[tokio::test]
async fn test_search_receives_joined_query_and_limit() {
    let stub = StubForum::default()
        .with_post("one", post("p1", "one"), vec![comment("a", "x", 1, vec![])])
        .with_post("one", post("p2", "one"), vec![comment("b", "y", 1, vec![])]);
    let mut wf = workflow(vec![group(&["one"], LabelSource::None)]);
    wf.query_keywords = vec!["israel".to_string(), "gaza".to_string()];
    wf.sort = SearchSort::Top;
    wf.limit_posts = 1;

    let collector = collector(stub);
    let report = collector.run(&wf).await;

    let query = collector.client().last_query.lock().unwrap().clone().unwrap();
    assert_eq!(query.query, "israel OR gaza");
    assert_eq!(query.sort, SearchSort::Top);
    assert_eq!(query.limit, 1);
    assert_eq!(report.forums[0].posts, 1);
    assert_eq!(report.records.len(), 1);
}

#[tokio::test]
async fn test_records_use_configured_forum_name() {
    let stub = StubForum::default().with_post(
        "israelpalestine",
        post("p1", "IsraelPalestine"),
        vec![comment("a", "hello", 3, vec![])],
    );
    let wf = workflow(vec![group(&["r/israelpalestine"], LabelSource::None)]);

    let report = collector(stub).run(&wf).await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].subreddit, "israelpalestine");
    assert_eq!(report.forums[0].forum, "israelpalestine");
}
