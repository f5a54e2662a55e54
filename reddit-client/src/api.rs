use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use redlabel_core::{CoreError, RedditApiError, RedditPost, SearchSort};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<T>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

pub type PostListing = RedditListing<RedditListingChild<RedditPostData>>;
pub type CommentListing = RedditListing<Thing>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub is_self: bool,
}

/// An entry of a comment listing: a real comment or a "load more" placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Thing {
    #[serde(rename = "t1")]
    Comment(RedditCommentData),
    #[serde(rename = "more")]
    More(RedditMoreData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub link_id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub replies: Replies,
}

/// The API sends `""` for a comment without replies and a listing otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Replies {
    Listing(Box<CommentListing>),
    Empty(String),
}

impl Default for Replies {
    fn default() -> Self {
        Replies::Empty(String::new())
    }
}

impl Replies {
    pub fn into_things(self) -> Vec<Thing> {
        match self {
            Replies::Listing(listing) => listing.data.children,
            Replies::Empty(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditMoreData {
    pub id: String,
    pub parent_id: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenResponse {
    json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenJson {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    #[serde(default)]
    data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenData {
    #[serde(default)]
    things: Vec<Thing>,
}

/// Map a non-success status to the API error it stands for.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, endpoint: &str) -> RedditApiError {
    match status.as_u16() {
        429 => {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(60);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => {
            let mut segments = endpoint.trim_start_matches('/').split('/');
            match (segments.next(), segments.next()) {
                (Some("r"), Some(subreddit)) => RedditApiError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                },
                (Some("comments"), Some(post_id)) => RedditApiError::PostNotFound {
                    post_id: post_id.to_string(),
                },
                _ => RedditApiError::InvalidResponse {
                    details: format!("Resource not found: {}", endpoint),
                },
            }
        }
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        },
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
}

impl RedditApiClient {
    /// The client must already carry the user agent Reddit requires.
    pub fn with_rate_limit(http_client: Client, rate_config: RateLimitConfig) -> Self {
        Self {
            http_client,
            rate_limiter: RateLimiter::new(rate_config),
        }
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);
        let start_time = Instant::now();

        let permit = self.rate_limiter.acquire_permit().await;
        if permit.queue_wait_time > Duration::from_millis(500) {
            debug!(
                "Waited {:?} for a rate limit permit for {}",
                permit.queue_wait_time, endpoint
            );
        }

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(&[("raw_json", "1")]);
        if !query_params.is_empty() {
            request_builder = request_builder.query(query_params);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        self.rate_limiter.observe_headers(response.headers()).await;

        let status = response.status();
        if !status.is_success() {
            let api_error = classify_status(status, response.headers(), endpoint);
            if let RedditApiError::RateLimitExceeded { retry_after } = &api_error {
                warn!("Rate limited, retry after {} seconds", retry_after);
            } else {
                error!("Request failed with status: {} for {}", status, endpoint);
            }
            return Err(CoreError::RedditApi(api_error));
        }

        debug!(
            "Request successful: {} {} in {:?}",
            status,
            endpoint,
            start_time.elapsed()
        );
        Ok(response)
    }

    /// One page of a subreddit search.
    pub async fn search_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        query: &str,
        sort: SearchSort,
        limit: u32,
        after: Option<&str>,
    ) -> Result<PostListing, CoreError> {
        let endpoint = format!("/r/{}/search", subreddit);
        let limit_str = limit.to_string();
        let mut params = vec![
            ("q", query),
            ("restrict_sr", "on"),
            ("sort", sort.as_str()),
            ("t", "all"),
            ("limit", limit_str.as_str()),
        ];
        if let Some(after_val) = after {
            params.push(("after", after_val));
        }

        let response = self
            .make_request(Method::GET, &endpoint, access_token, &params)
            .await?;

        let listing: PostListing = response.json().await.map_err(|e| {
            error!("Failed to parse search results: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse search results for r/{}", subreddit),
            })
        })?;

        debug!(
            "Retrieved {} posts from r/{} search",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }

    /// The post and its initial comment listing.
    pub async fn get_comments(
        &self,
        access_token: &str,
        post_id: &str,
    ) -> Result<(PostListing, CommentListing), CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        self.fetch_comment_listing(&endpoint, access_token).await
    }

    /// The listing behind a "continue this thread" placeholder, rooted at `comment_id`.
    pub async fn get_comment_thread(
        &self,
        access_token: &str,
        post_id: &str,
        comment_id: &str,
    ) -> Result<CommentListing, CoreError> {
        let endpoint = format!("/comments/{}/_/{}", post_id, comment_id);
        let (_, comments) = self.fetch_comment_listing(&endpoint, access_token).await?;
        Ok(comments)
    }

    /// Resolve a batch of hidden comment ids (at most 100 per call).
    pub async fn get_more_children(
        &self,
        access_token: &str,
        link_fullname: &str,
        children: &[String],
    ) -> Result<Vec<Thing>, CoreError> {
        let joined = children.join(",");
        let params = [
            ("api_type", "json"),
            ("link_id", link_fullname),
            ("children", joined.as_str()),
        ];

        let response = self
            .make_request(Method::GET, "/api/morechildren", access_token, &params)
            .await?;

        let parsed: MoreChildrenResponse = response.json().await.map_err(|e| {
            error!("Failed to parse morechildren response: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse more comments for {}", link_fullname),
            })
        })?;

        if !parsed.json.errors.is_empty() {
            return Err(CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("morechildren errors: {:?}", parsed.json.errors),
            }));
        }

        let things = parsed.json.data.map(|d| d.things).unwrap_or_default();
        debug!(
            "Resolved {} of {} hidden comments for {}",
            things.len(),
            children.len(),
            link_fullname
        );
        Ok(things)
    }

    async fn fetch_comment_listing(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<(PostListing, CommentListing), CoreError> {
        let response = self
            .make_request(Method::GET, endpoint, access_token, &[])
            .await?;

        let listings: (PostListing, CommentListing) = response.json().await.map_err(|e| {
            error!("Failed to parse comment listing: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comments at {}", endpoint),
            })
        })?;

        info!(
            "Retrieved {} top-level entries from {}",
            listings.1.data.children.len(),
            endpoint
        );
        Ok(listings)
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            subreddit: post_data.subreddit,
            url: post_data.url,
            permalink: post_data.permalink,
            score: post_data.score,
            num_comments: post_data.num_comments,
        }
    }
}
