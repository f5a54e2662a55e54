pub mod api;
pub mod comments;
pub mod fetch;
pub mod rate_limiter;
pub mod retry;


use crate::api::{CommentListing, PostListing, RedditApiClient, Thing};
use crate::fetch::ListingSource;
use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError, TokenResponse,
    TokenUrl,
};
use redlabel_core::{
    CommentTree, ConfigError, CoreError, RedditApiError, RedditCredentials, RedditPost,
    ReplaceMore, SearchSort,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use crate::rate_limiter::{RateLimitConfig, RateLimitStatus};
pub use crate::retry::{Attempted, RetryExecutor, RetryMetrics, RetryPolicy};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
/// Tokens this close to expiry are refreshed before use.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// A forum search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub sort: SearchSort,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, sort: SearchSort, limit: usize) -> Self {
        Self {
            query: query.into(),
            sort,
            limit,
        }
    }
}

/// The content-platform operations the collector depends on.
#[async_trait]
pub trait ForumClient: Send + Sync {
    /// Posts of `forum` matching the query, ranked by the platform, at most `query.limit`.
    async fn search(&self, forum: &str, query: &SearchQuery) -> Result<Vec<RedditPost>, CoreError>;

    /// The full comment tree of `post`, with placeholders handled per `replace_more`.
    async fn expand_comments(
        &self,
        post: &RedditPost,
        replace_more: ReplaceMore,
    ) -> Result<CommentTree, CoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_fresh(&self) -> bool {
        SystemTime::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Application-only Reddit client (OAuth2 client-credentials grant).
pub struct RedditClient {
    credentials: RedditCredentials,
    oauth_client: BasicClient,
    http_client: reqwest::Client,
    api: RedditApiClient,
    token: Mutex<Option<RedditToken>>,
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, CoreError> {
        Self::with_rate_limit(credentials, RateLimitConfig::reddit_oauth())
    }

    pub fn with_rate_limit(
        credentials: RedditCredentials,
        rate_config: RateLimitConfig,
    ) -> Result<Self, CoreError> {
        let oauth_client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| invalid_url("auth_url", e))?,
            Some(
                TokenUrl::new(REDDIT_TOKEN_URL.to_string())
                    .map_err(|e| invalid_url("token_url", e))?,
            ),
        );

        let http_client = reqwest::Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        let api = RedditApiClient::with_rate_limit(http_client.clone(), rate_config);

        Ok(Self {
            credentials,
            oauth_client,
            http_client,
            api,
            token: Mutex::new(None),
        })
    }

    /// Exchange credentials at `token_url` instead of Reddit's endpoint.
    pub fn with_token_url(mut self, token_url: &str) -> Result<Self, CoreError> {
        let url = TokenUrl::new(token_url.to_string()).map_err(|e| invalid_url("token_url", e))?;
        // oauth2 4.x only accepts the token URL at construction time.
        self.oauth_client = BasicClient::new(
            self.oauth_client.client_id().clone(),
            Some(ClientSecret::new(self.credentials.client_secret.clone())),
            self.oauth_client.auth_url().clone(),
            Some(url),
        );
        Ok(self)
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.lock().await = Some(token);
    }

    /// Request a fresh application token.
    pub async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        let http_client = &self.http_client;
        let status = AtomicU16::new(0);
        let response = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(|request| send_token_request(http_client, request, &status))
            .await
            .map_err(|e| {
                let status = StatusCode::from_u16(status.load(Ordering::Relaxed)).ok();
                let err = classify_token_error(e, status);
                error!("Token request failed: {}", err);
                err
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let token = RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + lifetime,
            scope: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default(),
        };

        info!("Authenticated with Reddit, token valid for {:?}", lifetime);
        Ok(token)
    }

    /// A usable bearer token, re-authenticating when the cached one is stale.
    async fn access_token(&self) -> Result<String, CoreError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        debug!("No fresh token cached, authenticating");
        let token = self.authenticate().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    /// Drop a token the server rejected so the next call re-authenticates.
    async fn invalidate_on_rejection<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            warn!("Reddit rejected the cached token, it will be re-requested");
            *self.token.lock().await = None;
        }
        result
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.api.get_rate_limit_status().await
    }
}

#[async_trait]
impl ListingSource for RedditClient {
    async fn search_page(
        &self,
        forum: &str,
        query: &str,
        sort: SearchSort,
        limit: u32,
        after: Option<&str>,
    ) -> Result<PostListing, CoreError> {
        let token = self.access_token().await?;
        self.api
            .search_posts(&token, forum, query, sort, limit, after)
            .await
    }

    async fn post_comments(&self, post_id: &str) -> Result<CommentListing, CoreError> {
        let token = self.access_token().await?;
        let (_, listing) = self.api.get_comments(&token, post_id).await?;
        Ok(listing)
    }

    async fn comment_thread(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<CommentListing, CoreError> {
        let token = self.access_token().await?;
        self.api.get_comment_thread(&token, post_id, comment_id).await
    }

    async fn more_children(
        &self,
        link_fullname: &str,
        children: &[String],
    ) -> Result<Vec<Thing>, CoreError> {
        let token = self.access_token().await?;
        self.api
            .get_more_children(&token, link_fullname, children)
            .await
    }
}

#[async_trait]
impl ForumClient for RedditClient {
    async fn search(&self, forum: &str, query: &SearchQuery) -> Result<Vec<RedditPost>, CoreError> {
        let result = fetch::search_pages(self, forum, query).await;
        self.invalidate_on_rejection(result).await
    }

    async fn expand_comments(
        &self,
        post: &RedditPost,
        replace_more: ReplaceMore,
    ) -> Result<CommentTree, CoreError> {
        let result = fetch::expand_tree(self, post, replace_more).await;
        self.invalidate_on_rejection(result).await
    }
}

fn invalid_url(field: &str, e: oauth2::url::ParseError) -> CoreError {
    CoreError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: e.to_string(),
    })
}

/// Only rejected credentials are final; transport failures and malformed
/// replies stay retryable.
fn classify_token_error(
    err: RequestTokenError<reqwest::Error, BasicErrorResponse>,
    status: Option<StatusCode>,
) -> CoreError {
    let rejected = matches!(
        status,
        Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
    );
    let api_error = match err {
        RequestTokenError::ServerResponse(response) => {
            let reason = match response.error_description() {
                Some(description) => format!("{}: {}", response.error(), description),
                None => response.error().to_string(),
            };
            match response.error() {
                BasicErrorResponseType::InvalidClient
                | BasicErrorResponseType::UnauthorizedClient
                | BasicErrorResponseType::InvalidGrant => {
                    RedditApiError::AuthenticationFailed { reason }
                }
                _ if rejected => RedditApiError::AuthenticationFailed { reason },
                _ => RedditApiError::InvalidResponse { details: reason },
            }
        }
        RequestTokenError::Request(e) if e.is_timeout() => RedditApiError::RequestTimeout,
        RequestTokenError::Request(e) => return CoreError::Network(e),
        RequestTokenError::Parse(e, _) if rejected => RedditApiError::AuthenticationFailed {
            reason: format!("token endpoint rejected the credentials ({})", e),
        },
        RequestTokenError::Parse(e, _) => RedditApiError::InvalidResponse {
            details: format!("Malformed token response: {}", e),
        },
        RequestTokenError::Other(reason) if rejected => {
            RedditApiError::AuthenticationFailed { reason }
        }
        RequestTokenError::Other(details) => RedditApiError::InvalidResponse { details },
    };
    CoreError::RedditApi(api_error)
}

/// Token exchange over the client's own HTTP stack so the request carries the
/// configured user agent. The response status is recorded in `status`.
async fn send_token_request(
    http_client: &reqwest::Client,
    request: HttpRequest,
    status: &AtomicU16,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    status.store(status_code.as_u16(), Ordering::Relaxed);
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
