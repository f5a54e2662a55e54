//! Paging through search results and expanding comment trees, written
//! against [`ListingSource`] so the walk does not depend on HTTP.

use crate::api::{CommentListing, PostListing, Thing};
use crate::comments::{self, MorePlaceholder, TreeBuilder};
use crate::SearchQuery;
use async_trait::async_trait;
use redlabel_core::{CommentTree, CoreError, RedditPost, ReplaceMore, SearchSort};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

pub const SEARCH_PAGE_SIZE: usize = 100;
/// Most ids one `morechildren` call accepts.
pub const MORE_CHILDREN_BATCH: usize = 100;

/// Raw listing calls, one request each.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn search_page(
        &self,
        forum: &str,
        query: &str,
        sort: SearchSort,
        limit: u32,
        after: Option<&str>,
    ) -> Result<PostListing, CoreError>;

    /// The initial comment listing of a post.
    async fn post_comments(&self, post_id: &str) -> Result<CommentListing, CoreError>;

    /// The listing behind a "continue this thread" link, rooted at `comment_id`.
    async fn comment_thread(&self, post_id: &str, comment_id: &str)
        -> Result<CommentListing, CoreError>;

    async fn more_children(
        &self,
        link_fullname: &str,
        children: &[String],
    ) -> Result<Vec<Thing>, CoreError>;
}

/// Up to `query.limit` posts, following the `after` cursor page by page.
pub async fn search_pages<S>(
    source: &S,
    forum: &str,
    query: &SearchQuery,
) -> Result<Vec<RedditPost>, CoreError>
where
    S: ListingSource + ?Sized,
{
    let mut posts: Vec<RedditPost> = Vec::new();
    let mut after: Option<String> = None;

    while posts.len() < query.limit {
        let page_size = (query.limit - posts.len()).min(SEARCH_PAGE_SIZE) as u32;
        let listing = source
            .search_page(forum, &query.query, query.sort, page_size, after.as_deref())
            .await?;

        let page_len = listing.data.children.len();
        posts.extend(listing.data.children.into_iter().map(|c| RedditPost::from(c.data)));
        after = listing.data.after;

        if page_len == 0 || after.is_none() {
            break;
        }
    }

    posts.truncate(query.limit);
    Ok(posts)
}

/// The comment tree of `post`, with placeholders dropped or resolved.
pub async fn expand_tree<S>(
    source: &S,
    post: &RedditPost,
    replace_more: ReplaceMore,
) -> Result<CommentTree, CoreError>
where
    S: ListingSource + ?Sized,
{
    let listing = source.post_comments(&post.id).await?;
    let (mut builder, pending) = TreeBuilder::new(listing.data.children);

    if replace_more == ReplaceMore::Drop {
        if !pending.is_empty() {
            debug!(
                "Dropped {} placeholders in post {} without resolving",
                pending.len(),
                post.id
            );
        }
        return Ok(builder.finish());
    }

    let link_fullname = post.fullname();
    let mut queue: VecDeque<MorePlaceholder> = pending.into();
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(more) = queue.pop_front() {
        if !seen.insert(format!("{}:{}", more.parent_id, more.id)) {
            continue;
        }

        let things = if more.is_continue_thread() {
            let Some(parent) = more.parent_comment_id() else {
                continue;
            };
            let listing = source.comment_thread(&post.id, parent).await?;
            comments::thread_replies(listing, parent)
        } else {
            let mut resolved = Vec::with_capacity(more.children.len());
            for batch in more.children.chunks(MORE_CHILDREN_BATCH) {
                resolved.extend(source.more_children(&link_fullname, batch).await?);
            }
            resolved
        };

        queue.extend(builder.attach(things));
    }

    debug!("Expanded post {} to {} comments", post.id, builder.len());
    Ok(builder.finish())
}
