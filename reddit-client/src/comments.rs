//! Turning comment listings into a [`CommentTree`] and tracking the
//! "load more" placeholders that still need resolving.

use crate::api::{CommentListing, RedditCommentData, RedditMoreData, Thing};
use redlabel_core::{CommentTree, RedditComment};
use std::collections::HashMap;
use tracing::debug;

/// A "load more comments" node found while building a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorePlaceholder {
    pub id: String,
    pub parent_id: String,
    pub children: Vec<String>,
}

impl MorePlaceholder {
    /// "Continue this thread" links carry no child ids; what they hide is
    /// fetched through the parent comment's permalink instead.
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }

    /// Id of the parent comment, when the placeholder hangs under a comment.
    pub fn parent_comment_id(&self) -> Option<&str> {
        self.parent_id.strip_prefix("t1_")
    }
}

impl From<RedditMoreData> for MorePlaceholder {
    fn from(more: RedditMoreData) -> Self {
        Self {
            id: more.id,
            parent_id: more.parent_id,
            children: more.children,
        }
    }
}

/// Grows a post's comment tree as hidden comments are resolved.
///
/// Every comment is indexed by the child positions leading to it from the
/// roots, so attaching under a known parent never scans the tree.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: CommentTree,
    paths: HashMap<String, Vec<usize>>,
}

impl TreeBuilder {
    /// Start from the initial listing of a post, returning the placeholders it contained.
    pub fn new(things: Vec<Thing>) -> (Self, Vec<MorePlaceholder>) {
        let mut builder = Self::default();
        let pending = builder.attach(things);
        (builder, pending)
    }

    /// Attach resolved comments under their parents, returning any new placeholders.
    ///
    /// Comments whose parent is the post, or is not in the tree, become roots.
    /// A comment already in the tree is not added twice.
    pub fn attach(&mut self, things: Vec<Thing>) -> Vec<MorePlaceholder> {
        let mut pending = Vec::new();
        for thing in things {
            match thing {
                Thing::Comment(data) => {
                    let comment = into_comment(data, &mut pending);
                    self.insert(comment);
                }
                Thing::More(more) => pending.push(more.into()),
            }
        }
        pending
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn tree(&self) -> &CommentTree {
        &self.tree
    }

    pub fn finish(self) -> CommentTree {
        self.tree
    }

    fn insert(&mut self, comment: RedditComment) {
        if self.paths.contains_key(&comment.id) {
            debug!("Comment {} already in tree, skipping", comment.id);
            return;
        }

        let parent_path = comment
            .parent_id
            .strip_prefix("t1_")
            .and_then(|parent| self.paths.get(parent))
            .cloned()
            .unwrap_or_default();

        let Some(siblings) = children_mut(&mut self.tree.roots, &parent_path) else {
            return;
        };
        let mut path = parent_path;
        path.push(siblings.len());
        index_subtree(&mut self.paths, &comment, path);
        siblings.push(comment);
    }
}

/// The reply list reached by following `path` from the roots.
fn children_mut<'a>(
    roots: &'a mut Vec<RedditComment>,
    path: &[usize],
) -> Option<&'a mut Vec<RedditComment>> {
    let mut level = roots;
    for &index in path {
        level = &mut level.get_mut(index)?.replies;
    }
    Some(level)
}

fn index_subtree(paths: &mut HashMap<String, Vec<usize>>, comment: &RedditComment, path: Vec<usize>) {
    for (index, reply) in comment.replies.iter().enumerate() {
        let mut child = path.clone();
        child.push(index);
        index_subtree(paths, reply, child);
    }
    paths.insert(comment.id.clone(), path);
}

/// The replies of `parent_id` inside a "continue this thread" listing.
pub fn thread_replies(listing: CommentListing, parent_id: &str) -> Vec<Thing> {
    listing
        .data
        .children
        .into_iter()
        .find_map(|thing| match thing {
            Thing::Comment(comment) if comment.id == parent_id => Some(comment.replies),
            _ => None,
        })
        .map(|replies| replies.into_things())
        .unwrap_or_default()
}

fn convert(things: Vec<Thing>, pending: &mut Vec<MorePlaceholder>) -> Vec<RedditComment> {
    let mut comments = Vec::with_capacity(things.len());
    for thing in things {
        match thing {
            Thing::Comment(data) => comments.push(into_comment(data, pending)),
            Thing::More(more) => pending.push(more.into()),
        }
    }
    comments
}

fn into_comment(data: RedditCommentData, pending: &mut Vec<MorePlaceholder>) -> RedditComment {
    let replies = convert(data.replies.into_things(), pending);
    RedditComment {
        id: data.id,
        parent_id: data.parent_id,
        body: data.body,
        score: data.score,
        depth: data.depth,
        replies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST_COMMENTS: &str = r#"{
        "kind": "Listing",
        "data": {
            "children": [
                {"kind": "t1", "data": {
                    "id": "c1", "parent_id": "t3_p1", "body": "root one", "score": 30, "depth": 0,
                    "replies": {"kind": "Listing", "data": {"children": [
                        {"kind": "t1", "data": {"id": "c2", "parent_id": "t1_c1", "body": "reply", "score": 5, "depth": 1, "replies": ""}},
                        {"kind": "more", "data": {"id": "_", "parent_id": "t1_c2", "count": 0, "depth": 2, "children": []}}
                    ]}}
                }},
                {"kind": "t1", "data": {"id": "c3", "parent_id": "t3_p1", "body": "root two", "score": 26, "depth": 0, "replies": ""}},
                {"kind": "more", "data": {"id": "m1", "parent_id": "t3_p1", "count": 2, "depth": 0, "children": ["c4", "c5"]}}
            ]
        }
    }"#;

    fn listing() -> CommentListing {
        serde_json::from_str(POST_COMMENTS).unwrap()
    }

    fn comment_thing(id: &str, parent: &str) -> Thing {
        serde_json::from_value(serde_json::json!({
            "kind": "t1",
            "data": {"id": id, "parent_id": parent, "body": format!("body {id}"), "score": 1, "replies": ""}
        }))
        .unwrap()
    }

    #[test]
    fn test_new_builder_collects_placeholders() {
        let (builder, pending) = TreeBuilder::new(listing().data.children);
        let tree = builder.tree();

        assert_eq!(tree.roots.len(), 2);
        assert_eq!(builder.len(), 3);
        assert_eq!(tree.roots[0].replies[0].body, "reply");

        assert_eq!(pending.len(), 2);
        let continue_thread = pending.iter().find(|p| p.is_continue_thread()).unwrap();
        assert_eq!(continue_thread.parent_comment_id(), Some("c2"));
        let more = pending.iter().find(|p| !p.is_continue_thread()).unwrap();
        assert_eq!(more.children, vec!["c4".to_string(), "c5".to_string()]);
        assert_eq!(more.parent_comment_id(), None);
    }

    #[test]
    fn test_attach_resolved_children() {
        let (mut builder, _) = TreeBuilder::new(listing().data.children);
        let resolved: Vec<Thing> = serde_json::from_str(
            r#"[
                {"kind": "t1", "data": {"id": "c4", "parent_id": "t3_p1", "body": "late root", "score": 1, "replies": ""}},
                {"kind": "t1", "data": {"id": "c5", "parent_id": "t1_c3", "body": "late reply", "score": 2, "replies": ""}},
                {"kind": "more", "data": {"id": "m9", "parent_id": "t1_c5", "count": 1, "children": ["c6"]}}
            ]"#,
        )
        .unwrap();

        let pending = builder.attach(resolved);
        let tree = builder.finish();

        assert_eq!(tree.roots.len(), 3);
        assert_eq!(tree.roots[1].replies[0].id, "c5");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].children, vec!["c6".to_string()]);
    }

    #[test]
    fn test_attach_finds_parents_in_nested_and_late_subtrees() {
        let (mut builder, _) = TreeBuilder::new(listing().data.children);

        // c2 came nested in the initial listing; c8 arrives later and gets its own reply.
        builder.attach(vec![comment_thing("c8", "t1_c2")]);
        builder.attach(vec![comment_thing("c9", "t1_c8"), comment_thing("c10", "t1_c1")]);

        let tree = builder.tree();
        let c2 = &tree.roots[0].replies[0];
        assert_eq!(c2.replies[0].id, "c8");
        assert_eq!(c2.replies[0].replies[0].id, "c9");
        assert_eq!(tree.roots[0].replies[1].id, "c10");
        assert_eq!(builder.len(), tree.len());
    }

    #[test]
    fn test_orphans_become_roots_and_duplicates_are_skipped() {
        let (mut builder, _) = TreeBuilder::new(Vec::new());
        assert!(builder.is_empty());

        builder.attach(vec![comment_thing("x", "t1_missing")]);
        builder.attach(vec![comment_thing("x", "t1_missing"), comment_thing("y", "t1_x")]);

        let tree = builder.finish();
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.roots[0].replies[0].id, "y");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_long_reply_chain_attaches_to_deepest_comment() {
        let (mut builder, _) = TreeBuilder::new(vec![comment_thing("n0", "t3_p1")]);
        for depth in 1..500 {
            let parent = format!("t1_n{}", depth - 1);
            builder.attach(vec![comment_thing(&format!("n{depth}"), &parent)]);
        }

        assert_eq!(builder.len(), 500);
        let tree = builder.finish();
        assert_eq!(tree.roots.len(), 1);
        let mut node = &tree.roots[0];
        let mut depth = 0;
        while let Some(next) = node.replies.first() {
            node = next;
            depth += 1;
        }
        assert_eq!(depth, 499);
        assert_eq!(node.id, "n499");
    }

    #[test]
    fn test_thread_replies_extracts_hidden_comments() {
        let thread: CommentListing = serde_json::from_str(
            r#"{"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {"id": "c2", "parent_id": "t1_c1", "body": "reply", "score": 5,
                  "replies": {"kind": "Listing", "data": {"children": [
                      {"kind": "t1", "data": {"id": "c7", "parent_id": "t1_c2", "body": "deep", "score": 40, "replies": ""}}
                  ]}}}}
            ]}}"#,
        )
        .unwrap();

        let replies = thread_replies(thread, "c2");
        assert_eq!(replies.len(), 1);
        assert!(matches!(&replies[0], Thing::Comment(c) if c.id == "c7"));
    }
}
