use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    api::{Author, Comment, CommentId, PostId, Reply},
    RequestClient,
};

/// Message shown to the user when the thread could not be loaded
pub const FETCH_ERROR_MESSAGE: &str = "Failed to load comments";

#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_comments(&self, post: &PostId) -> anyhow::Result<Vec<Comment>>;
}

/// Fetches threads with `GET /comments?postId=...`
pub struct HttpCommentSource {
    client: Arc<RequestClient>,
}

impl HttpCommentSource {
    pub fn new(client: Arc<RequestClient>) -> HttpCommentSource {
        HttpCommentSource { client }
    }
}

#[async_trait]
impl CommentSource for HttpCommentSource {
    async fn fetch_comments(&self, post: &PostId) -> anyhow::Result<Vec<Comment>> {
        self.client
            .get("/comments", &[("postId", post.0.as_str())])
            .await
            .with_context(|| format!("fetching comments of post {post}"))
    }
}

/// Simulated round-trip time of each mutation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Latency {
    pub add: Duration,
    pub reply: Duration,
    pub like: Duration,
    pub delete: Duration,
}

impl Default for Latency {
    fn default() -> Latency {
        Latency {
            add: Duration::from_millis(500),
            reply: Duration::from_millis(500),
            like: Duration::from_millis(200),
            delete: Duration::from_millis(300),
        }
    }
}

impl Latency {
    pub fn none() -> Latency {
        Latency {
            add: Duration::ZERO,
            reply: Duration::ZERO,
            like: Duration::ZERO,
            delete: Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug)]
struct State {
    load: LoadState,
    error: Option<String>,

    /// Newest first
    comments: Vec<Comment>,
}

/// In-memory comment thread of one post
///
/// Mutations wait for their simulated latency, then apply to whatever the
/// thread looks like at that point. Nothing is ever cancelled, and two
/// identical calls apply twice.
pub struct CommentStore {
    post_id: PostId,
    author: Author,
    source: Arc<dyn CommentSource>,
    latency: Latency,
    state: Mutex<State>,
}

impl CommentStore {
    pub fn new(post_id: PostId, author: Author, source: Arc<dyn CommentSource>) -> CommentStore {
        CommentStore {
            post_id,
            author,
            source,
            latency: Latency::default(),
            state: Mutex::new(State {
                load: LoadState::Idle,
                error: None,
                comments: Vec::new(),
            }),
        }
    }

    pub fn with_latency(mut self, latency: Latency) -> CommentStore {
        self.latency = latency;
        self
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    /// Author of everything posted through this store
    pub fn current_author(&self) -> &Author {
        &self.author
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.state.lock().comments.clone()
    }

    pub fn state(&self) -> LoadState {
        self.state.lock().load
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state() == LoadState::Loading
    }

    /// (Re)loads the thread
    ///
    /// Failures are recorded in the store rather than returned; the previous
    /// comments are kept in that case.
    pub async fn fetch(&self) {
        {
            let mut state = self.state.lock();
            state.load = LoadState::Loading;
            state.error = None;
        }
        let res = self.source.fetch_comments(&self.post_id).await;
        let mut state = self.state.lock();
        match res {
            Ok(comments) => {
                tracing::debug!(post = %self.post_id, num_comments = comments.len(), "loaded comments");
                state.comments = comments;
                state.load = LoadState::Ready;
            }
            Err(err) => {
                tracing::warn!(?err, post = %self.post_id, "failed loading comments");
                state.error = Some(String::from(FETCH_ERROR_MESSAGE));
                state.load = LoadState::Error;
            }
        }
    }

    pub async fn add(&self, content: String) -> CommentId {
        let comment = Comment::now(self.author.clone(), content);
        let id = comment.id;
        tokio::time::sleep(self.latency.add).await;
        self.state.lock().comments.insert(0, comment);
        id
    }

    /// Returns `None`, leaving the thread untouched, if `parent` is not a
    /// top-level comment
    pub async fn reply(&self, parent: CommentId, content: String) -> Option<CommentId> {
        let reply = Reply::now(self.author.clone(), content);
        let id = reply.id;
        tokio::time::sleep(self.latency.reply).await;
        let mut state = self.state.lock();
        let parent = state.comments.iter_mut().find(|c| c.id == parent)?;
        parent.replies.push(reply);
        Some(id)
    }

    /// Adds one like, with no limit on how many times the same user does so
    pub async fn like(&self, id: CommentId) -> bool {
        tokio::time::sleep(self.latency.like).await;
        let mut state = self.state.lock();
        for c in state.comments.iter_mut() {
            if c.id == id {
                c.likes += 1;
                return true;
            }
            if let Some(r) = c.replies.iter_mut().find(|r| r.id == id) {
                r.likes += 1;
                return true;
            }
        }
        false
    }

    pub async fn delete(&self, id: CommentId) -> bool {
        tokio::time::sleep(self.latency.delete).await;
        let mut state = self.state.lock();
        if let Some(pos) = state.comments.iter().position(|c| c.id == id) {
            state.comments.remove(pos);
            return true;
        }
        for c in state.comments.iter_mut() {
            if let Some(pos) = c.replies.iter().position(|r| r.id == id) {
                c.replies.remove(pos);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use anyhow::anyhow;
    use chrono::Utc;

    use super::*;
    use crate::api::{UserId, Uuid};

    struct FixedSource {
        comments: Vec<Comment>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl CommentSource for FixedSource {
        async fn fetch_comments(&self, _post: &PostId) -> anyhow::Result<Vec<Comment>> {
            match self.fail.load(Ordering::SeqCst) {
                true => Err(anyhow!("network error occurred")),
                false => Ok(self.comments.clone()),
            }
        }
    }

    fn someone(name: &str) -> Author {
        Author {
            id: UserId(Uuid::new_v4()),
            name: String::from(name),
            avatar: None,
        }
    }

    fn seeded() -> Vec<Comment> {
        let mut first = Comment::now(someone("Alice Johnson"), String::from("Great example!"));
        first.likes = 5;
        first.replies.push(Reply {
            likes: 2,
            created_at: Utc::now(),
            ..Reply::now(someone("Bob Smith"), String::from("I agree!"))
        });
        let mut second = Comment::now(someone("Carol Davis"), String::from("Seamless."));
        second.likes = 3;
        vec![second, first]
    }

    fn store_with(comments: Vec<Comment>) -> (CommentStore, Arc<FixedSource>) {
        let source = Arc::new(FixedSource {
            comments,
            fail: AtomicBool::new(false),
        });
        let store = CommentStore::new(
            PostId(String::from("post-1")),
            someone("Current User"),
            source.clone(),
        )
        .with_latency(Latency::none());
        (store, source)
    }

    async fn loaded() -> CommentStore {
        let (store, _) = store_with(seeded());
        store.fetch().await;
        store
    }

    #[tokio::test]
    async fn fetch_moves_to_ready() {
        let (store, _) = store_with(seeded());
        assert_eq!(store.state(), LoadState::Idle);
        store.fetch().await;
        assert_eq!(store.state(), LoadState::Ready);
        assert_eq!(store.error(), None);
        assert_eq!(store.comments().len(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_comments() {
        let (store, source) = store_with(seeded());
        store.fetch().await;
        let before = store.comments();

        source.fail.store(true, Ordering::SeqCst);
        store.fetch().await;
        assert_eq!(store.state(), LoadState::Error);
        assert_eq!(store.error().as_deref(), Some(FETCH_ERROR_MESSAGE));
        assert_eq!(store.comments(), before);

        source.fail.store(false, Ordering::SeqCst);
        store.fetch().await;
        assert_eq!(store.state(), LoadState::Ready);
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn add_on_empty_store() {
        let (store, _) = store_with(Vec::new());
        store.fetch().await;
        let id = store.add(String::from("hello")).await;

        let comments = store.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, id);
        assert_eq!(comments[0].content, "hello");
        assert_eq!(comments[0].likes, 0);
        assert!(comments[0].replies.is_empty());
        assert_eq!(comments[0].author, *store.current_author());
    }

    #[tokio::test]
    async fn add_prepends() {
        let store = loaded().await;
        let first = store.add(String::from("one")).await;
        let second = store.add(String::from("two")).await;
        let ids = store.comments().iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids[..2], [second, first]);
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn add_then_delete_restores_thread() {
        let store = loaded().await;
        let before = store.comments();
        let id = store.add(String::from("oops")).await;
        assert!(store.delete(id).await);
        assert_eq!(store.comments(), before);
    }

    #[tokio::test]
    async fn replies_append_in_order() {
        let store = loaded().await;
        let parent = store.comments()[1].id;
        let a = store.reply(parent, String::from("a")).await.unwrap();
        let b = store.reply(parent, String::from("b")).await.unwrap();
        let replies = store.comments()[1]
            .replies
            .iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[1..], [a, b]);
    }

    #[tokio::test]
    async fn reply_to_unknown_parent_is_noop() {
        let store = loaded().await;
        let before = store.comments();
        assert_eq!(store.reply(CommentId::new(), String::from("x")).await, None);

        // replies cannot be replied to
        let nested = before[1].replies[0].id;
        assert_eq!(store.reply(nested, String::from("x")).await, None);
        assert_eq!(store.comments(), before);
    }

    #[tokio::test]
    async fn likes_accumulate() {
        let store = loaded().await;
        let top = store.comments()[0].id;
        let nested = store.comments()[1].replies[0].id;

        assert!(store.like(top).await);
        assert!(store.like(top).await);
        assert!(store.like(nested).await);
        assert!(!store.like(CommentId::new()).await);

        let comments = store.comments();
        assert_eq!(comments[0].likes, 3 + 2);
        assert_eq!(comments[1].replies[0].likes, 2 + 1);
        assert_eq!(comments[1].likes, 5);
    }

    #[tokio::test]
    async fn delete_removes_exactly_one() {
        let store = loaded().await;
        let before = store.comments();
        let nested = before[1].replies[0].id;

        assert!(store.delete(nested).await);
        let after = store.comments();
        assert_eq!(after.len(), 2);
        assert!(after[1].replies.is_empty());
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1].id, before[1].id);
        assert_eq!(after[1].content, before[1].content);

        assert!(!store.delete(nested).await);
        assert!(store.delete(before[0].id).await);
        assert_eq!(store.comments().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_mutations_all_apply() {
        let store = loaded().await;
        let target = store.comments()[0].id;
        let likes = (0..10).map(|_| store.like(target));
        let adds = (0..3).map(|i| store.add(format!("comment {i}")));
        futures::future::join(
            futures::future::join_all(likes),
            futures::future::join_all(adds),
        )
        .await;
        let comments = store.comments();
        assert_eq!(comments.len(), 5);
        assert_eq!(comments[3].likes, 3 + 10);
    }

    #[tokio::test]
    async fn mutations_wait_for_latency() {
        let (store, _) = store_with(Vec::new());
        let store = store.with_latency(Latency {
            add: Duration::from_millis(30),
            ..Latency::none()
        });
        let start = std::time::Instant::now();
        store.add(String::from("slow")).await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
