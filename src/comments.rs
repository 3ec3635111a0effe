//! Comment tree synchronizer for a single post.
//!
//! The server is the source of truth: every successful mutation is followed
//! by a full reload, and the tree is rebuilt from scratch by [`build_tree`].
//! Loads are numbered; only the response to the most recently issued load is
//! applied, so a slow stale response cannot overwrite a newer one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::{Comment, CommentDraft, CommentId, ImageUpload, PostId};
use crate::session::{Session, SessionStore};

/// A top-level comment and its replies, both in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree {
    pub threads: Vec<Thread>,
}

impl CommentTree {
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Number of comments including replies.
    pub fn len(&self) -> usize {
        self.threads.iter().map(|t| 1 + t.replies.len()).sum()
    }

    pub fn find(&self, id: CommentId) -> Option<&Comment> {
        self.threads.iter().find_map(|t| {
            if t.comment.id == id {
                Some(&t.comment)
            } else {
                t.replies.iter().find(|r| r.id == id)
            }
        })
    }

    pub fn is_top_level(&self, id: CommentId) -> bool {
        self.threads.iter().any(|t| t.comment.id == id)
    }
}

/// Rebuild the tree from whatever the server returned.
///
/// Accepts both a flat list (every comment carries `parent_id`) and the
/// nested shape (roots carrying `replies`). Replies whose parent is not a
/// top-level comment in the same batch are dropped, which also drops
/// replies-of-replies. Both levels are ordered by `(created_at, id)`.
pub fn build_tree(raw: Vec<Comment>) -> CommentTree {
    let mut flat = Vec::with_capacity(raw.len());
    let mut seen = HashSet::new();
    for mut comment in raw {
        let nested = std::mem::take(&mut comment.replies);
        let root_id = comment.id;
        if seen.insert(comment.id) {
            flat.push(comment);
        }
        for mut reply in nested {
            if !reply.replies.is_empty() {
                tracing::debug!(
                    reply = reply.id,
                    dropped = reply.replies.len(),
                    "ignoring replies nested below a reply"
                );
                reply.replies.clear();
            }
            if reply.parent_id.is_none() {
                reply.parent_id = Some(root_id);
            }
            if seen.insert(reply.id) {
                flat.push(reply);
            }
        }
    }

    let top_ids: HashSet<CommentId> = flat
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|c| c.id)
        .collect();

    let (mut tops, replies): (Vec<Comment>, Vec<Comment>) =
        flat.into_iter().partition(|c| c.parent_id.is_none());
    tops.sort_by(display_order);

    let mut threads: Vec<Thread> = tops
        .into_iter()
        .map(|comment| Thread {
            comment,
            replies: Vec::new(),
        })
        .collect();

    for reply in replies {
        let parent = reply.parent_id.unwrap_or_default();
        if !top_ids.contains(&parent) {
            tracing::debug!(reply = reply.id, parent, "dropping reply without a top-level parent");
            continue;
        }
        if let Some(thread) = threads.iter_mut().find(|t| t.comment.id == parent) {
            thread.replies.push(reply);
        }
    }
    for thread in &mut threads {
        thread.replies.sort_by(display_order);
    }

    CommentTree { threads }
}

fn display_order(a: &Comment, b: &Comment) -> std::cmp::Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Loading,
    Ready,
    Mutating,
    /// The last load failed. The previous tree, if any, is still displayable.
    Error(String),
}

struct Inner {
    state: SyncState,
    tree: CommentTree,
}

pub struct CommentSynchronizer {
    gateway: Gateway,
    session: Arc<SessionStore>,
    post_id: PostId,
    issued: AtomicU64,
    mutating: AtomicBool,
    inner: Mutex<Inner>,
}

/// Releases the single in-flight mutation slot on drop.
struct MutationSlot<'a>(&'a AtomicBool);

impl Drop for MutationSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CommentSynchronizer {
    pub fn new(gateway: Gateway, session: Arc<SessionStore>, post_id: PostId) -> Self {
        Self {
            gateway,
            session,
            post_id,
            issued: AtomicU64::new(0),
            mutating: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                state: SyncState::Idle,
                tree: CommentTree::default(),
            }),
        }
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn state(&self) -> SyncState {
        self.lock().state.clone()
    }

    pub fn tree(&self) -> CommentTree {
        self.lock().tree.clone()
    }

    /// Fetch and rebuild. Returns the tree that is displayed afterwards, which
    /// is an older one if a newer load was issued while this one was in flight.
    pub async fn load(&self) -> ClientResult<CommentTree> {
        let seq = self.begin_load();
        let credential = self.session.credential();
        let result = self
            .gateway
            .list_comments(credential.as_ref(), self.post_id)
            .await;
        self.finish_load(seq, result)
    }

    pub async fn submit_comment(&self, draft: CommentDraft) -> ClientResult<CommentTree> {
        let session = self.require_session()?;
        if draft.content.trim().is_empty() {
            return Err(ClientError::EmptyContent);
        }
        if let Some(parent) = draft.parent_id {
            let tree = self.tree();
            if tree.find(parent).is_some() && !tree.is_top_level(parent) {
                return Err(ClientError::InvalidParent(parent));
            }
        }

        let _slot = self.claim("submission")?;
        self.set_state(SyncState::Mutating);
        let created = self
            .gateway
            .create_comment(Some(&session.credential), self.post_id, draft)
            .await;
        match created {
            Ok(comment) => {
                tracing::debug!(post = self.post_id, comment = comment.id, "comment created");
                self.load().await
            }
            Err(e) => {
                self.set_state(SyncState::Ready);
                Err(ClientError::SubmissionFailed(Box::new(e)))
            }
        }
    }

    pub async fn edit_comment(
        &self,
        id: CommentId,
        content: String,
        image: Option<ImageUpload>,
    ) -> ClientResult<CommentTree> {
        let session = self.require_session()?;
        self.require_author(&session, id, false)?;
        if content.trim().is_empty() {
            return Err(ClientError::EmptyContent);
        }

        let _slot = self.claim("edit")?;
        self.mutate(
            self.gateway
                .update_comment(Some(&session.credential), id, content, image),
        )
        .await
    }

    pub async fn delete_comment(&self, id: CommentId) -> ClientResult<CommentTree> {
        let session = self.require_session()?;
        self.require_author(&session, id, false)?;

        let _slot = self.claim("delete")?;
        self.mutate(self.gateway.delete_comment(Some(&session.credential), id))
            .await
    }

    pub async fn delete_reply(&self, id: CommentId) -> ClientResult<CommentTree> {
        let session = self.require_session()?;
        self.require_author(&session, id, true)?;

        let _slot = self.claim("delete")?;
        self.mutate(self.gateway.delete_reply(Some(&session.credential), id))
            .await
    }

    /// Admin removal; skips the author check.
    pub async fn force_delete_comment(&self, id: CommentId) -> ClientResult<CommentTree> {
        let session = self.require_admin()?;

        let _slot = self.claim("delete")?;
        self.mutate(
            self.gateway
                .force_delete_comment(Some(&session.credential), id),
        )
        .await
    }

    pub async fn force_delete_reply(&self, id: CommentId) -> ClientResult<CommentTree> {
        let session = self.require_admin()?;

        let _slot = self.claim("delete")?;
        self.mutate(self.gateway.force_delete_reply(Some(&session.credential), id))
            .await
    }

    async fn mutate<T>(
        &self,
        call: impl std::future::Future<Output = ClientResult<T>>,
    ) -> ClientResult<CommentTree> {
        self.set_state(SyncState::Mutating);
        if let Err(e) = call.await {
            self.set_state(SyncState::Ready);
            return Err(e);
        }
        self.load().await
    }

    fn begin_load(&self) -> u64 {
        let seq = self.issued.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_state(SyncState::Loading);
        seq
    }

    fn finish_load(
        &self,
        seq: u64,
        result: ClientResult<Vec<Comment>>,
    ) -> ClientResult<CommentTree> {
        let latest = self.issued.load(Ordering::Acquire);
        let mut inner = self.lock();
        if seq != latest {
            tracing::debug!(post = self.post_id, seq, latest, "discarding stale comment load");
            return match result {
                Ok(_) => Ok(inner.tree.clone()),
                Err(e) => Err(e),
            };
        }

        match result {
            Ok(raw) => {
                inner.tree = build_tree(raw);
                inner.state = SyncState::Ready;
                Ok(inner.tree.clone())
            }
            Err(e) => {
                inner.state = SyncState::Error(e.to_string());
                Err(e)
            }
        }
    }

    fn require_session(&self) -> ClientResult<Session> {
        self.session
            .current()
            .ok_or_else(|| ClientError::Unauthorized("not signed in".to_string()))
    }

    fn require_admin(&self) -> ClientResult<Session> {
        let session = self.require_session()?;
        if !session.identity.is_admin {
            return Err(ClientError::Forbidden(
                "force-delete requires an administrator".to_string(),
            ));
        }
        Ok(session)
    }

    fn require_author(&self, session: &Session, id: CommentId, reply: bool) -> ClientResult<()> {
        let inner = self.lock();
        let comment = inner
            .tree
            .find(id)
            .ok_or_else(|| ClientError::NotFound(format!("comment {id} is not loaded")))?;
        if reply && !comment.is_reply() {
            return Err(ClientError::NotFound(format!("comment {id} is not a reply")));
        }
        if comment.user_id != session.identity.id {
            return Err(ClientError::Forbidden(format!(
                "comment {id} belongs to someone else"
            )));
        }
        Ok(())
    }

    fn claim(&self, what: &'static str) -> ClientResult<MutationSlot<'_>> {
        self.mutating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::Busy(what))?;
        Ok(MutationSlot(&self.mutating))
    }

    fn set_state(&self, state: SyncState) {
        self.lock().state = state;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing panics while holding the lock; recover the data regardless.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
