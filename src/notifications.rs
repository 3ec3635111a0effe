use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::{Notification, NotificationId, PostId};
use crate::session::{Credential, SessionStore};

/// Outcome of marking a notification read. The feed never navigates; the
/// caller decides what to do with `navigate_to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub id: NotificationId,
    pub navigate_to: Option<PostId>,
}

#[derive(Default)]
struct FeedState {
    pending: Vec<Notification>,
    /// Everything seen by the last fetch, read or not, for post lookups.
    known: Vec<Notification>,
    marked: HashSet<NotificationId>,
}

pub struct NotificationFeed {
    gateway: Gateway,
    session: Arc<SessionStore>,
    state: Mutex<FeedState>,
}

impl NotificationFeed {
    pub fn new(gateway: Gateway, session: Arc<SessionStore>) -> Self {
        Self {
            gateway,
            session,
            state: Mutex::new(FeedState::default()),
        }
    }

    /// Unread notifications, most recent first.
    pub async fn fetch_pending(&self) -> ClientResult<Vec<Notification>> {
        let all = self.fetch_sorted().await?;
        let pending: Vec<Notification> = all.iter().filter(|n| !n.is_read).cloned().collect();

        let mut state = self.lock();
        state.pending = pending.clone();
        state.known = all;
        Ok(pending)
    }

    /// Read and unread notifications, most recent first.
    pub async fn fetch_all(&self) -> ClientResult<Vec<Notification>> {
        let all = self.fetch_sorted().await?;

        let mut state = self.lock();
        state.pending = all.iter().filter(|n| !n.is_read).cloned().collect();
        state.known = all.clone();
        Ok(all)
    }

    pub fn pending(&self) -> Vec<Notification> {
        self.lock().pending.clone()
    }

    /// Mark one notification read. Repeating it for an id this feed already
    /// marked succeeds without contacting the server.
    pub async fn mark_read(&self, id: NotificationId) -> ClientResult<ReadReceipt> {
        let navigate_to = {
            let state = self.lock();
            let navigate_to = state
                .known
                .iter()
                .find(|n| n.id == id)
                .and_then(|n| n.post_id);
            if state.marked.contains(&id) {
                return Ok(ReadReceipt { id, navigate_to });
            }
            navigate_to
        };

        let credential = self.credential()?;
        self.gateway
            .mark_notification_read(Some(&credential), id)
            .await?;

        let mut state = self.lock();
        state.marked.insert(id);
        state.pending.retain(|n| n.id != id);
        if let Some(n) = state.known.iter_mut().find(|n| n.id == id) {
            n.is_read = true;
        }
        tracing::debug!(notification = id, post = ?navigate_to, "notification read");
        Ok(ReadReceipt { id, navigate_to })
    }

    /// Returns how many notifications the server marked.
    pub async fn mark_all_read(&self) -> ClientResult<u64> {
        let credential = self.credential()?;
        let updated = self
            .gateway
            .mark_all_notifications_read(Some(&credential))
            .await?;

        let mut state = self.lock();
        let ids: Vec<NotificationId> = state.pending.iter().map(|n| n.id).collect();
        state.marked.extend(ids);
        state.pending.clear();
        for n in &mut state.known {
            n.is_read = true;
        }
        Ok(updated)
    }

    pub async fn unread_count(&self) -> ClientResult<u64> {
        let credential = self.credential()?;
        self.gateway
            .unread_notification_count(Some(&credential))
            .await
    }

    async fn fetch_sorted(&self) -> ClientResult<Vec<Notification>> {
        let credential = self.credential()?;
        let mut all = self.gateway.notifications(Some(&credential)).await?;
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(all)
    }

    fn credential(&self) -> ClientResult<Credential> {
        self.session
            .credential()
            .ok_or_else(|| ClientError::Unauthorized("not signed in".to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
