//! Commands: one function per user action, each returning a value or a
//! [`ClientError`] for the front end to present.

use std::sync::Arc;

use crate::comments::{CommentSynchronizer, CommentTree};
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::{
    AdminUser, Comment, MyComment, Page, Post, PostDraft, PostId, PostPatch, PostQuery,
    Registration,
};
use crate::notifications::NotificationFeed;
use crate::session::{Identity, Session, SessionStore};

const MAX_LOGIN_LEN: usize = 16;
const MAX_PASSWORD_LEN: usize = 20;
const MAX_NICKNAME_LEN: usize = 16;

#[derive(Clone)]
pub struct Board {
    gateway: Gateway,
    session: Arc<SessionStore>,
}

/// A post together with its comment tree.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: Post,
    pub comments: CommentTree,
}

impl Board {
    pub fn new(gateway: Gateway, session: Arc<SessionStore>) -> Self {
        Self { gateway, session }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    // account

    pub async fn register(&self, registration: Registration) -> ClientResult<()> {
        check_len("login", &registration.login, MAX_LOGIN_LEN)?;
        check_len("password", &registration.password, MAX_PASSWORD_LEN)?;
        check_len("nickname", &registration.nickname, MAX_NICKNAME_LEN)?;
        self.gateway.register(&registration).await
    }

    /// A rejected login (wrong password, banned account) leaves the current
    /// session as it was.
    pub async fn sign_in(&self, login: &str, password: &str) -> ClientResult<Identity> {
        let credential = self.gateway.login(login, password).await?;
        self.session.login(credential)
    }

    pub fn sign_out(&self) {
        self.session.logout();
    }

    pub fn whoami(&self) -> Option<Identity> {
        self.session.identity()
    }

    pub async fn change_nickname(&self, nickname: &str) -> ClientResult<Identity> {
        check_len("nickname", nickname, MAX_NICKNAME_LEN)?;
        let credential = self.session.credential();
        let fresh = self
            .gateway
            .change_nickname(credential.as_ref(), nickname)
            .await?;
        self.session.login(fresh)
    }

    pub async fn my_posts(&self, page: u32, page_size: u32) -> ClientResult<Page<Post>> {
        let credential = self.session.credential();
        self.gateway
            .my_posts(credential.as_ref(), page, page_size)
            .await
    }

    pub async fn my_comments(&self, page: u32, page_size: u32) -> ClientResult<Page<MyComment>> {
        let credential = self.session.credential();
        self.gateway
            .my_comments(credential.as_ref(), page, page_size)
            .await
    }

    // posts

    pub async fn list_posts(&self, query: &PostQuery) -> ClientResult<Page<Post>> {
        self.gateway.list_posts(query).await
    }

    pub async fn show_post(&self, id: PostId) -> ClientResult<PostDetail> {
        let post = self.gateway.get_post(id).await?;
        let comments = self.comments(id).load().await?;
        Ok(PostDetail { post, comments })
    }

    pub async fn create_post(&self, draft: PostDraft) -> ClientResult<Post> {
        let session = self.require_session()?;
        if draft.title.trim().is_empty() || draft.content.trim().is_empty() {
            return Err(ClientError::EmptyContent);
        }
        self.gateway
            .create_post(Some(&session.credential), draft)
            .await
    }

    pub async fn edit_post(&self, id: PostId, patch: PostPatch) -> ClientResult<Post> {
        let session = self.require_session()?;
        let post = self.gateway.get_post(id).await?;
        require_post_author(&session, &post)?;
        self.gateway
            .update_post(Some(&session.credential), id, patch)
            .await
    }

    pub async fn delete_post(&self, id: PostId) -> ClientResult<()> {
        let session = self.require_session()?;
        let post = self.gateway.get_post(id).await?;
        require_post_author(&session, &post)?;
        self.gateway
            .delete_post(Some(&session.credential), id)
            .await
    }

    pub async fn force_delete_post(&self, id: PostId) -> ClientResult<()> {
        let session = self.require_admin()?;
        self.gateway
            .force_delete_post(Some(&session.credential), id)
            .await
    }

    // comments and notifications

    pub fn comments(&self, post_id: PostId) -> CommentSynchronizer {
        CommentSynchronizer::new(self.gateway.clone(), self.session.clone(), post_id)
    }

    pub async fn all_comments(&self) -> ClientResult<Vec<Comment>> {
        self.gateway.list_all_comments().await
    }

    pub fn notifications(&self) -> NotificationFeed {
        NotificationFeed::new(self.gateway.clone(), self.session.clone())
    }

    // admin

    pub async fn admin_users(&self) -> ClientResult<Vec<AdminUser>> {
        let session = self.require_admin()?;
        self.gateway.admin_users(Some(&session.credential)).await
    }

    pub async fn admin_posts(&self) -> ClientResult<Vec<Post>> {
        let session = self.require_admin()?;
        self.gateway.list_all_posts(Some(&session.credential)).await
    }

    pub async fn ban_user(&self, login: &str) -> ClientResult<()> {
        let session = self.require_admin()?;
        self.gateway
            .ban_user(Some(&session.credential), login)
            .await
    }

    pub async fn unban_user(&self, login: &str) -> ClientResult<()> {
        let session = self.require_admin()?;
        self.gateway
            .unban_user(Some(&session.credential), login)
            .await
    }

    pub async fn delete_user(&self, login: &str) -> ClientResult<()> {
        let session = self.require_admin()?;
        self.gateway
            .delete_user(Some(&session.credential), login)
            .await
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
                "administrator privileges required".to_string(),
            ));
        }
        Ok(session)
    }
}

fn require_post_author(session: &Session, post: &Post) -> ClientResult<()> {
    if post.author_login != session.identity.login {
        return Err(ClientError::Forbidden(format!(
            "post {} belongs to someone else",
            post.id
        )));
    }
    Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> ClientResult<()> {
    if value.trim().is_empty() {
        return Err(ClientError::InvalidInput(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(ClientError::InvalidInput(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}
