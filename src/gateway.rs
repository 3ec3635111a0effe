use chrono::FixedOffset;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::models::{
    AdminUser, Comment, CommentDraft, CommentId, ImageUpload, MyComment, Notification,
    NotificationId, Page, Post, PostDraft, PostId, PostPatch, PostQuery, PostRecord,
    Registration,
};
use crate::session::Credential;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
    pub user_agent: String,
    /// Zone the server writes post timestamps in.
    pub server_offset: FixedOffset,
}

/// Typed wrapper over the board's HTTP API. Stateless: every call carries
/// whatever credential the caller hands it, and each method issues exactly
/// one request.
#[derive(Clone)]
pub struct Gateway {
    client: reqwest::Client,
    base_url: Url,
    server_offset: FixedOffset,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Deserialize)]
struct UnreadCount {
    unread_count: u64,
}

#[derive(Deserialize)]
struct ReadAll {
    #[serde(default)]
    updated: u64,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(ClientError::NetworkFailure)?;

        // Url::join replaces the last segment unless the base ends in '/'.
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            server_offset: config.server_offset,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an image reference from a response against the API base.
    pub fn resolve_image(&self, reference: &str) -> Option<Url> {
        let r = reference.trim();
        if r.is_empty() {
            return None;
        }
        if r.starts_with("http://") || r.starts_with("https://") {
            return Url::parse(r).ok();
        }
        self.base_url.join(r).ok()
    }

    // auth

    pub async fn register(&self, registration: &Registration) -> ClientResult<()> {
        let req = self.request(Method::POST, "/auth/register")?.json(registration);
        self.send(req, None).await?;
        Ok(())
    }

    /// Exchange a login and password for a bearer credential. Banned accounts
    /// get `Forbidden`.
    pub async fn login(&self, login: &str, password: &str) -> ClientResult<Credential> {
        let req = self
            .request(Method::POST, "/auth/login")?
            .json(&serde_json::json!({ "user_id": login, "password": password }));
        let token: TokenResponse = self.json(req, None).await?;
        Ok(Credential::new(token.access_token))
    }

    // posts

    pub async fn list_posts(&self, query: &PostQuery) -> ClientResult<Page<Post>> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
            ("order", query.order.as_str().to_string()),
        ];
        if let Some(keyword) = query.keyword.as_deref().filter(|k| !k.trim().is_empty()) {
            params.push(("keyword", keyword.to_string()));
        }
        let req = self.request(Method::GET, "/posts/")?.query(&params);
        let page: Page<PostRecord> = self.json(req, None).await?;
        page.try_map(|p| p.into_post(self.server_offset))
    }

    /// Every post, unpaginated. Admin only.
    pub async fn list_all_posts(&self, credential: Option<&Credential>) -> ClientResult<Vec<Post>> {
        let credential = required(credential)?;
        let req = self.request(Method::GET, "/posts/all")?;
        let records: Vec<PostRecord> = self.json(req, Some(credential)).await?;
        self.posts_from(records)
    }

    pub async fn get_post(&self, id: PostId) -> ClientResult<Post> {
        let req = self.request(Method::GET, &format!("/posts/{id}"))?;
        let record: PostRecord = self.json(req, None).await?;
        record.into_post(self.server_offset)
    }

    pub async fn create_post(
        &self,
        credential: Option<&Credential>,
        draft: PostDraft,
    ) -> ClientResult<Post> {
        let credential = required(credential)?;
        let form = with_image(
            Form::new()
                .text("title", draft.title)
                .text("content", draft.content),
            draft.image,
        )?;
        let req = self.request(Method::POST, "/posts/")?.multipart(form);
        let record: PostRecord = self.json(req, Some(credential)).await?;
        record.into_post(self.server_offset)
    }

    pub async fn update_post(
        &self,
        credential: Option<&Credential>,
        id: PostId,
        patch: PostPatch,
    ) -> ClientResult<Post> {
        let credential = required(credential)?;
        let mut form = Form::new();
        if let Some(title) = patch.title {
            form = form.text("title", title);
        }
        if let Some(content) = patch.content {
            form = form.text("content", content);
        }
        let form = with_image(form, patch.image)?;
        let req = self
            .request(Method::PATCH, &format!("/posts/{id}"))?
            .multipart(form);
        let record: PostRecord = self.json(req, Some(credential)).await?;
        record.into_post(self.server_offset)
    }

    pub async fn delete_post(&self, credential: Option<&Credential>, id: PostId) -> ClientResult<()> {
        self.delete(credential, &format!("/posts/{id}")).await
    }

    pub async fn force_delete_post(
        &self,
        credential: Option<&Credential>,
        id: PostId,
    ) -> ClientResult<()> {
        self.delete(credential, &format!("/admin/force-delete-post/{id}"))
            .await
    }

    // comments

    /// Comments of one post. Depending on the server this is either flat or
    /// roots with nested `replies`; callers reconcile either shape.
    pub async fn list_comments(
        &self,
        credential: Option<&Credential>,
        post_id: PostId,
    ) -> ClientResult<Vec<Comment>> {
        let req = self.request(Method::GET, &format!("/comments/{post_id}"))?;
        self.json(req, credential).await
    }

    pub async fn list_all_comments(&self) -> ClientResult<Vec<Comment>> {
        let req = self.request(Method::GET, "/comments/")?;
        self.json(req, None).await
    }

    pub async fn create_comment(
        &self,
        credential: Option<&Credential>,
        post_id: PostId,
        draft: CommentDraft,
    ) -> ClientResult<Comment> {
        let credential = required(credential)?;
        let mut form = Form::new()
            .text("content", draft.content)
            .text("post_id", post_id.to_string());
        if let Some(parent_id) = draft.parent_id {
            form = form.text("parent_id", parent_id.to_string());
        }
        let form = with_image(form, draft.image)?;
        let req = self.request(Method::POST, "/comments/")?.multipart(form);
        self.json(req, Some(credential)).await
    }

    pub async fn update_comment(
        &self,
        credential: Option<&Credential>,
        id: CommentId,
        content: String,
        image: Option<ImageUpload>,
    ) -> ClientResult<Comment> {
        let credential = required(credential)?;
        let form = with_image(Form::new().text("content", content), image)?;
        let req = self
            .request(Method::PATCH, &format!("/comments/{id}"))?
            .multipart(form);
        self.json(req, Some(credential)).await
    }

    pub async fn delete_comment(
        &self,
        credential: Option<&Credential>,
        id: CommentId,
    ) -> ClientResult<()> {
        self.delete(credential, &format!("/comments/{id}")).await
    }

    pub async fn delete_reply(
        &self,
        credential: Option<&Credential>,
        id: CommentId,
    ) -> ClientResult<()> {
        self.delete(credential, &format!("/comments/reply/{id}")).await
    }

    pub async fn force_delete_comment(
        &self,
        credential: Option<&Credential>,
        id: CommentId,
    ) -> ClientResult<()> {
        self.delete(credential, &format!("/admin/force-delete-comment/{id}"))
            .await
    }

    pub async fn force_delete_reply(
        &self,
        credential: Option<&Credential>,
        id: CommentId,
    ) -> ClientResult<()> {
        self.delete(credential, &format!("/admin/force-delete-reply/{id}"))
            .await
    }

    // notifications

    pub async fn notifications(
        &self,
        credential: Option<&Credential>,
    ) -> ClientResult<Vec<Notification>> {
        let credential = required(credential)?;
        let req = self.request(Method::GET, "/notifications/")?;
        self.json(req, Some(credential)).await
    }

    pub async fn mark_notification_read(
        &self,
        credential: Option<&Credential>,
        id: NotificationId,
    ) -> ClientResult<()> {
        let credential = required(credential)?;
        let req = self.request(Method::PATCH, &format!("/notifications/read/{id}/"))?;
        self.send(req, Some(credential)).await?;
        Ok(())
    }

    /// Returns how many notifications the server flipped to read.
    pub async fn mark_all_notifications_read(
        &self,
        credential: Option<&Credential>,
    ) -> ClientResult<u64> {
        let credential = required(credential)?;
        let req = self.request(Method::PATCH, "/notifications/read-all")?;
        let body: ReadAll = self.json(req, Some(credential)).await?;
        Ok(body.updated)
    }

    pub async fn unread_notification_count(
        &self,
        credential: Option<&Credential>,
    ) -> ClientResult<u64> {
        let credential = required(credential)?;
        let req = self.request(Method::GET, "/notifications/unread-count")?;
        let body: UnreadCount = self.json(req, Some(credential)).await?;
        Ok(body.unread_count)
    }

    // profile

    pub async fn my_posts(
        &self,
        credential: Option<&Credential>,
        page: u32,
        page_size: u32,
    ) -> ClientResult<Page<Post>> {
        let credential = required(credential)?;
        let req = self
            .request(Method::GET, "/user/my-posts")?
            .query(&[("page", page), ("page_size", page_size)]);
        let page: Page<PostRecord> = self.json(req, Some(credential)).await?;
        page.try_map(|p| p.into_post(self.server_offset))
    }

    pub async fn my_comments(
        &self,
        credential: Option<&Credential>,
        page: u32,
        page_size: u32,
    ) -> ClientResult<Page<MyComment>> {
        let credential = required(credential)?;
        let req = self
            .request(Method::GET, "/user/my-comments")?
            .query(&[("page", page), ("page_size", page_size)]);
        self.json(req, Some(credential)).await
    }

    /// The server embeds the nickname in the token, so a rename hands back a
    /// fresh credential.
    pub async fn change_nickname(
        &self,
        credential: Option<&Credential>,
        nickname: &str,
    ) -> ClientResult<Credential> {
        let credential = required(credential)?;
        let req = self
            .request(Method::PATCH, "/user/nickname")?
            .json(&serde_json::json!({ "nickname": nickname }));
        let token: TokenResponse = self.json(req, Some(credential)).await?;
        Ok(Credential::new(token.access_token))
    }

    // admin

    pub async fn admin_users(&self, credential: Option<&Credential>) -> ClientResult<Vec<AdminUser>> {
        let credential = required(credential)?;
        let req = self.request(Method::GET, "/admin/users")?;
        self.json(req, Some(credential)).await
    }

    pub async fn ban_user(&self, credential: Option<&Credential>, login: &str) -> ClientResult<()> {
        self.admin_patch(credential, &format!("/admin/ban-user/{login}"))
            .await
    }

    pub async fn unban_user(&self, credential: Option<&Credential>, login: &str) -> ClientResult<()> {
        self.admin_patch(credential, &format!("/admin/unban-user/{login}"))
            .await
    }

    pub async fn delete_user(&self, credential: Option<&Credential>, login: &str) -> ClientResult<()> {
        self.delete(credential, &format!("/admin/users/{login}")).await
    }

    // plumbing

    fn request(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidInput(format!("bad endpoint {path}: {e}")))?;
        Ok(self.client.request(method, url))
    }

    async fn delete(&self, credential: Option<&Credential>, path: &str) -> ClientResult<()> {
        let credential = required(credential)?;
        let req = self.request(Method::DELETE, path)?;
        self.send(req, Some(credential)).await?;
        Ok(())
    }

    async fn admin_patch(&self, credential: Option<&Credential>, path: &str) -> ClientResult<()> {
        let credential = required(credential)?;
        let req = self.request(Method::PATCH, path)?;
        self.send(req, Some(credential)).await?;
        Ok(())
    }

    async fn json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        credential: Option<&Credential>,
    ) -> ClientResult<T> {
        let resp = self.send(req, credential).await?;
        let url = resp.url().clone();
        let bytes = resp.bytes().await.map_err(ClientError::NetworkFailure)?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(format!("{url}: {e}")))
    }

    async fn send(
        &self,
        req: RequestBuilder,
        credential: Option<&Credential>,
    ) -> ClientResult<Response> {
        let req = match credential {
            Some(c) => req.bearer_auth(c.as_str()),
            None => req,
        };

        let resp = req.send().await.map_err(|e| {
            tracing::debug!(error = %e, "request failed before a response");
            ClientError::NetworkFailure(e)
        })?;

        let status = resp.status();
        tracing::debug!(path = resp.url().path(), %status, "response");
        if status.is_success() {
            return Ok(resp);
        }

        let detail = error_detail(resp).await;
        Err(match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized(detail),
            StatusCode::FORBIDDEN => ClientError::Forbidden(detail),
            StatusCode::NOT_FOUND => ClientError::NotFound(detail),
            _ => ClientError::Api {
                status: status.as_u16(),
                detail,
            },
        })
    }

    fn posts_from(&self, records: Vec<PostRecord>) -> ClientResult<Vec<Post>> {
        records
            .into_iter()
            .map(|r| r.into_post(self.server_offset))
            .collect()
    }
}

fn required(credential: Option<&Credential>) -> ClientResult<&Credential> {
    credential.ok_or_else(|| ClientError::Unauthorized("not signed in".to_string()))
}

fn with_image(form: Form, image: Option<ImageUpload>) -> ClientResult<Form> {
    let Some(image) = image else {
        return Ok(form);
    };
    let part = Part::bytes(image.bytes.to_vec())
        .file_name(image.file_name)
        .mime_str(image.mime)
        .map_err(|e| ClientError::InvalidInput(format!("image type: {e}")))?;
    Ok(form.part("file", part))
}

/// Pull the human-readable reason out of an error response. The server uses
/// `{"detail": "..."}`; anything else is passed through as text.
async fn error_detail(resp: Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset as _;

    fn gateway(base: &str) -> Gateway {
        Gateway::new(&GatewayConfig {
            base_url: Url::parse(base).unwrap(),
            user_agent: "test".to_string(),
            server_offset: chrono::Utc.fix(),
        })
        .unwrap()
    }

    #[test]
    fn resolves_image_references_against_the_base() {
        let g = gateway("http://localhost:8000/");
        assert_eq!(
            g.resolve_image("/uploads/a.png").unwrap().as_str(),
            "http://localhost:8000/uploads/a.png"
        );
        assert_eq!(
            g.resolve_image("https://cdn.example.com/x.png")
                .unwrap()
                .as_str(),
            "https://cdn.example.com/x.png"
        );
        assert!(g.resolve_image("  ").is_none());
    }

    #[test]
    fn endpoints_keep_a_base_path_prefix() {
        let g = gateway("http://example.com/api");
        let req = g
            .request(Method::GET, "/posts/1")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.url().as_str(), "http://example.com/api/posts/1");
    }
}
