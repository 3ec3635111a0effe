use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientResult;
use crate::time;

pub type PostId = i64;
pub type CommentId = i64;
pub type NotificationId = i64;
/// Numeric account key. Distinct from the login handle.
pub type UserPk = i64;

pub const DELETED_USER: &str = "(deleted user)";

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    /// Login handle of the author; the server keys post ownership on it.
    pub author_login: String,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn author_name(&self) -> &str {
        display_name(self.nickname.as_deref())
    }
}

/// Post as it arrives on the wire. `created_at` is server-local wall-clock
/// time and needs the server offset to become UTC.
#[derive(Debug, Deserialize)]
pub(crate) struct PostRecord {
    pub id: PostId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    pub created_at: String,
}

impl PostRecord {
    pub(crate) fn into_post(self, server_offset: FixedOffset) -> ClientResult<Post> {
        Ok(Post {
            id: self.id,
            title: self.title,
            content: self.content,
            image_url: self.image_url.filter(|s| !s.is_empty()),
            author_login: self.user_id.unwrap_or_default(),
            nickname: self.nickname,
            created_at: time::parse_api_time(&self.created_at, server_offset)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(default)]
    pub post_id: PostId,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Numeric id of the author.
    pub user_id: UserPk,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(deserialize_with = "time::deserialize_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    /// Present when the server returns roots with their replies nested.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub replies: Vec<Comment>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn author_name(&self) -> &str {
        display_name(self.nickname.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub post_id: Option<PostId>,
    #[serde(default)]
    pub comment_id: Option<CommentId>,
    #[serde(deserialize_with = "bool_or_int")]
    pub is_read: bool,
    #[serde(deserialize_with = "time::deserialize_utc")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdminUser {
    pub id: UserPk,
    #[serde(rename = "user_id")]
    pub login: String,
    pub nickname: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_admin: bool,
    #[serde(default = "default_true", deserialize_with = "bool_or_int")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_banned: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MyComment {
    pub id: CommentId,
    pub content: String,
    #[serde(deserialize_with = "time::deserialize_utc")]
    pub created_at: DateTime<Utc>,
}

/// One page of a paginated listing. Endpoints disagree on the name of the
/// item array and the total; every spelling is accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Page<T> {
    #[serde(alias = "posts", alias = "comments")]
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
    #[serde(default, alias = "total_count")]
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub(crate) fn try_map<U>(self, f: impl FnMut(T) -> ClientResult<U>) -> ClientResult<Page<U>> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<ClientResult<_>>()?,
            current_page: self.current_page,
            total_pages: self.total_pages,
            total: self.total,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PostOrder {
    #[default]
    Newest,
    Oldest,
    Title,
}

impl PostOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            PostOrder::Newest => "newest",
            PostOrder::Oldest => "oldest",
            PostOrder::Title => "title",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub page: u32,
    pub page_size: u32,
    pub keyword: Option<String>,
    pub order: PostOrder,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            keyword: None,
            order: PostOrder::Newest,
        }
    }
}

/// An image attached to a post or comment, sent as the multipart `file` part.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Bytes,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let bytes = bytes.into();
        let mime = sniff_image_mime(&bytes, &file_name);
        Self {
            file_name,
            mime,
            bytes,
        }
    }

    pub async fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

fn sniff_image_mime(bytes: &[u8], file_name: &str) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if bytes.starts_with(b"\xff\xd8\xff") {
        return "image/jpeg";
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP") {
        return "image/webp";
    }

    match file_name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub image: Option<ImageUpload>,
}

/// Fields left `None` keep their current value on the server.
#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone)]
pub struct CommentDraft {
    pub content: String,
    pub image: Option<ImageUpload>,
    pub parent_id: Option<CommentId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    #[serde(rename = "user_id")]
    pub login: String,
    pub password: String,
    pub nickname: String,
}

pub fn display_name(nickname: Option<&str>) -> &str {
    match nickname {
        Some(n) if !n.trim().is_empty() => n,
        _ => DELETED_USER,
    }
}

fn default_true() -> bool {
    true
}

/// The server stores flags as integers in some tables and booleans in others.
pub(crate) fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        None => false,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Comment>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Comment>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike as _;

    #[test]
    fn nested_comment_payload() {
        let raw = r#"[{
            "id": 1, "post_id": 42, "content": "root", "image_url": null,
            "parent_id": null, "created_at": "2025-03-01T10:00:00",
            "user_id": 5, "nickname": "alice",
            "replies": [{
                "id": 2, "post_id": 42, "content": "reply", "parent_id": 1,
                "created_at": "2025-03-01T10:05:00.123456", "user_id": 7,
                "nickname": null, "replies": null
            }]
        }]"#;
        let comments: Vec<Comment> = serde_json::from_str(raw).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].replies.len(), 1);
        assert_eq!(comments[0].replies[0].author_name(), DELETED_USER);
        assert_eq!(comments[0].created_at.hour(), 10);
    }

    #[test]
    fn page_accepts_every_spelling() {
        let posts: Page<serde_json::Value> = serde_json::from_str(
            r#"{"posts": [1, 2], "total_count": 12, "total_pages": 2, "current_page": 1, "page_size": 10}"#,
        )
        .unwrap();
        assert_eq!(posts.items.len(), 2);
        assert_eq!(posts.total, Some(12));

        let comments: Page<serde_json::Value> = serde_json::from_str(
            r#"{"comments": [], "total": 0, "total_pages": 0, "current_page": 1}"#,
        )
        .unwrap();
        assert!(comments.items.is_empty());
        assert_eq!(comments.total, Some(0));
    }

    #[test]
    fn admin_user_flags_accept_ints() {
        let u: AdminUser = serde_json::from_str(
            r#"{"id": 3, "user_id": "bob", "nickname": "Bob", "is_admin": 0, "is_active": 1, "is_banned": 1}"#,
        )
        .unwrap();
        assert_eq!(u.login, "bob");
        assert!(!u.is_admin);
        assert!(u.is_active);
        assert!(u.is_banned);
    }

    #[test]
    fn image_mime_prefers_magic_bytes() {
        let png = ImageUpload::new("photo.jpg", b"\x89PNG\r\n\x1a\nrest".to_vec());
        assert_eq!(png.mime, "image/png");
        let by_ext = ImageUpload::new("photo.JPEG", b"xxxx".to_vec());
        assert_eq!(by_ext.mime, "image/jpeg");
        let unknown = ImageUpload::new("notes.txt", b"xxxx".to_vec());
        assert_eq!(unknown.mime, "application/octet-stream");
    }
}
