//! Plain-text rendering for the terminal. Timestamps are converted to the
//! display offset here and nowhere else.

use std::fmt::Write as _;

use chrono::FixedOffset;

use crate::board::PostDetail;
use crate::comments::CommentTree;
use crate::gateway::Gateway;
use crate::models::{AdminUser, Comment, MyComment, Notification, Page, Post};
use crate::session::Identity;
use crate::time::format_display;

pub fn post_page(page: &Page<Post>, offset: FixedOffset) -> String {
    let mut out = String::new();
    if page.items.is_empty() {
        out.push_str("no posts\n");
    }
    for post in &page.items {
        let _ = writeln!(out, "{}", post_line(post, offset));
    }
    let _ = writeln!(out, "page {}/{}", page.current_page, page.total_pages.max(1));
    out
}

pub fn post_list(posts: &[Post], offset: FixedOffset) -> String {
    let mut out = String::new();
    for post in posts {
        let _ = writeln!(out, "{}", post_line(post, offset));
    }
    out
}

pub fn post_line(post: &Post, offset: FixedOffset) -> String {
    format!(
        "#{:<5} {}  ({} | {})",
        post.id,
        post.title,
        post.author_name(),
        format_display(&post.created_at, offset)
    )
}

pub fn post_detail(
    detail: &PostDetail,
    gateway: &Gateway,
    viewer: Option<&Identity>,
    offset: FixedOffset,
) -> String {
    let post = &detail.post;
    let mut out = String::new();
    let _ = writeln!(out, "{}", post.title);
    let _ = writeln!(
        out,
        "{} | {}",
        post.author_name(),
        format_display(&post.created_at, offset)
    );
    if let Some(url) = post.image_url.as_deref().and_then(|r| gateway.resolve_image(r)) {
        let _ = writeln!(out, "[image] {url}");
    }
    let _ = writeln!(out, "\n{}\n", post.content);
    out.push_str(&comment_tree(&detail.comments, gateway, viewer, offset));
    out
}

pub fn comment_tree(
    tree: &CommentTree,
    gateway: &Gateway,
    viewer: Option<&Identity>,
    offset: FixedOffset,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "-- {} comment(s)", tree.len());
    for thread in &tree.threads {
        write_comment(&mut out, &thread.comment, "", gateway, viewer, offset);
        for reply in &thread.replies {
            write_comment(&mut out, reply, "    ↳ ", gateway, viewer, offset);
        }
    }
    out
}

fn write_comment(
    out: &mut String,
    comment: &Comment,
    indent: &str,
    gateway: &Gateway,
    viewer: Option<&Identity>,
    offset: FixedOffset,
) {
    let mine = viewer.is_some_and(|v| v.id == comment.user_id);
    let _ = writeln!(
        out,
        "{indent}[{}] {}{} | {}",
        comment.id,
        comment.author_name(),
        if mine { " (you)" } else { "" },
        format_display(&comment.created_at, offset)
    );
    let pad = " ".repeat(indent.chars().count());
    for line in comment.content.lines() {
        let _ = writeln!(out, "{pad}  {line}");
    }
    if let Some(url) = comment
        .image_url
        .as_deref()
        .and_then(|r| gateway.resolve_image(r))
    {
        let _ = writeln!(out, "{pad}  [image] {url}");
    }
}

/// Comments across posts, one line each.
pub fn comment_list(comments: &[Comment], offset: FixedOffset) -> String {
    let mut out = String::new();
    for c in comments {
        let _ = writeln!(
            out,
            "[{}] post #{} {}: {}  ({})",
            c.id,
            c.post_id,
            c.author_name(),
            c.content.lines().next().unwrap_or_default(),
            format_display(&c.created_at, offset)
        );
    }
    out
}

pub fn notifications(list: &[Notification], offset: FixedOffset) -> String {
    if list.is_empty() {
        return "no notifications\n".to_string();
    }
    let mut out = String::new();
    for n in list {
        let _ = writeln!(
            out,
            "{} [{}] {}{}  ({})",
            if n.is_read { " " } else { "*" },
            n.id,
            n.message,
            n.post_id.map(|p| format!(" -> post #{p}")).unwrap_or_default(),
            format_display(&n.created_at, offset)
        );
    }
    out
}

pub fn my_comments(page: &Page<MyComment>, offset: FixedOffset) -> String {
    let mut out = String::new();
    for c in &page.items {
        let first = c.content.lines().next().unwrap_or_default();
        let _ = writeln!(
            out,
            "[{}] {}  ({})",
            c.id,
            first,
            format_display(&c.created_at, offset)
        );
    }
    let _ = writeln!(out, "page {}/{}", page.current_page, page.total_pages.max(1));
    out
}

pub fn users(users: &[AdminUser]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<5} {:<16} {:<16} {}", "id", "login", "nickname", "flags");
    for u in users {
        let mut flags = Vec::new();
        if u.is_admin {
            flags.push("admin");
        }
        if u.is_banned {
            flags.push("banned");
        }
        if !u.is_active {
            flags.push("inactive");
        }
        let _ = writeln!(
            out,
            "{:<5} {:<16} {:<16} {}",
            u.id,
            u.login,
            u.nickname,
            flags.join(",")
        );
    }
    out
}

pub fn identity(identity: Option<&Identity>) -> String {
    match identity {
        Some(i) => format!(
            "{} ({}){}\n",
            i.nickname,
            i.login,
            if i.is_admin { " [admin]" } else { "" }
        ),
        None => "not signed in\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset as _, TimeZone as _, Utc};
    use url::Url;

    use crate::comments::build_tree;
    use crate::gateway::GatewayConfig;

    fn comment(id: i64, user_id: i64, parent: Option<i64>) -> Comment {
        Comment {
            id,
            post_id: 3,
            content: format!("text {id}"),
            image_url: None,
            user_id,
            nickname: Some(format!("user{user_id}")),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, id as u32, 0).unwrap(),
            parent_id: parent,
            replies: Vec::new(),
        }
    }

    #[test]
    fn marks_own_comments_and_indents_replies() {
        let gateway = Gateway::new(&GatewayConfig {
            base_url: Url::parse("http://localhost:8000").unwrap(),
            user_agent: "test".to_string(),
            server_offset: Utc.fix(),
        })
        .unwrap();
        let viewer = Identity {
            id: 2,
            login: "two".to_string(),
            nickname: "user2".to_string(),
            is_admin: false,
        };
        let tree = build_tree(vec![comment(1, 1, None), comment(2, 2, Some(1))]);

        let out = comment_tree(&tree, &gateway, Some(&viewer), Utc.fix());
        assert!(out.starts_with("-- 2 comment(s)\n"));
        assert!(out.contains("[1] user1 | 2025-01-01 00:01"));
        assert!(out.contains("    ↳ [2] user2 (you) | 2025-01-01 00:02"));
    }

    #[test]
    fn unread_notifications_are_starred() {
        let list = vec![Notification {
            id: 4,
            kind: "comment".to_string(),
            message: "new comment".to_string(),
            post_id: Some(3),
            comment_id: Some(1),
            is_read: false,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }];
        let out = notifications(&list, Utc.fix());
        assert_eq!(out, "* [4] new comment -> post #3  (2025-01-01 00:00)\n");
        assert_eq!(notifications(&[], Utc.fix()), "no notifications\n");
    }
}
