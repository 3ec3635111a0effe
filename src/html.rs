use chrono::FixedOffset;
use maud::{DOCTYPE, Markup, PreEscaped, html};

use crate::board::PostDetail;
use crate::builtin;
use crate::gateway::Gateway;
use crate::models::Comment;
use crate::time::format_display;

/// Render a post and its comment tree as one standalone HTML page. Image
/// references are resolved to absolute URLs against the API base.
pub fn export_thread(detail: &PostDetail, gateway: &Gateway, offset: FixedOffset) -> String {
    let post = &detail.post;
    let comment_count = detail.comments.len();
    let post_image = post
        .image_url
        .as_deref()
        .and_then(|r| gateway.resolve_image(r))
        .map(|u| u.to_string());

    let markup: Markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (post.title) }
                style { (PreEscaped(builtin::BUILTIN_CSS)) }
            }
            body {
                main class="bc-container" {
                    article id=(format!("post_{}", post.id)) class="bc-post" {
                        h1 { (post.title) }
                        div class="bc-meta" {
                            (post.author_name()) " | " (format_display(&post.created_at, offset))
                        }
                        @if let Some(src) = &post_image {
                            img class="bc-post-image" src=(src) alt="post";
                        }
                        div class="bc-body" { (paragraphs(&post.content)) }
                    }
                    section {
                        h2 { "Comments (" (comment_count) ")" }
                        ol class="bc-comments" {
                            @for thread in &detail.comments.threads {
                                li id=(format!("comment_{}", thread.comment.id)) class="bc-comment" {
                                    (render_comment(&thread.comment, gateway, offset))
                                    @if !thread.replies.is_empty() {
                                        ol class="bc-replies" {
                                            @for reply in &thread.replies {
                                                li id=(format!("comment_{}", reply.id)) class="bc-reply" {
                                                    (render_comment(reply, gateway, offset))
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };
    markup.into_string()
}

fn render_comment(comment: &Comment, gateway: &Gateway, offset: FixedOffset) -> Markup {
    let image = comment
        .image_url
        .as_deref()
        .and_then(|r| gateway.resolve_image(r))
        .map(|u| u.to_string());

    html! {
        div class="bc-meta" {
            strong { (comment.author_name()) }
            " | "
            (format_display(&comment.created_at, offset))
        }
        @if let Some(src) = &image {
            img class="bc-comment-image" src=(src) alt="attachment";
        }
        div class="bc-body" { (paragraphs(&comment.content)) }
    }
}

fn paragraphs(text: &str) -> Markup {
    html! {
        @for line in text.lines().filter(|l| !l.trim().is_empty()) {
            p { (line) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset as _, TimeZone as _, Utc};
    use url::Url;

    use crate::comments::build_tree;
    use crate::gateway::GatewayConfig;
    use crate::models::Post;

    fn comment(id: i64, parent: Option<i64>, minute: u32, content: &str) -> Comment {
        Comment {
            id,
            post_id: 1,
            content: content.to_string(),
            image_url: None,
            user_id: 1,
            nickname: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 15, minute, 0).unwrap(),
            parent_id: parent,
            replies: Vec::new(),
        }
    }

    #[test]
    fn exports_nested_replies_with_absolute_images() {
        let gateway = Gateway::new(&GatewayConfig {
            base_url: Url::parse("http://board.example:8000").unwrap(),
            user_agent: "test".to_string(),
            server_offset: Utc.fix(),
        })
        .unwrap();

        let mut with_image = comment(2, Some(1), 5, "a reply");
        with_image.image_url = Some("/uploads/r.png".to_string());

        let detail = PostDetail {
            post: Post {
                id: 1,
                title: "Hello <board>".to_string(),
                content: "first line\n\nsecond line".to_string(),
                image_url: Some("/uploads/p.png".to_string()),
                author_login: "alice".to_string(),
                nickname: Some("Alice".to_string()),
                created_at: Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap(),
            },
            comments: build_tree(vec![
                comment(1, None, 1, "<script>alert(1)</script>"),
                with_image,
            ]),
        };

        let kst = chrono::FixedOffset::east_opt(9 * 3600).unwrap();
        let html = export_thread(&detail, &gateway, kst);

        assert!(html.contains("Hello &lt;board&gt;"));
        assert!(html.contains("http://board.example:8000/uploads/p.png"));
        assert!(html.contains("http://board.example:8000/uploads/r.png"));
        assert!(html.contains("class=\"bc-replies\""));
        assert!(html.contains("id=\"comment_2\""));
        assert!(!html.contains("<script>"));
        assert!(html.contains("2025-03-02 00:00"));
        assert!(html.contains("(deleted user)"));
        assert!(html.contains("<p>second line</p>"));
    }
}
