mod builtin;
mod cli;
mod config;
mod progress;

pub mod board;
pub mod comments;
pub mod error;
pub mod gateway;
pub mod html;
pub mod models;
pub mod notifications;
pub mod render;
pub mod session;
pub mod time;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use cli::{Args, Command};
use models::{CommentDraft, ImageUpload, PostDraft, PostPatch, PostQuery, Registration};
use progress::Activity;

pub use board::{Board, PostDetail};
pub use cli::ProgressMode;
pub use cli::{
    AdminCommand, Args as CliArgs, Command as CliCommand, CommentCommand, MeCommand,
    NotificationCommand, Paging, PostCommand,
};
pub use comments::{CommentSynchronizer, CommentTree, SyncState, build_tree};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use gateway::{Gateway, GatewayConfig};
pub use notifications::{NotificationFeed, ReadReceipt};
pub use session::{
    Credential, CredentialStore, FileCredentialStore, Identity, MemoryCredentialStore, Session,
    SessionStore,
};

pub async fn run(args: Args) -> anyhow::Result<()> {
    let out = execute(args).await?;
    print!("{out}");
    Ok(())
}

/// Run one command and return what it would print.
pub async fn execute(args: Args) -> anyhow::Result<String> {
    use std::io::IsTerminal as _;

    let config = ClientConfig::from_args(&args)?;
    let progress_enabled = match args.progress {
        ProgressMode::Always => true,
        ProgressMode::Never => false,
        ProgressMode::Auto => std::io::stderr().is_terminal(),
    };
    let activity = Activity::new(progress_enabled);

    let gateway = Gateway::new(&config.gateway()).context("build http client")?;
    let session = Arc::new(SessionStore::new(Arc::new(FileCredentialStore::new(
        config.credential_file.clone(),
    ))));
    session.restore();
    let board = Board::new(gateway, session);

    activity.set_stage("contacting board");
    let res = dispatch(&board, &config, args.command).await;
    activity.finish();
    res
}

async fn dispatch(board: &Board, config: &ClientConfig, command: Command) -> anyhow::Result<String> {
    let offset = config.display_offset;
    match command {
        Command::Register {
            login,
            password,
            nickname,
        } => {
            board
                .register(Registration {
                    login: login.clone(),
                    password,
                    nickname,
                })
                .await
                .context("register")?;
            Ok(format!("registered {login}\n"))
        }
        Command::Login { login, password } => {
            let identity = board.sign_in(&login, &password).await.context("login")?;
            Ok(render::identity(Some(&identity)))
        }
        Command::Logout => {
            board.sign_out();
            Ok("signed out\n".to_string())
        }
        Command::Whoami => Ok(render::identity(board.whoami().as_ref())),
        Command::Posts(cmd) => posts(board, config, cmd).await,
        Command::Comments(cmd) => comments(board, config, cmd).await,
        Command::Notifications(cmd) => notifications(board, config, cmd).await,
        Command::Me(cmd) => match cmd {
            MeCommand::Posts { paging } => {
                let page = board
                    .my_posts(paging.page, paging.page_size)
                    .await
                    .context("list my posts")?;
                Ok(render::post_page(&page, offset))
            }
            MeCommand::Comments { paging } => {
                let page = board
                    .my_comments(paging.page, paging.page_size)
                    .await
                    .context("list my comments")?;
                Ok(render::my_comments(&page, offset))
            }
            MeCommand::Nickname { nickname } => {
                let identity = board
                    .change_nickname(&nickname)
                    .await
                    .context("change nickname")?;
                Ok(render::identity(Some(&identity)))
            }
        },
        Command::Admin(cmd) => match cmd {
            AdminCommand::Users => {
                let users = board.admin_users().await.context("list users")?;
                Ok(render::users(&users))
            }
            AdminCommand::Posts => {
                let posts = board.admin_posts().await.context("list all posts")?;
                Ok(render::post_list(&posts, offset))
            }
            AdminCommand::Ban { login } => {
                board.ban_user(&login).await.context("ban user")?;
                Ok(format!("banned {login}\n"))
            }
            AdminCommand::Unban { login } => {
                board.unban_user(&login).await.context("unban user")?;
                Ok(format!("unbanned {login}\n"))
            }
            AdminCommand::DeleteUser { login } => {
                board.delete_user(&login).await.context("delete user")?;
                Ok(format!("deleted {login}\n"))
            }
        },
    }
}

async fn posts(board: &Board, config: &ClientConfig, cmd: PostCommand) -> anyhow::Result<String> {
    let offset = config.display_offset;
    match cmd {
        PostCommand::List {
            paging,
            keyword,
            order,
        } => {
            let query = PostQuery {
                page: paging.page,
                page_size: paging.page_size,
                keyword,
                order,
            };
            let page = board.list_posts(&query).await.context("list posts")?;
            Ok(render::post_page(&page, offset))
        }
        PostCommand::Show { id } => {
            let detail = board
                .show_post(id)
                .await
                .with_context(|| format!("show post {id}"))?;
            let viewer = board.whoami();
            Ok(render::post_detail(
                &detail,
                board.gateway(),
                viewer.as_ref(),
                offset,
            ))
        }
        PostCommand::Create {
            title,
            content,
            image,
        } => {
            let draft = PostDraft {
                title,
                content,
                image: load_image(image.as_deref()).await?,
            };
            let post = board.create_post(draft).await.context("create post")?;
            Ok(format!("{}\n", render::post_line(&post, offset)))
        }
        PostCommand::Edit {
            id,
            title,
            content,
            image,
        } => {
            let patch = PostPatch {
                title,
                content,
                image: load_image(image.as_deref()).await?,
            };
            let post = board
                .edit_post(id, patch)
                .await
                .with_context(|| format!("edit post {id}"))?;
            Ok(format!("{}\n", render::post_line(&post, offset)))
        }
        PostCommand::Delete { id, force } => {
            if force {
                board.force_delete_post(id).await
            } else {
                board.delete_post(id).await
            }
            .with_context(|| format!("delete post {id}"))?;
            Ok(format!("deleted post {id}\n"))
        }
        PostCommand::Export { id, out } => {
            let detail = board
                .show_post(id)
                .await
                .with_context(|| format!("load post {id}"))?;
            let out_path = out.unwrap_or_else(|| PathBuf::from(format!("post-{id}.html")));
            if let Some(parent) = out_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
            }
            let html = html::export_thread(&detail, board.gateway(), offset);
            std::fs::write(&out_path, html)
                .with_context(|| format!("write {}", out_path.display()))?;
            Ok(format!("wrote {}\n", out_path.display()))
        }
    }
}

async fn comments(
    board: &Board,
    config: &ClientConfig,
    cmd: CommentCommand,
) -> anyhow::Result<String> {
    let offset = config.display_offset;
    let viewer = board.whoami();
    match cmd {
        CommentCommand::Add {
            post,
            content,
            image,
            reply_to,
        } => {
            let sync = board.comments(post);
            if reply_to.is_some() {
                sync.load().await.context("load comments")?;
            }
            let draft = CommentDraft {
                content,
                image: load_image(image.as_deref()).await?,
                parent_id: reply_to,
            };
            let tree = sync.submit_comment(draft).await.context("add comment")?;
            Ok(render::comment_tree(
                &tree,
                board.gateway(),
                viewer.as_ref(),
                offset,
            ))
        }
        CommentCommand::Edit {
            post,
            id,
            content,
            image,
        } => {
            let sync = board.comments(post);
            sync.load().await.context("load comments")?;
            let image = load_image(image.as_deref()).await?;
            let tree = sync
                .edit_comment(id, content, image)
                .await
                .with_context(|| format!("edit comment {id}"))?;
            Ok(render::comment_tree(
                &tree,
                board.gateway(),
                viewer.as_ref(),
                offset,
            ))
        }
        CommentCommand::Delete { post, id, force } => {
            let sync = board.comments(post);
            let loaded = sync.load().await.context("load comments")?;
            let is_reply = loaded.find(id).is_some_and(|c| c.is_reply());
            let tree = match (force, is_reply) {
                (false, false) => sync.delete_comment(id).await,
                (false, true) => sync.delete_reply(id).await,
                (true, false) => sync.force_delete_comment(id).await,
                (true, true) => sync.force_delete_reply(id).await,
            }
            .with_context(|| format!("delete comment {id}"))?;
            Ok(render::comment_tree(
                &tree,
                board.gateway(),
                viewer.as_ref(),
                offset,
            ))
        }
        CommentCommand::All => {
            let all = board.all_comments().await.context("list comments")?;
            Ok(render::comment_list(&all, offset))
        }
    }
}

async fn notifications(
    board: &Board,
    config: &ClientConfig,
    cmd: NotificationCommand,
) -> anyhow::Result<String> {
    let feed = board.notifications();
    match cmd {
        NotificationCommand::List { all } => {
            let list = if all {
                feed.fetch_all().await
            } else {
                feed.fetch_pending().await
            }
            .context("fetch notifications")?;
            Ok(render::notifications(&list, config.display_offset))
        }
        NotificationCommand::Read { id } => {
            // Populate the feed so the receipt knows which post to point at.
            feed.fetch_all().await.context("fetch notifications")?;
            let receipt = feed
                .mark_read(id)
                .await
                .with_context(|| format!("mark notification {id} read"))?;
            Ok(match receipt.navigate_to {
                Some(post) => format!("marked {id} read; see `board posts show {post}`\n"),
                None => format!("marked {id} read\n"),
            })
        }
        NotificationCommand::ReadAll => {
            let updated = feed.mark_all_read().await.context("mark all read")?;
            Ok(format!("marked {updated} notification(s) read\n"))
        }
        NotificationCommand::Count => {
            let count = feed.unread_count().await.context("count unread")?;
            Ok(format!("{count}\n"))
        }
    }
}

async fn load_image(path: Option<&Path>) -> anyhow::Result<Option<ImageUpload>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let image = ImageUpload::from_path(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    Ok(Some(image))
}
