use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use url::Url;

use crate::models::{CommentId, NotificationId, PostId, PostOrder};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProgressMode {
    /// Show a spinner when stderr is a TTY.
    Auto,
    /// Always show a spinner (even when piped).
    Always,
    /// Never show a spinner.
    Never,
}

#[derive(Debug, Parser)]
#[command(name = "board", author, version, about = "Command-line client for the community board")]
pub struct Args {
    /// Base URL of the board API.
    #[arg(long, env = "BOARD_API_URL", default_value = "http://localhost:8000", global = true)]
    pub base_url: Url,

    /// File the bearer credential is kept in between runs.
    /// Defaults to `$HOME/.config/board-client/credential`.
    #[arg(long, env = "BOARD_CREDENTIAL_FILE", global = true)]
    pub credential_file: Option<PathBuf>,

    /// UTC offset the server writes post timestamps in.
    #[arg(long, env = "BOARD_SERVER_OFFSET", default_value = "+09:00", global = true, allow_hyphen_values = true)]
    pub server_offset: String,

    /// UTC offset timestamps are shown in.
    #[arg(long, env = "BOARD_DISPLAY_OFFSET", default_value = "+09:00", global = true, allow_hyphen_values = true)]
    pub display_offset: String,

    /// HTTP User-Agent.
    #[arg(long, default_value = "board-client/0.1", global = true)]
    pub user_agent: String,

    /// Progress display: `auto`, `always`, or `never`.
    #[arg(long, value_enum, default_value = "auto", global = true)]
    pub progress: ProgressMode,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account.
    Register {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        nickname: String,
    },
    /// Sign in and keep the credential for later runs.
    Login {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored credential.
    Logout,
    /// Show who is signed in.
    Whoami,
    #[command(subcommand)]
    Posts(PostCommand),
    #[command(subcommand)]
    Comments(CommentCommand),
    #[command(subcommand)]
    Notifications(NotificationCommand),
    /// The signed-in user's own content and profile.
    #[command(subcommand)]
    Me(MeCommand),
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Debug, Clone, ClapArgs)]
pub struct Paging {
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 10)]
    pub page_size: u32,
}

#[derive(Debug, Subcommand)]
pub enum PostCommand {
    /// List posts, newest first by default.
    List {
        #[command(flatten)]
        paging: Paging,
        /// Match against title and content.
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long, value_enum, default_value = "newest")]
        order: PostOrder,
    },
    /// Show a post with its comments.
    Show { id: PostId },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Edit one of your posts. Omitted fields keep their value.
    Edit {
        id: PostId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    Delete {
        id: PostId,
        /// Remove as an administrator, regardless of author.
        #[arg(long)]
        force: bool,
    },
    /// Write a post and its comments to a standalone HTML file.
    Export {
        id: PostId,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CommentCommand {
    /// Comment on a post, or reply to a top-level comment.
    Add {
        post: PostId,
        #[arg(long)]
        content: String,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        reply_to: Option<CommentId>,
    },
    Edit {
        post: PostId,
        id: CommentId,
        #[arg(long)]
        content: String,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    Delete {
        post: PostId,
        id: CommentId,
        /// Remove as an administrator, regardless of author.
        #[arg(long)]
        force: bool,
    },
    /// Every comment on the board, flat.
    All,
}

#[derive(Debug, Subcommand)]
pub enum NotificationCommand {
    /// Unread notifications (or all of them with `--all`).
    List {
        #[arg(long)]
        all: bool,
    },
    /// Mark one read and print the post it points to.
    Read { id: NotificationId },
    ReadAll,
    Count,
}

#[derive(Debug, Subcommand)]
pub enum MeCommand {
    Posts {
        #[command(flatten)]
        paging: Paging,
    },
    Comments {
        #[command(flatten)]
        paging: Paging,
    },
    Nickname { nickname: String },
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    Users,
    Posts,
    Ban { login: String },
    Unban { login: String },
    DeleteUser { login: String },
}
