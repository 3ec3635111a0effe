use std::path::PathBuf;

use anyhow::Context as _;
use chrono::FixedOffset;
use url::Url;

use crate::cli::Args;
use crate::gateway::GatewayConfig;
use crate::time::parse_offset;

/// Everything resolved from flags and environment before a command runs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub credential_file: PathBuf,
    pub server_offset: FixedOffset,
    pub display_offset: FixedOffset,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let server_offset = parse_offset(&args.server_offset)
            .map_err(anyhow::Error::msg)
            .context("--server-offset")?;
        let display_offset = parse_offset(&args.display_offset)
            .map_err(anyhow::Error::msg)
            .context("--display-offset")?;

        Ok(Self {
            base_url: args.base_url.clone(),
            credential_file: args
                .credential_file
                .clone()
                .unwrap_or_else(default_credential_file),
            server_offset,
            display_offset,
            user_agent: args.user_agent.clone(),
        })
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.base_url.clone(),
            user_agent: self.user_agent.clone(),
            server_offset: self.server_offset,
        }
    }
}

fn default_credential_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home)
            .join(".config")
            .join("board-client")
            .join("credential"),
        _ => PathBuf::from(".board-credential"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "board",
            "--base-url",
            "http://board.internal:9000",
            "--credential-file",
            "/tmp/cred",
            "--display-offset",
            "UTC",
            "whoami",
        ])
        .unwrap();
        let config = ClientConfig::from_args(&args).unwrap();
        assert_eq!(config.base_url.as_str(), "http://board.internal:9000/");
        assert_eq!(config.credential_file, PathBuf::from("/tmp/cred"));
        assert_eq!(config.display_offset.local_minus_utc(), 0);
        assert_eq!(config.server_offset.local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn bad_offsets_are_rejected() {
        let args =
            Args::try_parse_from(["board", "--server-offset", "nine", "whoami"]).unwrap();
        assert!(ClientConfig::from_args(&args).is_err());
    }
}
