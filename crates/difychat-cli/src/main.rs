//! difychat - command-line client for Dify chat apps

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use difychat_core::api::Rating;
use difychat_core::{ChatSession, ClientConfig};

#[derive(Parser)]
#[command(name = "difychat")]
#[command(about = "Chat with a Dify app from the terminal", version)]
struct Cli {
    /// Config file (defaults to <config dir>/difychat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, e.g. https://api.dify.ai/v1
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// App API key
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// End-user identifier sent with every request
    #[arg(long, global = true)]
    user: Option<String>,

    /// Session id sent with every request
    #[arg(long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message and print the answer
    Chat {
        query: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        blocking: bool,

        /// App input variable as key=value (repeatable)
        #[arg(long = "input", value_parser = parse_key_val)]
        inputs: Vec<(String, String)>,

        /// Attach an image by URL (repeatable)
        #[arg(long = "file-url")]
        file_urls: Vec<String>,

        /// Attach a previously uploaded file by id (repeatable)
        #[arg(long = "file-id")]
        file_ids: Vec<String>,
    },
    /// Upload a file for later attachment
    Upload {
        path: PathBuf,

        /// MIME type (defaults to application/octet-stream)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Stop a running generation
    Stop { task_id: String },
    /// Print the suggested follow-up questions for a message
    Suggested { message_id: String },
    /// Rate a message
    Feedback {
        message_id: String,

        #[arg(long, value_enum)]
        rating: RatingArg,

        #[arg(long, default_value = "")]
        content: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RatingArg {
    Like,
    Dislike,
    /// Revoke an earlier rating
    Clear,
}

impl From<RatingArg> for Option<Rating> {
    fn from(arg: RatingArg) -> Self {
        match arg {
            RatingArg::Like => Some(Rating::Like),
            RatingArg::Dislike => Some(Rating::Dislike),
            RatingArg::Clear => None,
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(api_key) = &cli.api_key {
        config.api_key = Some(api_key.clone());
    }
    if let Some(user) = &cli.user {
        config.default_user = user.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout only carries answers
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let locale = config.locale;

    let mut session = ChatSession::new(config).context("Failed to create HTTP client")?;
    if let Some(session_id) = cli.session {
        session = session.with_session_id(session_id);
    }

    match cli.command {
        Command::Chat {
            query,
            conversation,
            blocking,
            inputs,
            file_urls,
            file_ids,
        } => {
            let request = commands::build_chat_request(
                query,
                conversation,
                blocking,
                inputs,
                file_urls,
                file_ids,
            );
            commands::chat(&session, request, locale).await
        }
        Command::Upload { path, mime } => commands::upload(&session, &path, mime, locale).await,
        Command::Stop { task_id } => commands::stop(&session, &task_id, locale).await,
        Command::Suggested { message_id } => {
            commands::suggested(&session, &message_id, locale).await
        }
        Command::Feedback {
            message_id,
            rating,
            content,
        } => commands::feedback(&session, &message_id, rating.into(), &content, locale).await,
    }
}
