use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Ask questions about your data warehouse from the terminal.
#[derive(Debug, Parser)]
#[command(name = "querydesk", version)]
pub struct Cli {
    /// Settings file (defaults to ~/.querydesk/settings.json).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL, e.g. http://127.0.0.1:8340/api/cortex
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Delay between typed characters of a streamed summary.
    #[arg(long, global = true)]
    pub typing_interval_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ask one question and exit.
    Ask(AskArgs),
    /// Start the interactive session (the default).
    Chat,
}

#[derive(Debug, Args)]
pub struct AskArgs {
    pub prompt: String,

    /// Run the generated SQL.
    #[arg(long)]
    pub execute: bool,

    /// Summarize the result (implies --execute).
    #[arg(long)]
    pub summarize: bool,

    /// Semantic model to use; repeatable.
    #[arg(long = "model")]
    pub models: Vec<String>,

    /// Search service to use; repeatable.
    #[arg(long = "search")]
    pub search_services: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_with_flags() {
        let cli = Cli::parse_from([
            "querydesk",
            "--base-url",
            "http://h:1/api",
            "ask",
            "total enrollment by plan",
            "--summarize",
            "--model",
            "members.yaml",
        ]);
        assert_eq!(cli.base_url.as_deref(), Some("http://h:1/api"));
        let Some(Command::Ask(args)) = cli.command else {
            panic!("expected ask");
        };
        assert!(args.summarize);
        assert!(!args.execute);
        assert_eq!(args.models, vec!["members.yaml"]);
    }

    #[test]
    fn no_subcommand_means_chat() {
        let cli = Cli::parse_from(["querydesk", "--log-level", "debug"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
