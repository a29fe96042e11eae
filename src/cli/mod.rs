use crate::review::Side;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "git-pr-review",
    about = "Draft pull request reviews offline and publish them in one go"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set the repository (owner/repo) reviews are published to.
    Config(ConfigArgs),
    /// Start or resume a review; later commands default to it.
    Start {
        /// Pull request number.
        pr_number: u32,
    },
    /// Add, list or delete line comments.
    Comment {
        #[command(subcommand)]
        action: CommentAction,
    },
    /// Set or show the top-level review body.
    Body {
        #[command(subcommand)]
        action: BodyAction,
    },
    /// Print the whole draft review as JSON.
    Show(PrArgs),
    /// List pull requests that have a draft review.
    List,
    /// Write a new comment on a line range in $EDITOR.
    Draft(DraftArgs),
    /// Edit the comment covering a line in $EDITOR.
    Edit(EditArgs),
    /// Edit the review body in $EDITOR.
    EditBody(PrArgs),
    /// Print a file with a marker on every commented line.
    Markers(MarkersArgs),
    /// Publish the draft review.
    Submit(SubmitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Repository in the form <owner>/<repo>.
    #[arg(required_unless_present = "from_remote", conflicts_with = "from_remote")]
    pub repository: Option<String>,

    /// Read owner and repo from git-pr-review.toml, else from a git remote.
    #[arg(long)]
    pub from_remote: bool,

    /// Remote used by --from-remote.
    #[arg(long, default_value = "origin", requires = "from_remote")]
    pub remote: String,
}

#[derive(Args, Debug)]
pub struct PrArgs {
    /// Pull request number. Defaults to the review last started.
    #[arg(long = "pr", short = 'p')]
    pub pr_number: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum CommentAction {
    /// Add a comment to the draft review.
    Add(AddCommentArgs),
    /// Print the comments of the draft review as JSON.
    List(PrArgs),
    /// Delete the first comment covering a line.
    Delete(LocateArgs),
}

#[derive(Args, Debug)]
pub struct AddCommentArgs {
    #[command(flatten)]
    pub pr: PrArgs,

    /// Comment text.
    #[arg(long)]
    pub body: String,

    /// File path relative to the repository root.
    #[arg(long)]
    pub path: String,

    /// Line the comment is anchored to (last line of a range).
    #[arg(long)]
    pub line: u32,

    #[arg(long, default_value = "RIGHT")]
    pub side: Side,

    /// First line of a multi-line comment.
    #[arg(long)]
    pub start_line: Option<u32>,

    /// Side of --start-line (defaults to --side).
    #[arg(long, requires = "start_line")]
    pub start_side: Option<Side>,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    #[command(flatten)]
    pub pr: PrArgs,

    /// File path relative to the repository root.
    #[arg(long)]
    pub path: String,

    /// Any line covered by the comment.
    #[arg(long)]
    pub line: u32,
}

#[derive(Subcommand, Debug)]
pub enum BodyAction {
    /// Replace the review body.
    Set {
        #[command(flatten)]
        pr: PrArgs,
        /// New body text.
        #[arg(long)]
        body: String,
    },
    /// Print the review body.
    Show(PrArgs),
}

#[derive(Args, Debug)]
pub struct DraftArgs {
    #[command(flatten)]
    pub pr: PrArgs,

    /// File being commented on.
    #[arg(long)]
    pub file: PathBuf,

    /// Lines to comment on, as `N` or `START:END`.
    #[arg(long, value_parser = parse_line_range)]
    pub lines: (u32, u32),
}

#[derive(Args, Debug)]
pub struct EditArgs {
    #[command(flatten)]
    pub pr: PrArgs,

    /// File the comment is on.
    #[arg(long)]
    pub file: PathBuf,

    /// Any line covered by the comment.
    #[arg(long)]
    pub line: u32,
}

#[derive(Args, Debug)]
pub struct MarkersArgs {
    #[command(flatten)]
    pub pr: PrArgs,

    /// File to print.
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub pr: PrArgs,

    /// Base URL of the hosting API [default: https://api.github.com].
    #[arg(long, env = "GIT_PR_REVIEW_API_URL")]
    pub api_url: Option<String>,

    /// Environment variable holding the API token [default: GH_REVIEW_API_TOKEN].
    #[arg(long)]
    pub token_env: Option<String>,

    /// Request timeout in seconds [default: 30].
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Delete the local draft once the review is accepted.
    #[arg(long)]
    pub clear_on_success: bool,
}

/// Parse `N` or `START:END` into an inclusive line range.
pub fn parse_line_range(s: &str) -> Result<(u32, u32), String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid line number '{}'", part))
    };
    let (start, end) = match s.split_once(':') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let line = parse(s)?;
            (line, line)
        }
    };
    if start == 0 || end == 0 {
        return Err("line numbers start at 1".to_string());
    }
    if start > end {
        return Err(format!("range {}:{} ends before it starts", start, end));
    }
    Ok((start, end))
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}
