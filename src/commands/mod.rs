//! Named commands the editor host can invoke.
//!
//! Hosts register these names (as user commands, keymaps or hooks) and call
//! [`CommandTable::dispatch`] with whatever range and arguments the user gave.
//! Every failure is written to the host's error area and also returned, so
//! the session stays usable after any error.

use crate::editor::{BufferId, EditorHost};
use crate::session::{Session, SessionError};
use std::collections::BTreeMap;
use thiserror::Error;

pub const START_REVIEW: &str = "StartReview";
pub const REVIEW_COMMENT: &str = "ReviewComment";
pub const SAVE_COMMENT: &str = "SaveComment";
pub const CANCEL_COMMENT: &str = "CancelComment";
pub const EDIT_COMMENT: &str = "EditComment";
pub const DELETE_COMMENT: &str = "DeleteComment";
pub const REVIEW_BODY: &str = "ReviewBody";
pub const SAVE_REVIEW_BODY: &str = "SaveReviewBody";
pub const PUBLISH_REVIEW: &str = "PublishReview";
pub const UPDATE_REVIEW_MARKERS: &str = "UpdateReviewMarkers";
pub const LIST_REVIEW_COMMENTS: &str = "ListReviewComments";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{command}: {reason}")]
    BadArgs { command: String, reason: String },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Arguments a host passes along with a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    /// Selected lines, first and last, 1-based. A plain cursor is `(n, n)`.
    pub range: Option<(u32, u32)>,
    pub args: Vec<String>,
}

impl CommandArgs {
    pub fn with_range(start: u32, end: u32) -> Self {
        Self {
            range: Some((start, end)),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            range: None,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// A command name plus its arguments, as stored in save hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: CommandArgs,
}

impl Invocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: CommandArgs::default(),
        }
    }

    /// `name` bound to one buffer, for hooks that must act on the buffer written.
    pub fn for_buffer(name: impl Into<String>, buffer: BufferId) -> Self {
        Self {
            name: name.into(),
            args: CommandArgs::with_args([buffer.0.to_string()]),
        }
    }
}

type Handler = fn(&mut Session, &mut dyn EditorHost, &CommandArgs) -> Result<(), CommandError>;

/// A registered command.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    handler: Handler,
}

#[derive(Default)]
pub struct CommandTable {
    commands: BTreeMap<&'static str, CommandSpec>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table with every review command registered.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(START_REVIEW, "Start or resume the review of a pull request", start_review);
        table.register(REVIEW_COMMENT, "Add a review comment on the selected lines", review_comment);
        table.register(SAVE_COMMENT, "Save the comment being edited", save_comment);
        table.register(CANCEL_COMMENT, "Discard the comment being edited", cancel_comment);
        table.register(EDIT_COMMENT, "Edit the comment under the cursor", edit_comment);
        table.register(DELETE_COMMENT, "Delete the comment under the cursor", delete_comment);
        table.register(REVIEW_BODY, "Edit the body text of the review", review_body);
        table.register(SAVE_REVIEW_BODY, "Save the review body being edited", save_review_body);
        table.register(PUBLISH_REVIEW, "Publish the review", publish_review);
        table.register(UPDATE_REVIEW_MARKERS, "Redraw the markers for review comments", update_markers);
        table.register(LIST_REVIEW_COMMENTS, "List all review comments", list_comments);
        table
    }

    pub fn register(&mut self, name: &'static str, description: &'static str, handler: Handler) {
        self.commands.insert(
            name,
            CommandSpec {
                name,
                description,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    /// Registered commands, sorted by name.
    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }

    /// Run `name` against the session, reporting any failure to the host.
    pub fn dispatch(
        &self,
        session: &mut Session,
        host: &mut dyn EditorHost,
        name: &str,
        args: &CommandArgs,
    ) -> Result<(), CommandError> {
        log::debug!("dispatching {} {:?}", name, args);
        let result = match self.commands.get(name) {
            Some(spec) => (spec.handler)(session, host, args),
            None => Err(CommandError::Unknown(name.to_string())),
        };
        if let Err(err) = &result {
            host.err_write(&err.to_string());
        }
        result
    }

    pub fn run(
        &self,
        session: &mut Session,
        host: &mut dyn EditorHost,
        invocation: &Invocation,
    ) -> Result<(), CommandError> {
        self.dispatch(session, host, &invocation.name, &invocation.args)
    }
}

fn bad_args(command: &str, reason: impl Into<String>) -> CommandError {
    CommandError::BadArgs {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn cursor_line(command: &str, args: &CommandArgs) -> Result<u32, CommandError> {
    args.range
        .map(|(start, _)| start)
        .ok_or_else(|| bad_args(command, "needs a cursor line"))
}

fn start_review(session: &mut Session, host: &mut dyn EditorHost, args: &CommandArgs) -> Result<(), CommandError> {
    let pr_number = match args.args.as_slice() {
        [pr] => pr
            .trim_start_matches('#')
            .parse::<u32>()
            .map_err(|_| bad_args(START_REVIEW, format!("invalid pull request number '{}'", pr)))?,
        _ => return Err(bad_args(START_REVIEW, "expects one pull request number")),
    };
    Ok(session.start_review(host, pr_number)?)
}

fn review_comment(session: &mut Session, host: &mut dyn EditorHost, args: &CommandArgs) -> Result<(), CommandError> {
    let (start, end) = args
        .range
        .ok_or_else(|| bad_args(REVIEW_COMMENT, "needs a line range"))?;
    Ok(session.begin_comment(host, start, end)?)
}

fn save_comment(session: &mut Session, host: &mut dyn EditorHost, _args: &CommandArgs) -> Result<(), CommandError> {
    Ok(session.save_comment(host)?)
}

fn cancel_comment(session: &mut Session, host: &mut dyn EditorHost, _args: &CommandArgs) -> Result<(), CommandError> {
    Ok(session.cancel_comment(host)?)
}

fn edit_comment(session: &mut Session, host: &mut dyn EditorHost, args: &CommandArgs) -> Result<(), CommandError> {
    let line = cursor_line(EDIT_COMMENT, args)?;
    Ok(session.edit_comment(host, line)?)
}

fn delete_comment(session: &mut Session, host: &mut dyn EditorHost, args: &CommandArgs) -> Result<(), CommandError> {
    let line = cursor_line(DELETE_COMMENT, args)?;
    Ok(session.delete_comment(host, line)?)
}

fn review_body(session: &mut Session, host: &mut dyn EditorHost, _args: &CommandArgs) -> Result<(), CommandError> {
    Ok(session.edit_body(host)?)
}

fn save_review_body(session: &mut Session, host: &mut dyn EditorHost, args: &CommandArgs) -> Result<(), CommandError> {
    let buffer = match args.args.as_slice() {
        [id] => id
            .parse::<u64>()
            .map(BufferId)
            .map_err(|_| bad_args(SAVE_REVIEW_BODY, format!("invalid buffer '{}'", id)))?,
        _ => return Err(bad_args(SAVE_REVIEW_BODY, "expects the body buffer")),
    };
    Ok(session.save_body(host, buffer)?)
}

fn publish_review(session: &mut Session, host: &mut dyn EditorHost, _args: &CommandArgs) -> Result<(), CommandError> {
    let response = session.publish_review(host)?;
    if !response.body.is_empty() {
        log::debug!("publish response: {}", response.body);
    }
    Ok(())
}

fn update_markers(session: &mut Session, host: &mut dyn EditorHost, _args: &CommandArgs) -> Result<(), CommandError> {
    Ok(session.update_markers(host)?)
}

fn list_comments(session: &mut Session, host: &mut dyn EditorHost, _args: &CommandArgs) -> Result<(), CommandError> {
    session.list_comments(host)?;
    Ok(())
}
