use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the review model itself.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("no comment at {path}:{line}")]
    CommentNotFound { path: String, line: u32 },
    #[error("invalid comment range: {0}")]
    InvalidRange(String),
    #[error("malformed review JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;

/// Which version of the diff a line number refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// The new version of the file.
    #[default]
    Right,
    /// The old version of the file.
    Left,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Right => f.write_str("RIGHT"),
            Side::Left => f.write_str("LEFT"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RIGHT" => Ok(Side::Right),
            "LEFT" => Ok(Side::Left),
            other => Err(format!("invalid side '{}', expected RIGHT or LEFT", other)),
        }
    }
}

/// A line or line-range annotation on one file of the pull request.
///
/// Field order is the on-disk key order, so it must not be shuffled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    body: String,
    path: String,
    line: u32,
    side: Side,
    start_line: Option<u32>,
    start_side: Option<Side>,
}

impl Comment {
    /// Create an empty single-line comment.
    pub fn new(path: impl Into<String>, line: u32, side: Side) -> Result<Self> {
        let comment = Comment {
            body: String::new(),
            path: path.into(),
            line,
            side,
            start_line: None,
            start_side: None,
        };
        comment.validate()?;
        Ok(comment)
    }

    /// Create an empty comment covering `start_line..=line`.
    ///
    /// A span of a single line is stored as a single-line comment, since the
    /// hosting API rejects `start_line == line`.
    pub fn spanning(path: impl Into<String>, start_line: u32, line: u32, side: Side) -> Result<Self> {
        if start_line == line {
            return Self::new(path, line, side);
        }
        let comment = Comment {
            body: String::new(),
            path: path.into(),
            line,
            side,
            start_line: Some(start_line),
            start_side: Some(side),
        };
        comment.validate()?;
        Ok(comment)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Override the side of the first line. Ignored on single-line comments.
    pub fn with_start_side(mut self, side: Side) -> Self {
        if self.start_line.is_some() {
            self.start_side = Some(side);
        }
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The anchor (last) line of the comment.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn start_line(&self) -> Option<u32> {
        self.start_line
    }

    pub fn start_side(&self) -> Option<Side> {
        self.start_side
    }

    /// Every line the comment covers, first to last.
    pub fn lines(&self) -> RangeInclusive<u32> {
        self.start_line.unwrap_or(self.line)..=self.line
    }

    /// Whether this comment sits on `path` and covers `line`.
    pub fn contains(&self, path: &str, line: u32) -> bool {
        if self.path != path {
            return false;
        }
        line == self.line || self.start_line.is_some_and(|start| start <= line && line <= self.line)
    }

    fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(ReviewError::InvalidRange("comment path is empty".to_string()));
        }
        if self.line == 0 {
            return Err(ReviewError::InvalidRange(format!(
                "{}: line numbers start at 1",
                self.path
            )));
        }
        match (self.start_line, self.start_side) {
            (Some(0), _) => Err(ReviewError::InvalidRange(format!(
                "{}: start line numbers start at 1",
                self.path
            ))),
            (Some(start), _) if start > self.line => Err(ReviewError::InvalidRange(format!(
                "{}: start line {} is after line {}",
                self.path, start, self.line
            ))),
            (None, Some(_)) => Err(ReviewError::InvalidRange(format!(
                "{}:{}: start_side is set without start_line",
                self.path, self.line
            ))),
            _ => Ok(()),
        }
    }
}

/// The local draft of a pull-request review.
///
/// Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    owner: String,
    repo: String,
    pr_number: u32,
    body: String,
    comments: Vec<Comment>,
}

impl Review {
    /// A new review with an empty body and no comments.
    pub fn blank(owner: impl Into<String>, repo: impl Into<String>, pr_number: u32) -> Self {
        Review {
            owner: owner.into(),
            repo: repo.into(),
            pr_number,
            body: String::new(),
            comments: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn pr_number(&self) -> u32 {
        self.pr_number
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Append a comment. Duplicates are kept.
    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Remove the first comment equal to `comment` and return it.
    pub fn delete_comment(&mut self, comment: &Comment) -> Result<Comment> {
        let idx = self
            .comments
            .iter()
            .position(|c| c == comment)
            .ok_or_else(|| ReviewError::CommentNotFound {
                path: comment.path.clone(),
                line: comment.line,
            })?;
        Ok(self.comments.remove(idx))
    }

    /// Remove the comment at `index`, if there is one.
    pub fn remove_comment(&mut self, index: usize) -> Option<Comment> {
        (index < self.comments.len()).then(|| self.comments.remove(index))
    }

    pub fn comment_mut(&mut self, index: usize) -> Option<&mut Comment> {
        self.comments.get_mut(index)
    }

    /// Index of the first comment on `path` whose span covers `line`.
    pub fn position_of(&self, path: &str, line: u32) -> Option<usize> {
        self.comments.iter().position(|c| c.contains(path, line))
    }

    /// The first comment on `path` whose span covers `line`.
    pub fn find_comment_at(&self, path: &str, line: u32) -> Option<&Comment> {
        self.position_of(path, line).map(|idx| &self.comments[idx])
    }

    /// Canonical on-disk form: pretty JSON, 2-space indent, trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Parse and validate a review file.
    pub fn from_json(input: &str) -> Result<Self> {
        let review: Review = serde_json::from_str(input)?;
        for comment in &review.comments {
            comment.validate()?;
        }
        Ok(review)
    }
}
