//! The editor capabilities the review session relies on.
//!
//! A host owns the buffers, the margin markers and the message area. The
//! session never touches them directly; it asks the host through
//! [`EditorHost`] and gets called back through the command table when a hook
//! fires.

pub mod terminal;

use crate::commands::Invocation;
use crate::review::Side;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

pub use terminal::TerminalHost;

/// Something the host could not do.
#[derive(Debug, Error)]
#[error("editor: {0}")]
pub struct HostError(pub String);

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        HostError(err.to_string())
    }
}

/// Opaque handle to a host buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// One entry of a location list (file, line, text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLocation {
    pub path: PathBuf,
    pub line: u32,
    pub text: String,
}

pub trait EditorHost {
    /// The buffer that has focus.
    fn current_buffer(&self) -> BufferId;

    /// File-system path backing `buffer`, if it has one.
    fn buffer_name(&self, buffer: BufferId) -> Option<PathBuf>;

    fn buffer_lines(&self, buffer: BufferId) -> Result<Vec<String>, HostError>;

    fn set_buffer_lines(&mut self, buffer: BufferId, lines: &[String]) -> Result<(), HostError>;

    /// Every buffer currently loaded, scratch buffers included.
    fn open_buffers(&self) -> Vec<BufferId>;

    /// Open an empty buffer bound to a temporary file in a split and focus it.
    fn open_scratch(&mut self) -> Result<BufferId, HostError>;

    /// Run `invocation` right before the next write of `buffer`, once.
    fn on_next_save(&mut self, buffer: BufferId, invocation: Invocation) -> Result<(), HostError>;

    fn out_write(&mut self, message: &str);

    fn err_write(&mut self, message: &str);

    /// Remove every marker placed in `group`, in all buffers.
    fn clear_markers(&mut self, group: &str);

    fn place_marker(&mut self, buffer: BufferId, line: u32, group: &str) -> Result<(), HostError>;

    /// Present a list of locations. Hosts without a location list print them.
    fn show_locations(&mut self, locations: &[CommentLocation]) {
        for location in locations {
            let first_line = location.text.lines().next().unwrap_or_default();
            self.out_write(&format!(
                "{}:{}: {}",
                location.path.display(),
                location.line,
                first_line
            ));
        }
    }
}

/// `fugitive:///repo/.git//<sha>/path` names a file as of an older revision.
static PRIOR_REVISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^fugitive://.*/\.git/.*?[0-9a-f]{40}/(.+)$").expect("valid regex")
});

/// Map a buffer name to the repository-relative path a comment should carry.
///
/// Work-tree files resolve to the `RIGHT` side. Buffers showing a file at an
/// older revision resolve to `LEFT`. Anything outside `repo_root` is `None`.
pub fn resolve_buffer_path(repo_root: &Path, buffer_name: &Path) -> Option<(Side, String)> {
    let name = buffer_name.to_str()?;
    if let Some(captures) = PRIOR_REVISION.captures(name) {
        return Some((Side::Left, captures[1].to_string()));
    }

    if !buffer_name.is_absolute() {
        return None;
    }
    let relative = buffer_name.strip_prefix(repo_root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some((Side::Right, parts.join("/")))
}
