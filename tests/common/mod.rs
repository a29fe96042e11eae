#![allow(dead_code)]

use git_pr_review::commands::Invocation;
use git_pr_review::editor::{BufferId, EditorHost, HostError};
use git_pr_review::state::{Config, ReviewStore};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct FakeBuffer {
    name: Option<PathBuf>,
    lines: Vec<String>,
}

/// In-memory editor host that records everything the session asks of it.
#[derive(Default)]
pub struct FakeHost {
    buffers: Vec<FakeBuffer>,
    current: u64,
    pub hooks: Vec<(BufferId, Invocation)>,
    pub markers: Vec<(String, BufferId, u32)>,
    pub messages: Vec<String>,
    pub errors: Vec<String>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer named `path` and focus it.
    pub fn open(&mut self, path: impl Into<PathBuf>) -> BufferId {
        self.push(Some(path.into()), Vec::new())
    }

    pub fn focus(&mut self, buffer: BufferId) {
        self.current = buffer.0;
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Simulate the user typing `text` into `buffer`.
    pub fn type_text(&mut self, buffer: BufferId, text: &str) {
        self.buffers[buffer.0 as usize].lines = text.split('\n').map(str::to_string).collect();
    }

    /// Simulate a write of `buffer`, returning the hook it fires, if any.
    pub fn write(&mut self, buffer: BufferId) -> Option<Invocation> {
        let index = self.hooks.iter().position(|(b, _)| *b == buffer)?;
        Some(self.hooks.remove(index).1)
    }

    /// Lines marked in `buffer`, ascending.
    pub fn marked_lines(&self, buffer: BufferId) -> Vec<u32> {
        let mut lines: Vec<u32> = self
            .markers
            .iter()
            .filter(|(_, b, _)| *b == buffer)
            .map(|(_, _, line)| *line)
            .collect();
        lines.sort_unstable();
        lines
    }

    fn push(&mut self, name: Option<PathBuf>, lines: Vec<String>) -> BufferId {
        self.buffers.push(FakeBuffer { name, lines });
        self.current = self.buffers.len() as u64 - 1;
        BufferId(self.current)
    }

    fn get(&self, buffer: BufferId) -> Result<&FakeBuffer, HostError> {
        self.buffers
            .get(buffer.0 as usize)
            .ok_or_else(|| HostError(format!("no buffer {}", buffer.0)))
    }
}

impl EditorHost for FakeHost {
    fn current_buffer(&self) -> BufferId {
        BufferId(self.current)
    }

    fn buffer_name(&self, buffer: BufferId) -> Option<PathBuf> {
        self.get(buffer).ok().and_then(|b| b.name.clone())
    }

    fn buffer_lines(&self, buffer: BufferId) -> Result<Vec<String>, HostError> {
        Ok(self.get(buffer)?.lines.clone())
    }

    fn set_buffer_lines(&mut self, buffer: BufferId, lines: &[String]) -> Result<(), HostError> {
        self.get(buffer)?;
        self.buffers[buffer.0 as usize].lines = lines.to_vec();
        Ok(())
    }

    fn open_buffers(&self) -> Vec<BufferId> {
        (0..self.buffers.len() as u64).map(BufferId).collect()
    }

    fn open_scratch(&mut self) -> Result<BufferId, HostError> {
        Ok(self.push(None, Vec::new()))
    }

    fn on_next_save(&mut self, buffer: BufferId, invocation: Invocation) -> Result<(), HostError> {
        self.get(buffer)?;
        self.hooks.retain(|(b, _)| *b != buffer);
        self.hooks.push((buffer, invocation));
        Ok(())
    }

    fn out_write(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }

    fn err_write(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn clear_markers(&mut self, group: &str) {
        self.markers.retain(|(g, _, _)| g != group);
    }

    fn place_marker(&mut self, buffer: BufferId, line: u32, group: &str) -> Result<(), HostError> {
        self.get(buffer)?;
        self.markers.push((group.to_string(), buffer, line));
        Ok(())
    }
}

/// A fake repository root with a configured review store under `.git/reviews`.
pub struct Workspace {
    pub dir: TempDir,
    pub root: PathBuf,
    pub store: ReviewStore,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("widgets");
        let store = ReviewStore::open(root.join(".git").join("reviews")).unwrap();
        store.write_config(&Config::new("acme", "widgets")).unwrap();
        Self { dir, root, store }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn review_file(&self, pr_number: u32) -> PathBuf {
        self.store.review_file_path(pr_number)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
