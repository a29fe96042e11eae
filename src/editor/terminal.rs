use super::{BufferId, EditorHost, HostError};
use crate::commands::Invocation;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

enum BufferKind {
    File(PathBuf),
    Scratch(NamedTempFile),
}

struct Buffer {
    kind: BufferKind,
    lines: Vec<String>,
}

impl Buffer {
    fn path(&self) -> &Path {
        match &self.kind {
            BufferKind::File(path) => path,
            BufferKind::Scratch(file) => file.path(),
        }
    }
}

/// Editor host for the command line.
///
/// Files are loaded read-only, scratch buffers are temp files handed to an
/// external editor by [`TerminalHost::run_editor`], and markers are kept in
/// memory so they can be rendered as a gutter.
pub struct TerminalHost {
    editor: String,
    buffers: Vec<Buffer>,
    current: BufferId,
    pending_saves: Vec<(BufferId, Invocation)>,
    markers: BTreeMap<String, Vec<(BufferId, u32)>>,
}

impl TerminalHost {
    /// `editor` is a command line such as `vim` or `code --wait`.
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
            buffers: Vec::new(),
            current: BufferId(0),
            pending_saves: Vec::new(),
            markers: BTreeMap::new(),
        }
    }

    /// Load a file into a new buffer and focus it.
    pub fn open_file(&mut self, path: &Path) -> Result<BufferId, HostError> {
        let path = fs::canonicalize(path)?;
        let contents = fs::read_to_string(&path)?;
        let lines = contents.lines().map(str::to_string).collect();
        Ok(self.push(Buffer {
            kind: BufferKind::File(path),
            lines,
        }))
    }

    /// Lines carrying a marker of `group` in `buffer`, ascending.
    pub fn markers(&self, buffer: BufferId, group: &str) -> Vec<u32> {
        let mut lines: Vec<u32> = self
            .markers
            .get(group)
            .into_iter()
            .flatten()
            .filter(|(b, _)| *b == buffer)
            .map(|(_, line)| *line)
            .collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }

    /// Hand every scratch buffer with a pending save hook to the editor.
    ///
    /// Returns the hook invocations for the buffers the editor wrote back,
    /// in the order they were registered. A buffer the editor left untouched
    /// does not fire its hook; the hook is dropped. A failing editor aborts
    /// the batch.
    pub fn run_editor(&mut self) -> Result<Vec<Invocation>, HostError> {
        let mut fired = Vec::new();
        for (buffer, invocation) in std::mem::take(&mut self.pending_saves) {
            let path = self.get(buffer)?.path().to_path_buf();
            let mut contents = self.get(buffer)?.lines.join("\n");
            if !contents.is_empty() {
                contents.push('\n');
            }
            fs::write(&path, &contents)?;
            let before = fs::metadata(&path)?.modified()?;

            self.launch(&path)?;

            let edited = fs::read_to_string(&path)?;
            if edited == contents && fs::metadata(&path)?.modified()? == before {
                log::debug!("{} was not written, skipping {}", path.display(), invocation.name);
                continue;
            }
            let buf = self.get_mut(buffer)?;
            buf.lines = edited.lines().map(str::to_string).collect();
            self.current = buffer;
            fired.push(invocation);
        }
        Ok(fired)
    }

    fn launch(&self, path: &Path) -> Result<(), HostError> {
        let mut parts = self.editor.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| HostError("no editor configured".to_string()))?;
        log::debug!("launching {} on {}", self.editor, path.display());
        let status = Command::new(program).args(parts).arg(path).status()?;
        if !status.success() {
            return Err(HostError(format!("{} exited with {}", self.editor, status)));
        }
        Ok(())
    }

    fn push(&mut self, buffer: Buffer) -> BufferId {
        self.buffers.push(buffer);
        self.current = BufferId(self.buffers.len() as u64 - 1);
        self.current
    }

    fn get(&self, buffer: BufferId) -> Result<&Buffer, HostError> {
        self.buffers
            .get(buffer.0 as usize)
            .ok_or_else(|| HostError(format!("no buffer {}", buffer.0)))
    }

    fn get_mut(&mut self, buffer: BufferId) -> Result<&mut Buffer, HostError> {
        self.buffers
            .get_mut(buffer.0 as usize)
            .ok_or_else(|| HostError(format!("no buffer {}", buffer.0)))
    }
}

impl EditorHost for TerminalHost {
    fn current_buffer(&self) -> BufferId {
        self.current
    }

    fn buffer_name(&self, buffer: BufferId) -> Option<PathBuf> {
        self.get(buffer).ok().map(|b| b.path().to_path_buf())
    }

    fn buffer_lines(&self, buffer: BufferId) -> Result<Vec<String>, HostError> {
        Ok(self.get(buffer)?.lines.clone())
    }

    fn set_buffer_lines(&mut self, buffer: BufferId, lines: &[String]) -> Result<(), HostError> {
        self.get_mut(buffer)?.lines = lines.to_vec();
        Ok(())
    }

    fn open_buffers(&self) -> Vec<BufferId> {
        (0..self.buffers.len() as u64).map(BufferId).collect()
    }

    fn open_scratch(&mut self) -> Result<BufferId, HostError> {
        let file = tempfile::Builder::new()
            .prefix("pr-review-")
            .suffix(".md")
            .tempfile()?;
        Ok(self.push(Buffer {
            kind: BufferKind::Scratch(file),
            lines: Vec::new(),
        }))
    }

    fn on_next_save(&mut self, buffer: BufferId, invocation: Invocation) -> Result<(), HostError> {
        self.get(buffer)?;
        self.pending_saves.retain(|(b, _)| *b != buffer);
        self.pending_saves.push((buffer, invocation));
        Ok(())
    }

    fn out_write(&mut self, message: &str) {
        println!("{}", message);
    }

    fn err_write(&mut self, message: &str) {
        eprintln!("{}", message);
    }

    fn clear_markers(&mut self, group: &str) {
        self.markers.remove(group);
    }

    fn place_marker(&mut self, buffer: BufferId, line: u32, group: &str) -> Result<(), HostError> {
        self.get(buffer)?;
        self.markers
            .entry(group.to_string())
            .or_default()
            .push((buffer, line));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_file_focuses_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "one\ntwo\n").unwrap();

        let mut host = TerminalHost::new("true");
        let buffer = host.open_file(&file).unwrap();
        assert_eq!(host.current_buffer(), buffer);
        assert_eq!(host.buffer_lines(buffer).unwrap(), vec!["one", "two"]);
        assert_eq!(host.buffer_name(buffer), Some(fs::canonicalize(&file).unwrap()));
    }

    #[test]
    fn markers_are_grouped_and_cleared() {
        let mut host = TerminalHost::new("true");
        let scratch = host.open_scratch().unwrap();
        host.place_marker(scratch, 4, "a").unwrap();
        host.place_marker(scratch, 2, "a").unwrap();
        host.place_marker(scratch, 2, "b").unwrap();
        assert_eq!(host.markers(scratch, "a"), vec![2, 4]);

        host.clear_markers("a");
        assert!(host.markers(scratch, "a").is_empty());
        assert_eq!(host.markers(scratch, "b"), vec![2]);
    }

    #[test]
    fn place_marker_on_unknown_buffer_fails() {
        let mut host = TerminalHost::new("true");
        assert!(host.place_marker(BufferId(9), 1, "a").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn run_editor_reads_back_scratch_and_fires_hook_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-editor");
        fs::write(&script, "#!/bin/sh\necho \"edited: $(cat \"$1\")\" > \"$1\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut host = TerminalHost::new(script.to_string_lossy());
        let scratch = host.open_scratch().unwrap();
        host.set_buffer_lines(scratch, &["draft".to_string()]).unwrap();
        host.on_next_save(scratch, Invocation::new("SaveComment")).unwrap();

        let fired = host.run_editor().unwrap();
        assert_eq!(fired, vec![Invocation::new("SaveComment")]);
        assert_eq!(host.buffer_lines(scratch).unwrap(), vec!["edited: draft"]);
        assert!(host.run_editor().unwrap().is_empty());
    }

    #[test]
    fn editor_quitting_without_write_fires_nothing() {
        let mut host = TerminalHost::new("true");
        let scratch = host.open_scratch().unwrap();
        host.set_buffer_lines(scratch, &["kept".to_string()]).unwrap();
        host.on_next_save(scratch, Invocation::new("SaveComment")).unwrap();

        assert!(host.run_editor().unwrap().is_empty());
        assert_eq!(host.buffer_lines(scratch).unwrap(), vec!["kept"]);
        assert!(host.run_editor().unwrap().is_empty());
    }

    #[test]
    fn failing_editor_is_an_error() {
        let mut host = TerminalHost::new("false");
        let scratch = host.open_scratch().unwrap();
        host.on_next_save(scratch, Invocation::new("SaveComment")).unwrap();
        assert!(host.run_editor().is_err());
    }
}
