use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not in a git repository")]
    NotARepo,
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("unsupported remote url: {0}")]
    InvalidRemote(String),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

/// Run `git -C <dir> <args>` and return trimmed stdout.
///
/// Any non-zero exit is reported as `NotARepo` when git says so, as
/// `CommandFailed` otherwise.
fn git_output(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git").arg("-C").arg(dir).args(args).output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepo);
        }
        return Err(GitError::CommandFailed(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Find the root of the work tree containing `dir`.
pub fn find_repo_root(dir: &Path) -> Result<PathBuf> {
    let path = git_output(dir, &["rev-parse", "--show-toplevel"])?;
    if path.is_empty() {
        // bare repositories have no work tree
        return Err(GitError::NotARepo);
    }
    Ok(PathBuf::from(path))
}

/// Find the metadata directory (usually `.git`) of the repository containing `dir`.
///
/// git reports it relative to `dir` when it can, so the result is joined back
/// onto `dir` to make it absolute.
pub fn find_git_dir(dir: &Path) -> Result<PathBuf> {
    let path = PathBuf::from(git_output(dir, &["rev-parse", "--git-dir"])?);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(dir.join(path))
    }
}

/// URL of the named remote.
pub fn remote_url(dir: &Path, remote: &str) -> Result<String> {
    git_output(dir, &["remote", "get-url", remote])
}

/// Extract `(owner, repo)` from a GitHub remote URL.
///
/// Supports the SSH (`git@github.com:owner/repo.git`) and HTTPS
/// (`https://github.com/owner/repo.git`) forms.
pub fn parse_remote_url(url: &str) -> Result<(String, String)> {
    let url = url.trim();
    let path = if let Some((_, rest)) = url.split_once("://") {
        // https://host/owner/repo, ssh://git@host/owner/repo
        rest.split_once('/').map(|(_, path)| path)
    } else if url.contains('@') {
        // git@host:owner/repo
        url.split_once(':').map(|(_, path)| path)
    } else {
        None
    }
    .ok_or_else(|| GitError::InvalidRemote(url.to_string()))?;

    let mut parts = path.trim_end_matches('/').split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            if repo.is_empty() {
                return Err(GitError::InvalidRemote(url.to_string()));
            }
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(GitError::InvalidRemote(url.to_string())),
    }
}
