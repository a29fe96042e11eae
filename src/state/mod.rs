use crate::git::{self, GitError};
use crate::review::{Review, ReviewError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const STATE_DIR: &str = "reviews";
const CONFIG_FILE: &str = "config.json";
const REVIEW_FILE_SUFFIX: &str = "-review.json";

/// Errors that can occur while reading or writing local review state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no repository configured; run `git-pr-review config <owner>/<repo>` first")]
    ConfigMissing,
    #[error("no draft review for PR #{0}")]
    ReviewNotFound(u32),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("{path}: {source}")]
    Review {
        path: PathBuf,
        #[source]
        source: ReviewError,
    },
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Repository coordinates on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub owner: String,
    pub repo: String,
    /// Pull request commands act on when none is named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_pr: Option<u32>,
}

impl Config {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            active_pr: None,
        }
    }
}

/// File-backed store for draft reviews and the repository config.
///
/// Lives in `.git/reviews/`, one `{pr}-review.json` per pull request plus a
/// shared `config.json`. There is no locking: concurrent writers race and the
/// last one wins.
#[derive(Debug, Clone)]
pub struct ReviewStore {
    dir: PathBuf,
}

impl ReviewStore {
    /// Open the store for the repository containing the current directory.
    pub fn discover() -> Result<Self> {
        Self::discover_from(&std::env::current_dir()?)
    }

    /// Open the store for the repository containing `dir`.
    pub fn discover_from(dir: &Path) -> Result<Self> {
        let git_dir = git::find_git_dir(dir)?;
        Self::open(git_dir.join(STATE_DIR))
    }

    /// Open a store rooted at an explicit directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::debug!("review state directory at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn review_file_path(&self, pr_number: u32) -> PathBuf {
        self.dir.join(format!("{}{}", pr_number, REVIEW_FILE_SUFFIX))
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn exists(&self, pr_number: u32) -> bool {
        self.review_file_path(pr_number).exists()
    }

    /// Load the draft for `pr_number`, failing if none has been saved.
    pub fn load(&self, pr_number: u32) -> Result<Review> {
        let path = self.review_file_path(pr_number);
        if !path.exists() {
            return Err(StateError::ReviewNotFound(pr_number));
        }
        let contents = fs::read_to_string(&path)?;
        Review::from_json(&contents).map_err(|source| StateError::Review { path, source })
    }

    /// Load the draft for `pr_number`, or start a blank one from the config.
    ///
    /// The blank review is not written until the first `save`.
    pub fn load_or_create(&self, pr_number: u32) -> Result<Review> {
        if self.exists(pr_number) {
            return self.load(pr_number);
        }
        let config = self.load_config()?;
        log::debug!("starting blank review for PR #{}", pr_number);
        Ok(Review::blank(config.owner, config.repo, pr_number))
    }

    /// Write `review` to its file, replacing any previous version atomically.
    pub fn save(&self, review: &Review) -> Result<()> {
        let path = self.review_file_path(review.pr_number());
        let json = review.to_json().map_err(|source| StateError::Review {
            path: path.clone(),
            source,
        })?;
        self.write_atomic(&path, json.as_bytes())?;
        log::debug!(
            "saved review for PR #{} ({} comments) to {}",
            review.pr_number(),
            review.comments().len(),
            path.display()
        );
        Ok(())
    }

    /// Delete the draft for `pr_number`. Returns whether a file was removed.
    pub fn remove(&self, pr_number: u32) -> Result<bool> {
        let path = self.review_file_path(pr_number);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        log::debug!("removed {}", path.display());
        Ok(true)
    }

    /// PR numbers with a draft on disk, ascending.
    pub fn list_reviews(&self) -> Result<Vec<u32>> {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(number) = name
                .strip_suffix(REVIEW_FILE_SUFFIX)
                .and_then(|n| n.parse::<u32>().ok())
            {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    pub fn load_config(&self) -> Result<Config> {
        let path = self.config_file_path();
        if !path.exists() {
            return Err(StateError::ConfigMissing);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the repository config.
    ///
    /// Returns `true` when an existing config was overwritten.
    pub fn write_config(&self, config: &Config) -> Result<bool> {
        let path = self.config_file_path();
        let replaced = path.exists();
        if replaced {
            log::warn!("overwriting existing configuration at {}", path.display());
        }
        self.store_config(config)?;
        Ok(replaced)
    }

    /// Record `pr_number` as the active review in the existing config.
    pub fn set_active_pr(&self, pr_number: u32) -> Result<()> {
        let mut config = self.load_config()?;
        if config.active_pr == Some(pr_number) {
            return Ok(());
        }
        config.active_pr = Some(pr_number);
        self.store_config(&config)?;
        log::debug!("active review is now PR #{}", pr_number);
        Ok(())
    }

    fn store_config(&self, config: &Config) -> Result<()> {
        let mut json = serde_json::to_string_pretty(config)?;
        json.push('\n');
        self.write_atomic(&self.config_file_path(), json.as_bytes())
    }

    /// Write to a temp file next to `path`, sync it, then rename over `path`.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(contents)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| StateError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{Comment, Side};

    fn store() -> (tempfile::TempDir, ReviewStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReviewStore::open(dir.path().join("reviews")).unwrap();
        (dir, store)
    }

    fn configured_store() -> (tempfile::TempDir, ReviewStore) {
        let (dir, store) = store();
        store.write_config(&Config::new("acme", "widgets")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_directory() {
        let (dir, _store) = store();
        assert!(dir.path().join("reviews").is_dir());
    }

    #[test]
    fn file_paths_follow_layout() {
        let (dir, store) = store();
        assert_eq!(
            store.review_file_path(42),
            dir.path().join("reviews/42-review.json")
        );
        assert_eq!(
            store.config_file_path(),
            dir.path().join("reviews/config.json")
        );
    }

    #[test]
    fn load_config_missing() {
        let (_dir, store) = store();
        assert!(matches!(store.load_config(), Err(StateError::ConfigMissing)));
    }

    #[test]
    fn write_config_reports_overwrite() {
        let (_dir, store) = store();
        assert!(!store.write_config(&Config::new("acme", "widgets")).unwrap());

        let other = Config::new("acme", "gadgets");
        assert!(store.write_config(&other).unwrap());
        assert_eq!(store.load_config().unwrap(), other);
    }

    #[test]
    fn config_file_format() {
        let (_dir, store) = configured_store();
        let contents = fs::read_to_string(store.config_file_path()).unwrap();
        assert_eq!(contents, "{\n  \"owner\": \"acme\",\n  \"repo\": \"widgets\"\n}\n");
    }

    #[test]
    fn active_pr_is_kept_in_config() {
        let (_dir, store) = configured_store();
        store.set_active_pr(42).unwrap();

        let config = store.load_config().unwrap();
        assert_eq!(config.active_pr, Some(42));
        assert_eq!(config.owner, "acme");
        let contents = fs::read_to_string(store.config_file_path()).unwrap();
        assert!(contents.contains("\"active_pr\": 42"));
    }

    #[test]
    fn active_pr_needs_config() {
        let (_dir, store) = store();
        assert!(matches!(store.set_active_pr(1), Err(StateError::ConfigMissing)));
    }

    #[test]
    fn config_without_active_pr_still_loads() {
        let (_dir, store) = store();
        fs::write(store.config_file_path(), r#"{"owner": "acme", "repo": "widgets"}"#).unwrap();
        assert_eq!(store.load_config().unwrap(), Config::new("acme", "widgets"));
    }

    #[test]
    fn load_or_create_without_config_fails() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load_or_create(1),
            Err(StateError::ConfigMissing)
        ));
    }

    #[test]
    fn load_or_create_returns_blank_review_without_writing() {
        let (_dir, store) = configured_store();
        let review = store.load_or_create(42).unwrap();
        assert_eq!(review, Review::blank("acme", "widgets", 42));
        assert!(!store.exists(42));
    }

    #[test]
    fn strict_load_missing_review() {
        let (_dir, store) = configured_store();
        assert!(matches!(store.load(7), Err(StateError::ReviewNotFound(7))));
    }

    #[test]
    fn save_and_load_round_trip() {
        let (_dir, store) = configured_store();
        let mut review = store.load_or_create(42).unwrap();
        review.set_body("summary");
        review.add_comment(
            Comment::spanning("src/a.py", 8, 12, Side::Right)
                .unwrap()
                .with_body("span"),
        );
        store.save(&review).unwrap();

        assert_eq!(store.load(42).unwrap(), review);
        assert_eq!(store.load_or_create(42).unwrap(), review);
    }

    #[test]
    fn save_twice_is_byte_identical() {
        let (_dir, store) = configured_store();
        let mut review = store.load_or_create(42).unwrap();
        review.add_comment(Comment::new("src/a.py", 3, Side::Right).unwrap());

        store.save(&review).unwrap();
        let first = fs::read(store.review_file_path(42)).unwrap();
        store.save(&review).unwrap();
        let second = fs::read(store.review_file_path(42)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let (_dir, store) = configured_store();
        store.save(&Review::blank("acme", "widgets", 1)).unwrap();
        store.save(&Review::blank("acme", "widgets", 1)).unwrap();

        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {:?}", names);
    }

    #[test]
    fn load_reports_malformed_file() {
        let (_dir, store) = configured_store();
        fs::write(store.review_file_path(3), "{ not json").unwrap();
        assert!(matches!(store.load(3), Err(StateError::Review { .. })));
    }

    #[test]
    fn remove_and_list_reviews() {
        let (_dir, store) = configured_store();
        for pr in [12, 3, 7] {
            store.save(&Review::blank("acme", "widgets", pr)).unwrap();
        }
        assert_eq!(store.list_reviews().unwrap(), vec![3, 7, 12]);

        assert!(store.remove(7).unwrap());
        assert!(!store.remove(7).unwrap());
        assert_eq!(store.list_reviews().unwrap(), vec![3, 12]);
    }
}
