//! Interactive drafting workflow on top of the review model.
//!
//! A [`Session`] is `Idle` until a review is started, then `ReviewActive`,
//! and `EditingComment` while exactly one comment draft is open in a scratch
//! buffer. Every mutation is applied to a copy of the review, saved, and only
//! then committed, so a failed write leaves the session as it was.

use crate::commands::{Invocation, SAVE_COMMENT, SAVE_REVIEW_BODY};
use crate::editor::{BufferId, CommentLocation, EditorHost, HostError, resolve_buffer_path};
use crate::publish::{PublishError, PublishResponse, Publisher};
use crate::review::{Comment, Review, ReviewError, Side};
use crate::state::{ReviewStore, StateError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker group holding one marker per commented line.
pub const MARKER_GROUP: &str = "PrReviewComments";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no review is currently active")]
    NoActiveReview,
    #[error("a review comment is already being edited")]
    ConcurrentEdit,
    #[error("current buffer is not a valid path in the git repository")]
    InvalidPath,
    #[error("nothing is being edited")]
    NoDraft,
    #[error("no comment under the cursor")]
    CommentNotFound,
    #[error("failed to publish review: {0}")]
    Publish(#[from] PublishError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ReviewActive,
    EditingComment,
}

/// What happens to the local draft after the API accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// Leave the review file in place; publishing it again sends a duplicate.
    #[default]
    KeepDraft,
    /// Delete the review file.
    ClearOnSuccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DraftOrigin {
    New,
    /// Index of the comment being edited.
    Existing(usize),
}

#[derive(Debug)]
struct Draft {
    comment: Comment,
    origin: DraftOrigin,
    buffer: BufferId,
}

pub struct Session {
    store: ReviewStore,
    repo_root: PathBuf,
    publisher: Box<dyn Publisher>,
    policy: PublishPolicy,
    review: Option<Review>,
    draft: Option<Draft>,
    /// Scratch buffers holding an unsaved review body.
    body_buffers: Vec<BufferId>,
}

impl Session {
    pub fn new(store: ReviewStore, repo_root: impl Into<PathBuf>, publisher: Box<dyn Publisher>) -> Self {
        Self {
            store,
            repo_root: repo_root.into(),
            publisher,
            policy: PublishPolicy::default(),
            review: None,
            draft: None,
            body_buffers: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        match (&self.review, &self.draft) {
            (None, _) => SessionState::Idle,
            (Some(_), None) => SessionState::ReviewActive,
            (Some(_), Some(_)) => SessionState::EditingComment,
        }
    }

    pub fn is_active(&self) -> bool {
        self.review.is_some()
    }

    pub fn review(&self) -> Option<&Review> {
        self.review.as_ref()
    }

    /// The comment currently open for editing, as it was when opened.
    pub fn draft(&self) -> Option<&Comment> {
        self.draft.as_ref().map(|d| &d.comment)
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn store(&self) -> &ReviewStore {
        &self.store
    }

    /// Load (or start) the review for `pr_number` and make it active.
    pub fn start_review(&mut self, host: &mut dyn EditorHost, pr_number: u32) -> Result<()> {
        self.ensure_no_draft()?;
        let review = self.store.load_or_create(pr_number)?;
        if let Err(err) = self.store.set_active_pr(pr_number) {
            log::warn!("could not record PR #{} as active: {}", pr_number, err);
        }
        host.out_write(&format!(
            "Reviewing PR #{} on {}/{} ({} comments)",
            review.pr_number(),
            review.owner(),
            review.repo(),
            review.comments().len()
        ));
        log::debug!("session active for PR #{}", pr_number);
        self.review = Some(review);
        self.body_buffers.clear();
        self.update_markers(host)
    }

    /// Open a scratch buffer for a new comment on `start..=end` of the current buffer.
    ///
    /// The review is not touched until the scratch buffer is saved.
    pub fn begin_comment(&mut self, host: &mut dyn EditorHost, start: u32, end: u32) -> Result<()> {
        self.active_review()?;
        self.ensure_no_draft()?;
        let (side, path) = self.current_path(host)?;
        let comment = Comment::spanning(path, start, end, side)?;

        let buffer = host.open_scratch()?;
        host.on_next_save(buffer, Invocation::new(SAVE_COMMENT))?;
        log::debug!("drafting comment on {}:{}-{}", comment.path(), start, end);
        self.draft = Some(Draft {
            comment,
            origin: DraftOrigin::New,
            buffer,
        });
        Ok(())
    }

    /// Open the comment covering `line` of the current buffer for editing.
    pub fn edit_comment(&mut self, host: &mut dyn EditorHost, line: u32) -> Result<()> {
        self.ensure_no_draft()?;
        let (_, path) = self.current_path(host)?;
        let review = self.active_review()?;
        let index = review
            .position_of(&path, line)
            .ok_or(SessionError::CommentNotFound)?;
        let comment = review.comments()[index].clone();

        let buffer = host.open_scratch()?;
        host.set_buffer_lines(buffer, &split_lines(comment.body()))?;
        host.on_next_save(buffer, Invocation::new(SAVE_COMMENT))?;
        self.draft = Some(Draft {
            comment,
            origin: DraftOrigin::Existing(index),
            buffer,
        });
        Ok(())
    }

    /// Commit the draft with the text of its scratch buffer.
    pub fn save_comment(&mut self, host: &mut dyn EditorHost) -> Result<()> {
        let draft = self.draft.as_ref().ok_or(SessionError::NoDraft)?;
        let text = host.buffer_lines(draft.buffer)?.join("\n");

        let mut updated = self.active_review()?.clone();
        match draft.origin {
            DraftOrigin::New => updated.add_comment(draft.comment.clone().with_body(text)),
            DraftOrigin::Existing(index) => updated
                .comment_mut(index)
                .ok_or(SessionError::CommentNotFound)?
                .set_body(text),
        }

        let buffer = draft.buffer;
        if let Err(err) = self.store.save(&updated) {
            // keep the draft so the next write retries
            if let Err(rearm) = host.on_next_save(buffer, Invocation::new(SAVE_COMMENT)) {
                log::warn!("could not re-arm save hook: {}", rearm);
            }
            return Err(err.into());
        }

        self.review = Some(updated);
        self.draft = None;
        host.out_write("Comment saved.");
        self.update_markers(host)
    }

    /// Drop the draft without touching the review.
    pub fn cancel_comment(&mut self, host: &mut dyn EditorHost) -> Result<()> {
        self.draft.take().ok_or(SessionError::NoDraft)?;
        host.out_write("Comment discarded.");
        Ok(())
    }

    /// Delete the comment covering `line` of the current buffer.
    pub fn delete_comment(&mut self, host: &mut dyn EditorHost, line: u32) -> Result<()> {
        self.ensure_no_draft()?;
        let (_, path) = self.current_path(host)?;
        let review = self.active_review()?;
        let comment = review
            .find_comment_at(&path, line)
            .ok_or(SessionError::CommentNotFound)?
            .clone();

        let mut updated = review.clone();
        updated.delete_comment(&comment)?;
        self.store.save(&updated)?;

        self.review = Some(updated);
        host.out_write("Comment deleted.");
        self.update_markers(host)
    }

    /// Open a scratch buffer holding the review body.
    ///
    /// Each call opens its own buffer; its save hook names the buffer so a
    /// write stores that buffer's text.
    pub fn edit_body(&mut self, host: &mut dyn EditorHost) -> Result<()> {
        let body = self.active_review()?.body().to_string();
        let buffer = host.open_scratch()?;
        host.set_buffer_lines(buffer, &split_lines(&body))?;
        host.on_next_save(buffer, Invocation::for_buffer(SAVE_REVIEW_BODY, buffer))?;
        self.body_buffers.push(buffer);
        Ok(())
    }

    /// Store the text of body buffer `buffer` as the review body.
    pub fn save_body(&mut self, host: &mut dyn EditorHost, buffer: BufferId) -> Result<()> {
        if !self.body_buffers.contains(&buffer) {
            return Err(SessionError::NoDraft);
        }
        let text = host.buffer_lines(buffer)?.join("\n");

        let mut updated = self.active_review()?.clone();
        updated.set_body(text);
        if let Err(err) = self.store.save(&updated) {
            let invocation = Invocation::for_buffer(SAVE_REVIEW_BODY, buffer);
            if let Err(rearm) = host.on_next_save(buffer, invocation) {
                log::warn!("could not re-arm save hook: {}", rearm);
            }
            return Err(err.into());
        }

        self.review = Some(updated);
        self.body_buffers.retain(|b| *b != buffer);
        host.out_write("Review body saved.");
        Ok(())
    }

    /// Send the review in one request.
    ///
    /// On success the session goes back to `Idle`. On any failure it stays
    /// `ReviewActive` with the draft untouched so the publish can be retried.
    pub fn publish_review(&mut self, host: &mut dyn EditorHost) -> Result<PublishResponse> {
        self.ensure_no_draft()?;
        let review = self.active_review()?;
        let pr_number = review.pr_number();

        let response = self.publisher.publish(review)?.error_for_status()?;
        host.out_write(&format!("Review for PR #{} published ({}).", pr_number, response.status));

        if self.policy == PublishPolicy::ClearOnSuccess {
            match self.store.remove(pr_number) {
                Ok(_) => log::info!("cleared local draft for PR #{}", pr_number),
                Err(err) => host.err_write(&format!("Could not remove local draft: {}", err)),
            }
        }
        self.review = None;
        self.body_buffers.clear();
        self.update_markers(host)?;
        Ok(response)
    }

    /// Send every comment location to the host's location list.
    pub fn list_comments(&self, host: &mut dyn EditorHost) -> Result<usize> {
        let review = self.active_review()?;
        let locations: Vec<CommentLocation> = review
            .comments()
            .iter()
            .map(|c| CommentLocation {
                path: self.repo_root.join(c.path()),
                line: *c.lines().start(),
                text: c.body().to_string(),
            })
            .collect();
        host.show_locations(&locations);
        Ok(locations.len())
    }

    /// Recompute every marker from scratch.
    ///
    /// Clears the marker group, then marks each line covered by a comment in
    /// every open buffer showing that comment's file on that comment's side:
    /// work-tree buffers for `RIGHT`, prior-revision buffers for `LEFT`.
    pub fn update_markers(&self, host: &mut dyn EditorHost) -> Result<()> {
        host.clear_markers(MARKER_GROUP);
        let Some(review) = &self.review else {
            return Ok(());
        };

        for buffer in host.open_buffers() {
            let Some((side, path)) = host
                .buffer_name(buffer)
                .and_then(|name| resolve_buffer_path(&self.repo_root, &name))
            else {
                continue;
            };
            for comment in review.comments() {
                if comment.path() != path || comment.side() != side {
                    continue;
                }
                for line in comment.lines() {
                    host.place_marker(buffer, line, MARKER_GROUP)?;
                }
            }
        }
        Ok(())
    }

    fn active_review(&self) -> Result<&Review> {
        self.review.as_ref().ok_or(SessionError::NoActiveReview)
    }

    fn ensure_no_draft(&self) -> Result<()> {
        if self.draft.is_some() {
            return Err(SessionError::ConcurrentEdit);
        }
        Ok(())
    }

    fn current_path(&self, host: &dyn EditorHost) -> Result<(Side, String)> {
        host.buffer_name(host.current_buffer())
            .and_then(|name| resolve_buffer_path(&self.repo_root, &name))
            .ok_or(SessionError::InvalidPath)
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}
