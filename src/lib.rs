pub mod cli;
pub mod commands;
pub mod editor;
pub mod git;
pub mod project;
pub mod publish;
pub mod review;
pub mod session;
pub mod state;

pub use commands::{CommandArgs, CommandTable, Invocation};
pub use editor::{BufferId, EditorHost};
pub use project::ProjectConfig;
pub use publish::{GitHubPublisher, PublishResponse, Publisher, TokenSource};
pub use review::{Comment, Review, Side};
pub use session::{PublishPolicy, Session, SessionState};
pub use state::{Config, ReviewStore};
