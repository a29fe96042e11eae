use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use git_pr_review::cli::{
    self, AddCommentArgs, BodyAction, CommentAction, Commands, ConfigArgs, DraftArgs, EditArgs,
    LocateArgs, MarkersArgs, PrArgs, SubmitArgs,
};
use git_pr_review::commands::{self, CommandArgs, CommandError, CommandTable};
use git_pr_review::editor::{BufferId, EditorHost, TerminalHost};
use git_pr_review::git;
use git_pr_review::project::ProjectConfig;
use git_pr_review::publish::{
    DEFAULT_API_URL, DEFAULT_TIMEOUT, GitHubPublisher, Publisher, TokenSource,
};
use git_pr_review::review::Comment;
use git_pr_review::session::{MARKER_GROUP, PublishPolicy, Session};
use git_pr_review::state::{Config, ReviewStore};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(cli::parse_args().command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // command failures were already written to the host's error area
            if err.downcast_ref::<CommandError>().is_none() {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Config(args) => handle_config(&args),
        Commands::Start { pr_number } => {
            Terminal::for_editing(pr_number)?;
            Ok(())
        }
        Commands::Comment { action } => match action {
            CommentAction::Add(args) => handle_comment_add(&args),
            CommentAction::List(args) => {
                let store = open_store()?;
                let review = store.load_or_create(resolve_pr(&store, &args)?)?;
                println!("{}", serde_json::to_string_pretty(review.comments())?);
                Ok(())
            }
            CommentAction::Delete(args) => handle_comment_delete(&args),
        },
        Commands::Body { action } => match action {
            BodyAction::Set { pr, body } => {
                let store = open_store()?;
                let pr_number = resolve_pr(&store, &pr)?;
                let mut review = store.load_or_create(pr_number)?;
                review.set_body(body);
                store.save(&review)?;
                println!("✓ Review body set for PR #{}", pr_number);
                Ok(())
            }
            BodyAction::Show(args) => {
                let store = open_store()?;
                let review = store.load_or_create(resolve_pr(&store, &args)?)?;
                println!("{}", review.body());
                Ok(())
            }
        },
        Commands::Show(args) => {
            let store = open_store()?;
            let review = store.load_or_create(resolve_pr(&store, &args)?)?;
            print!("{}", review.to_json()?);
            Ok(())
        }
        Commands::List => handle_list(),
        Commands::Draft(args) => handle_draft(&args),
        Commands::Edit(args) => handle_edit(&args),
        Commands::EditBody(args) => {
            let pr_number = resolve_pr(&open_store()?, &args)?;
            let mut terminal = Terminal::for_editing(pr_number)?;
            terminal.dispatch(commands::REVIEW_BODY, &CommandArgs::default())?;
            terminal.run_editor()
        }
        Commands::Markers(args) => handle_markers(&args),
        Commands::Submit(args) => handle_submit(&args),
    }
}

/// Handle config command - record which repository reviews go to.
fn handle_config(args: &ConfigArgs) -> Result<()> {
    let store = discover_store()?;
    let (owner, repo) = if args.from_remote {
        let from_project = match load_project()? {
            Some(project) => project.repository()?,
            None => None,
        };
        match from_project {
            Some(repository) => repository,
            None => repository_from_remote(&args.remote)?,
        }
    } else {
        parse_repository(args.repository.as_deref().unwrap_or_default())?
    };

    let replaced = store.write_config(&Config::new(owner.clone(), repo.clone()))?;
    if replaced {
        println!("✓ Configuration updated: reviews go to {}/{}", owner, repo);
    } else {
        println!("✓ Reviews go to {}/{}", owner, repo);
    }
    Ok(())
}

fn repository_from_remote(remote: &str) -> Result<(String, String)> {
    let cwd = std::env::current_dir()?;
    let url = git::remote_url(&cwd, remote)
        .with_context(|| format!("Failed to read URL of remote '{}'", remote))?;
    Ok(git::parse_remote_url(&url)?)
}

/// Split `owner/repo`.
fn parse_repository(value: &str) -> Result<(String, String)> {
    match value.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => bail!("Invalid repository '{}': expected <owner>/<repo>", value),
    }
}

/// Handle comment add - append a comment without going through an editor.
fn handle_comment_add(args: &AddCommentArgs) -> Result<()> {
    let store = open_store()?;
    let pr_number = resolve_pr(&store, &args.pr)?;
    let mut review = store.load_or_create(pr_number)?;

    let mut comment = match args.start_line {
        Some(start) => Comment::spanning(&args.path, start, args.line, args.side)?,
        None => Comment::new(&args.path, args.line, args.side)?,
    };
    if let Some(start_side) = args.start_side {
        comment = comment.with_start_side(start_side);
    }
    review.add_comment(comment.with_body(&args.body));
    store.save(&review)?;

    println!(
        "✓ Comment added to PR #{} ({} total)",
        pr_number,
        review.comments().len()
    );
    Ok(())
}

/// Handle comment delete - remove the first comment covering a line.
fn handle_comment_delete(args: &LocateArgs) -> Result<()> {
    let store = open_store()?;
    let mut review = store.load_or_create(resolve_pr(&store, &args.pr)?)?;
    let comment = review
        .find_comment_at(&args.path, args.line)
        .cloned()
        .with_context(|| format!("No comment at {}:{}", args.path, args.line))?;
    review.delete_comment(&comment)?;
    store.save(&review)?;

    println!("✓ Comment at {}:{} deleted", args.path, args.line);
    Ok(())
}

fn handle_list() -> Result<()> {
    let store = open_store()?;
    let reviews = store.list_reviews()?;
    if reviews.is_empty() {
        println!("No draft reviews");
        return Ok(());
    }
    for pr_number in reviews {
        let review = store.load(pr_number)?;
        println!(
            "#{:<6} {}/{}  {} comments",
            pr_number,
            review.owner(),
            review.repo(),
            review.comments().len()
        );
    }
    Ok(())
}

/// Handle draft command - write a new comment in $EDITOR.
fn handle_draft(args: &DraftArgs) -> Result<()> {
    let mut terminal = Terminal::for_editing(resolve_pr(&open_store()?, &args.pr)?)?;
    terminal.open_file(&args.file)?;
    let (start, end) = args.lines;
    terminal.dispatch(commands::REVIEW_COMMENT, &CommandArgs::with_range(start, end))?;
    terminal.run_editor()
}

/// Handle edit command - rewrite an existing comment in $EDITOR.
fn handle_edit(args: &EditArgs) -> Result<()> {
    let mut terminal = Terminal::for_editing(resolve_pr(&open_store()?, &args.pr)?)?;
    terminal.open_file(&args.file)?;
    terminal.dispatch(commands::EDIT_COMMENT, &CommandArgs::with_range(args.line, args.line))?;
    terminal.run_editor()
}

/// Handle markers command - print a file with commented lines flagged.
fn handle_markers(args: &MarkersArgs) -> Result<()> {
    let mut terminal = Terminal::for_editing(resolve_pr(&open_store()?, &args.pr)?)?;
    let buffer = terminal.open_file(&args.file)?;
    terminal.dispatch(commands::UPDATE_REVIEW_MARKERS, &CommandArgs::default())?;

    let marked = terminal.host.markers(buffer, MARKER_GROUP);
    for (index, line) in terminal.host.buffer_lines(buffer)?.iter().enumerate() {
        let number = index as u32 + 1;
        let gutter = if marked.contains(&number) { "C>" } else { "  " };
        println!("{} {:>4} {}", gutter, number, line);
    }
    Ok(())
}

/// Handle submit command - publish the draft in one request.
///
/// Flags win over `git-pr-review.toml`, which wins over the defaults.
fn handle_submit(args: &SubmitArgs) -> Result<()> {
    let store = open_store()?;
    let pr_number = resolve_pr(&store, &args.pr)?;
    if !store.exists(pr_number) {
        bail!("No draft review for PR #{}", pr_number);
    }

    let project = load_project()?.unwrap_or_default();
    let api_url = args
        .api_url
        .as_deref()
        .or(project.api_url())
        .unwrap_or(DEFAULT_API_URL);
    let token = match &args.token_env {
        Some(var) => TokenSource::Env(var.clone()),
        None => project.token_source().unwrap_or_default(),
    };
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .or(project.timeout())
        .unwrap_or(DEFAULT_TIMEOUT);

    let publisher = GitHubPublisher::new(api_url, token, timeout)?;
    let policy = if args.clear_on_success {
        PublishPolicy::ClearOnSuccess
    } else {
        PublishPolicy::KeepDraft
    };

    let mut terminal = Terminal::start(pr_number, Box::new(publisher), policy)?;
    terminal.dispatch(commands::PUBLISH_REVIEW, &CommandArgs::default())
}

/// Open the review store, configuring it from `git-pr-review.toml` on first use.
fn open_store() -> Result<ReviewStore> {
    let store = discover_store()?;
    if store.config_file_path().exists() {
        return Ok(store);
    }
    if let Some(project) = load_project()? {
        let (owner, repo) = match project.repository()? {
            Some(repository) => repository,
            None => repository_from_remote("origin")?,
        };
        log::info!("configuring {}/{} from project file", owner, repo);
        store.write_config(&Config::new(owner, repo))?;
    }
    Ok(store)
}

fn discover_store() -> Result<ReviewStore> {
    ReviewStore::discover().context("Failed to open review state")
}

fn load_project() -> Result<Option<ProjectConfig>> {
    let cwd = std::env::current_dir()?;
    let root = git::find_repo_root(&cwd)?;
    ProjectConfig::load(&root).context("Failed to read project config")
}

/// `--pr` if given, else the review last started.
fn resolve_pr(store: &ReviewStore, args: &PrArgs) -> Result<u32> {
    if let Some(pr_number) = args.pr_number {
        return Ok(pr_number);
    }
    match store.load_config().ok().and_then(|config| config.active_pr) {
        Some(pr_number) => Ok(pr_number),
        None => bail!("No pull request given; pass --pr or run `git-pr-review start <N>`"),
    }
}

fn default_publisher() -> Result<Box<dyn Publisher>> {
    let publisher = GitHubPublisher::new(DEFAULT_API_URL, TokenSource::default(), DEFAULT_TIMEOUT)?;
    Ok(Box::new(publisher))
}

/// `$VISUAL`, then `$EDITOR`, then `vi`.
fn editor_command() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "vi".to_string())
}

/// A review session driven from the terminal.
struct Terminal {
    table: CommandTable,
    session: Session,
    host: TerminalHost,
}

impl Terminal {
    /// Open the session for the current repository and start reviewing `pr_number`.
    fn start(pr_number: u32, publisher: Box<dyn Publisher>, policy: PublishPolicy) -> Result<Self> {
        let store = open_store()?;
        let cwd = std::env::current_dir()?;
        let repo_root = std::fs::canonicalize(git::find_repo_root(&cwd)?)?;

        let mut terminal = Self {
            table: CommandTable::standard(),
            session: Session::new(store, repo_root, publisher).with_policy(policy),
            host: TerminalHost::new(editor_command()),
        };
        terminal.dispatch(commands::START_REVIEW, &CommandArgs::with_args([pr_number.to_string()]))?;
        Ok(terminal)
    }

    /// Start a session for drafting; nothing is published from it.
    fn for_editing(pr_number: u32) -> Result<Self> {
        Self::start(pr_number, default_publisher()?, PublishPolicy::default())
    }

    fn open_file(&mut self, path: &Path) -> Result<BufferId> {
        self.host
            .open_file(path)
            .with_context(|| format!("Failed to open {}", path.display()))
    }

    fn dispatch(&mut self, name: &str, args: &CommandArgs) -> Result<()> {
        self.table.dispatch(&mut self.session, &mut self.host, name, args)?;
        Ok(())
    }

    /// Launch the editor until no save hooks are left, running each hook that fires.
    ///
    /// A comment still open once the editor fails or quits without writing is
    /// discarded.
    fn run_editor(&mut self) -> Result<()> {
        loop {
            let fired = match self.host.run_editor() {
                Ok(fired) => fired,
                Err(err) => {
                    self.discard_draft();
                    return Err(err).context("Editor failed");
                }
            };
            if fired.is_empty() {
                self.discard_draft();
                return Ok(());
            }
            for invocation in &fired {
                self.table.run(&mut self.session, &mut self.host, invocation)?;
            }
        }
    }

    fn discard_draft(&mut self) {
        if self.session.draft().is_none() {
            return;
        }
        if let Err(err) = self.dispatch(commands::CANCEL_COMMENT, &CommandArgs::default()) {
            log::warn!("could not discard comment draft: {:#}", err);
        }
    }
}
