use anyhow::{Context, Result};
use bitpush::areas::uploader::Uploader;
use bitpush::areas::workspace::Workspace;
use bitpush::artifacts::branch::branch_name::BranchName;
use bitpush::artifacts::ignore::DEFAULT_IGNORE_FILE;
use bitpush::commands::push::PushOutcome;
use bitpush::config::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_FILE_SIZE, FailurePolicy, GitHubConfig, PushMode,
    PushOptions, UploadSettings,
};
use bitpush::store::github::GitHubStore;
use bitpush::store::memory::MemoryStore;
use bitpush::store::{ObjectStore, RepoSlug};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "bitpush",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "Upload a directory to a GitHub repository as a single commit",
    long_about = "Walks a local directory, honours its .gitignore, uploads every file as a blob \
    and commits the result on top of a branch in one step. \
    The branch only moves once every object of the commit exists on the remote. \
    The token is read from GITHUB_TOKEN.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
",
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "push",
        about = "Upload a directory as one commit",
        long_about = "This command uploads every non-ignored file below DIR and commits them on top of \
        the target branch. With --new-branch the commit lands on a fresh branch forked from \
        --base-branch instead, named after the current minute unless a name is given."
    )]
    Push {
        #[arg(index = 1, help = "The directory to upload")]
        dir: PathBuf,
        #[arg(long, help = "The target repository as owner/name")]
        repo: RepoSlug,
        #[arg(long, default_value = "main", help = "The branch to advance")]
        branch: BranchName,
        #[arg(
            long,
            default_value = "main",
            help = "The branch to fork from when the target does not exist"
        )]
        base_branch: BranchName,
        #[arg(
            long,
            num_args = 0..=1,
            help = "Commit on a new branch (build-YYYY-MM-DD-HH-mm unless named)"
        )]
        new_branch: Option<Option<BranchName>>,
        #[arg(short, long, help = "The commit message")]
        message: Option<String>,
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY, help = "Blob uploads in flight at once")]
        concurrency: usize,
        #[arg(long, help = "Commit the files that uploaded instead of aborting")]
        skip_failed: bool,
        #[arg(long, default_value = DEFAULT_IGNORE_FILE, help = "Pattern file at the root of DIR")]
        ignore_file: String,
        #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE, help = "Largest file accepted, in bytes")]
        max_file_size: u64,
        #[arg(long, help = "Run against an in-memory store instead of GitHub")]
        dry_run: bool,
    },
    #[command(
        name = "create-repo",
        about = "Create an empty repository",
        long_about = "This command creates a repository owned by the authenticated user, without any commits. \
        The first push bootstraps it with a README."
    )]
    CreateRepo {
        #[arg(index = 1, help = "The repository name")]
        name: String,
        #[arg(short, long, help = "The repository description")]
        description: Option<String>,
        #[arg(long, help = "Make the repository public")]
        public: bool,
    },
    #[command(
        name = "resolve",
        about = "Show the tip of a branch",
        long_about = "This command prints the commit and tree a branch currently points at."
    )]
    Resolve {
        #[arg(long, help = "The repository as owner/name")]
        repo: RepoSlug,
        #[arg(long, default_value = "main", help = "The branch to resolve")]
        branch: BranchName,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Push {
            dir,
            repo,
            branch,
            base_branch,
            new_branch,
            message,
            concurrency,
            skip_failed,
            ignore_file,
            max_file_size,
            dry_run,
        } => {
            let settings = UploadSettings {
                concurrency,
                failure_policy: if skip_failed {
                    FailurePolicy::SkipFailed
                } else {
                    FailurePolicy::Abort
                },
                max_file_size,
                ignore_file,
                bootstrap_readme: None,
            };

            let options = match new_branch {
                Some(name) => PushOptions::new(
                    PushMode::CreateNewBranch {
                        name,
                        from: base_branch,
                    },
                    message,
                ),
                None => {
                    let fork_from = (branch != base_branch).then_some(base_branch);
                    let message = message.unwrap_or_else(|| default_message(&dir));
                    PushOptions::new(PushMode::UpdateExistingBranch { branch, fork_from }, Some(message))
                }
            };

            let workspace = Workspace::open(&dir, &settings)?;
            let files = workspace
                .collect()
                .with_context(|| format!("failed to collect files from {:?}", dir))?;

            let store: Arc<dyn ObjectStore> = if dry_run {
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(GitHubStore::new(&GitHubConfig::from_env()?)?)
            };
            let uploader = Uploader::new(store, repo.clone(), settings);

            let outcome = uploader
                .push(files, &options)
                .await
                .with_context(|| format!("failed to upload {:?} to {repo}", dir))?;

            report(&mut std::io::stdout(), &outcome, dry_run)?;
        }
        Commands::CreateRepo {
            name,
            description,
            public,
        } => {
            let store = GitHubStore::new(&GitHubConfig::from_env()?)?;
            let created = store
                .create_repository(&name, description.as_deref(), !public)
                .await
                .with_context(|| format!("failed to create repository {name}"))?;

            writeln!(
                std::io::stdout(),
                "Created {} {}",
                created.slug.to_string().green(),
                created.html_url
            )?;
        }
        Commands::Resolve { repo, branch } => {
            let store = GitHubStore::new(&GitHubConfig::from_env()?)?;
            let uploader = Uploader::new(Arc::new(store), repo, UploadSettings::default());
            let state = uploader.branch_state(&branch).await?;

            let mut stdout = std::io::stdout();
            match (state.head_commit, state.head_tree) {
                (Some(commit), Some(tree)) => {
                    writeln!(stdout, "{} {}", branch.to_string().green(), commit)?;
                    writeln!(stdout, "tree {tree}")?;
                }
                _ => writeln!(stdout, "{} does not exist", branch.to_string().yellow())?,
            }
        }
    }

    Ok(())
}

fn default_message(dir: &Path) -> String {
    let name = dir
        .canonicalize()
        .ok()
        .and_then(|dir| dir.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| dir.to_string_lossy().into_owned());

    format!("Upload from {name}")
}

fn report(writer: &mut impl Write, outcome: &PushOutcome, dry_run: bool) -> Result<()> {
    if outcome.bootstrapped {
        writeln!(writer, "{}", "Initialized empty repository with a README".dimmed())?;
    }
    if outcome.created_branch {
        writeln!(writer, "Created branch {}", outcome.branch.to_string().green())?;
    }
    for skipped in &outcome.skipped {
        writeln!(writer, "{} {}", "skipped".yellow(), skipped)?;
    }

    writeln!(
        writer,
        "[{} {}] {}",
        outcome.branch,
        outcome.commit.sha.to_short_oid().yellow(),
        outcome.commit.short_message()
    )?;
    writeln!(writer, " {} files uploaded", outcome.uploaded)?;

    if dry_run {
        writeln!(writer, "{}", "dry run: nothing was sent to GitHub".dimmed())?;
    }

    Ok(())
}
