use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use crd_bumper_core::{GitCli, Repository, RunOptions};

/// Where the repository lives and how it may be changed. Shared by every command.
#[derive(Args, Debug, Clone)]
pub struct WorkareaArgs {
    /// Git repository URL to clone, or whose existing clone to use
    #[arg(short = 'r', long, global = true, value_name = "URL")]
    pub repo: Option<String>,

    /// Branch to create for the work (each command picks a default)
    #[arg(short = 'b', long, global = true)]
    pub branch: Option<String>,

    /// Continue in the branch that is already checked out
    #[arg(long, global = true)]
    pub this_branch: bool,

    /// Allow --this-branch before the first step has been committed
    #[arg(long, global = true)]
    pub use_existing_workarea: bool,

    /// Announce every change instead of making it (implies `step`)
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Edit files but do not commit them (implies `step`)
    #[arg(short = 'C', long, global = true)]
    pub no_commit: bool,

    /// Directory that holds the clone
    #[arg(long, global = true, default_value = "workingspace")]
    pub workdir: PathBuf,
}

impl WorkareaArgs {
    /// Clone `--repo` into the workdir, or reuse the clone already there.
    pub fn open(&self) -> Result<Workarea> {
        let Some(url) = self.repo.as_deref() else {
            anyhow::bail!("the --repo argument is required");
        };
        let root = GitCli::clone_into(url, &self.workdir, self.dry_run)
            .with_context(|| format!("Unable to prepare a clone of {url}"))?;
        let root = root.canonicalize().unwrap_or(root);
        log::debug!("Working in {}", root.display());
        Ok(Workarea {
            git: GitCli::new(&root, self.dry_run, self.no_commit),
            root,
        })
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            this_branch: self.this_branch,
            use_existing_workarea: self.use_existing_workarea,
        }
    }

    /// Create the working branch unless told to stay on the current one.
    pub fn enter_branch(&self, workarea: &Workarea, default_branch: &str) -> Result<()> {
        if self.this_branch {
            eprintln!("Continuing work in current branch");
            return Ok(());
        }
        let branch = self.branch.as_deref().unwrap_or(default_branch);
        eprintln!("Creating branch {}", branch.bold());
        workarea.git.checkout_branch(branch).map_err(|e| {
            e.context("If you are continuing in an existing branch, then specify `--this-branch`")
        })
    }
}

/// A checked-out repository and the git handle that edits it.
pub struct Workarea {
    pub root: PathBuf,
    pub git: GitCli,
}

impl Workarea {
    pub fn root(&self) -> &Path {
        &self.root
    }
}
