use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::copyright::CopyrightUpdater;
use crate::error::BumpError;
use crate::marker::CommitMarker;
use crate::tools::ToolRunner;

/// Branches a bump must never be committed to.
pub const PROTECTED_BRANCHES: &[&str] = &["main", "master", "releases/v0"];

/// Vendored upstream code whose copyright notices belong to someone else.
const COPYRIGHT_EXEMPT_PREFIX: &str = "github/";

/// Version-control operations the pipeline needs.
pub trait Repository {
    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Fail with [`BumpError::DirtyWorkarea`] on uncommitted or untracked files.
    fn verify_clean(&self) -> Result<()>;

    /// Commit everything with `CRDBUMPER-<step>` as the first message line.
    fn commit_stage(&self, step: &str, body: &str) -> Result<()>;

    /// Marker of the most recent commit, if it carries one.
    fn last_marker(&self) -> Result<Option<CommitMarker>>;

    fn mv(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// [`Repository`] backed by the `git` command line.
///
/// With `dry_run` nothing is mutated and every mutating command is only
/// announced. With `no_commit` files are still edited and copyright notices
/// bumped, but `git add` and `git commit` are only announced.
#[derive(Debug, Clone)]
pub struct GitCli {
    runner: ToolRunner,
    dry_run: bool,
    no_commit: bool,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool, no_commit: bool) -> Self {
        Self {
            runner: ToolRunner::new(root, dry_run),
            dry_run,
            no_commit: no_commit || dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        self.runner.root()
    }

    /// Clone `url` under `workdir` unless a checkout is already there.
    ///
    /// Returns the checkout directory: the last path component of `url`
    /// without any `.git` suffix.
    pub fn clone_into(url: &str, workdir: &Path, dry_run: bool) -> Result<PathBuf> {
        fs::create_dir_all(workdir)
            .with_context(|| format!("creating workdir {}", workdir.display()))?;
        let name = checkout_name(url);
        let dest = workdir.join(&name);
        if dest.is_dir() {
            log::info!("Using existing checkout {}", dest.display());
            return Ok(dest);
        }
        ToolRunner::new(workdir, dry_run).run("git", &["clone", url, &name])?;
        if !dry_run && !dest.is_dir() {
            anyhow::bail!("Expected to find directory {} after clone", dest.display());
        }
        Ok(dest)
    }

    /// Switch to an existing branch or tag, e.g. a release to start from.
    pub fn checkout_existing(&self, name: &str) -> Result<()> {
        self.verify_clean()?;
        self.runner
            .run("git", &["checkout", name])
            .with_context(|| format!("Unable to checkout {name}"))
    }

    fn status(&self) -> Result<String> {
        self.runner
            .run_always("git", &["status", "--porcelain", "--untracked-files=all"])
    }

    /// Paths reported by `git status`, relative to the repository root.
    pub fn modified_files(&self) -> Result<Vec<PathBuf>> {
        Ok(parse_status(&self.status()?))
    }

    fn update_copyrights(&self) -> Result<()> {
        if self.dry_run {
            log::info!("Dryrun: update copyrights of modified files");
            return Ok(());
        }
        let updater = CopyrightUpdater::new(false);
        for rel in self.modified_files()? {
            if rel.starts_with(COPYRIGHT_EXEMPT_PREFIX) {
                continue;
            }
            let path = self.root().join(&rel);
            if path.is_file() {
                updater.update(&path)?;
            }
        }
        Ok(())
    }

    fn run_commit(&self, args: &[&str]) -> Result<()> {
        if self.no_commit {
            log::info!("Dryrun: git {}", args.join(" "));
            return Ok(());
        }
        self.runner.run("git", args)
    }
}

impl Repository for GitCli {
    fn checkout_branch(&self, name: &str) -> Result<()> {
        if PROTECTED_BRANCHES.contains(&name) {
            return Err(BumpError::ProtectedBranch.into());
        }
        self.verify_clean()?;
        self.runner
            .run("git", &["checkout", "-b", name])
            .with_context(|| format!("Unable to checkout branch {name}"))
    }

    fn verify_clean(&self) -> Result<()> {
        if self.dry_run {
            log::info!("Dryrun: git status");
            return Ok(());
        }
        let status = self.status()?;
        if !status.is_empty() {
            return Err(BumpError::DirtyWorkarea(status).into());
        }
        Ok(())
    }

    fn commit_stage(&self, step: &str, body: &str) -> Result<()> {
        let marker = CommitMarker::new(step)?;
        self.update_copyrights()?;
        self.run_commit(&["add", "-A"])?;
        self.run_commit(&["commit", "-q", "-s", "-m", &marker.message(body)])?;
        if !self.no_commit {
            self.verify_clean()?;
        }
        Ok(())
    }

    fn last_marker(&self) -> Result<Option<CommitMarker>> {
        let message = self
            .runner
            .run_always("git", &["log", "-1", "--format=%B"])
            .context("Unable to get log")?;
        Ok(CommitMarker::parse(&message)?)
    }

    fn mv(&self, src: &Path, dst: &Path) -> Result<()> {
        let src = src.to_string_lossy();
        let dst = dst.to_string_lossy();
        self.runner
            .run("git", &["mv", &src, &dst])
            .context("Unable to execute command to move code")
    }
}

fn checkout_name(url: &str) -> String {
    let base = url
        .trim_end_matches('/')
        .rsplit(|c| c == '/' || c == ':')
        .next()
        .unwrap_or(url);
    base.strip_suffix(".git").unwrap_or(base).to_string()
}

/// Parse `git status --porcelain` output into paths. Renames yield the new path.
fn parse_status(status: &str) -> Vec<PathBuf> {
    status
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| l.split_whitespace().last())
        .map(|p| PathBuf::from(p.trim_matches('"')))
        .collect()
}
