//! Hermetic git sandbox for bumper tests.
//!
//! - A private `HOME` with its own `.gitconfig`, and no system config
//! - Repositories created under an `assert_fs::TempDir`, cleaned up on drop
//! - Commands run through `duct` with the sandbox environment injected
//!
//! ## Quick example
//! ```no_run
//! use crd_bumper_test_utils::sandbox::Sandbox;
//!
//! let sb = Sandbox::new();
//! let repo = sb.git_repo("dws");
//! repo.write("README.md", "hello").commit("init");
//! assert_eq!(repo.subjects(), vec!["init".to_string()]);
//! ```

use assert_fs::TempDir;
use assert_fs::fixture::PathChild;
use duct::Expression;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct Sandbox {
    root: TempDir,
    pub home: PathBuf,
    pub gitconfig: PathBuf,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    /// Create a new sandbox; all state is under an auto-cleaned TempDir.
    pub fn new() -> Self {
        let root = TempDir::new().expect("create sandbox TempDir");
        let home = root.child("home").to_path_buf();
        let gitconfig = home.join(".gitconfig");
        fs::create_dir_all(&home).expect("create home dir");
        fs::write(
            &gitconfig,
            "[user]\n\tname = Sandbox\n\temail = test@example.com\n\
             [init]\n\tdefaultBranch = main\n\
             [commit]\n\tgpgsign = false\n",
        )
        .expect("write gitconfig");
        Self {
            root,
            home,
            gitconfig,
        }
    }

    /// Absolute path to the sandbox root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// `git init` a work tree at `rel` under the sandbox root.
    ///
    /// Identity and signing are configured in the repository itself, so git
    /// commands run outside the sandbox environment still commit cleanly.
    pub fn git_repo<S: AsRef<str>>(&self, rel: S) -> FixtureRepo {
        let work = self.root_path().join(rel.as_ref());
        fs::create_dir_all(&work).expect("create work dir");
        let repo = FixtureRepo { work };
        repo.git(&["init", "-q"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["config", "user.name", "Sandbox"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.git(&["branch", "-M", "main"]);
        repo
    }

    /// Build a `duct::Expression` pre-wired with the sandbox env, run in `cwd`.
    pub fn cmd<S: AsRef<OsStr>, I: IntoIterator>(&self, program: S, args: I, cwd: &Path) -> Expression
    where
        I::Item: AsRef<OsStr>,
    {
        let program_str = program.as_ref().to_string_lossy();
        let args: Vec<_> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string_lossy().to_string())
            .collect();
        let expr = duct::cmd(program_str.as_ref(), args).dir(cwd);
        self.inject_env(expr)
    }

    /// Environment for anything launched inside the sandbox.
    pub fn env(&self) -> HashMap<String, String> {
        let mut env_map: HashMap<String, String> = HashMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env_map.insert("PATH".into(), path);
        }
        env_map.insert("HOME".into(), self.home.to_string_lossy().into_owned());
        env_map.insert(
            "XDG_CONFIG_HOME".into(),
            self.home.to_string_lossy().into_owned(),
        );
        env_map.insert(
            "GIT_CONFIG_GLOBAL".into(),
            self.gitconfig.to_string_lossy().into_owned(),
        );
        env_map.insert(
            "GIT_CONFIG_SYSTEM".into(),
            if cfg!(windows) { "NUL" } else { "/dev/null" }.into(),
        );
        env_map.insert("GIT_ALLOW_PROTOCOL".into(), "file".into());
        env_map
    }

    pub fn inject_env(&self, expr: Expression) -> Expression {
        expr.full_env(self.env())
    }

    /// Run a binary built by this workspace in `cwd` with the sandbox env.
    ///
    /// Returns stdout on success and a message carrying stderr otherwise.
    pub fn run<I>(&self, program: &str, args: I, cwd: &Path) -> Result<String, String>
    where
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let cargo_bin_path = assert_cmd::cargo::cargo_bin(program)
            .to_string_lossy()
            .to_string();
        let args: Vec<_> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string_lossy().to_string())
            .collect();
        let output = self
            .inject_env(duct::cmd(&cargo_bin_path, args).dir(cwd))
            .env("NO_COLOR", "1")
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| format!("failed to start {program}: {e}"))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(format!(
                "{program} exited with {:?}\n{stderr}",
                output.status.code()
            ))
        }
    }
}

/// A git work tree inside a [`Sandbox`].
pub struct FixtureRepo {
    work: PathBuf,
}

impl FixtureRepo {
    /// Write/overwrite a file relative to the work tree.
    pub fn write<P: AsRef<Path>, S: AsRef<[u8]>>(&self, rel: P, contents: S) -> &Self {
        let p = self.work.join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(p, contents).expect("write file");
        self
    }

    /// Read a file relative to the work tree.
    pub fn read<P: AsRef<Path>>(&self, rel: P) -> String {
        let p = self.work.join(rel);
        fs::read_to_string(&p).unwrap_or_else(|e| panic!("read {}: {e}", p.display()))
    }

    pub fn exists<P: AsRef<Path>>(&self, rel: P) -> bool {
        self.work.join(rel).exists()
    }

    /// Stage all changes and commit with the given message.
    pub fn commit<S: AsRef<str>>(&self, msg: S) -> &Self {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", msg.as_ref()]);
        self
    }

    /// Run git in the work tree and return its trimmed stdout.
    pub fn git(&self, args: &[&str]) -> String {
        duct::cmd("git", args)
            .dir(&self.work)
            .stderr_null()
            .read()
            .unwrap_or_else(|e| panic!("git {args:?} failed: {e}"))
    }

    /// `git status --porcelain`, empty for a clean tree.
    pub fn status(&self) -> String {
        self.git(&["status", "--porcelain", "--untracked-files=all"])
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    /// Commit subjects, oldest first.
    pub fn subjects(&self) -> Vec<String> {
        let log = self.git(&["log", "--reverse", "--format=%s"]);
        log.lines().map(str::to_string).collect()
    }

    /// Full message of the most recent commit.
    pub fn head_message(&self) -> String {
        self.git(&["log", "-1", "--format=%B"])
    }

    /// Every file of the work tree outside `.git`, by relative path.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(&self.work)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
        {
            let entry = entry.expect("walk work tree");
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.work)
                .expect("path under work tree")
                .to_string_lossy()
                .replace('\\', "/");
            let content = fs::read_to_string(entry.path()).expect("read work tree file");
            files.insert(rel, content);
        }
        files
    }

    pub fn work_dir(&self) -> &Path {
        &self.work
    }
}
