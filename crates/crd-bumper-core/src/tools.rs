//! Adapters for the external programs a bump shells out to.
//!
//! Each collaborator sits behind a small trait so steps receive it as an
//! explicit object and tests can swap in a recording fake.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::BumpError;

/// Runs programs in a fixed directory, or only announces them in dry-run mode.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    root: PathBuf,
    dry_run: bool,
}

impl ToolRunner {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run `program args...`, failing with its stderr on non-zero exit.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        self.run_stdout(program, args).map(|_| ())
    }

    /// Like [`ToolRunner::run`], but return trimmed stdout. Dry-run yields "".
    pub fn run_stdout(&self, program: &str, args: &[&str]) -> Result<String> {
        let display = display_command(program, args);
        if self.dry_run {
            log::info!("Dryrun: {display}");
            return Ok(String::new());
        }
        self.run_always(program, args)
    }

    /// Run even in dry-run mode. For read-only queries.
    pub fn run_always(&self, program: &str, args: &[&str]) -> Result<String> {
        let display = display_command(program, args);
        if which::which(program).is_err() {
            return Err(BumpError::ToolNotFound(program.to_string()).into());
        }
        log::info!("Run: {display}");
        let out = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .output()?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
            Err(BumpError::Tool {
                command: display,
                stderr: if stderr.is_empty() { stdout } else { stderr },
            }
            .into())
        }
    }
}

fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Makefile targets the bump relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakeTarget {
    Manifests,
    Generate,
    GenerateConversions,
    Format,
    CleanArtifacts,
}

impl MakeTarget {
    pub fn target(self) -> &'static str {
        match self {
            MakeTarget::Manifests => "manifests",
            MakeTarget::Generate => "generate",
            MakeTarget::GenerateConversions => "generate-go-conversions",
            MakeTarget::Format => "fmt",
            MakeTarget::CleanArtifacts => "clean-bin",
        }
    }
}

impl fmt::Display for MakeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "make {}", self.target())
    }
}

/// Regenerates derived artifacts (manifests, deep-copy, conversions).
pub trait BuildDriver {
    fn make(&self, target: MakeTarget) -> Result<()>;

    /// `manifests`, `generate`, `generate-go-conversions`, then `fmt`.
    fn regenerate_all(&self) -> Result<()> {
        self.make(MakeTarget::Manifests)?;
        self.make(MakeTarget::Generate)?;
        self.make(MakeTarget::GenerateConversions)?;
        self.make(MakeTarget::Format)
    }
}

/// Creates new API and webhook boilerplate.
pub trait Scaffolder {
    fn create_api(&self, group: &str, version: &str, kind: &str) -> Result<()>;
    fn create_conversion_webhook(&self, group: &str, version: &str, kind: &str) -> Result<()>;
}

/// Pulls a new version of an upstream module into the vendor tree.
pub trait ModuleFetcher {
    fn fetch(&self, module: &str, version: &str) -> Result<()>;
    fn reconcile_dependencies(&self) -> Result<()>;
    fn vendor(&self) -> Result<()>;
}

/// `make <target>`.
#[derive(Debug, Clone)]
pub struct Make {
    runner: ToolRunner,
}

impl Make {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }
}

impl BuildDriver for Make {
    fn make(&self, target: MakeTarget) -> Result<()> {
        self.runner.run("make", &[target.target()])
    }
}

/// `kubebuilder create ...`.
#[derive(Debug, Clone)]
pub struct Kubebuilder {
    runner: ToolRunner,
}

impl Kubebuilder {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }
}

impl Scaffolder for Kubebuilder {
    fn create_api(&self, group: &str, version: &str, kind: &str) -> Result<()> {
        self.runner.run(
            "kubebuilder",
            &[
                "create",
                "api",
                "--group",
                group,
                "--version",
                version,
                "--kind",
                kind,
                "--resource",
                "--controller=false",
            ],
        )
    }

    fn create_conversion_webhook(&self, group: &str, version: &str, kind: &str) -> Result<()> {
        self.runner.run(
            "kubebuilder",
            &[
                "create",
                "webhook",
                "--group",
                group,
                "--version",
                version,
                "--kind",
                kind,
                "--conversion",
            ],
        )
    }
}

/// `go get` / `go mod ...`.
#[derive(Debug, Clone)]
pub struct GoCli {
    runner: ToolRunner,
}

impl GoCli {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }
}

impl ModuleFetcher for GoCli {
    fn fetch(&self, module: &str, version: &str) -> Result<()> {
        self.runner.run("go", &["get", &format!("{module}@{version}")])
    }

    fn reconcile_dependencies(&self) -> Result<()> {
        self.runner.run("go", &["mod", "tidy"])
    }

    fn vendor(&self) -> Result<()> {
        self.runner.run("go", &["mod", "vendor"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_does_not_execute() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = ToolRunner::new(dir.path(), true);
        // Would fail if executed: the program does not exist.
        assert_eq!(runner.run_stdout("definitely-not-a-real-tool", &["x"])?, "");
        Ok(())
    }

    #[test]
    fn missing_program_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = ToolRunner::new(dir.path(), false);
        let err = runner.run("definitely-not-a-real-tool", &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BumpError>(),
            Some(BumpError::ToolNotFound(p)) if p == "definitely-not-a-real-tool"
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failure_surfaces_stderr() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = ToolRunner::new(dir.path(), false);
        let err = runner
            .run("sh", &["-c", "echo boom >&2; exit 3"])
            .unwrap_err();
        match err.downcast_ref::<BumpError>() {
            Some(BumpError::Tool { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn make_target_names() {
        assert_eq!(MakeTarget::GenerateConversions.target(), "generate-go-conversions");
        assert_eq!(MakeTarget::CleanArtifacts.to_string(), "make clean-bin");
    }
}
