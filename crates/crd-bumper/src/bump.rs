use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crd_bumper_core::{
    BumpContext, BumpOptions, Kubebuilder, Make, RunMode, StepOutcome, ToolRunner, Toolbox,
    bump_pipeline,
};

use crate::workarea::WorkareaArgs;

/// Versions taking part in a bump.
#[derive(Args, Debug, Clone)]
pub struct VersionArgs {
    /// Current hub API version, which becomes a spoke
    #[arg(long, global = true, value_name = "VERSION")]
    pub prev_ver: Option<String>,

    /// New hub API version to create
    #[arg(long, global = true, value_name = "VERSION")]
    pub new_ver: Option<String>,

    /// Most recent existing spoke, whose conversion routines get updated for the new hub
    #[arg(long, global = true, value_name = "VERSION")]
    pub most_recent_spoke: Option<String>,
}

impl VersionArgs {
    fn options(&self, dry_run: bool) -> Result<BumpOptions> {
        let (Some(prev), Some(new)) = (&self.prev_ver, &self.new_ver) else {
            anyhow::bail!("both --prev-ver and --new-ver are required");
        };
        Ok(BumpOptions {
            prev: prev.clone(),
            new: new.clone(),
            most_recent_spoke: self.most_recent_spoke.clone(),
            dry_run,
        })
    }
}

/// Execute `all` or `step`
pub fn execute(mode: RunMode, versions: &VersionArgs, args: &WorkareaArgs) -> Result<()> {
    let options = versions.options(args.dry_run)?;
    // Changes that are not committed cannot be built on by a later step.
    let mode = if args.dry_run || args.no_commit {
        RunMode::Step
    } else {
        mode
    };

    let workarea = args.open()?;
    let runner = ToolRunner::new(workarea.root(), args.dry_run);
    let make = Make::new(runner.clone());
    let kubebuilder = Kubebuilder::new(runner);
    let tools = Toolbox {
        repo: &workarea.git,
        build: &make,
        scaffolder: &kubebuilder,
    };

    let default_branch = format!("api-{}", options.new);
    let mut ctx = BumpContext::new(workarea.root(), options, tools)?;
    ctx.validate()?;
    log::info!(
        "Bumping {} from {} to {}",
        ctx.project().name().unwrap_or(ctx.module()),
        ctx.options.prev,
        ctx.options.new
    );
    args.enter_branch(&workarea, &default_branch)?;

    let report = bump_pipeline().run(&mut ctx, mode, args.run_options())?;
    for (step, outcome) in &report.executed {
        match outcome {
            StepOutcome::Committed => eprintln!("{} {step}", "✓".green()),
            StepOutcome::NothingToDo => eprintln!("{} {step}: nothing to do", "-".dimmed()),
            StepOutcome::Incomplete => {
                eprintln!("\n{} Stop on incomplete step {step}\n", "!".yellow())
            }
        }
    }
    if report.executed.is_empty() && report.finished {
        eprintln!("The last step has been done.");
    } else if report.finished {
        eprintln!("\n{} All steps are done.", "✓".green().bold());
        eprintln!("  Review changes with: git log -p");
    }
    Ok(())
}
