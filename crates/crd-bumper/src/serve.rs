use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crd_bumper_core::standalone::{self, RESERVE_API, UNSERVE_API};
use crd_bumper_core::{Make, ToolRunner};

use crate::workarea::WorkareaArgs;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Spoke API version to change
    #[arg(long, value_name = "VERSION")]
    pub spoke_ver: String,

    /// Existing branch or tag to check out before creating the working branch
    #[arg(long, value_name = "BRANCH")]
    pub start_branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Unserve,
    ReServe,
}

impl Action {
    fn branch_suffix(self) -> &'static str {
        match self {
            Action::Unserve => "unserve",
            Action::ReServe => "re-serve",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Action::Unserve => UNSERVE_API,
            Action::ReServe => RESERVE_API,
        }
    }
}

/// Execute `unserve` or `re-serve`
pub fn execute(action: Action, args: ServeArgs, workarea_args: &WorkareaArgs) -> Result<()> {
    let workarea = workarea_args.open()?;
    if let Some(start) = &args.start_branch {
        workarea.git.checkout_existing(start)?;
    }
    let default_branch = format!("api-{}-{}", args.spoke_ver, action.branch_suffix());
    workarea_args.enter_branch(&workarea, &default_branch)?;

    let make = Make::new(ToolRunner::new(workarea.root(), workarea_args.dry_run));
    let (root, spoke, dry_run) = (workarea.root(), args.spoke_ver.as_str(), workarea_args.dry_run);
    match action {
        Action::Unserve => standalone::unserve(root, spoke, &workarea.git, &make, dry_run)?,
        Action::ReServe => standalone::re_serve(root, spoke, &workarea.git, &make, dry_run)?,
    };
    eprintln!("{} {}", "✓".green(), action.marker());
    Ok(())
}
