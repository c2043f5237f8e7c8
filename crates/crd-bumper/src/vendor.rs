use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crd_bumper_core::standalone::{self, VENDOR_NEW_API};
use crd_bumper_core::{GoCli, Make, StepOutcome, ToolRunner};

use crate::workarea::WorkareaArgs;

#[derive(Args, Debug)]
pub struct VendorArgs {
    /// Hub API version of the vendored module to move to
    #[arg(long, value_name = "VERSION")]
    pub hub_ver: String,

    /// Go module that provides the API
    #[arg(short = 'm', long)]
    pub module: String,
}

/// `api-<module basename>-<hub>`
fn default_branch(module: &str, hub: &str) -> String {
    let base = module.rsplit('/').next().unwrap_or(module);
    format!("api-{base}-{hub}")
}

pub fn execute(args: VendorArgs, workarea_args: &WorkareaArgs) -> Result<()> {
    let workarea = workarea_args.open()?;
    workarea_args.enter_branch(&workarea, &default_branch(&args.module, &args.hub_ver))?;

    let runner = ToolRunner::new(workarea.root(), workarea_args.dry_run);
    let make = Make::new(runner.clone());
    let go = GoCli::new(runner);
    let outcome = standalone::vendor_new_api(
        workarea.root(),
        &args.module,
        &args.hub_ver,
        &workarea.git,
        &make,
        &go,
        workarea_args.dry_run,
    )?;

    match outcome {
        StepOutcome::Committed => eprintln!("{} {VENDOR_NEW_API}", "✓".green()),
        _ => eprintln!(
            "Module {} is not used by {}. Nothing to do.",
            args.module,
            workarea.root().display()
        ),
    }
    Ok(())
}
