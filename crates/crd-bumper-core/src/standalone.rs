//! Single-commit operations that run outside the bump sequence.

use anyhow::Result;
use std::path::Path;

use crate::config::BumperConfig;
use crate::error::BumpError;
use crate::git::Repository;
use crate::gomod::{module_name, preferred_alias};
use crate::hub_spoke::HubSpoke;
use crate::pipeline::StepOutcome;
use crate::project::Project;
use crate::rewrite::serve::{self, ServeContext};
use crate::rewrite::vendoring::{Vendoring, uses_module};
use crate::tools::{BuildDriver, MakeTarget, ModuleFetcher};

/// Marker step names of the standalone commands.
pub const VENDOR_NEW_API: &str = "vendor-new-api";
pub const UNSERVE_API: &str = "unserve-api";
pub const RESERVE_API: &str = "re-serve-api";

/// Branch the module fetcher pulls the new API from.
const UPSTREAM_BRANCH: &str = "master";

fn regenerate_and_clean(build: &dyn BuildDriver) -> Result<()> {
    build.regenerate_all()?;
    build.make(MakeTarget::CleanArtifacts)
}

/// Move a consumer repository onto version `new` of `module`'s API.
pub fn vendor_new_api(
    root: &Path,
    module: &str,
    new: &str,
    repo: &dyn Repository,
    build: &dyn BuildDriver,
    fetcher: &dyn ModuleFetcher,
    dry_run: bool,
) -> Result<StepOutcome> {
    if !uses_module(root, module)? {
        log::info!("Module {module} is not found in go.mod. Nothing to do.");
        return Ok(StepOutcome::NothingToDo);
    }
    repo.verify_clean()?;

    let hub_spoke = HubSpoke::new(root);
    let mut own_hub = None;
    for ver in hub_spoke.api_versions()? {
        if hub_spoke.is_hub(&ver)? {
            own_hub = Some(ver);
        }
    }

    let config = BumperConfig::load(root)?;
    let vendoring = Vendoring::discover(root, module, new, own_hub, dry_run)?;
    log::info!("Updating files from {} to {new}", vendoring.current);

    vendoring.update_go_files(&config.extra_go_dirs())?;
    for dir in config.extra_config_dirs() {
        vendoring.update_config_files(&dir)?;
    }

    fetcher.fetch(module, UPSTREAM_BRANCH)?;
    fetcher.reconcile_dependencies()?;
    fetcher.vendor()?;
    vendoring.verify_one_api_version()?;

    regenerate_and_clean(build)?;
    repo.commit_stage(VENDOR_NEW_API, &vendoring.message())?;
    Ok(StepOutcome::Committed)
}

fn serve_context(root: &Path, spoke: &str, dry_run: bool) -> Result<ServeContext> {
    if !HubSpoke::new(root).is_spoke(spoke)? {
        return Err(BumpError::NotSpoke(spoke.to_string()).into());
    }
    let project = Project::load(root, dry_run)?;
    let kinds = project.require_kinds(spoke)?;
    let module = module_name(root)?;
    let alias = preferred_alias(root, &module, spoke, project.group(&kinds[0], spoke)?)?;
    ServeContext::new(root, &project, spoke, alias, dry_run)
}

/// Stop serving `spoke`, keeping it as a stored conversion target.
pub fn unserve(
    root: &Path,
    spoke: &str,
    repo: &dyn Repository,
    build: &dyn BuildDriver,
    dry_run: bool,
) -> Result<StepOutcome> {
    repo.verify_clean()?;
    let ctx = serve_context(root, spoke, dry_run)?;
    log::info!("Updating files to mark API {spoke} as unserved");

    serve::set_unserved(&ctx)?;
    serve::unserve_conversion_suite_test(&ctx)?;
    regenerate_and_clean(build)?;

    repo.commit_stage(UNSERVE_API, &serve::unserve_message(spoke))?;
    Ok(StepOutcome::Committed)
}

/// Serve `spoke` again after an earlier [`unserve`].
pub fn re_serve(
    root: &Path,
    spoke: &str,
    repo: &dyn Repository,
    build: &dyn BuildDriver,
    dry_run: bool,
) -> Result<StepOutcome> {
    repo.verify_clean()?;
    let ctx = serve_context(root, spoke, dry_run)?;
    log::info!("Updating files to mark API {spoke} as served");

    serve::set_served(&ctx)?;
    serve::reserve_conversion_suite_test(&ctx)?;
    regenerate_and_clean(build)?;

    repo.commit_stage(RESERVE_API, &serve::reserve_message(spoke))?;
    Ok(StepOutcome::Committed)
}
