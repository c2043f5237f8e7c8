//! The eight steps that move a repository to a new hub API version.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::error::BumpError;
use crate::git::Repository;
use crate::gomod::{fix_kubebuilder_import_alias, module_name, preferred_alias};
use crate::hub_spoke::HubSpoke;
use crate::pipeline::{Pipeline, Step, StepContext, StepOutcome};
use crate::project::Project;
use crate::rewrite::{
    RewriteContext, api, controllers, conversion, kustomize, makefile, webhooks,
};
use crate::tools::{BuildDriver, MakeTarget, Scaffolder};

/// What the operator asked for.
#[derive(Debug, Clone, Default)]
pub struct BumpOptions {
    /// The current hub, which becomes a spoke.
    pub prev: String,
    /// The hub being created.
    pub new: String,
    pub most_recent_spoke: Option<String>,
    pub dry_run: bool,
}

/// External tools the steps drive.
#[derive(Clone, Copy)]
pub struct Toolbox<'a> {
    pub repo: &'a dyn Repository,
    pub build: &'a dyn BuildDriver,
    pub scaffolder: &'a dyn Scaffolder,
}

/// State shared by the bump steps, rebuilt from disk between steps.
pub struct BumpContext<'a> {
    pub root: PathBuf,
    pub options: BumpOptions,
    pub tools: Toolbox<'a>,
    module: String,
    preferred_alias: Option<String>,
    project: Project,
}

impl<'a> BumpContext<'a> {
    pub fn new(root: impl Into<PathBuf>, options: BumpOptions, tools: Toolbox<'a>) -> Result<Self> {
        let root = root.into();
        let project = Project::load(&root, options.dry_run)?;
        let module = module_name(&root)?;
        let mut ctx = Self {
            root,
            options,
            tools,
            module,
            preferred_alias: None,
            project,
        };
        ctx.preferred_alias = ctx.find_preferred_alias()?;
        Ok(ctx)
    }

    /// Argument checks that need no knowledge of the step sequence.
    pub fn validate(&self) -> Result<()> {
        let BumpOptions {
            prev,
            new,
            most_recent_spoke,
            ..
        } = &self.options;
        if prev == new {
            return Err(BumpError::InvalidArgs(
                "API --prev-ver and --new-ver must not be the same".to_string(),
            )
            .into());
        }
        if let Some(spoke) = most_recent_spoke {
            if spoke == prev || spoke == new {
                return Err(BumpError::InvalidArgs(
                    "API --most-recent-spoke must not be the same as --prev-ver or --new-ver"
                        .to_string(),
                )
                .into());
            }
            if !HubSpoke::new(&self.root).is_spoke(spoke)? {
                return Err(BumpError::NotSpoke(spoke.clone()).into());
            }
        }
        Ok(())
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn preferred_alias(&self) -> Option<&str> {
        self.preferred_alias.as_deref()
    }

    fn find_preferred_alias(&self) -> Result<Option<String>> {
        let prev = &self.options.prev;
        let kinds = self.project.require_kinds(prev)?;
        let group = self.project.group(&kinds[0], prev)?;
        preferred_alias(&self.root, &self.module, prev, group)
    }

    fn rewrite(&self) -> RewriteContext {
        RewriteContext {
            root: self.root.clone(),
            prev: self.options.prev.clone(),
            new: self.options.new.clone(),
            module: self.module.clone(),
            preferred_alias: self.preferred_alias.clone(),
            project: self.project.clone(),
            dry_run: self.options.dry_run,
        }
    }

    fn fix_import_alias(&self) -> Result<bool> {
        let prev = &self.options.prev;
        let kinds = self.project.require_kinds(prev)?;
        let group = self.project.group(&kinds[0], prev)?;
        fix_kubebuilder_import_alias(
            &self.root,
            group,
            self.preferred_alias.as_deref(),
            &self.options.new,
            self.options.dry_run,
        )
    }

    fn fmt(&self) -> Result<()> {
        self.tools.build.make(MakeTarget::Format)
    }

    fn commit(&self, step: &str, body: &str) -> Result<StepOutcome> {
        self.tools.repo.commit_stage(step, body)?;
        Ok(StepOutcome::Committed)
    }

    /// `ACTION` note naming controller-only Kinds, if there are any.
    fn nonlocal_note(&self, what: &str) -> String {
        let nonlocal = self.project.controllers_with_nonlocal_api();
        if nonlocal.is_empty() {
            return String::new();
        }
        format!(
            "\n\nACTION: Some {what} may have been referencing one of these\n  \
             non-local APIs. Verify that these APIs are being referenced\n  \
             by their correct versions:\n  {}\n",
            nonlocal.join(", ")
        )
    }
}

impl StepContext for BumpContext<'_> {
    fn repository(&self) -> &dyn Repository {
        self.tools.repo
    }

    fn reload(&mut self) -> Result<()> {
        self.project = Project::load(&self.root, self.options.dry_run)
            .context("Reloading PROJECT between steps")?;
        self.preferred_alias = self.find_preferred_alias()?;
        Ok(())
    }
}

/// `kubebuilder create api` for every Kind of the previous hub.
pub struct CreateApis;

impl<'a> Step<BumpContext<'a>> for CreateApis {
    fn name(&self) -> &'static str {
        "create-apis"
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        let BumpOptions { prev, new, .. } = ctx.options.clone();
        if !HubSpoke::new(&ctx.root).prev_is_hub(&prev, &new)? {
            return Err(BumpError::PrevNotHub(prev).into());
        }

        let existing = ctx.project.kinds(&new);
        for kind in ctx.project.require_kinds(&prev)? {
            if existing.contains(&kind) {
                log::debug!("{kind}.{new} already exists");
                continue;
            }
            let group = ctx.project.group(&kind, &prev)?;
            ctx.tools
                .scaffolder
                .create_api(group, &new, &kind)
                .with_context(|| format!("Unable to create API for {kind}.{new}"))?;
        }
        ctx.fix_import_alias()?;

        ctx.commit(
            self.name(),
            &format!(
                "Create {new} APIs.\n\n\
                 This used \"kubebuilder create api --resource --controller=false\"\n\
                 for each API."
            ),
        )
    }
}

/// Fill the new hub with the previous hub's types.
pub struct CopyApiContent;

impl<'a> Step<BumpContext<'a>> for CopyApiContent {
    fn name(&self) -> &'static str {
        "copy-api-content"
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        let rc = ctx.rewrite();
        api::copy_content(&rc, ctx.tools.repo)?;
        api::edit_new_api_files(&rc)?;
        api::remove_previous_storage_version(&rc)?;
        api::set_storage_version(&rc)?;
        api::add_conversion_scheme_builder(&rc)?;
        ctx.fmt()?;

        let (prev, new) = (&rc.prev, &rc.new);
        ctx.commit(
            self.name(),
            &format!(
                "Copy API content from {prev} to {new}.\n\n\
                 Move the kubebuilder:storageversion marker from {prev} to {new}.\n\n\
                 Set localSchemeBuilder var in api/{prev}/groupversion_info.go\n\
                 to satisfy zz_generated.conversion.go."
            ),
        )
    }
}

/// Relocate existing webhooks from the previous hub to the new one.
pub struct MvWebhooks;

impl<'a> Step<BumpContext<'a>> for MvWebhooks {
    fn name(&self) -> &'static str {
        "mv-webhooks"
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        let mut rc = ctx.rewrite();
        webhooks::edit_webhook_files(&rc)?;
        webhooks::edit_main(&rc)?;
        webhooks::edit_manifests(&rc)?;
        webhooks::move_project_webhooks(&mut rc)?;
        ctx.fmt()?;

        ctx.commit(
            self.name(),
            &format!(
                "Move the existing webhooks from {} to {}.",
                rc.prev, rc.new
            ),
        )
    }
}

/// Conversion webhooks, hub routines and their test scaffolding.
pub struct ConversionWebhooks;

impl<'a> Step<BumpContext<'a>> for ConversionWebhooks {
    fn name(&self) -> &'static str {
        "conversion-webhooks"
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        let rc = ctx.rewrite();
        let created = webhooks::create_conversion_webhooks(&rc, ctx.tools.scaffolder)?;
        if !created.is_empty() {
            log::info!("Created conversion webhooks for {}", created.join(", "));
        }
        ctx.fix_import_alias()?;
        webhooks::write_hub(&rc)?;
        kustomize::enable_conversion_patches(&rc)?;
        webhooks::add_fuzz_tests(&rc)?;
        ctx.fmt()?;

        let new = &rc.new;
        ctx.commit(
            self.name(),
            &format!(
                "Create conversion webhooks and hub routines for {new}.\n\n\
                 This may have used \"kubebuilder create webhook --conversion\" for any\n\
                 API that did not already have a webhook.\n\n\
                 Any newly-created api/{new}/*_webhook_test.go is empty and\n\
                 does not need content at this time. It has been updated with a comment\n\
                 to explain where conversion tests are located.\n\n\
                 ACTION: Any new tests added to\n  \
                 {util}\n  \
                 may need to be manually adjusted. Look for the \"ACTION\" comments\n  \
                 in this file.\n\n\
                 This may have added a new SetupWebhookWithManager() to suite_test.go,\n\
                 though a later step will complete the changes to that file.",
                util = webhooks::UTIL_CONVERSION_TEST,
            ),
        )
    }
}

/// Turn the previous hub into a spoke of the new one.
pub struct ConversionGen;

impl<'a> Step<BumpContext<'a>> for ConversionGen {
    fn name(&self) -> &'static str {
        "conversion-gen"
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        let rc = ctx.rewrite();
        conversion::write_doc_go(&rc)?;
        conversion::write_spoke(&rc)?;
        conversion::write_spoke_fuzz_test(&rc)?;
        conversion::write_webhook_suite_test(&rc)?;
        ctx.fmt()?;

        let (prev, new) = (&rc.prev, &rc.new);
        ctx.commit(
            self.name(),
            &format!(
                "Create conversion routines and tests for {prev}.\n\n\
                 Switch api/{prev}/conversion.go content from hub to spoke.\n\n\
                 These conversion.go ConvertTo()/ConvertFrom() routines are complete\n\
                 and do not require manual adjustment at this time, because {prev} is\n\
                 currently identical to the new hub {new}.\n\n\
                 ACTION: The api/{prev}/conversion_test.go may need to be\n  \
                 manually adjusted for your needs, especially if it has been manually\n  \
                 adjusted in earlier spokes.\n\n\
                 ACTION: Any new tests added to {suite}\n  \
                 may need to be manually adjusted.\n\n\
                 This added api/{prev}/doc.go to hold the k8s:conversion-gen\n\
                 marker that points to the new hub.\n",
                suite = conversion::CONTROLLER_CONVERSION_TEST,
            ),
        )
    }
}

/// Point the controllers and the fuzz-test helpers at the new hub.
pub struct BumpControllers;

impl<'a> Step<BumpContext<'a>> for BumpControllers {
    fn name(&self) -> &'static str {
        "bump-controllers"
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        let rc = ctx.rewrite();
        let bumped = controllers::bump_controllers(&rc)? + controllers::bump_util_conversion_test(&rc)?;
        log::debug!("Bumped {bumped} controller files");
        ctx.fmt()?;

        let body = format!(
            "Point controllers at new hub {}\n\n\
             Point conversion fuzz test at new hub. These routines are still\n\
             valid for the new hub because it is currently identical to the\n\
             previous hub.{}",
            rc.new,
            ctx.nonlocal_note("controllers"),
        );
        ctx.commit(self.name(), &body)
    }
}

/// Point spokes older than the previous hub at the new hub.
pub struct BumpApis;

impl<'a> Step<BumpContext<'a>> for BumpApis {
    fn name(&self) -> &'static str {
        "bump-apis"
    }

    fn has_work(&self, ctx: &BumpContext<'a>) -> Result<bool> {
        HubSpoke::new(&ctx.root).has_earlier_spokes(&ctx.options.prev, &ctx.options.new)
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        if !self.has_work(ctx)? {
            log::info!("There are no earlier spokes; nothing to bump");
            ctx.tools.repo.verify_clean()?;
            return Ok(StepOutcome::NothingToDo);
        }
        let rc = ctx.rewrite();
        controllers::bump_earlier_spokes(&rc)?;
        ctx.fmt()?;

        let body = format!(
            "Point earlier spoke APIs at new hub {}.\n\n\
             The conversion_test.go and the ConvertTo()/ConvertFrom() routines in\n\
             conversion.go are still valid for the new hub because it is currently\n\
             identical to the previous hub.\n\n\
             Update the k8s:conversion-gen marker in doc.go to point to the new hub.{}",
            rc.new,
            ctx.nonlocal_note("API libraries"),
        );
        ctx.commit(self.name(), &body)
    }
}

/// Regenerate everything derived from the API types.
pub struct AutoGens;

impl<'a> Step<BumpContext<'a>> for AutoGens {
    fn name(&self) -> &'static str {
        "auto-gens"
    }

    fn alternate_predecessors(&self) -> &'static [&'static str] {
        &["bump-controllers"]
    }

    fn run(&self, ctx: &mut BumpContext<'a>) -> Result<StepOutcome> {
        makefile::update_spoke_list(&ctx.rewrite())?;
        ctx.tools.build.regenerate_all()?;

        ctx.commit(
            self.name(),
            "Make the auto-generated files.\n\n\
             Update the SRC_DIRS spoke list in the Makefile.\n\n\
             make manifests & make generate & make generate-go-conversions\n\
             make fmt\n\n\
             ACTION: If any of the code in this repo was referencing non-local\n  \
             APIs, the references to them may have been inadvertently\n  \
             modified. Verify that any non-local APIs are being referenced\n  \
             by their correct versions.\n\n\
             ACTION: Begin by running \"make vet\". Repair any issues that it finds.\n  \
             Then run \"make test\" and continue repairing issues until the tests\n  \
             pass.\n",
        )
    }
}

/// The bump sequence, in order.
pub fn bump_pipeline<'a>() -> Pipeline<BumpContext<'a>> {
    let steps: Vec<Box<dyn Step<BumpContext<'a>>>> = vec![
        Box::new(CreateApis),
        Box::new(CopyApiContent),
        Box::new(MvWebhooks),
        Box::new(ConversionWebhooks),
        Box::new(ConversionGen),
        Box::new(BumpControllers),
        Box::new(BumpApis),
        Box::new(AutoGens),
    ];
    Pipeline::new(steps)
}
