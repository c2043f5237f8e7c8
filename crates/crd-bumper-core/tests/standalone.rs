use anyhow::Result;

use crd_bumper_core::standalone::{self, RESERVE_API, UNSERVE_API, VENDOR_NEW_API};
use crd_bumper_core::{
    BumpContext, BumpError, BumpOptions, GitCli, MakeTarget, Repository, RunMode, RunOptions,
    StepOutcome, Toolbox, bump_pipeline,
};
use crd_bumper_test_utils::fakes::{FakeScaffolder, RecordingBuild, RecordingFetcher};
use crd_bumper_test_utils::fixture::{MODULE, kubebuilder_repo};
use crd_bumper_test_utils::sandbox::{FixtureRepo, Sandbox};

/// The fixture after a completed v1alpha1 -> v1alpha2 bump.
fn bumped_repo(sb: &Sandbox) -> Result<FixtureRepo> {
    let repo = kubebuilder_repo(sb, "dws");
    let git = GitCli::new(repo.work_dir(), false, false);
    let build = RecordingBuild::default();
    let scaffolder = FakeScaffolder::new(repo.work_dir());
    let tools = Toolbox {
        repo: &git,
        build: &build,
        scaffolder: &scaffolder,
    };
    let options = BumpOptions {
        prev: "v1alpha1".to_string(),
        new: "v1alpha2".to_string(),
        ..Default::default()
    };
    let mut ctx = BumpContext::new(repo.work_dir(), options, tools)?;
    let report = bump_pipeline().run(&mut ctx, RunMode::All, RunOptions::default())?;
    assert!(report.finished);
    Ok(repo)
}

#[test]
fn unserve_then_re_serve_restores_the_tree() -> Result<()> {
    let sb = Sandbox::new();
    let repo = bumped_repo(&sb)?;
    let before = repo.snapshot();
    let git = GitCli::new(repo.work_dir(), false, false);
    let build = RecordingBuild::default();

    let outcome = standalone::unserve(repo.work_dir(), "v1alpha1", &git, &build, false)?;
    assert_eq!(outcome, StepOutcome::Committed);
    assert_eq!(repo.subjects().last().map(String::as_str), Some("CRDBUMPER-unserve-api"));
    assert_eq!(repo.status(), "");

    for kind in ["workflow", "storage"] {
        let types = repo.read(format!("api/v1alpha1/{kind}_types.go"));
        assert!(types.contains("//+kubebuilder:subresource:status\n// +kubebuilder:unservedversion\n"));
    }
    assert!(!repo.read("api/v1alpha2/workflow_types.go").contains("unservedversion"));
    let suite = repo.read("internal/controller/conversion_test.go");
    assert!(suite.contains("\t\tIt(\"is unable to read Workflow resource via spoke v1alpha1\", func() {\n"));
    assert!(suite.contains("\t\t\tresSpoke := &dwsv1alpha1.Workflow{}\n"));
    assert!(suite.contains("\t\t// ACTION: v1alpha1 is no longer served, and this test can be removed.\n"));
    assert!(suite.contains("\t\tPIt(\"reads Storage resource via hub and via spoke v1alpha1\", func() {\n"));
    assert!(repo.head_message().contains("ACTION: Address the ACTION comments in internal/controller/conversion_test.go."));
    assert_eq!(
        build.targets(),
        vec![
            MakeTarget::Manifests,
            MakeTarget::Generate,
            MakeTarget::GenerateConversions,
            MakeTarget::Format,
            MakeTarget::CleanArtifacts,
        ]
    );

    let outcome = standalone::re_serve(repo.work_dir(), "v1alpha1", &git, &build, false)?;
    assert_eq!(outcome, StepOutcome::Committed);
    assert_eq!(repo.subjects().last().map(String::as_str), Some("CRDBUMPER-re-serve-api"));
    assert_eq!(repo.snapshot(), before);
    Ok(())
}

#[test]
fn unserve_refuses_the_hub() -> Result<()> {
    let sb = Sandbox::new();
    let repo = bumped_repo(&sb)?;
    let head = repo.head();
    let git = GitCli::new(repo.work_dir(), false, false);

    let err = standalone::unserve(repo.work_dir(), "v1alpha2", &git, &RecordingBuild::default(), false)
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<BumpError>(), Some(BumpError::NotSpoke(v)) if v == "v1alpha2"));
    assert_eq!(repo.head(), head);
    assert_eq!(repo.status(), "");
    Ok(())
}

#[test]
fn standalone_markers_do_not_disturb_the_bump_sequence() -> Result<()> {
    let sb = Sandbox::new();
    let repo = bumped_repo(&sb)?;
    let git = GitCli::new(repo.work_dir(), false, false);
    standalone::unserve(repo.work_dir(), "v1alpha1", &git, &RecordingBuild::default(), false)?;

    let marker = git.last_marker()?;
    assert_eq!(marker.as_ref().map(|m| m.step()), Some(UNSERVE_API));
    let pipeline = bump_pipeline();
    assert!(pipeline.recorded_step(marker.as_ref()).is_none());

    standalone::re_serve(repo.work_dir(), "v1alpha1", &git, &RecordingBuild::default(), false)?;
    assert_eq!(git.last_marker()?.as_ref().map(|m| m.step()), Some(RESERVE_API));
    assert!(pipeline.recorded_step(git.last_marker()?.as_ref()).is_none());
    Ok(())
}

const CONSUMER_GO_MOD: &str = "module github.com/NearNodeFlash/nnf-sos\n\ngo 1.21\n\nrequire (\n\
\tgithub.com/DataWorkflowServices/dws v0.0.1-0.20240101000000-000000000000\n\
\tsigs.k8s.io/controller-runtime v0.16.3\n)\n";

const CONSUMER_MAIN: &str = "package main\n\nimport (\n\
\tdataworkflowservicesv1alpha2 \"github.com/DataWorkflowServices/dws/api/v1alpha2\"\n\
\t//+kubebuilder:scaffold:imports\n)\n\n\
func init() {\n\tutilruntime.Must(dataworkflowservicesv1alpha2.AddToScheme(scheme))\n}\n";

const CONSUMER_CONTROLLER: &str = "package controller\n\nimport (\n\
\tdataworkflowservicesv1alpha2 \"github.com/DataWorkflowServices/dws/api/v1alpha2\"\n)\n\n\
func get() *dataworkflowservicesv1alpha2.Workflow {\n\treturn &dataworkflowservicesv1alpha2.Workflow{}\n}\n";

fn consumer_repo(sb: &Sandbox) -> FixtureRepo {
    let repo = sb.git_repo("nnf-sos");
    repo.write("go.mod", CONSUMER_GO_MOD)
        .write("cmd/main.go", CONSUMER_MAIN)
        .write("internal/controller/workflow_controller.go", CONSUMER_CONTROLLER)
        .write("pkg/util/workflow.go", CONSUMER_CONTROLLER.replace("package controller", "package util"))
        .write(
            "config/dws/workflow.yaml",
            "apiVersion: dataworkflowservices.github.io/v1alpha2\nkind: Workflow\n",
        )
        .write(
            "crd-bumper.yaml",
            "extra_go_dirs: pkg/util\nextra_config_dirs: config/dws\n",
        )
        .write(
            "vendor/github.com/DataWorkflowServices/dws/api/v1alpha2/workflow_types.go",
            "package v1alpha2\n",
        )
        .commit("Consumer project");
    repo
}

#[test]
fn vendor_new_api_moves_a_consumer_to_the_new_version() -> Result<()> {
    let sb = Sandbox::new();
    let repo = consumer_repo(&sb);
    let git = GitCli::new(repo.work_dir(), false, false);
    let build = RecordingBuild::default();
    let fetcher = RecordingFetcher::default();

    let outcome =
        standalone::vendor_new_api(repo.work_dir(), MODULE, "v1alpha3", &git, &build, &fetcher, false)?;
    assert_eq!(outcome, StepOutcome::Committed);
    assert_eq!(repo.subjects().last(), Some(&format!("CRDBUMPER-{VENDOR_NEW_API}")));
    assert!(repo
        .head_message()
        .starts_with("CRDBUMPER-vendor-new-api\n\nVendor v1alpha3 API from github.com/DataWorkflowServices/dws.\n"));
    assert_eq!(repo.status(), "");

    let expected = CONSUMER_CONTROLLER.replace("v1alpha2", "v1alpha3");
    assert_eq!(repo.read("internal/controller/workflow_controller.go"), expected);
    assert_eq!(
        repo.read("pkg/util/workflow.go"),
        expected.replace("package controller", "package util")
    );
    assert_eq!(repo.read("cmd/main.go"), CONSUMER_MAIN.replace("v1alpha2", "v1alpha3"));
    assert_eq!(
        repo.read("config/dws/workflow.yaml"),
        "apiVersion: dataworkflowservices.github.io/v1alpha3\nkind: Workflow\n"
    );

    assert_eq!(
        *fetcher.calls.borrow(),
        vec![
            format!("get {MODULE}@master"),
            "mod tidy".to_string(),
            "mod vendor".to_string(),
        ]
    );
    assert_eq!(build.targets().last(), Some(&MakeTarget::CleanArtifacts));
    Ok(())
}

#[test]
fn vendor_new_api_skips_repositories_without_the_module() -> Result<()> {
    let sb = Sandbox::new();
    let repo = kubebuilder_repo(&sb, "lustre-fs-operator");
    let head = repo.head();
    let git = GitCli::new(repo.work_dir(), false, false);
    let fetcher = RecordingFetcher::default();

    let outcome = standalone::vendor_new_api(
        repo.work_dir(),
        "github.com/HewlettPackard/lustre-csi-driver",
        "v1beta2",
        &git,
        &RecordingBuild::default(),
        &fetcher,
        false,
    )?;
    assert_eq!(outcome, StepOutcome::NothingToDo);
    assert_eq!(repo.head(), head);
    assert!(fetcher.calls.borrow().is_empty());
    Ok(())
}

#[test]
fn vendor_new_api_requires_a_single_vendored_version() -> Result<()> {
    let sb = Sandbox::new();
    let repo = consumer_repo(&sb);
    repo.write(
        "vendor/github.com/DataWorkflowServices/dws/api/v1alpha1/workflow_types.go",
        "package v1alpha1\n",
    )
    .commit("Vendor two versions");
    let git = GitCli::new(repo.work_dir(), false, false);

    let err = standalone::vendor_new_api(
        repo.work_dir(),
        MODULE,
        "v1alpha3",
        &git,
        &RecordingBuild::default(),
        &RecordingFetcher::default(),
        false,
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BumpError>(),
        Some(BumpError::VendoredVersions { found, .. }) if found.len() == 2
    ));
    assert_eq!(repo.status(), "");
    Ok(())
}
