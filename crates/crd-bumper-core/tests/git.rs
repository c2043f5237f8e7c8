use anyhow::Result;
use std::path::Path;

use crd_bumper_core::{BumpError, GitCli, Repository};
use crd_bumper_test_utils::sandbox::Sandbox;

const GO_FILE: &str = "/*\n * Copyright 2024 Hewlett Packard Enterprise Development LP\n */\n\npackage v1alpha1\n";

#[test]
fn commit_stage_records_the_marker() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("README.md", "dws\n").commit("Initial commit");
    let git = GitCli::new(repo.work_dir(), false, false);
    assert!(git.last_marker()?.is_none());

    repo.write("api/v1alpha1/doc.go", GO_FILE);
    git.commit_stage("conversion-gen", "Create conversion routines.")?;

    assert_eq!(repo.status(), "");
    let marker = git.last_marker()?.expect("marker");
    assert_eq!(marker.step(), "conversion-gen");
    let message = repo.head_message();
    assert!(message.starts_with("CRDBUMPER-conversion-gen\n\nCreate conversion routines.\n"));
    assert!(message.contains("Signed-off-by: Sandbox <test@example.com>"));
    Ok(())
}

#[test]
fn commit_stage_bumps_copyright_of_changed_files_only() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("api/v1alpha1/untouched.go", GO_FILE)
        .write("github/cluster-api/util/conversion/conversion.go", GO_FILE)
        .commit("Initial commit");
    let git = GitCli::new(repo.work_dir(), false, false);

    repo.write("api/v1alpha1/doc.go", GO_FILE)
        .write(
            "github/cluster-api/util/conversion/conversion.go",
            format!("{GO_FILE}\n// edited\n"),
        );
    git.commit_stage("conversion-gen", "body")?;

    assert!(repo.read("api/v1alpha1/doc.go").contains(" * Copyright 2024-"));
    assert_eq!(repo.read("api/v1alpha1/untouched.go"), GO_FILE);
    assert!(repo
        .read("github/cluster-api/util/conversion/conversion.go")
        .contains(" * Copyright 2024 Hewlett"));
    Ok(())
}

#[test]
fn dirty_work_area_is_refused() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("README.md", "dws\n").commit("Initial commit");
    let git = GitCli::new(repo.work_dir(), false, false);
    git.verify_clean()?;

    repo.write("README.md", "changed\n");
    let err = git.verify_clean().unwrap_err();
    assert!(matches!(err.downcast_ref::<BumpError>(), Some(BumpError::DirtyWorkarea(s)) if s.contains("README.md")));
    assert!(git.checkout_branch("api-v1alpha2").is_err());
    Ok(())
}

#[test]
fn checkout_branch_creates_the_working_branch() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("README.md", "dws\n").commit("Initial commit");
    let git = GitCli::new(repo.work_dir(), false, false);

    git.checkout_branch("api-v1alpha2")?;
    assert_eq!(repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]), "api-v1alpha2");

    git.checkout_existing("main")?;
    assert_eq!(repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    Ok(())
}

#[test]
fn no_commit_edits_but_leaves_changes_staged_for_review() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("README.md", "dws\n").commit("Initial commit");
    let head = repo.head();
    let git = GitCli::new(repo.work_dir(), false, true);

    repo.write("api/v1alpha1/doc.go", GO_FILE);
    git.commit_stage("conversion-gen", "body")?;

    assert_eq!(repo.head(), head);
    assert!(repo.status().contains("api/v1alpha1/doc.go"));
    assert!(repo.read("api/v1alpha1/doc.go").contains(" * Copyright 2024-"));
    Ok(())
}

#[test]
fn dry_run_touches_nothing() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("README.md", "dws\n").commit("Initial commit");
    let head = repo.head();
    let git = GitCli::new(repo.work_dir(), true, false);

    repo.write("api/v1alpha1/doc.go", GO_FILE);
    git.verify_clean()?;
    git.checkout_branch("api-v1alpha2")?;
    git.commit_stage("conversion-gen", "body")?;

    assert_eq!(repo.head(), head);
    assert_eq!(repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert_eq!(repo.read("api/v1alpha1/doc.go"), GO_FILE);
    Ok(())
}

#[test]
fn mv_is_recorded_as_a_rename() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("api/v1alpha1/workflow_webhook.go", "package v1alpha1\n")
        .write("api/v1alpha2/groupversion_info.go", "package v1alpha2\n")
        .commit("Initial commit");
    let git = GitCli::new(repo.work_dir(), false, false);

    git.mv(
        Path::new("api/v1alpha1/workflow_webhook.go"),
        Path::new("api/v1alpha2/workflow_webhook.go"),
    )?;
    assert!(!repo.exists("api/v1alpha1/workflow_webhook.go"));
    assert!(repo.exists("api/v1alpha2/workflow_webhook.go"));
    assert!(repo.status().starts_with("R "));
    Ok(())
}

#[test]
fn foreign_commit_messages_are_not_markers() -> Result<()> {
    let sb = Sandbox::new();
    let repo = sb.git_repo("dws");
    repo.write("README.md", "dws\n").commit("Merge pull request #42");
    let git = GitCli::new(repo.work_dir(), false, false);
    assert!(git.last_marker()?.is_none());

    repo.write("README.md", "x\n").commit("Mention CRDBUMPER-create-apis in docs");
    assert!(git.last_marker()?.is_none());

    repo.write("README.md", "y\n").commit("CRDBUMPER-");
    let err = git.last_marker().unwrap_err();
    assert!(matches!(err.downcast_ref::<BumpError>(), Some(BumpError::MalformedMarker(_))));
    Ok(())
}

#[test]
fn clone_into_reuses_an_existing_checkout() -> Result<()> {
    let sb = Sandbox::new();
    let upstream = sb.git_repo("upstream/dws");
    upstream.write("README.md", "dws\n").commit("Initial commit");
    let workdir = sb.root_path().join("workingspace");

    let url = upstream.work_dir().to_string_lossy().into_owned();
    let checkout = GitCli::clone_into(&url, &workdir, false)?;
    assert_eq!(checkout, workdir.join("dws"));
    assert!(checkout.join("README.md").is_file());

    std::fs::write(checkout.join("local.txt"), "kept\n")?;
    let again = GitCli::clone_into(&url, &workdir, false)?;
    assert_eq!(again, checkout);
    assert!(again.join("local.txt").is_file());
    Ok(())
}
