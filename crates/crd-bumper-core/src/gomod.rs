//! Facts about the Go module being bumped: its name and import-alias habits.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::editor::FileEditor;
use crate::error::BumpError;

pub const GO_MOD: &str = "go.mod";
pub const MAIN_GO: &str = "cmd/main.go";

static MODULE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^module\s+(\S+)").unwrap());

/// The module path declared in `go.mod`.
pub fn module_name(root: &Path) -> Result<String> {
    let path = root.join(GO_MOD);
    if !path.is_file() {
        return Err(BumpError::MissingFile(path).into());
    }
    let mut ed = FileEditor::new(&path, false);
    let line = ed
        .find_regex(&MODULE_LINE)?
        .with_context(|| format!("unable to find module name in {}", path.display()))?;
    let caps = MODULE_LINE
        .captures(&line)
        .with_context(|| format!("unable to parse module name in {}", path.display()))?;
    Ok(caps[1].to_string())
}

/// Regex matching an import line of `{module}/api/{ver}` and capturing its alias prefix.
fn api_import(module: &str, ver: &str) -> Result<Regex> {
    let pattern = format!(
        r#"^\s+([A-Za-z0-9_]+){ver}\s+"{module}/api/{ver}""#,
        ver = regex::escape(ver),
        module = regex::escape(module),
    );
    Ok(Regex::new(&pattern)?)
}

/// The alias prefix `cmd/main.go` uses for `{module}/api/{ver}`, if any.
pub fn import_alias(root: &Path, module: &str, ver: &str) -> Result<Option<String>> {
    let path = root.join(MAIN_GO);
    if !path.is_file() {
        return Ok(None);
    }
    let re = api_import(module, ver)?;
    let mut ed = FileEditor::new(path, false);
    let Some(line) = ed.find_regex(&re)? else {
        return Ok(None);
    };
    Ok(re.captures(&line).map(|c| c[1].to_string()))
}

/// The repository's own alias prefix, when it differs from the API group.
///
/// Some repositories import `dwsv1alpha1` where kubebuilder would have
/// written `dataworkflowservicesv1alpha1`; `cmd/main.go` tells which.
pub fn preferred_alias(root: &Path, module: &str, ver: &str, group: &str) -> Result<Option<String>> {
    Ok(import_alias(root, module, ver)?.filter(|alias| alias != group))
}

/// Replace the group-derived alias kubebuilder wrote into `cmd/main.go`.
pub fn fix_kubebuilder_import_alias(
    root: &Path,
    group: &str,
    preferred: Option<&str>,
    new_ver: &str,
    dry_run: bool,
) -> Result<bool> {
    let Some(preferred) = preferred else {
        return Ok(false);
    };
    let path = root.join(MAIN_GO);
    if !path.is_file() {
        return Ok(false);
    }
    let mut ed = FileEditor::new(path, dry_run);
    let changed = ed.replace(&format!("{group}{new_ver}"), &format!("{preferred}{new_ver}"))?;
    ed.store()?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MAIN: &str = r#"package main

import (
	"flag"

	dwsv1alpha1 "github.com/DataWorkflowServices/dws/api/v1alpha1"
	dataworkflowservicesv1alpha2 "github.com/DataWorkflowServices/dws/api/v1alpha2"
)
"#;

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(GO_MOD),
            "module github.com/DataWorkflowServices/dws\n\ngo 1.22\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("cmd")).unwrap();
        fs::write(dir.path().join(MAIN_GO), MAIN).unwrap();
        dir
    }

    #[test]
    fn reads_module_name() -> Result<()> {
        let dir = repo();
        assert_eq!(module_name(dir.path())?, "github.com/DataWorkflowServices/dws");
        Ok(())
    }

    #[test]
    fn missing_go_mod_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = module_name(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BumpError>(),
            Some(BumpError::MissingFile(_))
        ));
    }

    #[test]
    fn preferred_alias_only_when_it_differs_from_group() -> Result<()> {
        let dir = repo();
        let module = "github.com/DataWorkflowServices/dws";
        assert_eq!(
            preferred_alias(dir.path(), module, "v1alpha1", "dataworkflowservices")?.as_deref(),
            Some("dws")
        );
        assert_eq!(preferred_alias(dir.path(), module, "v1alpha1", "dws")?, None);
        assert_eq!(preferred_alias(dir.path(), module, "v9", "dws")?, None);
        Ok(())
    }

    #[test]
    fn fixes_kubebuilder_alias() -> Result<()> {
        let dir = repo();
        assert!(fix_kubebuilder_import_alias(
            dir.path(),
            "dataworkflowservices",
            Some("dws"),
            "v1alpha2",
            false
        )?);
        let main = fs::read_to_string(dir.path().join(MAIN_GO))?;
        assert!(main.contains("\tdwsv1alpha2 \"github.com/DataWorkflowServices/dws/api/v1alpha2\""));
        assert!(!fix_kubebuilder_import_alias(dir.path(), "dataworkflowservices", None, "v1alpha2", false)?);
        Ok(())
    }
}
