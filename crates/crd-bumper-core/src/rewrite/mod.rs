//! Line-oriented rewrite rules that move a repository from one hub to the next.
//!
//! Every rule loads a file through [`FileEditor`], applies find/replace edits
//! anchored on lines it can recognise, and stores the file only when an edit
//! took effect. Rules are written so that applying them a second time finds
//! nothing left to change.

pub mod api;
pub mod controllers;
pub mod conversion;
pub mod kustomize;
pub mod makefile;
pub mod serve;
pub mod vendoring;
pub mod webhooks;

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::editor::{FileEditor, write_atomic};
use crate::error::BumpError;
use crate::project::Project;

/// Template for generated Go files.
pub const BOILERPLATE: &str = "hack/boilerplate.go.txt";

/// Everything a rule needs to know about the bump in progress.
#[derive(Debug)]
pub struct RewriteContext {
    pub root: PathBuf,
    pub prev: String,
    pub new: String,
    pub module: String,
    pub preferred_alias: Option<String>,
    pub project: Project,
    pub dry_run: bool,
}

impl RewriteContext {
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub fn editor(&self, rel: impl AsRef<Path>) -> FileEditor {
        FileEditor::new(self.path(rel), self.dry_run)
    }

    /// Import alias prefix for `kind` at `ver`: the repository's preferred
    /// alias, or else the Kind's group.
    pub fn alias_for(&self, kind: &str, ver: &str) -> Result<String> {
        match &self.preferred_alias {
            Some(alias) => Ok(alias.clone()),
            None => Ok(self.project.group(kind, ver)?.to_string()),
        }
    }

    /// Alias of the first Kind at `ver`, for files that import the package once.
    pub fn package_alias(&self, ver: &str) -> Result<String> {
        let kinds = self.project.require_kinds(ver)?;
        self.alias_for(&kinds[0], ver)
    }

    /// The group of the first Kind at `ver`.
    pub fn package_group(&self, ver: &str) -> Result<String> {
        let kinds = self.project.require_kinds(ver)?;
        Ok(self.project.group(&kinds[0], ver)?.to_string())
    }

    /// The hack boilerplate that starts every generated Go file.
    pub fn boilerplate(&self) -> Result<String> {
        let path = self.path(BOILERPLATE);
        if !path.is_file() {
            return Err(BumpError::MissingFile(path).into());
        }
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
    }

    /// Write a whole generated file, honouring dry-run.
    pub fn write_file(&self, rel: impl AsRef<Path>, content: &str) -> Result<()> {
        let path = self.path(rel);
        log::debug!("Write {}", path.display());
        write_atomic(&path, content, self.dry_run)
    }
}

/// `{alias}{prev}.` -> `{alias}{new}.`, never inside a longer identifier.
pub fn retarget_qualifier(ed: &mut FileEditor, alias: &str, prev: &str, new: &str) -> Result<bool> {
    let re = Regex::new(&format!(
        r"(^|[^A-Za-z0-9_]){}\.",
        regex::escape(&format!("{alias}{prev}"))
    ))?;
    ed.replace_regex(&re, &format!("${{1}}{alias}{new}."))
}

/// `{prefix}{alias}{prev}.{kind}` -> `{prefix}{alias}{new}.{kind}` for whole identifiers.
pub fn retarget_kind_reference(
    ed: &mut FileEditor,
    alias: &str,
    prev: &str,
    new: &str,
    kind: &str,
) -> Result<bool> {
    let re = Regex::new(&format!(
        r"(^|[^A-Za-z0-9_]){}\.{}\b",
        regex::escape(&format!("{alias}{prev}")),
        regex::escape(kind)
    ))?;
    ed.replace_regex(&re, &format!("${{1}}{alias}{new}.{kind}"))
}

/// Retarget an import of `{module}/api/{prev}` under any alias ending in `{prev}`.
pub fn retarget_module_import(
    ed: &mut FileEditor,
    module: &str,
    prev: &str,
    new: &str,
) -> Result<bool> {
    let re = Regex::new(&format!(
        r#"(?m)^(\s*[A-Za-z0-9_]*){prev}(\s+"{module}/api/){prev}""#,
        prev = regex::escape(prev),
        module = regex::escape(module),
    ))?;
    ed.replace_regex(&re, &format!("${{1}}{new}${{2}}{new}\""))
}

/// Retarget the import bound to `{alias}{prev}`, whatever path prefix it uses.
pub fn retarget_alias_import(ed: &mut FileEditor, alias: &str, prev: &str, new: &str) -> Result<bool> {
    let re = alias_import_regex(alias, prev)?;
    ed.replace_regex(&re, &format!("${{1}}{alias}{new}${{2}}{new}\""))
}

/// Add an import of `{new}` right after the `{alias}{prev}` import.
///
/// Returns `false` when the `{prev}` import is absent or `{new}` is already
/// imported.
pub fn add_import_after(ed: &mut FileEditor, alias: &str, prev: &str, new: &str) -> Result<bool> {
    let prev_re = alias_import_regex(alias, prev)?;
    let Some(line) = ed.find_regex(&prev_re)? else {
        return Ok(false);
    };
    if ed.find_regex(&alias_import_regex(alias, new)?)?.is_some() {
        return Ok(false);
    }
    let added = prev_re
        .replace(&line, format!("${{1}}{alias}{new}${{2}}{new}\"").as_str())
        .into_owned();
    ed.insert_after(&line, &added)
}

fn alias_import_regex(alias: &str, ver: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r#"(?m)^(\s+){}(\s+"[^"]*/){}""#,
        regex::escape(&format!("{alias}{ver}")),
        regex::escape(ver),
    ))?)
}

/// Insert `// {marker}` after the first of `anchors` found, unless `marker`
/// is already present.
///
/// A file with none of the anchors is a fatal error.
pub fn insert_marker(ed: &mut FileEditor, marker: &str, anchors: &[&str]) -> Result<bool> {
    if ed.find(marker)?.is_some() {
        return Ok(false);
    }
    for anchor in anchors {
        if ed.insert_after(anchor, &format!("// {marker}"))? {
            return Ok(true);
        }
    }
    Err(BumpError::AnchorNotFound {
        marker: marker.trim_start_matches('+').to_string(),
        path: ed.path().to_path_buf(),
    }
    .into())
}

/// Delete a `// {marker}` line in either of the spellings kubebuilder has used.
pub fn remove_marker(ed: &mut FileEditor, marker: &str) -> Result<bool> {
    let tight = ed.delete_lines(&format!("//{marker}"))?;
    let spaced = ed.delete_lines(&format!("// {marker}"))?;
    Ok(tight || spaced)
}

/// Anchors for type-level markers, in order of preference.
pub const TYPE_MARKER_ANCHORS: &[&str] =
    &["+kubebuilder:subresource:status", "+kubebuilder:object:root=true"];

/// Regular files under `root/rel`, sorted, skipping generated `zz_` files.
pub fn source_files(root: &Path, rel: &str) -> Result<Vec<PathBuf>> {
    let top = root.join(rel);
    if !top.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(&top).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", top.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with("zz_") || name.ends_with(".new") {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// The `.` and `..`-free path of `path` relative to `root`, with `/` separators.
pub fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// A context over `root` whose `PROJECT` declares `kinds` at v1alpha1 and v1alpha2.
#[cfg(test)]
pub(crate) fn test_context(root: &Path, kinds: &[&str]) -> RewriteContext {
    let mut yaml = String::from("projectName: dws\nresources:\n");
    for ver in ["v1alpha1", "v1alpha2"] {
        for kind in kinds {
            yaml.push_str(&format!(
                "- api:\n    crdVersion: v1\n  group: dataworkflowservices\n  kind: {kind}\n  version: {ver}\n"
            ));
        }
    }
    yaml.push_str("version: \"3\"\n");
    fs::write(root.join(crate::project::PROJECT_FILE), yaml).unwrap();
    RewriteContext {
        root: root.to_path_buf(),
        prev: "v1alpha1".to_string(),
        new: "v1alpha2".to_string(),
        module: "github.com/DataWorkflowServices/dws".to_string(),
        preferred_alias: Some("dws".to_string()),
        project: Project::load(root, false).unwrap(),
        dry_run: false,
    }
}
