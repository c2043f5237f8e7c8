//! Moving a consumer repository onto a newer vendored API of another module.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use super::{relative, retarget_qualifier, source_files};
use crate::editor::FileEditor;
use crate::error::BumpError;
use crate::gomod::{GO_MOD, MAIN_GO, import_alias};

/// The consumer side of a vendored API bump.
#[derive(Debug)]
pub struct Vendoring {
    pub root: PathBuf,
    pub module: String,
    /// The consumer's own hub, whose `api/` directory may import the module.
    pub own_hub: Option<String>,
    /// The version being vendored in.
    pub new: String,
    pub current: String,
    pub alias: String,
    pub dry_run: bool,
}

/// Whether `go.mod` requires `module`.
pub fn uses_module(root: &Path, module: &str) -> Result<bool> {
    let path = root.join(GO_MOD);
    if !path.is_file() {
        return Ok(false);
    }
    let re = Regex::new(&format!(
        r"^(\t|require\s+){}\s+v",
        regex::escape(module)
    ))?;
    let mut ed = FileEditor::new(path, false);
    Ok(ed.find_regex(&re)?.is_some())
}

/// API version directories under `vendor/<module>/api`.
pub fn vendored_versions(root: &Path, module: &str) -> Result<Vec<String>> {
    let dir = root.join("vendor").join(module).join("api");
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            found.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    found.sort();
    Ok(found)
}

/// The single vendored API version of `module`.
pub fn current_api_version(root: &Path, module: &str) -> Result<String> {
    let mut found = vendored_versions(root, module)?;
    if found.len() != 1 {
        return Err(BumpError::VendoredVersions {
            module: module.to_string(),
            found,
        }
        .into());
    }
    Ok(found.remove(0))
}

impl Vendoring {
    /// Discover the vendored version and the alias `cmd/main.go` imports it under.
    pub fn discover(
        root: impl Into<PathBuf>,
        module: &str,
        new: &str,
        own_hub: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let root = root.into();
        let current = current_api_version(&root, module)?;
        let alias =
            import_alias(&root, module, &current)?.ok_or_else(|| BumpError::ImportNotFound {
                module: module.to_string(),
                version: current.clone(),
                path: root.join(MAIN_GO),
            })?;
        Ok(Self {
            root,
            module: module.to_string(),
            own_hub,
            new: new.to_string(),
            current,
            alias,
            dry_run,
        })
    }

    /// Go files in the usual kubebuilder locations, plus any extra
    /// directories. Extra directories must exist.
    pub fn update_go_files(&self, extra_dirs: &[String]) -> Result<usize> {
        let mut tops: Vec<String> = ["cmd", "internal/controller", "controllers"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(hub) = &self.own_hub {
            tops.push(format!("api/{hub}"));
        }
        for dir in extra_dirs {
            self.require_dir(dir)?;
            tops.push(dir.clone());
        }

        let mut changed = 0;
        for top in &tops {
            for path in source_files(&self.root, top)? {
                if path.extension().is_some_and(|ext| ext == "go") && self.update_go_file(&path)? {
                    log::debug!("Vendored {}", relative(&self.root, &path));
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    fn update_go_file(&self, path: &Path) -> Result<bool> {
        let (cur, new, alias) = (&self.current, &self.new, &self.alias);
        let mut ed = FileEditor::new(path, self.dry_run);
        let import = Regex::new(&format!(
            r#"(?m)^(\s*){}{cur}(\s+"{}/api/){cur}""#,
            regex::escape(alias),
            regex::escape(&self.module),
            cur = regex::escape(cur),
        ))?;
        let mut changed = ed.replace_regex(&import, &format!("${{1}}{alias}{new}${{2}}{new}\""))?;
        changed |= retarget_qualifier(&mut ed, alias, cur, new)?;
        ed.store()?;
        Ok(changed)
    }

    /// `apiVersion: {alias}...` lines in Kustomize YAML under `dir`.
    pub fn update_config_files(&self, dir: &str) -> Result<usize> {
        self.require_dir(dir)?;
        let re = Regex::new(&format!(
            r"(?m)^(\s*-?\s*apiVersion:\s*{}[A-Za-z0-9.-]*/){}\b",
            regex::escape(&self.alias),
            regex::escape(&self.current),
        ))?;
        let mut changed = 0;
        for path in source_files(&self.root, dir)? {
            if !path.extension().is_some_and(|ext| ext == "yaml") {
                continue;
            }
            let mut ed = FileEditor::new(&path, self.dry_run);
            if ed.replace_regex(&re, &format!("${{1}}{}", self.new))? {
                changed += 1;
            }
            ed.store()?;
        }
        Ok(changed)
    }

    /// After `go mod vendor`, exactly one API version must remain vendored.
    pub fn verify_one_api_version(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        current_api_version(&self.root, &self.module).map(|_| ())
    }

    fn require_dir(&self, dir: &str) -> Result<()> {
        let path = self.root.join(dir);
        if !path.is_dir() {
            anyhow::bail!("{} is not a directory", path.display());
        }
        Ok(())
    }

    /// Commit body for `vendor-new-api`.
    pub fn message(&self) -> String {
        format!(
            "Vendor {} API from {}.\n\
             \n\
             ACTION: If any of the code in this repo was referencing non-local\n  \
             APIs, the references to them may have been inadvertently\n  \
             modified. Verify that any non-local APIs are being referenced\n  \
             by their correct versions.\n\
             \n\
             ACTION: Begin by running \"make vet\". Repair any issues that it finds.\n  \
             Then run \"make test\" and continue repairing issues until the tests\n  \
             pass.\n",
            self.new, self.module
        )
    }
}
