//! Populating the new hub from the previous one.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::{
    RewriteContext, TYPE_MARKER_ANCHORS, insert_marker, relative, remove_marker,
    retarget_alias_import, retarget_qualifier, source_files,
};
use crate::editor::FileEditor;
use crate::error::BumpError;
use crate::git::Repository;

pub const STORAGE_VERSION: &str = "+kubebuilder:storageversion";

/// Files of the previous hub that the new hub gets from the scaffolder or
/// from later steps instead of by copy.
const NOT_COPIED: &[&str] = &[
    "doc.go",
    "groupversion_info.go",
    "conversion.go",
    "conversion_test.go",
    "zz_generated.deepcopy.go",
    "zz_generated.conversion.go",
];

pub fn types_file(ver: &str, kind: &str) -> PathBuf {
    PathBuf::from(format!("api/{ver}/{}_types.go", kind.to_lowercase()))
}

/// Copy `<kind>_types.go` and helper files from the previous hub into the
/// new one. Webhook files are moved with the repository tool instead.
pub fn copy_content(ctx: &RewriteContext, repo: &dyn Repository) -> Result<()> {
    let prev_kinds = ctx.project.require_kinds(&ctx.prev)?;
    let new_kinds = ctx.project.kinds(&ctx.new);

    let mut copied = BTreeSet::new();
    for kind in new_kinds.iter().filter(|k| prev_kinds.contains(k)) {
        let src = types_file(&ctx.prev, kind);
        let dst = types_file(&ctx.new, kind);
        if ctx.path(&src).is_file() && ctx.path(&dst).is_file() {
            copy(ctx, &src, &dst)?;
            copied.insert(ctx.path(&src));
        }
    }

    let prev_dir = ctx.path(format!("api/{}", ctx.prev));
    for src in source_files(&ctx.root, &format!("api/{}", ctx.prev))? {
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if NOT_COPIED.contains(&name.as_str()) || copied.contains(&src) {
            continue;
        }
        let rest = src.strip_prefix(&prev_dir).unwrap_or(&src);
        let src_rel = PathBuf::from(relative(&ctx.root, &src));
        let dst_rel = PathBuf::from(format!("api/{}", ctx.new)).join(rest);
        if name.contains("webhook") {
            repo.mv(&src_rel, &dst_rel)?;
        } else {
            copy(ctx, &src_rel, &dst_rel)?;
        }
    }
    Ok(())
}

fn copy(ctx: &RewriteContext, src: &Path, dst: &Path) -> Result<()> {
    if ctx.dry_run {
        log::info!("Dryrun: copy {} {}", src.display(), dst.display());
        return Ok(());
    }
    let to = ctx.path(dst);
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(ctx.path(src), &to)
        .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
    log::debug!("Copied {} to {}", src.display(), dst.display());
    Ok(())
}

/// Rename the package and retarget references in everything under the new hub.
pub fn edit_new_api_files(ctx: &RewriteContext) -> Result<()> {
    let package = Regex::new(&format!(r"(?m)^package {}$", regex::escape(&ctx.prev)))?;
    let mut aliases = BTreeSet::new();
    for kind in ctx.project.kinds(&ctx.new) {
        aliases.insert(ctx.alias_for(&kind, &ctx.new)?);
    }

    for path in source_files(&ctx.root, &format!("api/{}", ctx.new))? {
        let mut ed = FileEditor::new(&path, ctx.dry_run);
        ed.replace_regex(&package, &format!("package {}", ctx.new))?;
        for alias in &aliases {
            retarget_alias_import(&mut ed, alias, &ctx.prev, &ctx.new)?;
            retarget_qualifier(&mut ed, alias, &ctx.prev, &ctx.new)?;
        }
        ed.store()?;
    }
    Ok(())
}

/// Drop the storage-version marker from the previous hub's types.
pub fn remove_previous_storage_version(ctx: &RewriteContext) -> Result<()> {
    for kind in ctx.project.kinds(&ctx.prev) {
        let rel = types_file(&ctx.prev, &kind);
        if !ctx.path(&rel).is_file() {
            continue;
        }
        let mut ed = ctx.editor(&rel);
        remove_marker(&mut ed, STORAGE_VERSION)?;
        ed.store()?;
    }
    Ok(())
}

/// Place the storage-version marker on each of the new hub's types.
pub fn set_storage_version(ctx: &RewriteContext) -> Result<()> {
    for kind in ctx.project.kinds(&ctx.prev) {
        let rel = types_file(&ctx.new, &kind);
        if !ctx.path(&rel).is_file() {
            continue;
        }
        let mut ed = ctx.editor(&rel);
        insert_marker(&mut ed, STORAGE_VERSION, TYPE_MARKER_ANCHORS)?;
        ed.store()?;
    }
    Ok(())
}

/// Declare the `localSchemeBuilder` that generated conversions register with.
pub fn add_conversion_scheme_builder(ctx: &RewriteContext) -> Result<bool> {
    const ANCHOR: &str = "AddToScheme = SchemeBuilder.AddToScheme";
    let rel = format!("api/{}/groupversion_info.go", ctx.prev);
    let mut ed = ctx.editor(&rel);
    if ed.find("localSchemeBuilder")?.is_some() {
        return Ok(false);
    }
    let added = ed.insert_after(
        ANCHOR,
        "\n\t// Used by zz_generated.conversion.go.\n\tlocalSchemeBuilder = SchemeBuilder.SchemeBuilder",
    )?;
    if !added {
        return Err(BumpError::AnchorNotFound {
            marker: "localSchemeBuilder".to_string(),
            path: ctx.path(&rel),
        }
        .into());
    }
    ed.store()?;
    Ok(true)
}
