//! Pointing controllers, older spokes and shared test helpers at the new hub.

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;

use super::{
    RewriteContext, add_import_after, relative, retarget_alias_import, retarget_kind_reference,
    retarget_module_import, retarget_qualifier, source_files,
};
use crate::error::BumpError;

const CONTROLLER_DIRS: &[&str] = &["internal/controller", "controllers"];
const UTIL_CONVERSION_DIR: &str = "github/cluster-api/util/conversion";
const SCHEME_SCAFFOLD: &str = "+kubebuilder:scaffold:scheme";

/// What a file under one of the walked trees gets.
#[derive(Debug, PartialEq, Eq)]
enum Role {
    Skip,
    ConversionGenMarker,
    SpokeConversion,
    SchemeRegistration,
    Generic,
}

fn role_of(ctx: &RewriteContext, top: &str, rel: &str) -> Role {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    if name.starts_with("zz_") {
        return Role::Skip;
    }
    match top {
        "api" => {
            let version = rel.split_once('/').map(|(v, _)| v);
            match (version, name) {
                (Some(v), _) if v == ctx.new => Role::Skip,
                // The new spoke was written against the new hub already.
                (Some(v), "doc.go" | "conversion.go") if v == ctx.prev => Role::Skip,
                (Some(_), "doc.go") => Role::ConversionGenMarker,
                (Some(_), "conversion.go") => Role::SpokeConversion,
                _ => Role::Generic,
            }
        }
        "internal/controller" => match name {
            "suite_test.go" => Role::SchemeRegistration,
            "conversion_test.go" => Role::Skip,
            _ => Role::Generic,
        },
        _ => Role::Generic,
    }
}

/// Apply the role-appropriate rule to every file under `top`.
///
/// Returns the number of files that changed.
pub fn bump_directory(ctx: &RewriteContext, top: &str) -> Result<usize> {
    let kinds = ctx.project.require_kinds(&ctx.prev)?;
    let base = ctx.path(top);
    let mut changed = 0;
    for path in source_files(&ctx.root, top)? {
        let rel = relative(&base, &path);
        let touched = match role_of(ctx, top, &rel) {
            Role::Skip => false,
            Role::ConversionGenMarker => conversion_gen_marker(ctx, &path)?,
            Role::SpokeConversion => spoke_conversion(ctx, &path)?,
            Role::SchemeRegistration => scheme_registration(ctx, &kinds, &path)?,
            Role::Generic => point_at_new_hub(ctx, &kinds, &path)?,
        };
        if touched {
            log::debug!("Bumped {}", relative(&ctx.root, &path));
            changed += 1;
        }
    }
    Ok(changed)
}

/// Controllers in `internal/controller` and the legacy `controllers` tree.
pub fn bump_controllers(ctx: &RewriteContext) -> Result<usize> {
    let mut changed = 0;
    for top in CONTROLLER_DIRS {
        if ctx.path(top).is_dir() {
            changed += bump_directory(ctx, top)?;
        }
    }
    Ok(changed)
}

/// The vendored cluster-api fuzz test helpers.
pub fn bump_util_conversion_test(ctx: &RewriteContext) -> Result<usize> {
    bump_directory(ctx, UTIL_CONVERSION_DIR)
}

/// Spokes older than the previous hub.
pub fn bump_earlier_spokes(ctx: &RewriteContext) -> Result<usize> {
    bump_directory(ctx, "api")
}

fn aliases(ctx: &RewriteContext, kinds: &[String]) -> Result<BTreeSet<String>> {
    kinds.iter().map(|k| ctx.alias_for(k, &ctx.prev)).collect()
}

fn point_at_new_hub(ctx: &RewriteContext, kinds: &[String], path: &Path) -> Result<bool> {
    let (prev, new) = (&ctx.prev, &ctx.new);
    let mut ed = ctx.editor(path);
    let mut changed = retarget_module_import(&mut ed, &ctx.module, prev, new)?;
    for alias in aliases(ctx, kinds)? {
        changed |= retarget_qualifier(&mut ed, &alias, prev, new)?;
    }
    ed.store()?;
    Ok(changed)
}

fn scheme_registration(ctx: &RewriteContext, kinds: &[String], path: &Path) -> Result<bool> {
    let (prev, new) = (&ctx.prev, &ctx.new);
    let alias = ctx.package_alias(prev)?;
    let mut ed = ctx.editor(path);
    let mut changed = add_import_after(&mut ed, &alias, prev, new)?;

    if ed.find(&format!("{alias}{new}.AddToScheme("))?.is_none() {
        let register = format!(
            "\terr = {alias}{new}.AddToScheme(scheme.Scheme)\n\tExpect(err).NotTo(HaveOccurred())\n"
        );
        if !ed.insert_before(SCHEME_SCAFFOLD, &register)? {
            return Err(BumpError::AnchorNotFound {
                marker: SCHEME_SCAFFOLD.trim_start_matches('+').to_string(),
                path: path.to_path_buf(),
            }
            .into());
        }
        changed = true;
    }

    // Webhook managers now serve the hub types.
    for kind in kinds {
        let alias = ctx.alias_for(kind, prev)?;
        changed |= retarget_kind_reference(&mut ed, &alias, prev, new, kind)?;
    }
    ed.store()?;
    Ok(changed)
}

fn conversion_gen_marker(ctx: &RewriteContext, path: &Path) -> Result<bool> {
    let mut ed = ctx.editor(path);
    let Some(line) = ed.find("k8s:conversion-gen")? else {
        return Ok(false);
    };
    let marker = format!("// +k8s:conversion-gen={}/api/{}", ctx.module, ctx.new);
    let changed = ed.replace(&line, &marker)?;
    ed.store()?;
    Ok(changed)
}

fn spoke_conversion(ctx: &RewriteContext, path: &Path) -> Result<bool> {
    let (prev, new) = (&ctx.prev, &ctx.new);
    let alias = ctx.package_alias(prev)?;
    let mut ed = ctx.editor(path);
    let mut changed = retarget_alias_import(&mut ed, &alias, prev, new)?;
    changed |= retarget_qualifier(&mut ed, &alias, prev, new)?;
    // Generated Convert_<from>_<Kind>_To_<to>_<Kind> routines.
    changed |= ed.replace(&format!("_{prev}_"), &format!("_{new}_"))?;
    ed.store()?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::test_context;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn controller_suite_registers_new_scheme_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = test_context(dir.path(), &["Workflow"]);
        write(
            dir.path(),
            "internal/controller/suite_test.go",
            "import (\n\tdwsv1alpha1 \"github.com/DataWorkflowServices/dws/api/v1alpha1\"\n)\n\n\
             func setup() {\n\terr = dwsv1alpha1.AddToScheme(scheme.Scheme)\n\tExpect(err).NotTo(HaveOccurred())\n\n\
             \t//+kubebuilder:scaffold:scheme\n\
             \terr = (&dwsv1alpha1.Workflow{}).SetupWebhookWithManager(k8sManager)\n}\n",
        );

        assert_eq!(bump_controllers(&ctx)?, 1);
        assert_eq!(bump_controllers(&ctx)?, 0);

        let got = fs::read_to_string(dir.path().join("internal/controller/suite_test.go"))?;
        assert_eq!(
            got,
            "import (\n\tdwsv1alpha1 \"github.com/DataWorkflowServices/dws/api/v1alpha1\"\n\
             \tdwsv1alpha2 \"github.com/DataWorkflowServices/dws/api/v1alpha2\"\n)\n\n\
             func setup() {\n\terr = dwsv1alpha1.AddToScheme(scheme.Scheme)\n\tExpect(err).NotTo(HaveOccurred())\n\n\
             \terr = dwsv1alpha2.AddToScheme(scheme.Scheme)\n\tExpect(err).NotTo(HaveOccurred())\n\n\
             \t//+kubebuilder:scaffold:scheme\n\
             \terr = (&dwsv1alpha2.Workflow{}).SetupWebhookWithManager(k8sManager)\n}\n"
        );
        Ok(())
    }

    #[test]
    fn controllers_switch_import_and_qualifiers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = test_context(dir.path(), &["Workflow"]);
        write(
            dir.path(),
            "internal/controller/workflow_controller.go",
            "import (\n\tdwsv1alpha1 \"github.com/DataWorkflowServices/dws/api/v1alpha1\"\n)\n\nvar w dwsv1alpha1.Workflow\n",
        );
        write(dir.path(), "internal/controller/conversion_test.go", "dwsv1alpha1.Workflow\n");
        write(dir.path(), "internal/controller/zz_generated.go", "dwsv1alpha1.Workflow\n");

        assert_eq!(bump_controllers(&ctx)?, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("internal/controller/workflow_controller.go"))?,
            "import (\n\tdwsv1alpha2 \"github.com/DataWorkflowServices/dws/api/v1alpha2\"\n)\n\nvar w dwsv1alpha2.Workflow\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("internal/controller/conversion_test.go"))?,
            "dwsv1alpha1.Workflow\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("internal/controller/zz_generated.go"))?,
            "dwsv1alpha1.Workflow\n"
        );
        Ok(())
    }

    #[test]
    fn earlier_spokes_follow_the_new_hub() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ctx = test_context(dir.path(), &["Workflow"]);
        ctx.prev = "v1alpha2".to_string();
        ctx.new = "v1alpha3".to_string();

        write(
            dir.path(),
            "api/v1alpha1/doc.go",
            "// +k8s:conversion-gen=github.com/DataWorkflowServices/dws/api/v1alpha2\npackage v1alpha1\n",
        );
        write(
            dir.path(),
            "api/v1alpha1/conversion.go",
            "import (\n\tdwsv1alpha2 \"github.com/DataWorkflowServices/dws/api/v1alpha2\"\n)\n\n\
             func (src *Workflow) ConvertTo(dstRaw conversion.Hub) error {\n\
             \tdst := dstRaw.(*dwsv1alpha2.Workflow)\n\
             \treturn Convert_v1alpha1_Workflow_To_v1alpha2_Workflow(src, dst, nil)\n}\n",
        );
        let new_spoke_doc =
            "// +k8s:conversion-gen=github.com/DataWorkflowServices/dws/api/v1alpha3\npackage v1alpha2\n";
        write(dir.path(), "api/v1alpha2/doc.go", new_spoke_doc);
        write(dir.path(), "api/v1alpha3/conversion.go", "dwsv1alpha2.Workflow\n");

        assert_eq!(bump_earlier_spokes(&ctx)?, 2);
        assert_eq!(bump_earlier_spokes(&ctx)?, 0);

        assert_eq!(
            fs::read_to_string(dir.path().join("api/v1alpha1/doc.go"))?,
            "// +k8s:conversion-gen=github.com/DataWorkflowServices/dws/api/v1alpha3\npackage v1alpha1\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("api/v1alpha1/conversion.go"))?,
            "import (\n\tdwsv1alpha3 \"github.com/DataWorkflowServices/dws/api/v1alpha3\"\n)\n\n\
             func (src *Workflow) ConvertTo(dstRaw conversion.Hub) error {\n\
             \tdst := dstRaw.(*dwsv1alpha3.Workflow)\n\
             \treturn Convert_v1alpha1_Workflow_To_v1alpha3_Workflow(src, dst, nil)\n}\n"
        );
        assert_eq!(fs::read_to_string(dir.path().join("api/v1alpha2/doc.go"))?, new_spoke_doc);
        assert_eq!(
            fs::read_to_string(dir.path().join("api/v1alpha3/conversion.go"))?,
            "dwsv1alpha2.Workflow\n"
        );
        Ok(())
    }

    #[test]
    fn missing_scheme_scaffold_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), &["Workflow"]);
        write(dir.path(), "internal/controller/suite_test.go", "package controller\n");
        let err = bump_controllers(&ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BumpError>(),
            Some(BumpError::AnchorNotFound { .. })
        ));
    }
}
