//! Moving webhooks to the new hub and wiring up its conversion webhooks.

use anyhow::Result;

use super::{RewriteContext, retarget_kind_reference, source_files};
use crate::editor::FileEditor;
use crate::error::BumpError;
use crate::gomod::MAIN_GO;
use crate::tools::Scaffolder;

pub const WEBHOOK_MANIFESTS: &str = "config/webhook/manifests.yaml";
pub const CONTROLLER_SUITE_TEST: &str = "internal/controller/suite_test.go";
pub const UTIL_CONVERSION_TEST: &str = "github/cluster-api/util/conversion/conversion_test.go";

const BUILDER_SCAFFOLD: &str = "crdbumper:scaffold:builder";
const GVK_SCAFFOLD: &str = "+crdbumper:scaffold:gvk";
const MARSHAL_SCAFFOLD: &str = "+crdbumper:scaffold:marshaldata";
const UNMARSHAL_SCAFFOLD: &str = "+crdbumper:scaffold:unmarshaldata";

/// Point webhook paths and names in the moved webhook files at the new hub.
///
/// Only `-<ver>-` and `versions=<ver>,` are touched so that
/// `admissionReviewVersions` stays as it is.
pub fn edit_webhook_files(ctx: &RewriteContext) -> Result<()> {
    for path in source_files(&ctx.root, &format!("api/{}", ctx.new))? {
        let is_webhook = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains("webhook"));
        if !is_webhook {
            continue;
        }
        let mut ed = FileEditor::new(&path, ctx.dry_run);
        ed.replace(&format!("-{}-", ctx.prev), &format!("-{}-", ctx.new))?;
        ed.replace(
            &format!("versions={},", ctx.prev),
            &format!("versions={},", ctx.new),
        )?;
        ed.store()?;
    }
    Ok(())
}

/// Switch the webhook setup in `cmd/main.go` to the new hub's types.
pub fn edit_main(ctx: &RewriteContext) -> Result<()> {
    let mut ed = ctx.editor(MAIN_GO);
    for kind in ctx.project.kinds(&ctx.prev) {
        let alias = ctx.alias_for(&kind, &ctx.prev)?;
        retarget_kind_reference(&mut ed, &alias, &ctx.prev, &ctx.new, &kind)?;
    }
    ed.store()
}

/// Retarget webhook versions and names in `config/webhook/manifests.yaml`.
pub fn edit_manifests(ctx: &RewriteContext) -> Result<()> {
    let mut ed = ctx.editor(WEBHOOK_MANIFESTS);
    if !ed.exists()? {
        log::debug!("No {WEBHOOK_MANIFESTS}; no webhooks to move");
        return Ok(());
    }
    for kind in ctx.project.kinds(&ctx.prev) {
        let lower = kind.to_lowercase();
        ed.replace(&format!("- {}", ctx.prev), &format!("- {}", ctx.new))?;
        ed.replace(
            &format!("-{}-{lower}", ctx.prev),
            &format!("-{}-{lower}", ctx.new),
        )?;
    }
    ed.store()
}

/// Move each Kind's `webhooks` block in `PROJECT` to the new hub.
pub fn move_project_webhooks(ctx: &mut RewriteContext) -> Result<()> {
    let (prev, new) = (ctx.prev.clone(), ctx.new.clone());
    for kind in ctx.project.kinds(&prev) {
        ctx.project.move_webhooks(&kind, &prev, &new)?;
    }
    ctx.project.save()
}

/// Scaffold a conversion webhook for every Kind of the new hub that lacks one.
///
/// Returns the Kinds that were scaffolded.
pub fn create_conversion_webhooks(
    ctx: &RewriteContext,
    scaffolder: &dyn Scaffolder,
) -> Result<Vec<String>> {
    let mut created = Vec::new();
    for kind in ctx.project.kinds(&ctx.prev) {
        if ctx.project.has_webhooks(&kind, &ctx.new)? {
            continue;
        }
        let group = ctx.project.group(&kind, &ctx.new)?;
        scaffolder.create_conversion_webhook(group, &ctx.new, &kind)?;
        if !ctx.dry_run {
            register_webhook_in_suite_test(ctx, &kind)?;
            explain_webhook_test(ctx, &kind)?;
        }
        created.push(kind);
    }
    Ok(created)
}

/// Enable the new Kind's conversion webhook in the controller suite test.
pub fn register_webhook_in_suite_test(ctx: &RewriteContext, kind: &str) -> Result<bool> {
    let alias = ctx.alias_for(kind, &ctx.new)?;
    let setup = format!(
        "\terr = (&{alias}{new}.{kind}{{}}).SetupWebhookWithManager(k8sManager)\n\tExpect(err).ToNot(HaveOccurred())\n",
        new = ctx.new
    );
    let mut ed = ctx.editor(CONTROLLER_SUITE_TEST);
    if ed.find(setup.lines().next().unwrap_or_default())?.is_some() {
        return Ok(false);
    }
    if !ed.insert_before(BUILDER_SCAFFOLD, &setup)? {
        return Err(anchor_missing(BUILDER_SCAFFOLD, &ed));
    }
    ed.store()?;
    Ok(true)
}

/// Prefix the scaffolded webhook test with a note on where conversion is tested.
pub fn explain_webhook_test(ctx: &RewriteContext, kind: &str) -> Result<bool> {
    let rel = format!("api/{}/{}_webhook_test.go", ctx.new, kind.to_lowercase());
    let mut ed = ctx.editor(&rel);
    if !ed.exists()? {
        return Ok(false);
    }
    let intro = format!("Context(\"When creating {kind} under Conversion Webhook");
    if ed.find(&intro)?.is_none() || ed.find("We already have api/<spoke_ver>/conversion_test.go")?.is_some() {
        return Ok(false);
    }
    ed.insert_before(
        &intro,
        "\n\t// We already have api/<spoke_ver>/conversion_test.go that is\n\
         \t// digging deep into the conversion routines, and we have\n\
         \t// internal/controllers/conversion_test.go that is verifing that the\n\
         \t// conversion webhook is hooked up to those routines.\n",
    )?;
    ed.store()?;
    Ok(true)
}

/// Write the new hub's `conversion.go`, declaring `Hub()` for every Kind and List.
pub fn write_hub(ctx: &RewriteContext) -> Result<bool> {
    let rel = format!("api/{}/conversion.go", ctx.new);
    if ctx.path(&rel).exists() {
        return Ok(false);
    }
    let kinds = ctx.project.kinds(&ctx.new);
    let mut content = ctx.boilerplate()?;
    content.push_str(&format!("\npackage {}\n\n", ctx.new));
    for kind in &kinds {
        content.push_str(&format!("func (*{kind}) Hub() {{}}\n"));
    }
    content.push_str("\n// The conversion-verifier tool wants these...though they're never used.\n");
    for kind in &kinds {
        content.push_str(&format!("func (*{kind}List) Hub() {{}}\n"));
    }
    ctx.write_file(&rel, &content)?;
    Ok(true)
}

/// Add marshal/unmarshal tests for each new Kind to the vendored
/// `util/conversion` test.
pub fn add_fuzz_tests(ctx: &RewriteContext) -> Result<()> {
    let mut ed = ctx.editor(UTIL_CONVERSION_TEST);
    for kind in ctx.project.kinds(&ctx.new) {
        if ed.find(&format!("old{kind}GVK"))?.is_some() {
            continue;
        }
        let hub = format!("{}{}", ctx.alias_for(&kind, &ctx.new)?, ctx.new);
        insert_scaffolded(&mut ed, GVK_SCAFFOLD, &gvk_template(&kind, &hub))?;
        insert_scaffolded(&mut ed, MARSHAL_SCAFFOLD, &marshal_template(&kind, &hub))?;
        insert_scaffolded(&mut ed, UNMARSHAL_SCAFFOLD, &unmarshal_template(&kind, &hub))?;
    }
    ed.store()
}

fn insert_scaffolded(ed: &mut FileEditor, scaffold: &str, text: &str) -> Result<()> {
    if !ed.insert_before(scaffold, text)? {
        return Err(anchor_missing(scaffold, ed));
    }
    Ok(())
}

fn anchor_missing(marker: &str, ed: &FileEditor) -> anyhow::Error {
    BumpError::AnchorNotFound {
        marker: marker.to_string(),
        path: ed.path().to_path_buf(),
    }
    .into()
}

fn gvk_template(kind: &str, hub: &str) -> String {
    format!(
        r#"
	old{kind}GVK = schema.GroupVersionKind{{
		Group:   {hub}.GroupVersion.Group,
		Version: "v1old",
		Kind:    "{kind}",
	}}
"#
    )
}

fn marshal_template(kind: &str, hub: &str) -> String {
    format!(
        r#"
	t.Run("{kind} should write source object to destination", func(*testing.T) {{
		src := &{hub}.{kind}{{
			ObjectMeta: metav1.ObjectMeta{{
				Name: "test-1",
				Labels: map[string]string{{
					"label1": "",
				}},
			}},
			//Spec: {hub}.{kind}Spec{{
			//	// ACTION: Fill in a few valid fields so
			//	// they can be tested in the annotation checks
			//	// below.
			//}},
		}}

		dst := &unstructured.Unstructured{{}}
		dst.SetGroupVersionKind(old{kind}GVK)
		dst.SetName("test-1")

		g.Expect(MarshalData(src, dst)).To(Succeed())
		// ensure the src object is not modified
		g.Expect(src.GetLabels()).ToNot(BeEmpty())

		g.Expect(dst.GetAnnotations()[DataAnnotation]).ToNot(BeEmpty())

		// ACTION: Fill in a few valid fields above in the Spec so
		// they can be tested here in the annotation checks.
	}})

	t.Run("{kind} should append the annotation", func(*testing.T) {{
		src := &{hub}.{kind}{{
			ObjectMeta: metav1.ObjectMeta{{
				Name: "test-1",
			}},
		}}
		dst := &unstructured.Unstructured{{}}
		dst.SetGroupVersionKind({hub}.GroupVersion.WithKind("{kind}"))
		dst.SetName("test-1")
		dst.SetAnnotations(map[string]string{{
			"annotation": "1",
		}})

		g.Expect(MarshalData(src, dst)).To(Succeed())
		g.Expect(dst.GetAnnotations()).To(HaveLen(2))
	}})
"#
    )
}

fn unmarshal_template(kind: &str, hub: &str) -> String {
    let data = r#"{\"metadata\":{\"name\":\"test-1\",\"creationTimestamp\":null,\"labels\":{\"label1\":\"\"}},\"spec\":{},\"status\":{}}"#;
    format!(
        r#"
	t.Run("{kind} should return false without errors if annotation doesn't exist", func(*testing.T) {{
		src := &{hub}.{kind}{{
			ObjectMeta: metav1.ObjectMeta{{
				Name: "test-1",
			}},
		}}
		dst := &unstructured.Unstructured{{}}
		dst.SetGroupVersionKind(old{kind}GVK)
		dst.SetName("test-1")

		ok, err := UnmarshalData(src, dst)
		g.Expect(ok).To(BeFalse())
		g.Expect(err).ToNot(HaveOccurred())
	}})

	t.Run("{kind} should return true when a valid annotation with data exists", func(*testing.T) {{
		src := &unstructured.Unstructured{{}}
		src.SetGroupVersionKind(old{kind}GVK)
		src.SetName("test-1")
		src.SetAnnotations(map[string]string{{
			DataAnnotation: "{data}",
		}})

		dst := &{hub}.{kind}{{
			ObjectMeta: metav1.ObjectMeta{{
				Name: "test-1",
			}},
		}}

		ok, err := UnmarshalData(src, dst)
		g.Expect(err).ToNot(HaveOccurred())
		g.Expect(ok).To(BeTrue())

		g.Expect(dst.GetLabels()).To(HaveLen(1))
		g.Expect(dst.GetName()).To(Equal("test-1"))
		g.Expect(dst.GetLabels()).To(HaveKeyWithValue("label1", ""))
		g.Expect(dst.GetAnnotations()).To(BeEmpty())
	}})

	t.Run("{kind} should clean the annotation on successful unmarshal", func(*testing.T) {{
		src := &unstructured.Unstructured{{}}
		src.SetGroupVersionKind(old{kind}GVK)
		src.SetName("test-1")
		src.SetAnnotations(map[string]string{{
			"annotation-1": "",
			DataAnnotation: "{data}",
		}})

		dst := &{hub}.{kind}{{
			ObjectMeta: metav1.ObjectMeta{{
				Name: "test-1",
			}},
		}}

		ok, err := UnmarshalData(src, dst)
		g.Expect(err).ToNot(HaveOccurred())
		g.Expect(ok).To(BeTrue())

		g.Expect(src.GetAnnotations()).ToNot(HaveKey(DataAnnotation))
		g.Expect(src.GetAnnotations()).To(HaveLen(1))
	}})
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_reference_the_hub_alias() {
        let gvk = gvk_template("Workflow", "dwsv1alpha2");
        assert!(gvk.contains("oldWorkflowGVK = schema.GroupVersionKind{"));
        assert!(gvk.contains("Group:   dwsv1alpha2.GroupVersion.Group,"));

        let unmarshal = unmarshal_template("Workflow", "dwsv1alpha2");
        assert!(unmarshal.contains(r#"DataAnnotation: "{\"metadata\":{\"name\":\"test-1\""#));
        assert!(unmarshal.contains("dst := &dwsv1alpha2.Workflow{"));
    }
}
