//! Turning the previous hub into a spoke: conversion routines and their tests.

use anyhow::Result;

use super::{RewriteContext, add_import_after, retarget_qualifier};
use crate::editor::FileEditor;
use crate::error::BumpError;

pub const CONTROLLER_CONVERSION_TEST: &str = "internal/controller/conversion_test.go";
const WEBHOOK_SUITE_SCAFFOLD: &str = "+crdbumper:scaffold:webhooksuitetest";

/// `api/<prev>/doc.go`, carrying the conversion-gen marker for the new hub.
pub fn write_doc_go(ctx: &RewriteContext) -> Result<()> {
    let mut content = ctx.boilerplate()?;
    content.push_str(&format!(
        "\n// The following tag tells conversion-gen to generate conversion routines, and\n\
         // it tells conversion-gen the name of the hub version.\n\
         // +k8s:conversion-gen={module}/api/{new}\n\
         package {prev}\n",
        module = ctx.module,
        new = ctx.new,
        prev = ctx.prev,
    ));
    ctx.write_file(format!("api/{}/doc.go", ctx.prev), &content)
}

/// Replace the previous hub's `conversion.go` with spoke conversion routines.
///
/// The routines are complete as written because the new hub starts out as an
/// exact copy of this version.
pub fn write_spoke(ctx: &RewriteContext) -> Result<()> {
    let (prev, new, module) = (&ctx.prev, &ctx.new, &ctx.module);
    let kinds = ctx.project.require_kinds(prev)?;
    let alias = ctx.package_alias(prev)?;

    let mut content = ctx.boilerplate()?;
    content.push_str(&format!(
        r#"
package {prev}

import (
	apierrors "k8s.io/apimachinery/pkg/api/errors"
	"k8s.io/apimachinery/pkg/runtime/schema"
	"sigs.k8s.io/controller-runtime/pkg/conversion"
	logf "sigs.k8s.io/controller-runtime/pkg/log"

	{alias}{new} "{module}/api/{new}"
	utilconversion "{module}/github/cluster-api/util/conversion"
)

var convertlog = logf.Log.V(2).WithName("convert-{prev}")
"#
    ));

    for kind in &kinds {
        let hub = format!("{}{new}", ctx.alias_for(kind, prev)?);
        content.push_str(&format!(
            r#"
func (src *{kind}) ConvertTo(dstRaw conversion.Hub) error {{
	convertlog.Info("Convert {kind} To Hub", "name", src.GetName(), "namespace", src.GetNamespace())
	dst := dstRaw.(*{hub}.{kind})

	if err := Convert_{prev}_{kind}_To_{new}_{kind}(src, dst, nil); err != nil {{
		return err
	}}

	// Manually restore data.
	restored := &{hub}.{kind}{{}}
	if ok, err := utilconversion.UnmarshalData(src, restored); err != nil || !ok {{
		return err
	}}
	// EDIT THIS FUNCTION! If the annotation is holding anything that is
	// hub-specific then copy it into 'dst' from 'restored'.
	// Otherwise, you may comment out UnmarshalData() until it's needed.

	return nil
}}

func (dst *{kind}) ConvertFrom(srcRaw conversion.Hub) error {{
	src := srcRaw.(*{hub}.{kind})
	convertlog.Info("Convert {kind} From Hub", "name", src.GetName(), "namespace", src.GetNamespace())

	if err := Convert_{new}_{kind}_To_{prev}_{kind}(src, dst, nil); err != nil {{
		return err
	}}

	// Preserve Hub data on down-conversion except for metadata.
	return utilconversion.MarshalData(src, dst)
}}
"#
        ));
    }

    let group = ctx.package_group(prev)?;
    content.push_str(&format!(
        r#"
// The List-based ConvertTo/ConvertFrom routines are never used by the
// conversion webhook, but the conversion-verifier tool wants to see them.
// The conversion-gen tool generated the Convert_X_to_Y routines, should they
// ever be needed.

func resource(resource string) schema.GroupResource {{
	return schema.GroupResource{{Group: "{group}", Resource: resource}}
}}
"#
    ));

    for kind in &kinds {
        content.push_str(&format!(
            r#"
func (src *{kind}List) ConvertTo(dstRaw conversion.Hub) error {{
	return apierrors.NewMethodNotSupported(resource("{kind}List"), "ConvertTo")
}}

func (dst *{kind}List) ConvertFrom(srcRaw conversion.Hub) error {{
	return apierrors.NewMethodNotSupported(resource("{kind}List"), "ConvertFrom")
}}
"#
        ));
    }

    ctx.write_file(format!("api/{prev}/conversion.go"), &content)
}

/// `api/<prev>/conversion_test.go`: spoke-hub-spoke and hub-spoke-hub fuzzing.
pub fn write_spoke_fuzz_test(ctx: &RewriteContext) -> Result<()> {
    let (prev, new, module) = (&ctx.prev, &ctx.new, &ctx.module);
    let kinds = ctx.project.require_kinds(prev)?;
    let alias = ctx.package_alias(prev)?;

    let mut content = ctx.boilerplate()?;
    content.push_str(&format!(
        r#"
package {prev}

import (
	"testing"

	. "github.com/onsi/ginkgo/v2"

	{alias}{new} "{module}/api/{new}"
	utilconversion "{module}/github/cluster-api/util/conversion"
)

func TestFuzzyConversion(t *testing.T) {{
"#
    ));
    for kind in &kinds {
        let hub = format!("{}{new}", ctx.alias_for(kind, prev)?);
        content.push_str(&format!(
            r#"
	t.Run("for {kind}", utilconversion.FuzzTestFunc(utilconversion.FuzzTestFuncInput{{
		Hub:   &{hub}.{kind}{{}},
		Spoke: &{kind}{{}},
	}}))
"#
        ));
    }
    content.push_str(
        r#"
}

// Just touch ginkgo, so it's here to interpret any ginkgo args from
// "make test", so that doesn't fail on this test file.
var _ = BeforeSuite(func() {})
"#,
    );
    ctx.write_file(format!("api/{prev}/conversion_test.go"), &content)
}

/// Create or extend the controller suite test that goes through the
/// conversion webhook for each Kind, reading via the hub and via the new spoke.
pub fn write_webhook_suite_test(ctx: &RewriteContext) -> Result<()> {
    let (prev, new, module) = (&ctx.prev, &ctx.new, &ctx.module);
    let kinds = ctx.project.require_kinds(prev)?;
    let alias = ctx.package_alias(prev)?;

    let mut ed = ctx.editor(CONTROLLER_CONVERSION_TEST);
    if !ed.exists()? {
        let mut content = ctx.boilerplate()?;
        content.push_str(&format!(
            r#"
package controller

import (
	"context"

	"github.com/google/uuid"
	. "github.com/onsi/ginkgo/v2"
	. "github.com/onsi/gomega"

	corev1 "k8s.io/api/core/v1"
	metav1 "k8s.io/apimachinery/pkg/apis/meta/v1"
	"sigs.k8s.io/controller-runtime/pkg/client"

	{alias}{prev} "{module}/api/{prev}"
	{alias}{new} "{module}/api/{new}"
	utilconversion "{module}/github/cluster-api/util/conversion"
)

var _ = Describe("Conversion Webhook Test", func() {{

	// Don't get deep into verifying the conversion.
	// We have api/<spoke_ver>/conversion_test.go that is digging deep.
	// We're just verifying that the conversion webhook is hooked up.

	// Note: if a resource is accessed by its spoke API, then it should
	// have the utilconversion.DataAnnotation annotation.  It will not
	// have that annotation when it is accessed by its hub API.

	// +crdbumper:scaffold:webhooksuitetest
}})
"#
        ));
        ed.append(&content)?;
    } else if add_import_after(&mut ed, &alias, prev, new)? {
        // Existing hub tests move to the new hub along with the import.
        for kind in &kinds {
            retarget_qualifier(&mut ed, &ctx.alias_for(kind, prev)?, prev, new)?;
        }
    }

    for kind in &kinds {
        if ed.find(&format!("Context(\"{kind}\", func"))?.is_some() {
            continue;
        }
        let hub = format!("{}{new}", ctx.alias_for(kind, prev)?);
        let group = ctx.project.group(kind, prev)?;
        let context = hub_context(kind, &hub, group);
        if !ed.insert_before(WEBHOOK_SUITE_SCAFFOLD, &context)? {
            return Err(BumpError::AnchorNotFound {
                marker: WEBHOOK_SUITE_SCAFFOLD.to_string(),
                path: ed.path().to_path_buf(),
            }
            .into());
        }
    }

    for kind in &kinds {
        add_spoke_read_test(ctx, &mut ed, kind)?;
    }
    ed.store()
}

fn add_spoke_read_test(ctx: &RewriteContext, ed: &mut FileEditor, kind: &str) -> Result<bool> {
    let prev = &ctx.prev;
    let group = ctx.project.group(kind, prev)?;
    let anchor = format!("crdbumper:scaffold:spoketest=\"{group}.{kind}\"");
    if ed.find(&anchor)?.is_none() {
        log::debug!("No spoke test scaffold for {kind}; skipping");
        return Ok(false);
    }
    let title = format!("It(\"reads {kind} resource via hub and via spoke {prev}\"");
    if ed.find(&title)?.is_some() {
        return Ok(false);
    }
    let spoke = format!("{}{prev}", ctx.alias_for(kind, prev)?);
    let test = format!(
        r#"
		{title}, func() {{
			// Spoke should have annotation.
			resSpoke := &{spoke}.{kind}{{}}
			Eventually(func(g Gomega) {{
				g.Expect(k8sClient.Get(context.TODO(), client.ObjectKeyFromObject(resHub), resSpoke)).To(Succeed())
				anno := resSpoke.GetAnnotations()
				g.Expect(anno).To(HaveLen(1))
				g.Expect(anno).Should(HaveKey(utilconversion.DataAnnotation))
			}}).Should(Succeed())

			// Hub should not have annotation.
			Eventually(func(g Gomega) {{
				g.Expect(k8sClient.Get(context.TODO(), client.ObjectKeyFromObject(resHub), resHub)).To(Succeed())
				anno := resHub.GetAnnotations()
				g.Expect(anno).To(HaveLen(0))
			}}).Should(Succeed())
		}})
"#
    );
    ed.insert_before(&anchor, &test)
}

fn hub_context(kind: &str, hub: &str, group: &str) -> String {
    format!(
        r#"
	Context("{kind}", func() {{
		var resHub *{hub}.{kind}

		BeforeEach(func() {{
			id := uuid.NewString()[0:8]
			resHub = &{hub}.{kind}{{
				ObjectMeta: metav1.ObjectMeta{{
					Name: id,
					Namespace: corev1.NamespaceDefault,
				}},
				//Spec: {hub}.{kind}Spec{{}},
			}}

			Expect(k8sClient.Create(context.TODO(), resHub)).To(Succeed())
		}})

		AfterEach(func() {{
			if resHub != nil {{
				Expect(k8sClient.Delete(context.TODO(), resHub)).To(Succeed())
				expected := &{hub}.{kind}{{}}
				Eventually(func() error {{ // Delete can still return the cached object. Wait until the object is no longer present.
					return k8sClient.Get(context.TODO(), client.ObjectKeyFromObject(resHub), expected)
				}}).ShouldNot(Succeed())
			}}
		}})

		// +crdbumper:scaffold:spoketest="{group}.{kind}"
	}})
"#
    )
}
