//! Withdrawing a spoke from the API server, and bringing it back.

use anyhow::Result;
use regex::Regex;
use std::path::PathBuf;

use super::conversion::CONTROLLER_CONVERSION_TEST;
use super::{TYPE_MARKER_ANCHORS, insert_marker, remove_marker};
use crate::editor::FileEditor;
use crate::project::Project;
use crate::rewrite::api::types_file;

pub const UNSERVED_MARKER: &str = "+kubebuilder:unservedversion";

/// A spoke whose served state is changing.
#[derive(Debug)]
pub struct ServeContext {
    pub root: PathBuf,
    pub spoke: String,
    pub alias: String,
    pub kinds: Vec<String>,
    pub dry_run: bool,
}

impl ServeContext {
    /// Alias is the repository's preferred one, or the group of the first Kind.
    pub fn new(
        root: impl Into<PathBuf>,
        project: &Project,
        spoke: &str,
        preferred_alias: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let kinds = project.require_kinds(spoke)?;
        let alias = match preferred_alias {
            Some(alias) => alias,
            None => project.group(&kinds[0], spoke)?.to_string(),
        };
        Ok(Self {
            root: root.into(),
            spoke: spoke.to_string(),
            alias,
            kinds,
            dry_run,
        })
    }

    fn editor(&self, rel: impl AsRef<std::path::Path>) -> FileEditor {
        FileEditor::new(self.root.join(rel), self.dry_run)
    }

    fn types_editors(&self) -> impl Iterator<Item = FileEditor> + '_ {
        self.kinds
            .iter()
            .map(|kind| self.root.join(types_file(&self.spoke, kind)))
            .filter(|path| path.is_file())
            .map(|path| FileEditor::new(path, self.dry_run))
    }

    fn spoke_read_test(&self, kind: &str) -> Result<Regex> {
        Ok(Regex::new(&format!(
            r#"^(\s+)(P?)It\("reads {} resource via hub and via spoke {}", func\(\) \{{"#,
            regex::escape(kind),
            regex::escape(&self.spoke),
        ))?)
    }

    /// Lines that replace the spoke read test while the spoke is unserved.
    fn unserved_block(&self, kind: &str, indent: &str) -> String {
        let spoke = &self.spoke;
        let alias = &self.alias;
        format!(
            "{indent}It(\"is unable to read {kind} resource via spoke {spoke}\", func() {{\n\
             {indent}\tresSpoke := &{alias}{spoke}.{kind}{{}}\n\
             {indent}\tExpect(k8sClient.Get(context.TODO(), client.ObjectKeyFromObject(resHub), resSpoke)).ToNot(Succeed())\n\
             {indent}}})\n\
             \n\
             {indent}// ACTION: {spoke} is no longer served, and this test can be removed.\n\
             {indent}PIt(\"reads {kind} resource via hub and via spoke {spoke}\", func() {{"
        )
    }

    fn served_line(&self, kind: &str, indent: &str) -> String {
        format!(
            "{indent}It(\"reads {kind} resource via hub and via spoke {}\", func() {{",
            self.spoke
        )
    }
}

/// Add the unserved-version marker to every Kind of the spoke.
pub fn set_unserved(ctx: &ServeContext) -> Result<bool> {
    let mut changed = false;
    for mut ed in ctx.types_editors() {
        changed |= insert_marker(&mut ed, UNSERVED_MARKER, TYPE_MARKER_ANCHORS)?;
        ed.store()?;
    }
    Ok(changed)
}

/// Remove the unserved-version marker from every Kind of the spoke.
pub fn set_served(ctx: &ServeContext) -> Result<bool> {
    let mut changed = false;
    for mut ed in ctx.types_editors() {
        changed |= remove_marker(&mut ed, UNSERVED_MARKER)?;
        ed.store()?;
    }
    Ok(changed)
}

/// Park the spoke read tests (`It` -> `PIt`) and add a test that reading
/// through the spoke now fails.
pub fn unserve_conversion_suite_test(ctx: &ServeContext) -> Result<bool> {
    let mut ed = ctx.editor(CONTROLLER_CONVERSION_TEST);
    if !ed.exists()? {
        log::warn!("Unable to find {CONTROLLER_CONVERSION_TEST}");
        return Ok(false);
    }
    let mut changed = false;
    for kind in &ctx.kinds {
        let re = ctx.spoke_read_test(kind)?;
        let Some(line) = ed.find_regex(&re)? else {
            log::debug!("No spoke read test for {kind} {}", ctx.spoke);
            continue;
        };
        let Some(caps) = re.captures(&line) else {
            continue;
        };
        if !caps[2].is_empty() {
            continue;
        }
        let block = ctx.unserved_block(kind, &caps[1]);
        changed |= ed.replace(&line, &block)?;
    }
    ed.store()?;
    Ok(changed)
}

/// Reverse [`unserve_conversion_suite_test`].
///
/// When the parked block was edited by hand, only `PIt` is switched back and
/// the negative test is left for the operator.
pub fn reserve_conversion_suite_test(ctx: &ServeContext) -> Result<bool> {
    let mut ed = ctx.editor(CONTROLLER_CONVERSION_TEST);
    if !ed.exists()? {
        log::warn!("Unable to find {CONTROLLER_CONVERSION_TEST}");
        return Ok(false);
    }
    let mut changed = false;
    for kind in &ctx.kinds {
        let re = ctx.spoke_read_test(kind)?;
        let Some(line) = ed.find_regex(&re)? else {
            continue;
        };
        let Some(caps) = re.captures(&line) else {
            continue;
        };
        if caps[2].is_empty() {
            continue;
        }
        let indent = caps[1].to_string();
        let served = ctx.served_line(kind, &indent);
        if ed.replace(&ctx.unserved_block(kind, &indent), &served)? {
            changed = true;
        } else {
            log::warn!(
                "The unserved test block for {kind} was modified; only re-enabling the spoke read test"
            );
            changed |= ed.replace(&line, &served)?;
        }
    }
    ed.store()?;
    Ok(changed)
}

/// Commit body for `unserve-api`.
pub fn unserve_message(spoke: &str) -> String {
    format!(
        "Mark the {spoke} API as unserved.\n\
         \n\
         ACTION: Address the ACTION comments in {CONTROLLER_CONVERSION_TEST}.\n\
         \n\
         ACTION: Begin by running \"make vet\". Repair any issues that it finds.\n  \
         Then run \"make test\" and continue repairing issues until the tests\n  \
         pass.\n"
    )
}

/// Commit body for `re-serve-api`.
pub fn reserve_message(spoke: &str) -> String {
    format!(
        "Mark the {spoke} API as served.\n\
         \n\
         ACTION: Begin by running \"make vet\". Repair any issues that it finds.\n  \
         Then run \"make test\" and continue repairing issues until the tests\n  \
         pass.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::test_context;
    use std::fs;

    const SUITE: &str = "var _ = Describe(\"Conversion Webhook Test\", func() {\n\
        \tContext(\"Workflow\", func() {\n\
        \t\tIt(\"reads Workflow resource via hub and via spoke v1alpha1\", func() {\n\
        \t\t\tresSpoke := &dwsv1alpha1.Workflow{}\n\
        \t\t})\n\
        \t})\n\
        })\n";

    fn setup(dir: &std::path::Path) -> Result<ServeContext> {
        let ctx = test_context(dir, &["Workflow"]);
        let types = dir.join("api/v1alpha1/workflow_types.go");
        fs::create_dir_all(types.parent().unwrap())?;
        fs::write(
            &types,
            "// +kubebuilder:object:root=true\n// +kubebuilder:subresource:status\ntype Workflow struct{}\n",
        )?;
        let suite = dir.join(CONTROLLER_CONVERSION_TEST);
        fs::create_dir_all(suite.parent().unwrap())?;
        fs::write(&suite, SUITE)?;
        ServeContext::new(dir, &ctx.project, "v1alpha1", Some("dws".to_string()), false)
    }

    #[test]
    fn unserve_parks_spoke_tests_and_reserve_restores_them() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = setup(dir.path())?;
        let types = dir.path().join("api/v1alpha1/workflow_types.go");
        let suite = dir.path().join(CONTROLLER_CONVERSION_TEST);

        assert!(set_unserved(&ctx)?);
        assert!(unserve_conversion_suite_test(&ctx)?);
        assert!(!set_unserved(&ctx)?);
        assert!(!unserve_conversion_suite_test(&ctx)?);

        assert!(fs::read_to_string(&types)?.contains("// +kubebuilder:subresource:status\n// +kubebuilder:unservedversion\n"));
        let parked = fs::read_to_string(&suite)?;
        assert!(parked.contains("\t\tPIt(\"reads Workflow resource via hub and via spoke v1alpha1\""));
        assert!(parked.contains("\t\tIt(\"is unable to read Workflow resource via spoke v1alpha1\""));
        assert!(parked.contains("// ACTION: v1alpha1 is no longer served"));

        assert!(set_served(&ctx)?);
        assert!(reserve_conversion_suite_test(&ctx)?);
        assert!(!reserve_conversion_suite_test(&ctx)?);
        assert_eq!(fs::read_to_string(&suite)?, SUITE);
        assert!(!fs::read_to_string(&types)?.contains("unservedversion"));
        Ok(())
    }

    #[test]
    fn reserve_after_hand_edit_only_restores_it() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = setup(dir.path())?;
        let suite = dir.path().join(CONTROLLER_CONVERSION_TEST);

        unserve_conversion_suite_test(&ctx)?;
        let edited = fs::read_to_string(&suite)?.replace("// ACTION: v1alpha1 is no longer served, and this test can be removed.\n", "");
        fs::write(&suite, edited)?;

        assert!(reserve_conversion_suite_test(&ctx)?);
        let got = fs::read_to_string(&suite)?;
        assert!(got.contains("\t\tIt(\"reads Workflow resource via hub and via spoke v1alpha1\""));
        assert!(got.contains("is unable to read Workflow"));
        Ok(())
    }

    #[test]
    fn missing_suite_test_is_not_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = setup(dir.path())?;
        fs::remove_file(dir.path().join(CONTROLLER_CONVERSION_TEST))?;
        assert!(!unserve_conversion_suite_test(&ctx)?);
        Ok(())
    }
}
