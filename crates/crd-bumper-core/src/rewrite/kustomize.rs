use anyhow::Result;
use regex::Regex;

use super::RewriteContext;

pub const CRD_KUSTOMIZATION: &str = "config/crd/kustomization.yaml";

/// Uncomment the `webhook_in_<kind>` and `cainjection_in_<kind>` patches for
/// every Kind of the new hub.
pub fn enable_conversion_patches(ctx: &RewriteContext) -> Result<bool> {
    let mut ed = ctx.editor(CRD_KUSTOMIZATION);
    let mut changed = false;
    for kind in ctx.project.kinds(&ctx.new) {
        let kind = kind.to_lowercase();
        for patch in ["webhook_in", "cainjection_in"] {
            let base = regex::escape(&format!("- path: patches/{patch}_{kind}"));
            if ed.find_regex(&Regex::new(&format!("^{base}"))?)?.is_some() {
                continue;
            }
            let commented = Regex::new(&format!("^#{base}"))?;
            if let Some(line) = ed.find_regex(&commented)? {
                changed |= ed.replace(&line, &line[1..])?;
            }
        }
    }
    ed.store()?;
    Ok(changed)
}
