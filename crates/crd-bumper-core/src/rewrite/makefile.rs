use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use super::RewriteContext;
use crate::error::BumpError;
use crate::hub_spoke::api_versions;

pub const MAKEFILE: &str = "Makefile";

static SRC_DIRS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^SRC_DIRS=").unwrap());

/// Set `SRC_DIRS=` to every API directory except the new hub, so that
/// `generate-go-conversions` covers all spokes.
pub fn update_spoke_list(ctx: &RewriteContext) -> Result<bool> {
    let spokes: Vec<String> = api_versions(&ctx.root)?
        .into_iter()
        .filter(|v| *v != ctx.new)
        .map(|v| format!("./api/{v}"))
        .collect();

    let mut ed = ctx.editor(MAKEFILE);
    let Some(line) = ed.find_regex(&SRC_DIRS)? else {
        return Err(BumpError::AnchorNotFound {
            marker: "SRC_DIRS=".to_string(),
            path: ctx.path(MAKEFILE),
        }
        .into());
    };
    let changed = ed.replace(&line, &format!("SRC_DIRS={}", spokes.join(" ")))?;
    ed.store()?;
    Ok(changed)
}
