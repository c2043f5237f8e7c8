use anyhow::Result;
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::editor::FileEditor;

static RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Copyright (\d{4})-\d{4}").unwrap());
static LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"Copyright (\d{4})[, ]+\d{4}").unwrap());
static SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Copyright (\d{4})([^-]|$)").unwrap());

/// Extends the first `Copyright` line of a file to the given year.
#[derive(Debug, Clone)]
pub struct CopyrightUpdater {
    year: String,
    dry_run: bool,
}

impl CopyrightUpdater {
    /// Updater for the current calendar year.
    pub fn new(dry_run: bool) -> Self {
        Self::for_year(chrono::Local::now().year(), dry_run)
    }

    pub fn for_year(year: i32, dry_run: bool) -> Self {
        Self {
            year: year.to_string(),
            dry_run,
        }
    }

    /// The rewritten form of `line`, or `None` when it is already current.
    ///
    /// `2021-2023` becomes `2021-<year>`, `2021, 2023` becomes `2021-<year>`,
    /// and a lone `2022` becomes `2022-<year>`.
    pub fn bump_line(&self, line: &str) -> Option<String> {
        let year = self.year.as_str();
        let updated = if let Some(c) = RANGE.captures(line) {
            RANGE
                .replace(line, format!("Copyright {}-{year}", &c[1]))
                .into_owned()
        } else if let Some(c) = LIST.captures(line) {
            LIST.replace(line, format!("Copyright {}-{year}", &c[1]))
                .into_owned()
        } else if let Some(c) = SINGLE.captures(line) {
            if &c[1] == year {
                return None;
            }
            SINGLE
                .replace(line, format!("Copyright {}-{year}${{2}}", &c[1]))
                .into_owned()
        } else {
            return None;
        };
        (updated != line).then_some(updated)
    }

    /// Update `path` in place. Files without a copyright line are left alone.
    pub fn update(&self, path: &Path) -> Result<bool> {
        let mut ed = FileEditor::new(path, self.dry_run);
        let Some(line) = ed.find("Copyright")? else {
            return Ok(false);
        };
        let Some(updated) = self.bump_line(&line) else {
            return Ok(false);
        };
        log::debug!("Copyright: {}", path.display());
        let changed = ed.replace(&line, &updated)?;
        ed.store()?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updater() -> CopyrightUpdater {
        CopyrightUpdater::for_year(2025, false)
    }

    #[test]
    fn bumps_each_form() {
        let u = updater();
        assert_eq!(
            u.bump_line("// Copyright 2021-2023 Hewlett Packard Enterprise").as_deref(),
            Some("// Copyright 2021-2025 Hewlett Packard Enterprise")
        );
        assert_eq!(
            u.bump_line("# Copyright 2021, 2023 HPE").as_deref(),
            Some("# Copyright 2021-2025 HPE")
        );
        assert_eq!(
            u.bump_line(" * Copyright 2022 HPE").as_deref(),
            Some(" * Copyright 2022-2025 HPE")
        );
        assert_eq!(
            u.bump_line("Copyright 2022").as_deref(),
            Some("Copyright 2022-2025")
        );
    }

    #[test]
    fn current_lines_are_untouched() {
        let u = updater();
        assert_eq!(u.bump_line("// Copyright 2025 HPE"), None);
        assert_eq!(u.bump_line("// Copyright 2020-2025 HPE"), None);
        assert_eq!(u.bump_line("no notice here"), None);
    }

    #[test]
    fn update_rewrites_only_the_notice() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("types.go");
        std::fs::write(&path, "/*\n * Copyright 2023 HPE\n */\n\npackage v1\n")?;
        assert!(updater().update(&path)?);
        assert_eq!(
            std::fs::read_to_string(&path)?,
            "/*\n * Copyright 2023-2025 HPE\n */\n\npackage v1\n"
        );
        assert!(!updater().update(&path)?);
        Ok(())
    }
}
