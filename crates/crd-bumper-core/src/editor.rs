use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::BumpError;

/// Line-oriented editor for a single file.
///
/// Content is read on first use and held in memory; every mutation works on
/// that buffer. Nothing reaches the disk until [`FileEditor::store`], which
/// writes `<path>.new` and renames it over the original. In dry-run mode the
/// `.new` file is left behind as a preview and the original is not touched.
///
/// A missing file is not an error by itself: [`FileEditor::append`] starts an
/// empty buffer for it. Any other operation on a missing, never-appended file
/// fails with [`BumpError::MissingFile`].
#[derive(Debug)]
pub struct FileEditor {
    path: PathBuf,
    dry_run: bool,
    loaded: bool,
    content: Option<String>,
    dirty: bool,
}

impl FileEditor {
    pub fn new(path: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            path: path.into(),
            dry_run,
            loaded: false,
            content: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        match fs::read_to_string(&self.path) {
            Ok(s) => self.content = Some(s),
            Err(e) if e.kind() == ErrorKind::NotFound => self.content = None,
            Err(e) => {
                return Err(e).with_context(|| format!("reading file {}", self.path.display()));
            }
        }
        self.loaded = true;
        Ok(())
    }

    /// The current buffer.
    pub fn content(&mut self) -> Result<&str> {
        self.load()?;
        match self.content.as_deref() {
            Some(s) => Ok(s),
            None => Err(BumpError::MissingFile(self.path.clone()).into()),
        }
    }

    /// Whether the file exists on disk or has been started with `append`.
    pub fn exists(&mut self) -> Result<bool> {
        self.load()?;
        Ok(self.content.is_some())
    }

    /// First line containing `substr`.
    pub fn find(&mut self, substr: &str) -> Result<Option<String>> {
        Ok(self
            .content()?
            .split('\n')
            .find(|line| line.contains(substr))
            .map(str::to_string))
    }

    /// First line matching the regular expression `pattern`.
    pub fn find_pattern(&mut self, pattern: &str) -> Result<Option<String>> {
        let re = Regex::new(pattern).with_context(|| format!("invalid pattern {pattern:?}"))?;
        self.find_regex(&re)
    }

    pub fn find_regex(&mut self, re: &Regex) -> Result<Option<String>> {
        Ok(self
            .content()?
            .split('\n')
            .find(|line| re.is_match(line))
            .map(str::to_string))
    }

    /// Replace every occurrence of `from` with `to` across the whole buffer.
    ///
    /// This is a content replacement, not a line-indexed one: a line that
    /// recurs in the file is replaced everywhere it appears.
    pub fn replace(&mut self, from: &str, to: &str) -> Result<bool> {
        let current = self.content()?;
        if from.is_empty() || !current.contains(from) {
            return Ok(false);
        }
        let updated = current.replace(from, to);
        Ok(self.set(updated))
    }

    /// Replace every match of `re` using `rep` (which may use `$1` style groups).
    pub fn replace_regex(&mut self, re: &Regex, rep: &str) -> Result<bool> {
        let current = self.content()?;
        let updated = re.replace_all(current, rep).into_owned();
        Ok(self.set(updated))
    }

    /// Remove every line exactly equal to `line`.
    pub fn delete_lines(&mut self, line: &str) -> Result<bool> {
        let current = self.content()?;
        let kept: Vec<&str> = current.split('\n').filter(|l| *l != line).collect();
        let updated = kept.join("\n");
        Ok(self.set(updated))
    }

    /// Insert `text` as new line(s) right after the first line containing `anchor`.
    ///
    /// Returns `false` when no line contains `anchor`.
    pub fn insert_after(&mut self, anchor: &str, text: &str) -> Result<bool> {
        self.insert_near(anchor, text, true)
    }

    /// Insert `text` as new line(s) right before the first line containing `anchor`.
    pub fn insert_before(&mut self, anchor: &str, text: &str) -> Result<bool> {
        self.insert_near(anchor, text, false)
    }

    fn insert_near(&mut self, anchor: &str, text: &str, after: bool) -> Result<bool> {
        let current = self.content()?;
        let mut lines: Vec<&str> = current.split('\n').collect();
        let Some(idx) = lines.iter().position(|l| l.contains(anchor)) else {
            return Ok(false);
        };
        let at = if after { idx + 1 } else { idx };
        lines.insert(at, text);
        let updated = lines.join("\n");
        Ok(self.set(updated))
    }

    /// Append raw text, starting an empty buffer if the file does not exist.
    pub fn append(&mut self, text: &str) -> Result<()> {
        self.load()?;
        self.content.get_or_insert_with(String::new).push_str(text);
        self.dirty = true;
        Ok(())
    }

    fn set(&mut self, updated: String) -> bool {
        if self.content.as_deref() == Some(updated.as_str()) {
            return false;
        }
        self.content = Some(updated);
        self.dirty = true;
        true
    }

    /// Write the buffer back if it was modified.
    pub fn store(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(content) = &self.content {
            write_atomic(&self.path, content, self.dry_run)?;
        }
        self.dirty = false;
        Ok(())
    }
}

/// Sibling path used for staged writes.
pub fn staged_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
}

/// Write `content` to `<path>.new` and, unless `dry_run`, rename it over `path`.
pub fn write_atomic(path: &Path, content: &str, dry_run: bool) -> Result<()> {
    let staged = staged_path(path);
    if let Some(parent) = staged.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(&staged, content).with_context(|| format!("writing {}", staged.display()))?;
    if dry_run {
        log::info!("Dryrun: left preview in {}", staged.display());
    } else {
        fs::rename(&staged, path)
            .with_context(|| format!("renaming {} to {}", staged.display(), path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_with(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.go");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn find_returns_first_matching_line() -> Result<()> {
        let (_dir, path) = editor_with("a foo\nb foo\nc bar\n");
        let mut ed = FileEditor::new(&path, false);
        assert_eq!(ed.find("foo")?.as_deref(), Some("a foo"));
        assert_eq!(ed.find("baz")?, None);
        assert_eq!(ed.find_pattern(r"^c\s")?.as_deref(), Some("c bar"));
        Ok(())
    }

    #[test]
    fn replace_hits_every_occurrence() -> Result<()> {
        let (_dir, path) = editor_with("x\ny\nx\n");
        let mut ed = FileEditor::new(&path, false);
        assert!(ed.replace("x", "z")?);
        assert!(!ed.replace("x", "z")?);
        ed.store()?;
        assert_eq!(fs::read_to_string(&path)?, "z\ny\nz\n");
        Ok(())
    }

    #[test]
    fn delete_lines_keeps_trailing_newline() -> Result<()> {
        let (_dir, path) = editor_with("keep\n// +kubebuilder:storageversion\nkeep too\n");
        let mut ed = FileEditor::new(&path, false);
        assert!(ed.delete_lines("// +kubebuilder:storageversion")?);
        assert!(!ed.delete_lines("// +kubebuilder:storageversion")?);
        ed.store()?;
        assert_eq!(fs::read_to_string(&path)?, "keep\nkeep too\n");
        Ok(())
    }

    #[test]
    fn insert_uses_first_anchor_only() -> Result<()> {
        let (_dir, path) = editor_with("// +root\ntype A struct{}\n// +root\ntype AList struct{}\n");
        let mut ed = FileEditor::new(&path, false);
        assert!(ed.insert_after("+root", "// +marker")?);
        assert!(ed.insert_before("type AList", "// list")?);
        assert!(!ed.insert_after("+absent", "x")?);
        ed.store()?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "// +root\n// +marker\ntype A struct{}\n// +root\n// list\ntype AList struct{}\n"
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_only_an_error_when_content_is_needed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("new.go");

        let mut ed = FileEditor::new(&path, false);
        let err = ed.find("x").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BumpError>(),
            Some(BumpError::MissingFile(_))
        ));

        let mut ed = FileEditor::new(&path, false);
        ed.append("package v1\n")?;
        assert_eq!(ed.find("package")?.as_deref(), Some("package v1"));
        ed.store()?;
        assert_eq!(fs::read_to_string(&path)?, "package v1\n");
        Ok(())
    }

    #[test]
    fn dry_run_leaves_original_untouched() -> Result<()> {
        let (_dir, path) = editor_with("old\n");
        let mut ed = FileEditor::new(&path, true);
        ed.replace("old", "new")?;
        ed.store()?;
        assert_eq!(fs::read_to_string(&path)?, "old\n");
        assert_eq!(fs::read_to_string(staged_path(&path))?, "new\n");
        Ok(())
    }

    #[test]
    fn unmodified_buffer_is_not_written() -> Result<()> {
        let (_dir, path) = editor_with("same\n");
        let mut ed = FileEditor::new(&path, true);
        ed.find("same")?;
        ed.store()?;
        assert!(!staged_path(&path).exists());
        Ok(())
    }
}
