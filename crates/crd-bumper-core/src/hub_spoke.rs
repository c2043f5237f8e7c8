use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::editor::FileEditor;
use crate::error::BumpError;

/// Line that marks a hub type in `conversion.go`.
const HUB_MARKER: &str = " Hub() ";
/// Line that marks a spoke type in `conversion.go`.
const SPOKE_MARKER: &str = " ConvertTo(dstRaw conversion.Hub) ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRole {
    Hub,
    Spoke,
    /// Neither marker: a version that is not wired for conversion yet.
    Uninitialized,
}

/// Classifies API versions by inspecting `api/<ver>/conversion.go`.
#[derive(Debug, Clone)]
pub struct HubSpoke {
    root: PathBuf,
}

impl HubSpoke {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn conversion_go(&self, ver: &str) -> PathBuf {
        self.root.join("api").join(ver).join("conversion.go")
    }

    fn has_line(&self, ver: &str, needle: &str) -> Result<bool> {
        let path = self.conversion_go(ver);
        if !path.is_file() {
            return Ok(false);
        }
        Ok(FileEditor::new(path, false).find(needle)?.is_some())
    }

    pub fn is_hub(&self, ver: &str) -> Result<bool> {
        self.has_line(ver, HUB_MARKER)
    }

    pub fn is_spoke(&self, ver: &str) -> Result<bool> {
        self.has_line(ver, SPOKE_MARKER)
    }

    pub fn classify(&self, ver: &str) -> Result<ApiRole> {
        match (self.is_hub(ver)?, self.is_spoke(ver)?) {
            (true, true) => Err(BumpError::HubAndSpoke(ver.to_string()).into()),
            (true, false) => Ok(ApiRole::Hub),
            (false, true) => Ok(ApiRole::Spoke),
            (false, false) => Ok(ApiRole::Uninitialized),
        }
    }

    /// Version directories directly under `api/`, sorted.
    pub fn api_versions(&self) -> Result<Vec<String>> {
        api_versions(&self.root)
    }

    /// With more than one API version present, `prev_ver` must be the hub.
    ///
    /// An uninitialized `new_ver` directory is not counted: it is what an
    /// interrupted `create-apis` leaves behind.
    pub fn prev_is_hub(&self, prev_ver: &str, new_ver: &str) -> Result<bool> {
        let new_is_leftover = self.classify(new_ver)? == ApiRole::Uninitialized;
        let existing = self
            .api_versions()?
            .into_iter()
            .filter(|v| !(new_is_leftover && v == new_ver))
            .count();
        if existing > 1 {
            return self.is_hub(prev_ver);
        }
        Ok(true)
    }

    /// Spokes other than `prev_ver` and `new_ver`.
    pub fn earlier_spokes(&self, prev_ver: &str, new_ver: &str) -> Result<Vec<String>> {
        let mut spokes = Vec::new();
        for ver in self.api_versions()? {
            if ver != prev_ver && ver != new_ver && self.classify(&ver)? == ApiRole::Spoke {
                spokes.push(ver);
            }
        }
        Ok(spokes)
    }

    pub fn has_earlier_spokes(&self, prev_ver: &str, new_ver: &str) -> Result<bool> {
        Ok(!self.earlier_spokes(prev_ver, new_ver)?.is_empty())
    }
}

pub fn api_versions(root: &Path) -> Result<Vec<String>> {
    let api = root.join("api");
    if !api.is_dir() {
        return Ok(Vec::new());
    }
    let mut versions = Vec::new();
    for entry in fs::read_dir(&api).with_context(|| format!("reading {}", api.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            versions.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    versions.sort();
    Ok(versions)
}
