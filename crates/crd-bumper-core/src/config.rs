use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Optional per-repository settings read from the repository root.
pub const CONFIG_FILE: &str = "crd-bumper.yaml";

/// Contents of `crd-bumper.yaml`.
///
/// Both keys hold comma-separated directory lists, relative to the root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BumperConfig {
    #[serde(default)]
    pub extra_go_dirs: Option<String>,

    #[serde(default)]
    pub extra_config_dirs: Option<String>,
}

impl BumperConfig {
    /// Load the config, or the empty default when the file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Extra directories of Go code to retarget when vendoring.
    pub fn extra_go_dirs(&self) -> Vec<String> {
        split_dirs(self.extra_go_dirs.as_deref())
    }

    /// Extra Kustomize directories whose `apiVersion:` lines follow the vendored API.
    pub fn extra_config_dirs(&self) -> Vec<String> {
        split_dirs(self.extra_config_dirs.as_deref())
    }
}

fn split_dirs(list: Option<&str>) -> Vec<String> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}
