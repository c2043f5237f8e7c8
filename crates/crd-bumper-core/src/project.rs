use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::editor::write_atomic;
use crate::error::BumpError;

/// Name of the kubebuilder project descriptor.
pub const PROJECT_FILE: &str = "PROJECT";

/// The kubebuilder `PROJECT` file.
///
/// Only the fields this tool reads are typed; everything else round-trips
/// through the flattened `extra` maps so `save()` does not drop keys it does
/// not understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// One entry of `resources:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,

    #[serde(default)]
    pub group: String,

    pub version: String,

    /// Present when the API type lives in this repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<serde_yaml::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<serde_yaml::Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Resource {
    pub fn has_webhooks(&self) -> bool {
        self.webhooks.is_some()
    }

    /// Reconciled here, but the API type is declared in another module.
    pub fn is_controller_only(&self) -> bool {
        self.api.is_none()
    }
}

/// In-memory registry of the Kinds declared in `PROJECT`.
#[derive(Debug, Clone)]
pub struct Project {
    path: PathBuf,
    dry_run: bool,
    header: String,
    file: ProjectFile,
}

impl Project {
    /// Load `PROJECT` from the repository root.
    pub fn load(root: &Path, dry_run: bool) -> Result<Self> {
        Self::load_from(root.join(PROJECT_FILE), dry_run)
    }

    pub fn load_from(path: impl Into<PathBuf>, dry_run: bool) -> Result<Self> {
        let path = path.into();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(path, &raw, dry_run)
    }

    fn parse(path: PathBuf, raw: &str, dry_run: bool) -> Result<Self> {
        // Keep the introductory comments written by kubebuilder.
        let header: String = raw
            .lines()
            .take_while(|l| l.starts_with('#'))
            .map(|l| format!("{l}\n"))
            .collect();

        let file: ProjectFile = serde_yaml::from_str(raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut seen = BTreeSet::new();
        for r in &file.resources {
            if !seen.insert((r.kind.as_str(), r.version.as_str())) {
                return Err(BumpError::DuplicateResource {
                    kind: r.kind.clone(),
                    version: r.version.clone(),
                    path: path.clone(),
                }
                .into());
            }
        }

        Ok(Self {
            path,
            dry_run,
            header,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&str> {
        self.file.project_name.as_deref()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.file.resources
    }

    /// Sorted names of the Kinds with a local API at `version`.
    pub fn kinds(&self, version: &str) -> Vec<String> {
        let kinds: BTreeSet<&str> = self
            .file
            .resources
            .iter()
            .filter(|r| !r.is_controller_only() && r.version == version)
            .map(|r| r.kind.as_str())
            .collect();
        kinds.into_iter().map(str::to_string).collect()
    }

    /// Like [`Project::kinds`], but an empty result is an error.
    pub fn require_kinds(&self, version: &str) -> Result<Vec<String>> {
        let kinds = self.kinds(version);
        if kinds.is_empty() {
            return Err(BumpError::NoKinds(version.to_string()).into());
        }
        Ok(kinds)
    }

    /// Sorted names of controller-only Kinds, whose API lives elsewhere.
    pub fn controllers_with_nonlocal_api(&self) -> Vec<String> {
        let kinds: BTreeSet<&str> = self
            .file
            .resources
            .iter()
            .filter(|r| r.is_controller_only())
            .map(|r| r.kind.as_str())
            .collect();
        kinds.into_iter().map(str::to_string).collect()
    }

    pub fn resource(&self, kind: &str, version: &str) -> Result<&Resource> {
        self.find_idx(kind, version).map(|i| &self.file.resources[i])
    }

    pub fn group(&self, kind: &str, version: &str) -> Result<&str> {
        Ok(self.resource(kind, version)?.group.as_str())
    }

    pub fn has_webhooks(&self, kind: &str, version: &str) -> Result<bool> {
        Ok(self.resource(kind, version)?.has_webhooks())
    }

    fn find_idx(&self, kind: &str, version: &str) -> Result<usize> {
        self.file
            .resources
            .iter()
            .position(|r| r.kind == kind && r.version == version)
            .ok_or_else(|| {
                BumpError::UnknownResource {
                    kind: kind.to_string(),
                    version: version.to_string(),
                    path: self.path.clone(),
                }
                .into()
            })
    }

    /// Move the `webhooks` block of `kind` from one version to the other.
    ///
    /// Both versions must declare the same set of Kinds.
    pub fn move_webhooks(&mut self, kind: &str, from_ver: &str, to_ver: &str) -> Result<()> {
        let from_kinds = self.kinds(from_ver);
        let to_kinds = self.kinds(to_ver);
        if from_kinds != to_kinds {
            return Err(BumpError::KindMismatch {
                prev: from_ver.to_string(),
                new: to_ver.to_string(),
                prev_kinds: from_kinds,
                new_kinds: to_kinds,
            }
            .into());
        }

        let from_idx = self.find_idx(kind, from_ver)?;
        let to_idx = self.find_idx(kind, to_ver)?;
        if let Some(webhooks) = self.file.resources[from_idx].webhooks.take() {
            self.file.resources[to_idx].webhooks = Some(webhooks);
        }
        Ok(())
    }

    /// Render the descriptor, header comments first and every mapping's keys
    /// sorted, the order kubebuilder writes.
    pub fn to_yaml(&self) -> Result<String> {
        let value = serde_yaml::to_value(&self.file).context("Failed to serialize PROJECT")?;
        let body = serde_yaml::to_string(&sort_keys(value))
            .context("Failed to serialize PROJECT")?;
        Ok(format!("{}{}", self.header, body))
    }

    pub fn save(&self) -> Result<()> {
        write_atomic(&self.path, &self.to_yaml()?, self.dry_run)
    }
}

fn sort_keys(value: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::{Mapping, Value};
    match value {
        Value::Mapping(map) => {
            let mut entries: Vec<(Value, Value)> = map.into_iter().collect();
            entries.sort_by_cached_key(|(k, _)| k.as_str().map(str::to_string).unwrap_or_default());
            let mut sorted = Mapping::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Mapping(sorted)
        }
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"# Code generated by tool. DO NOT EDIT.
# This file is used to track the info used to scaffold your project
domain: github.com
layout:
- go.kubebuilder.io/v4
projectName: dws
repo: github.com/DataWorkflowServices/dws
resources:
- api:
    crdVersion: v1
    namespaced: true
  controller: true
  domain: github.com
  group: dataworkflowservices
  kind: Workflow
  path: github.com/DataWorkflowServices/dws/api/v1alpha1
  version: v1alpha1
  webhooks:
    conversion: true
    webhookVersion: v1
- api:
    crdVersion: v1
    namespaced: true
  domain: github.com
  group: dataworkflowservices
  kind: Storage
  path: github.com/DataWorkflowServices/dws/api/v1alpha1
  version: v1alpha1
- api:
    crdVersion: v1
    namespaced: true
  domain: github.com
  group: dataworkflowservices
  kind: Workflow
  path: github.com/DataWorkflowServices/dws/api/v1alpha2
  version: v1alpha2
- controller: true
  domain: cray.hpe.com
  group: lus
  kind: LustreFileSystem
  version: v1beta1
version: "3"
"#;

    fn project() -> Project {
        Project::parse(PathBuf::from("PROJECT"), PROJECT, false).unwrap()
    }

    #[test]
    fn kinds_are_sorted_and_local_only() {
        let p = project();
        assert_eq!(p.kinds("v1alpha1"), vec!["Storage", "Workflow"]);
        assert_eq!(p.kinds("v1alpha2"), vec!["Workflow"]);
        assert!(p.kinds("v1beta1").is_empty());
        assert_eq!(p.controllers_with_nonlocal_api(), vec!["LustreFileSystem"]);
        assert_eq!(p.name(), Some("dws"));
    }

    #[test]
    fn group_and_webhooks_lookup() -> Result<()> {
        let p = project();
        assert_eq!(p.group("Workflow", "v1alpha1")?, "dataworkflowservices");
        assert!(p.has_webhooks("Workflow", "v1alpha1")?);
        assert!(!p.has_webhooks("Storage", "v1alpha1")?);
        assert!(p.group("Nope", "v1alpha1").is_err());
        Ok(())
    }

    #[test]
    fn require_kinds_rejects_empty_version() {
        let err = project().require_kinds("v9").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BumpError>(),
            Some(BumpError::NoKinds(v)) if v == "v9"
        ));
    }

    #[test]
    fn move_webhooks_requires_matching_kind_sets() {
        let mut p = project();
        let err = p
            .move_webhooks("Workflow", "v1alpha1", "v1alpha2")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BumpError>(),
            Some(BumpError::KindMismatch { .. })
        ));
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let dup = "resources:\n- kind: A\n  version: v1\n  api: {}\n- kind: A\n  version: v1\n  api: {}\n";
        let err = Project::parse(PathBuf::from("PROJECT"), dup, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BumpError>(),
            Some(BumpError::DuplicateResource { .. })
        ));
    }

    #[test]
    fn save_keeps_header_and_unknown_keys() -> Result<()> {
        const TWO_VERSIONS: &str = r#"# Code generated by tool. DO NOT EDIT.
projectName: dws
repo: github.com/DataWorkflowServices/dws
resources:
- api:
    crdVersion: v1
  group: dataworkflowservices
  kind: Workflow
  version: v1alpha1
  webhooks:
    conversion: true
- api:
    crdVersion: v1
  group: dataworkflowservices
  kind: Workflow
  version: v1alpha2
version: "3"
"#;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        fs::write(&path, TWO_VERSIONS)?;

        let mut p = Project::load(dir.path(), false)?;
        p.move_webhooks("Workflow", "v1alpha1", "v1alpha2")?;
        p.save()?;

        let reloaded = Project::load(dir.path(), false)?;
        assert!(!reloaded.has_webhooks("Workflow", "v1alpha1")?);
        assert!(reloaded.has_webhooks("Workflow", "v1alpha2")?);

        let text = fs::read_to_string(&path)?;
        assert!(text.starts_with("# Code generated by tool. DO NOT EDIT.\n"));
        assert!(text.contains("repo: github.com/DataWorkflowServices/dws"));
        assert!(text.contains("crdVersion: v1"));
        Ok(())
    }

    #[test]
    fn save_writes_keys_in_sorted_order() -> Result<()> {
        const UNSORTED: &str = r#"# Code generated by tool. DO NOT EDIT.
version: "3"
resources:
- kind: Workflow
  webhooks:
    webhookVersion: v1
    conversion: true
  version: v1alpha1
  group: dataworkflowservices
  api:
    namespaced: true
    crdVersion: v1
- kind: Workflow
  version: v1alpha2
  group: dataworkflowservices
  api:
    namespaced: true
    crdVersion: v1
projectName: dws
domain: github.com
"#;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        fs::write(&path, UNSORTED)?;

        let mut p = Project::load(dir.path(), false)?;
        p.move_webhooks("Workflow", "v1alpha1", "v1alpha2")?;
        p.save()?;

        let text = fs::read_to_string(&path)?;
        let pos = |needle: &str| {
            text.find(needle)
                .unwrap_or_else(|| panic!("{needle:?} missing from:\n{text}"))
        };
        assert!(pos("domain:") < pos("projectName:"));
        assert!(pos("projectName:") < pos("resources:"));
        assert!(pos("resources:") < pos("\nversion:"));
        assert!(pos("- api:") < pos("  group:"));
        assert!(pos("  group:") < pos("  kind:"));
        assert!(pos("    crdVersion: v1") < pos("    namespaced: true"));
        assert!(pos("  version: v1alpha2") < pos("  webhooks:"));
        assert!(pos("    conversion: true") < pos("    webhookVersion: v1"));
        assert_eq!(text.matches("webhooks:").count(), 1);
        Ok(())
    }
}
