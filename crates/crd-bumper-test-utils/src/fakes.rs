//! Stand-ins for `make`, `kubebuilder` and `go` that record what they were
//! asked to do and, for the scaffolder, write what kubebuilder would.

use anyhow::{Context, Result, bail};
use serde_yaml::{Mapping, Value};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use crd_bumper_core::gomod::{MAIN_GO, module_name};
use crd_bumper_core::project::PROJECT_FILE;
use crd_bumper_core::tools::{BuildDriver, MakeTarget, ModuleFetcher, Scaffolder};

use crate::fixture::{groupversion_info, types_go};

/// Records every `make` target instead of running it.
#[derive(Debug, Default)]
pub struct RecordingBuild {
    pub targets: RefCell<Vec<MakeTarget>>,
}

impl RecordingBuild {
    pub fn targets(&self) -> Vec<MakeTarget> {
        self.targets.borrow().clone()
    }
}

impl BuildDriver for RecordingBuild {
    fn make(&self, target: MakeTarget) -> Result<()> {
        self.targets.borrow_mut().push(target);
        Ok(())
    }
}

/// Records module fetcher calls.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    pub calls: RefCell<Vec<String>>,
}

impl ModuleFetcher for RecordingFetcher {
    fn fetch(&self, module: &str, version: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("get {module}@{version}"));
        Ok(())
    }

    fn reconcile_dependencies(&self) -> Result<()> {
        self.calls.borrow_mut().push("mod tidy".to_string());
        Ok(())
    }

    fn vendor(&self) -> Result<()> {
        self.calls.borrow_mut().push("mod vendor".to_string());
        Ok(())
    }
}

/// Writes the files and `PROJECT` entries `kubebuilder create` would.
#[derive(Debug)]
pub struct FakeScaffolder {
    root: PathBuf,
    pub calls: RefCell<Vec<String>>,
}

impl FakeScaffolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn write_new(&self, rel: &str, content: &str) -> Result<()> {
        let path = self.root.join(rel);
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))
    }

    fn edit_project(&self, edit: impl FnOnce(&mut Vec<Value>) -> Result<()>) -> Result<()> {
        let path = self.root.join(PROJECT_FILE);
        let raw = fs::read_to_string(&path)?;
        let header: String = raw
            .lines()
            .take_while(|l| l.starts_with('#'))
            .map(|l| format!("{l}\n"))
            .collect();
        let mut doc: Value = serde_yaml::from_str(&raw)?;
        let Some(resources) = doc.get_mut("resources").and_then(Value::as_sequence_mut) else {
            bail!("{} has no resources", path.display());
        };
        edit(resources)?;
        fs::write(&path, format!("{header}{}", serde_yaml::to_string(&doc)?))?;
        Ok(())
    }

    /// Import the new version in `cmd/main.go` under the group name and add
    /// it to the scheme, as kubebuilder does.
    fn register_in_main(&self, group: &str, version: &str) -> Result<()> {
        let path = self.root.join(MAIN_GO);
        let main = fs::read_to_string(&path)?;
        let module = module_name(&self.root)?;
        let import_path = format!("\"{module}/api/{version}\"");
        if main.contains(&import_path) {
            return Ok(());
        }
        let main = main
            .replacen(
                "\t//+kubebuilder:scaffold:imports",
                &format!("\t{group}{version} {import_path}\n\t//+kubebuilder:scaffold:imports"),
                1,
            )
            .replacen(
                "\t//+kubebuilder:scaffold:scheme",
                &format!(
                    "\tutilruntime.Must({group}{version}.AddToScheme(scheme))\n\t//+kubebuilder:scaffold:scheme"
                ),
                1,
            );
        fs::write(&path, main)?;
        Ok(())
    }
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn is_resource(r: &Value, kind: &str, version: &str) -> bool {
    r.get("kind").and_then(Value::as_str) == Some(kind)
        && r.get("version").and_then(Value::as_str) == Some(version)
}

impl Scaffolder for FakeScaffolder {
    fn create_api(&self, group: &str, version: &str, kind: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("create api {group} {version} {kind}"));
        let dir = format!("api/{version}");
        self.write_new(&format!("{dir}/groupversion_info.go"), &groupversion_info(version))?;
        self.write_new(
            &format!("{dir}/{}_types.go", kind.to_lowercase()),
            &types_go(version, kind, false),
        )?;
        self.register_in_main(group, version)?;

        let module = module_name(&self.root)?;
        self.edit_project(|resources| {
            if resources.iter().any(|r| is_resource(r, kind, version)) {
                return Ok(());
            }
            let mut api = Mapping::new();
            api.insert(key("crdVersion"), key("v1"));
            api.insert(key("namespaced"), Value::Bool(true));
            let mut r = Mapping::new();
            r.insert(key("api"), Value::Mapping(api));
            r.insert(key("domain"), key("github.io"));
            r.insert(key("group"), key(group));
            r.insert(key("kind"), key(kind));
            r.insert(key("path"), key(&format!("{module}/api/{version}")));
            r.insert(key("version"), key(version));
            resources.push(Value::Mapping(r));
            Ok(())
        })
    }

    fn create_conversion_webhook(&self, group: &str, version: &str, kind: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("create webhook {group} {version} {kind} --conversion"));
        let lower = kind.to_lowercase();
        self.write_new(
            &format!("api/{version}/{lower}_webhook.go"),
            &format!(
                "package {version}\n\n\
                 import (\n\tctrl \"sigs.k8s.io/controller-runtime\"\n)\n\n\
                 func (r *{kind}) SetupWebhookWithManager(mgr ctrl.Manager) error {{\n\
                 \treturn ctrl.NewWebhookManagedBy(mgr).\n\t\tFor(r).\n\t\tComplete()\n}}\n"
            ),
        )?;
        self.write_new(
            &format!("api/{version}/{lower}_webhook_test.go"),
            &format!(
                "package {version}\n\n\
                 import (\n\t. \"github.com/onsi/ginkgo/v2\"\n)\n\n\
                 var _ = Describe(\"{kind} Webhook\", func() {{\n\n\
                 \tContext(\"When creating {kind} under Conversion Webhook\", func() {{\n\
                 \t\tIt(\"Should get the converted version of {kind}\", func() {{\n\
                 \t\t\t// Add your logic here\n\
                 \t\t}})\n\t}})\n}})\n"
            ),
        )?;
        self.edit_project(|resources| {
            let Some(r) = resources
                .iter_mut()
                .find(|r| is_resource(r, kind, version))
                .and_then(Value::as_mapping_mut)
            else {
                bail!("no {kind}.{version} resource to add a webhook to");
            };
            let mut webhooks = Mapping::new();
            webhooks.insert(key("conversion"), Value::Bool(true));
            webhooks.insert(key("webhookVersion"), key("v1"));
            r.insert(key("webhooks"), Value::Mapping(webhooks));
            Ok(())
        })
    }
}
