use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a step.
///
/// Every variant falls into one of four groups: a precondition that did not
/// hold before any edit was made, a step requested out of order, a rewrite rule
/// that could not find its anchor, or an external tool that exited non-zero.
#[derive(Debug, Error)]
pub enum BumpError {
    #[error("Workarea is not clean:\n{0}")]
    DirtyWorkarea(String),

    #[error("API --prev-ver {0} must point to the current hub")]
    PrevNotHub(String),

    #[error("Nothing found at version {0}")]
    NoKinds(String),

    #[error(
        "The {prev} list of kinds does not match the {new} list (prev: {prev_kinds:?}, new: {new_kinds:?})"
    )]
    KindMismatch {
        prev: String,
        new: String,
        prev_kinds: Vec<String>,
        new_kinds: Vec<String>,
    },

    #[error("Unable to find resource API {kind}.{version} in {}", path.display())]
    UnknownResource {
        kind: String,
        version: String,
        path: PathBuf,
    },

    #[error("Duplicate resource API {kind}.{version} in {}", path.display())]
    DuplicateResource {
        kind: String,
        version: String,
        path: PathBuf,
    },

    #[error("API {0} is not a spoke")]
    NotSpoke(String),

    #[error("{0}")]
    InvalidArgs(String),

    #[error("API {0} carries both hub and spoke conversion routines")]
    HubAndSpoke(String),

    #[error("Operation {step} wants to build on {expected}, but found that the previous operation was {found}")]
    OutOfOrder {
        step: String,
        expected: String,
        found: String,
    },

    #[error("--this-branch is allowed only after the first step; add --use-existing-workarea to start in the current branch")]
    ExistingBranchFirstStep,

    #[error("Unable to determine the next step: {0} does not name a known step")]
    UnknownStep(String),

    #[error("Malformed commit marker: {0:?}")]
    MalformedMarker(String),

    #[error("Unable to place {marker} in {}", path.display())]
    AnchorNotFound { marker: String, path: PathBuf },

    #[error("{}: file does not exist", .0.display())]
    MissingFile(PathBuf),

    #[error("Branch name must not be main, master, or releases/v0")]
    ProtectedBranch,

    #[error("Unable to find the import of {module}/api/{version} in {}", path.display())]
    ImportNotFound {
        module: String,
        version: String,
        path: PathBuf,
    },

    #[error("Expected exactly one vendored API version of {module}, found {found:?}")]
    VendoredVersions { module: String, found: Vec<String> },

    #[error("{command} failed: {stderr}")]
    Tool { command: String, stderr: String },

    #[error("{0} is not installed or not on PATH")]
    ToolNotFound(String),
}
