//! Move a kubebuilder repository's CRD APIs to a new hub version.
//!
//! A bump is a fixed sequence of steps ([`steps::bump_pipeline`]). Each step
//! edits files through line-oriented [`rewrite`] rules, optionally runs the
//! build driver, and commits with a `CRDBUMPER-<step>` marker so a later run
//! can pick up where the last one stopped.

pub mod config;
pub mod copyright;
pub mod editor;
pub mod error;
pub mod git;
pub mod gomod;
pub mod hub_spoke;
pub mod marker;
pub mod pipeline;
pub mod project;
pub mod rewrite;
pub mod standalone;
pub mod steps;
pub mod tools;

pub use error::BumpError;
pub use git::{GitCli, Repository};
pub use hub_spoke::{ApiRole, HubSpoke};
pub use marker::CommitMarker;
pub use pipeline::{Pipeline, RunMode, RunOptions, RunReport, Step, StepContext, StepOutcome};
pub use project::Project;
pub use steps::{BumpContext, BumpOptions, Toolbox, bump_pipeline};
pub use tools::{BuildDriver, GoCli, Kubebuilder, Make, MakeTarget, ModuleFetcher, Scaffolder, ToolRunner};
