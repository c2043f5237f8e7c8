//! Shared test support: hermetic git sandboxes, a kubebuilder-style fixture
//! repository and recording fakes for the external tools.

pub mod fakes;
pub mod fixture;
pub mod sandbox;
