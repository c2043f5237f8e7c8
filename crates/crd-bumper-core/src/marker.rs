use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::BumpError;

/// Prefix of the first commit-message line written for each completed step.
pub const MARKER_PREFIX: &str = "CRDBUMPER";

static STEP_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap());

/// The `CRDBUMPER-<step>` token that records a completed step.
///
/// This line is the only persisted pipeline state, so the format is strict:
/// a message that starts with the prefix but does not carry a valid step name
/// is an error rather than "no marker".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMarker {
    step: String,
}

impl CommitMarker {
    pub fn new(step: &str) -> Result<Self, BumpError> {
        if !STEP_NAME.is_match(step) {
            return Err(BumpError::MalformedMarker(format!("{MARKER_PREFIX}-{step}")));
        }
        Ok(Self {
            step: step.to_string(),
        })
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    /// Parse the marker from a full commit message.
    ///
    /// Returns `Ok(None)` when the first line is not one of ours.
    pub fn parse(message: &str) -> Result<Option<Self>, BumpError> {
        let first = message.trim().lines().next().unwrap_or("").trim();
        let Some(rest) = first.strip_prefix(MARKER_PREFIX) else {
            return Ok(None);
        };
        let Some(step) = rest.strip_prefix('-') else {
            return Err(BumpError::MalformedMarker(first.to_string()));
        };
        Self::new(step)
            .map(Some)
            .map_err(|_| BumpError::MalformedMarker(first.to_string()))
    }

    /// Full commit message: marker line, blank line, body.
    pub fn message(&self, body: &str) -> String {
        format!("{self}\n\n{body}")
    }
}

impl fmt::Display for CommitMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MARKER_PREFIX}-{}", self.step)
    }
}

/// Render an optional marker the way sequencing errors report it.
pub fn describe(marker: Option<&CommitMarker>) -> String {
    match marker {
        Some(m) => m.to_string(),
        None => format!("{MARKER_PREFIX}-None"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marker_from_first_line() {
        let m = CommitMarker::parse("CRDBUMPER-copy-api-content\n\nCopy API content.\n")
            .unwrap()
            .unwrap();
        assert_eq!(m.step(), "copy-api-content");
        assert_eq!(m.to_string(), "CRDBUMPER-copy-api-content");
    }

    #[test]
    fn foreign_commits_have_no_marker() {
        assert_eq!(CommitMarker::parse("Fix typo in README").unwrap(), None);
        assert_eq!(CommitMarker::parse("").unwrap(), None);
    }

    #[test]
    fn malformed_markers_are_rejected() {
        for msg in ["CRDBUMPER", "CRDBUMPER-", "CRDBUMPER-Bad Step", "CRDBUMPERx-a"] {
            assert!(
                matches!(CommitMarker::parse(msg), Err(BumpError::MalformedMarker(_))),
                "{msg}"
            );
        }
    }

    #[test]
    fn message_round_trips() {
        let m = CommitMarker::new("auto-gens").unwrap();
        let msg = m.message("Make the auto-generated files.");
        assert_eq!(CommitMarker::parse(&msg).unwrap(), Some(m));
        assert_eq!(describe(None), "CRDBUMPER-None");
    }
}
