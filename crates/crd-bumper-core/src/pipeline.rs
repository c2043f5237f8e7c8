//! Resumable, ordered execution of named steps.
//!
//! The only state kept between runs is the `CRDBUMPER-<step>` marker on the
//! most recent commit. Each run reads it, works out which step comes next and
//! runs from there.

use anyhow::{Result, bail};

use crate::error::BumpError;
use crate::git::Repository;
use crate::marker::{CommitMarker, describe};
use crate::standalone::{RESERVE_API, UNSERVE_API, VENDOR_NEW_API};

/// Markers left by commands that live outside the step sequence.
pub const STANDALONE_MARKERS: &[&str] = &[VENDOR_NEW_API, UNSERVE_API, RESERVE_API];

/// What a step's action achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Changes were made and committed with the step's marker.
    Committed,
    /// The step found nothing to change and made no commit.
    NothingToDo,
    /// The step could not finish; "all" mode stops here.
    Incomplete,
}

/// One named stage of a pipeline over context `C`.
pub trait Step<C> {
    fn name(&self) -> &'static str;

    /// Steps besides the immediately preceding one that may have been the
    /// last to commit before this one runs.
    fn alternate_predecessors(&self) -> &'static [&'static str] {
        &[]
    }

    /// Probe consulted by the resolver before choosing this step.
    fn has_work(&self, _ctx: &C) -> Result<bool> {
        Ok(true)
    }

    fn run(&self, ctx: &mut C) -> Result<StepOutcome>;
}

/// What the pipeline needs from the context its steps share.
pub trait StepContext {
    fn repository(&self) -> &dyn Repository;

    /// Re-read state that earlier steps may have rewritten on disk.
    fn reload(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Keep going until the last step or an incomplete one.
    All,
    /// Run exactly one step.
    Step,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub this_branch: bool,
    pub use_existing_workarea: bool,
}

/// The resolver's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Step(usize),
    Done,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub executed: Vec<(&'static str, StepOutcome)>,
    /// Every step has been committed.
    pub finished: bool,
}

pub struct Pipeline<C> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: StepContext> Pipeline<C> {
    pub fn new(steps: Vec<Box<dyn Step<C>>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }

    /// The last marker, with markers of standalone commands read as none.
    pub fn recorded_step<'a>(&self, marker: Option<&'a CommitMarker>) -> Option<&'a CommitMarker> {
        marker.filter(|m| !STANDALONE_MARKERS.contains(&m.step()))
    }

    /// Work out which step follows the recorded marker.
    pub fn resolve(&self, marker: Option<&CommitMarker>, ctx: &C) -> Result<Next> {
        let Some(last) = self.recorded_step(marker) else {
            return Ok(if self.steps.is_empty() { Next::Done } else { Next::Step(0) });
        };
        let Some(pos) = self.position(last.step()) else {
            return Err(BumpError::UnknownStep(last.to_string()).into());
        };
        let mut idx = pos + 1;
        if idx == self.steps.len() {
            return Ok(Next::Done);
        }

        // A step with nothing to do is passed over when the one after it
        // accepts this step's predecessor.
        while idx + 1 < self.steps.len() {
            let predecessor = self.steps[idx - 1].name();
            let successor = &self.steps[idx + 1];
            if !successor.alternate_predecessors().contains(&predecessor)
                || self.steps[idx].has_work(ctx)?
            {
                break;
            }
            log::info!(
                "{} has nothing to do; continuing with {}",
                self.steps[idx].name(),
                successor.name()
            );
            idx += 1;
        }
        Ok(Next::Step(idx))
    }

    /// Fail unless `marker` is an acceptable predecessor for step `idx`.
    pub fn expect_previous(&self, idx: usize, marker: Option<&CommitMarker>) -> Result<()> {
        if idx == 0 {
            return Ok(());
        }
        let step = &self.steps[idx];
        let expected = self.steps[idx - 1].name();
        let recorded = self.recorded_step(marker);
        let ok = recorded.is_some_and(|m| {
            m.step() == expected || step.alternate_predecessors().contains(&m.step())
        });
        if !ok {
            return Err(BumpError::OutOfOrder {
                step: step.name().to_string(),
                expected: CommitMarker::new(expected)?.to_string(),
                found: describe(recorded),
            }
            .into());
        }
        Ok(())
    }

    fn prologue(&self, ctx: &C, idx: usize) -> Result<()> {
        log::info!("Executing {}", self.steps[idx].name());
        let repo = ctx.repository();
        repo.verify_clean()?;
        self.expect_previous(idx, repo.last_marker()?.as_ref())
    }

    /// Run from the recorded position, one step or all remaining ones.
    pub fn run(&self, ctx: &mut C, mode: RunMode, options: RunOptions) -> Result<RunReport> {
        let mut report = RunReport::default();
        let marker = ctx.repository().last_marker()?;
        let mut next = self.resolve(marker.as_ref(), ctx)?;

        if next == Next::Step(0) && options.this_branch && !options.use_existing_workarea {
            return Err(BumpError::ExistingBranchFirstStep.into());
        }

        loop {
            let idx = match next {
                Next::Done => {
                    report.finished = true;
                    break;
                }
                Next::Step(idx) => idx,
            };
            let step = &self.steps[idx];
            self.prologue(ctx, idx)?;
            let outcome = step.run(ctx)?;
            report.executed.push((step.name(), outcome));

            match outcome {
                StepOutcome::Incomplete => {
                    log::warn!("Stop on incomplete step {}", step.name());
                    break;
                }
                StepOutcome::NothingToDo => log::info!("{}: nothing to do", step.name()),
                StepOutcome::Committed => {}
            }
            if mode == RunMode::Step {
                break;
            }

            ctx.reload()?;
            next = match outcome {
                StepOutcome::Committed => {
                    let resolved = self.resolve(ctx.repository().last_marker()?.as_ref(), ctx)?;
                    if resolved == Next::Step(idx) {
                        bail!("{} reported a commit, but its marker was not recorded", step.name());
                    }
                    resolved
                }
                _ if idx + 1 < self.steps.len() => Next::Step(idx + 1),
                _ => Next::Done,
            };
        }
        Ok(report)
    }
}
