//! Line-boundary tracer
//!
//! Receives one callback per executed source line of the test file, maps
//! the line onto the step table and drives the step lifecycle. The pause
//! before a step is the only place the test thread blocks.

use std::path::{Path, PathBuf};

use crate::common::Result;

use super::handle::Session;
use super::queue::{CommandReceiver, QueueSignal};
use super::ControlSignal;

#[derive(Debug, Default)]
pub struct ExecutionTracer {
    source: Option<PathBuf>,
    /// The setup gate already waited for the first step's go-ahead
    resume_granted: bool,
}

impl ExecutionTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, source: &Path) {
        tracing::debug!(source = %source.display(), "Tracer attached");
        self.source = Some(source.to_path_buf());
        self.resume_granted = false;
    }

    /// Stop reacting to lines; safe to call repeatedly or before `attach`
    pub fn detach(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::debug!(source = %source.display(), "Tracer detached");
        }
        self.resume_granted = false;
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// Treat the next pause as already answered
    pub(crate) fn grant_resume(&mut self) {
        self.resume_granted = true;
    }

    /// Line callback
    ///
    /// Returns a control signal when the UI asked to reset or exit while the
    /// step was paused; the caller must abandon the test body.
    pub fn on_line(
        &mut self,
        session: &Session,
        commands: &mut CommandReceiver,
        line: u32,
    ) -> Result<Option<ControlSignal>> {
        if self.source.is_none() {
            return Ok(None);
        }

        session.finish_current_step(false);

        let Some(index) = session.step_at_line(line) else {
            return Ok(None);
        };

        let must_pause = session.enter_step(index);
        let granted = std::mem::take(&mut self.resume_granted);
        if must_pause && !granted {
            session.pause_step(index);
            match session.wait_for_command(commands)? {
                QueueSignal::Advance => {}
                QueueSignal::Reset => return Ok(Some(ControlSignal::Reset)),
                QueueSignal::Exit => return Ok(Some(ControlSignal::Exit)),
            }
        }

        session.run_step(index);
        Ok(None)
    }
}
