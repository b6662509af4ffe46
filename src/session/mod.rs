//! Step coordination: run state, command queue, tracer and controller
//!
//! Two threads meet here. The test thread runs the controller and blocks
//! only while a step is paused; the server's tasks apply UI commands
//! through the cloneable [`Session`] handle.

mod controller;
mod events;
mod handle;
mod queue;
mod state;
mod step;
mod tracer;
mod watch;

pub use controller::{SessionController, SuiteReport, TestEnd};
pub use events::{EventLog, FrameEvent, RecordedEvent};
pub use handle::Session;
pub use queue::{command_queue, CommandReceiver, CommandSender, QueueSignal};
pub use state::{
    test_duration_ms, PausePolicy, RunRecord, RunStatus, Snapshot, TestInfo, TestResult,
};
pub use step::{permalink, Step, StepStatus, StepTable};
pub use tracer::ExecutionTracer;
pub use watch::TestFileWatcher;

use crate::runner::TestFailure;

/// Request to abandon the running test body
///
/// Not an error: it never marks a step failed and is logged at info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Reset,
    Exit,
}

/// How a test body run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ran to the end or stopped at a failure
    Completed(std::result::Result<(), TestFailure>),
    ResetRequested,
    ExitRequested,
}

impl From<ControlSignal> for RunOutcome {
    fn from(signal: ControlSignal) -> Self {
        match signal {
            ControlSignal::Reset => Self::ResetRequested,
            ControlSignal::Exit => Self::ExitRequested,
        }
    }
}
