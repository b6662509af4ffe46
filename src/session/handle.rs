//! Shared session handle
//!
//! One `Session` exists per process, created by whoever wires the CLI
//! together and cloned into the UI server's handlers. The run record lives
//! behind a lock that is only held while fields are copied or mutated,
//! never across the blocking wait on the command queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{config::Config, now_ms, Result};
use crate::server::{Broadcaster, Command, CommandRequest};

use super::events::{EventLog, FrameEvent, RecordedEvent};
use super::queue::{command_queue, CommandReceiver, CommandSender, QueueSignal};
use super::state::{PausePolicy, RunRecord, Snapshot, TestInfo, TestResult};
use super::step::{Step, StepStatus, StepTable};

/// Cloneable handle to the running session
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    record: Mutex<RunRecord>,
    commands: CommandSender,
    broadcaster: Broadcaster,
    events: Mutex<EventLog>,
    /// Number of waits the test thread has entered so far
    waits: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("record", &*self.inner.record.lock())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create the session and the receiving end of its command queue
    pub fn new(config: Config, broadcaster: Broadcaster) -> (Self, CommandReceiver) {
        let (commands, receiver) = command_queue();
        let events = EventLog::new(config.events.max_events);
        let session = Self {
            inner: Arc::new(Inner {
                config,
                record: Mutex::new(RunRecord::default()),
                commands,
                broadcaster,
                events: Mutex::new(events),
                waits: AtomicU64::new(0),
            }),
        };
        (session, receiver)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Consistent copy of the current run state
    pub fn snapshot(&self) -> Snapshot {
        self.inner.record.lock().snapshot()
    }

    pub fn current_step(&self) -> Option<Step> {
        let record = self.inner.record.lock();
        record.current_step.and_then(|i| record.table.get(i).cloned())
    }

    pub fn pause_policy(&self) -> PausePolicy {
        self.inner.record.lock().pause_policy
    }

    /// Whether the test thread is blocked waiting for a command
    pub fn is_awaiting_command(&self) -> bool {
        self.inner.record.lock().awaiting_command
    }

    /// Sequence number of the wait the test thread is blocked in, if any
    ///
    /// Lets a caller answer each wait exactly once: a reset or exit leaves
    /// the thread marked as waiting until it picks the signal up, but the
    /// number only changes when a new wait begins.
    pub fn pending_wait(&self) -> Option<u64> {
        let record = self.inner.record.lock();
        record
            .awaiting_command
            .then(|| self.inner.waits.load(Ordering::SeqCst))
    }

    /// Pause policy for the next run instead of pausing before every step
    pub fn set_next_pause_policy(&self, policy: PausePolicy) {
        self.inner.record.lock().next_pause_policy = Some(policy);
    }

    /// Push the current snapshot to the UI
    pub fn notify(&self) {
        let snapshot = self.snapshot();
        self.inner.broadcaster.broadcast(Some(snapshot));
    }

    /// Push the end-of-stream sentinel
    pub fn notify_end(&self) {
        self.inner.broadcaster.broadcast(None);
    }

    /// Parse and apply a command posted by the UI
    pub fn handle_request(&self, request: &CommandRequest) -> Result<()> {
        let command = Command::parse(request)?;
        self.apply_command(command)
    }

    pub fn apply_command(&self, command: Command) -> Result<()> {
        tracing::debug!(command = command.name(), "Applying command");
        let mut record = self.inner.record.lock();

        match command {
            Command::Start { pause_at_step } => {
                if let Some(policy) = pause_at_step {
                    record.pause_policy = policy;
                }
                // a queued reset/exit must be the next thing the thread sees
                if record.awaiting_command && !record.abort_pending {
                    record.awaiting_command = false;
                    self.inner.commands.send(QueueSignal::Advance)?;
                } else {
                    tracing::debug!("Start received while not paused, pause policy updated only");
                }
            }
            Command::Stop => {
                record.pause_policy = PausePolicy::Always;
            }
            Command::Reset => {
                record.pause_policy = PausePolicy::Always;
                self.send_abort(&mut record, QueueSignal::Reset)?;
            }
            Command::Exit => {
                record.pause_policy = PausePolicy::Always;
                self.send_abort(&mut record, QueueSignal::Exit)?;
            }
        }

        // queued while still locked, so it lands ahead of anything the test
        // thread pushes after picking up the signal
        self.inner.broadcaster.broadcast(Some(record.snapshot()));
        Ok(())
    }

    /// Queue a reset because the test files changed on disk
    pub fn request_reload(&self) -> Result<()> {
        let mut record = self.inner.record.lock();
        if record.test.is_none() || record.abort_pending {
            return Ok(());
        }
        tracing::info!("Test files changed, resetting test...");

        if self.inner.config.run.auto_run_on_reload {
            record.next_pause_policy = Some(record.pause_policy);
        }
        record.pause_policy = PausePolicy::Always;
        self.send_abort(&mut record, QueueSignal::Reset)
    }

    fn send_abort(&self, record: &mut RunRecord, signal: QueueSignal) -> Result<()> {
        if record.abort_pending {
            tracing::info!(?signal, "A reset or exit is already pending, ignoring");
            return Ok(());
        }
        record.abort_pending = true;
        self.inner.commands.send(signal)
    }

    /// Record a browser event against the step that was active at its time
    pub fn record_event(&self, event: FrameEvent) {
        let step_index = self
            .inner
            .record
            .lock()
            .table
            .step_for_timestamp(event.timestamp);
        self.inner.events.lock().push(event, step_index);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.inner.events.lock().to_vec()
    }

    // === Test-thread operations ===

    /// Install a fresh step table for a new run
    ///
    /// Checks the command queue is empty and clears the pending-abort guard
    /// under the record lock, so no producer can slip a signal in between.
    pub(crate) fn begin_run(
        &self,
        commands: &mut CommandReceiver,
        test: TestInfo,
        table: StepTable,
    ) -> Result<PausePolicy> {
        let mut record = self.inner.record.lock();
        commands.ensure_empty()?;

        let policy = record.next_pause_policy.take().unwrap_or_default();
        *record = RunRecord {
            test: Some(test),
            table,
            pause_policy: policy,
            ..RunRecord::default()
        };
        drop(record);

        self.inner.events.lock().clear();
        Ok(policy)
    }

    /// Mark the thread as waiting while the record is locked
    ///
    /// Callers push the snapshot the UI answers under the same lock, so a
    /// `start` reacting to it always finds a waiter to advance.
    fn begin_wait(&self, record: &mut RunRecord) {
        record.awaiting_command = true;
        self.inner.waits.fetch_add(1, Ordering::SeqCst);
    }

    /// Push the run's first snapshot and hold it at the start gate
    pub(crate) fn open_gate(&self) {
        let mut record = self.inner.record.lock();
        self.begin_wait(&mut record);
        self.inner.broadcaster.broadcast(Some(record.snapshot()));
    }

    /// Store the test result, push it with the end-of-run sentinel and
    /// wait for the UI to move on
    pub(crate) fn complete_run(&self, result: TestResult) {
        let mut record = self.inner.record.lock();
        record.result = Some(result);
        self.begin_wait(&mut record);
        self.inner.broadcaster.broadcast(Some(record.snapshot()));
        self.inner.broadcaster.broadcast(None);
    }

    /// Publish a run that cannot continue, without waiting for the UI
    pub(crate) fn abandon_run(&self, result: TestResult) {
        let mut record = self.inner.record.lock();
        record.result = Some(result);
        self.inner.broadcaster.broadcast(Some(record.snapshot()));
        self.inner.broadcaster.broadcast(None);
    }

    /// Block until the UI sends a command
    ///
    /// Must follow [`open_gate`](Self::open_gate),
    /// [`pause_step`](Self::pause_step) or
    /// [`complete_run`](Self::complete_run), which announce the wait.
    pub(crate) fn wait_for_command(&self, commands: &mut CommandReceiver) -> Result<QueueSignal> {
        let signal = commands.wait();

        // abort_pending stays set until the next begin_run
        self.inner.record.lock().awaiting_command = false;
        let signal = signal?;
        tracing::debug!(?signal, "Received command");
        Ok(signal)
    }

    pub(crate) fn step_at_line(&self, line: u32) -> Option<usize> {
        self.inner.record.lock().table.index_at_line(line)
    }

    /// Make `index` the current step; returns whether it must pause
    pub(crate) fn enter_step(&self, index: usize) -> bool {
        let mut record = self.inner.record.lock();
        record.current_step = Some(index);
        let pauses = record.pause_policy.pauses_at(index);
        if let Some(step) = record.table.get(index) {
            tracing::debug!("STEP {:>2}: {}", index + 1, step.as_string);
        }
        pauses
    }

    /// Pause `index` and announce the wait for the UI's answer
    pub(crate) fn pause_step(&self, index: usize) {
        let mut record = self.inner.record.lock();
        if let Some(step) = record.table.get_mut(index) {
            step.paused_at = Some(now_ms());
            step.status = StepStatus::Paused;
        }
        self.begin_wait(&mut record);
        self.inner.broadcaster.broadcast(Some(record.snapshot()));
    }

    pub(crate) fn run_step(&self, index: usize) {
        self.update_step(index, |step| {
            step.start_at = Some(now_ms());
            step.status = StepStatus::Running;
        });
    }

    fn update_step(&self, index: usize, f: impl FnOnce(&mut Step)) {
        {
            let mut record = self.inner.record.lock();
            if let Some(step) = record.table.get_mut(index) {
                f(step);
            }
        }
        self.notify();
    }

    /// Close the current step, if any, and push a snapshot
    pub(crate) fn finish_current_step(&self, failed: bool) {
        {
            let mut record = self.inner.record.lock();
            if let Some(index) = record.current_step.take() {
                if let Some(step) = record.table.get_mut(index) {
                    step.end_at = Some(now_ms());
                    step.status = if failed {
                        StepStatus::Failed
                    } else {
                        StepStatus::Passed
                    };
                    let elapsed = step
                        .elapsed_ms()
                        .map(|ms| format!(" ({ms}ms)"))
                        .unwrap_or_default();
                    let outcome = if failed { " FAILED" } else { "" };
                    tracing::info!(
                        "STEP {:>2}: {}{}{}",
                        index + 1,
                        step.as_string,
                        elapsed,
                        outcome
                    );
                }
            }
        }
        self.notify();
    }

    /// Show the resolved target of the current `visit` step
    pub(crate) fn set_visit_display(&self, display_url: &str) -> Result<()> {
        let changed = {
            let mut record = self.inner.record.lock();
            let Some(index) = record.current_step else {
                return Ok(());
            };
            match record.table.get_mut(index) {
                Some(step) if step.method == "visit" => {
                    step.as_string = format!("visit {}", serde_json::to_string(display_url)?);
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.notify();
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_record<R>(&self, f: impl FnOnce(&mut RunRecord) -> R) -> R {
        f(&mut self.inner.record.lock())
    }
}
