//! Session controller: setup, run, teardown and the reset/exit loop
//!
//! Runs on the test thread. Owns the page driver, the tracer and the
//! receiving end of the command queue; everything the UI can see goes
//! through the shared [`Session`].

use std::path::{Path, PathBuf};

use crate::common::{paths, Error, Result};
use crate::driver::{Action, FrameDriver, PageDriver};
use crate::extract::{self, LocatedTest, TriggerSet};
use crate::runner::{ScriptRunner, TestHost};

use super::handle::Session;
use super::queue::{CommandReceiver, QueueSignal};
use super::state::{PausePolicy, RunStatus, TestInfo, TestResult};
use super::step::StepTable;
use super::tracer::ExecutionTracer;
use super::watch::TestFileWatcher;
use super::{ControlSignal, RunOutcome};

/// How one test ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestEnd {
    /// Reached a terminal status and the UI asked to move on
    Finished(RunStatus),
    /// The UI asked to exit
    Exited,
}

/// Result of running a list of tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteReport {
    pub results: Vec<(String, RunStatus)>,
    pub exited: bool,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        !self.exited && self.results.iter().all(|(_, s)| *s == RunStatus::Passed)
    }
}

enum Setup {
    Ready(LocatedTest),
    Aborted(ControlSignal),
}

enum AfterRun {
    Rerun,
    Next,
    Exit,
}

pub struct SessionController<D> {
    session: Session,
    commands: CommandReceiver,
    driver: FrameDriver<D>,
    tracer: ExecutionTracer,
    triggers: TriggerSet,
    source_path: PathBuf,
    watcher: Option<TestFileWatcher>,
    /// Pause policy each test starts with, instead of pausing at every step
    initial_policy: Option<PausePolicy>,
}

impl<D: PageDriver> SessionController<D> {
    pub fn new(
        session: Session,
        commands: CommandReceiver,
        driver: D,
        source_path: &Path,
        triggers: TriggerSet,
    ) -> Result<Self> {
        let driver = FrameDriver::new(driver, &session.config().run.app_host)?;
        Ok(Self {
            session,
            commands,
            driver,
            tracer: ExecutionTracer::new(),
            triggers,
            source_path: paths::absolute_source_path(source_path),
            watcher: None,
            initial_policy: None,
        })
    }

    pub fn with_initial_policy(mut self, policy: PausePolicy) -> Self {
        self.initial_policy = Some(policy);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn driver(&self) -> &D {
        self.driver.inner()
    }

    /// Run tests in order; an exit request ends the whole suite
    pub fn run_suite(&mut self, selectors: &[String]) -> Result<SuiteReport> {
        let mut report = SuiteReport::default();
        for selector in selectors {
            match self.run_test(selector)? {
                TestEnd::Finished(status) => report.results.push((selector.clone(), status)),
                TestEnd::Exited => {
                    tracing::info!("Exit requested, skipping remaining tests");
                    report.exited = true;
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Run one test until it finishes or the UI exits, rerunning on reset
    pub fn run_test(&mut self, selector: &str) -> Result<TestEnd> {
        if let Some(policy) = self.initial_policy {
            self.session.set_next_pause_policy(policy);
        }
        loop {
            let source = std::fs::read_to_string(&self.source_path)
                .map_err(|e| Error::file_read(&self.source_path, &e))?;

            let outcome = match self.set_current_test(&source, selector) {
                Ok(Setup::Ready(test)) => self.run_body(&source, &test),
                Ok(Setup::Aborted(signal)) => Ok(signal.into()),
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            };
            match self.teardown(outcome)? {
                AfterRun::Rerun => continue,
                AfterRun::Next => return Ok(TestEnd::Finished(self.session.snapshot().test_status)),
                AfterRun::Exit => return Ok(TestEnd::Exited),
            }
        }
    }

    fn run_body(&mut self, source: &str, test: &LocatedTest) -> Result<RunOutcome> {
        let mut runner = ScriptRunner::new(source, &self.source_path, &test.case, &self.triggers);
        let mut host = RunHost {
            session: &self.session,
            commands: &mut self.commands,
            tracer: &mut self.tracer,
            driver: &mut self.driver,
        };
        runner.run(&test.body, &mut host)
    }

    /// Prepare a fresh run of `selector`
    ///
    /// Builds the step table, points the driver at the UI frame, starts
    /// tracing and file watching, then waits for the first `start` when
    /// every step pauses.
    fn set_current_test(&mut self, source: &str, selector: &str) -> Result<Setup> {
        let path = self.source_path.display().to_string();
        let located = extract::locate(source, &path, selector)?;
        let descriptors = extract::steps_in(source, &located.body, &self.triggers);
        if descriptors.is_empty() {
            return Err(Error::NoSteps(located.case.id.clone()));
        }

        let config = self.session.config().clone();
        let table = StepTable::build(descriptors, &self.source_path, config.editor_scheme());
        print_steps(&table);

        let info = TestInfo {
            suite: located.case.suite.clone(),
            name: located.case.id.clone(),
        };
        let policy = self.session.begin_run(&mut self.commands, info, table)?;

        self.driver.open_ui(&config.ui_origin())?;
        let gated = policy == PausePolicy::Always;
        if gated {
            self.session.open_gate();
        } else {
            self.session.notify();
        }

        self.tracer.attach(&self.source_path);
        if config.run.reload_test_files {
            self.watch_test_files();
        }

        if gated {
            match self.session.wait_for_command(&mut self.commands)? {
                QueueSignal::Advance => self.tracer.grant_resume(),
                QueueSignal::Reset => return Ok(Setup::Aborted(ControlSignal::Reset)),
                QueueSignal::Exit => return Ok(Setup::Aborted(ControlSignal::Exit)),
            }
        }

        Ok(Setup::Ready(located))
    }

    fn watch_test_files(&mut self) {
        let dir = paths::test_directory(&self.source_path);
        if self.watcher.as_ref().is_some_and(|w| w.dir() == dir) {
            return;
        }
        match TestFileWatcher::start(&dir, self.session.clone()) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => tracing::warn!("Reload on change disabled: {}", e),
        }
    }

    /// Finish the run and decide what comes next
    ///
    /// The tracer and the file watcher are always released, whatever the
    /// outcome.
    fn teardown(&mut self, outcome: Result<RunOutcome>) -> Result<AfterRun> {
        let after = self.finish_run(outcome);
        self.release();
        after
    }

    fn release(&mut self) {
        self.tracer.detach();
        self.watcher = None;
    }

    fn finish_run(&mut self, outcome: Result<RunOutcome>) -> Result<AfterRun> {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // the UI still gets a terminal state before the error propagates
                tracing::error!("Test run aborted: {}", e);
                self.session.finish_current_step(true);
                self.session.abandon_run(TestResult {
                    passed: false,
                    error: Some(e.to_string()),
                    backtrace: Vec::new(),
                });
                return Err(e);
            }
        };

        let result = match outcome {
            RunOutcome::ResetRequested => {
                tracing::info!("Resetting test (ignore any error logs)...");
                self.session.notify_end();
                return Ok(AfterRun::Rerun);
            }
            RunOutcome::ExitRequested => {
                tracing::info!("Exiting test run");
                self.session.notify_end();
                return Ok(AfterRun::Exit);
            }
            RunOutcome::Completed(result) => result,
        };

        self.session.finish_current_step(result.is_err());
        let test_result = match result {
            Ok(()) => TestResult {
                passed: true,
                error: None,
                backtrace: Vec::new(),
            },
            Err(failure) => {
                let backtrace = failure.relevant_backtrace(&self.source_path.display().to_string());
                tracing::warn!(
                    "Test failed with error:\n{}\n{}",
                    failure.message,
                    backtrace.join("\n")
                );
                TestResult {
                    passed: false,
                    error: Some(failure.message),
                    backtrace,
                }
            }
        };
        self.session.complete_run(test_result);

        tracing::info!("teardown complete. Waiting for command...");
        match self.session.wait_for_command(&mut self.commands)? {
            QueueSignal::Advance => Ok(AfterRun::Next),
            QueueSignal::Reset => {
                tracing::info!("Resetting test...");
                Ok(AfterRun::Rerun)
            }
            QueueSignal::Exit => Ok(AfterRun::Exit),
        }
    }
}

fn print_steps(table: &StepTable) {
    tracing::info!("found {} steps:", table.len());
    for step in table.steps() {
        tracing::info!(
            " {:>2}.  {}: {}:{}",
            step.index + 1,
            step.method,
            step.line,
            step.column
        );
    }
}

/// Test-thread view handed to the runner for one run
struct RunHost<'r, D> {
    session: &'r Session,
    commands: &'r mut CommandReceiver,
    tracer: &'r mut ExecutionTracer,
    driver: &'r mut FrameDriver<D>,
}

impl<D: PageDriver> TestHost for RunHost<'_, D> {
    fn on_line(&mut self, line: u32) -> Result<Option<ControlSignal>> {
        self.tracer.on_line(self.session, self.commands, line)
    }

    fn perform(&mut self, action: &Action) -> Result<()> {
        match (action.method.as_str(), action.first_arg()) {
            ("visit", Some(target)) if target.literal => {
                if let Some(display) = self.driver.visit(&target.text)? {
                    self.session.set_visit_display(&display)?;
                }
                Ok(())
            }
            ("refresh", None) => {
                if let Some(shown) = self.driver.refresh()? {
                    tracing::debug!(url = %shown, "refreshed");
                }
                Ok(())
            }
            ("go_back", _) => self.driver.go_back(action),
            _ => self.driver.perform(action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Config;
    use crate::driver::RecordingDriver;
    use crate::server::{broadcast, BroadcastQueue, Command};
    use crate::session::StepStatus;
    use std::collections::HashSet;
    use std::io::Write;
    use std::time::Duration;

    const SPEC: &str = r#"describe "checkout" do
  it "pays" do
    visit "/cart"
    click_on "Pay"
  end

  it "is empty" do
    x = 1
  end
end
"#;

    fn config() -> Config {
        let mut config = Config::default();
        config.run.reload_test_files = false;
        config
    }

    fn controller(source: &str) -> (SessionController<RecordingDriver>, RecordingDriver, tempfile::NamedTempFile) {
        let mut file = tempfile::Builder::new().suffix("_spec.rb").tempfile().unwrap();
        file.write_all(source.as_bytes()).unwrap();

        let (broadcaster, _queue) = broadcast::channel();
        let (session, commands) = Session::new(config(), broadcaster);
        let driver = RecordingDriver::new();
        let controller = SessionController::new(
            session,
            commands,
            driver.clone(),
            file.path(),
            TriggerSet::default(),
        )
        .unwrap();
        (controller, driver, file)
    }

    struct Fixture {
        controller: SessionController<RecordingDriver>,
        driver: RecordingDriver,
        queue: BroadcastQueue,
        _dir: tempfile::TempDir,
    }

    /// Controller for a spec file in its own `spec/` directory, push queue kept
    fn fixture(source: &str, config: Config) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let spec_dir = dir.path().join("spec");
        std::fs::create_dir(&spec_dir).unwrap();
        let path = spec_dir.join("checkout_spec.rb");
        std::fs::write(&path, source).unwrap();

        let (broadcaster, queue) = broadcast::channel();
        let (session, commands) = Session::new(config, broadcaster);
        let driver = RecordingDriver::new();
        let controller =
            SessionController::new(session, commands, driver.clone(), &path, TriggerSet::default())
                .unwrap();
        Fixture {
            controller,
            driver,
            queue,
            _dir: dir,
        }
    }

    /// UI that presses start the moment a snapshot asking for it is queued
    ///
    /// Answers the start gate, each paused step once and the end of the run.
    /// Returns how many starts it sent.
    fn answer_from_queue(session: Session, queue: BroadcastQueue) -> std::thread::JoinHandle<usize> {
        std::thread::spawn(move || {
            let start = || {
                session
                    .apply_command(Command::Start { pause_at_step: None })
                    .unwrap()
            };
            let mut gate_answered = false;
            let mut answered_pauses = HashSet::new();
            let mut starts = 0;
            loop {
                for message in queue.drain() {
                    let Some(snapshot) = message else {
                        start();
                        return starts + 1;
                    };
                    let paused = snapshot
                        .steps
                        .iter()
                        .position(|step| step.status == StepStatus::Paused);
                    let asks = match paused {
                        Some(index) => answered_pauses.insert(index),
                        None => !std::mem::replace(&mut gate_answered, true),
                    };
                    if asks {
                        start();
                        starts += 1;
                    }
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        })
    }

    /// Answer each wait of the test thread with the next command
    fn drive(session: Session, commands: Vec<Command>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let mut answered = None;
            for command in commands {
                loop {
                    match session.pending_wait() {
                        Some(wait) if answered != Some(wait) => {
                            answered = Some(wait);
                            break;
                        }
                        _ => std::thread::sleep(Duration::from_millis(2)),
                    }
                }
                session.apply_command(command).unwrap();
            }
        })
    }

    #[test]
    fn test_unpaused_run_passes() {
        let (mut controller, driver, _file) = controller(SPEC);
        let session = controller.session().clone();
        session.set_next_pause_policy(PausePolicy::Never);

        let ui = drive(session.clone(), vec![Command::Start { pause_at_step: None }]);
        let end = controller.run_test("checkout pays").unwrap();
        ui.join().unwrap();

        assert_eq!(end, TestEnd::Finished(RunStatus::Passed));
        let snapshot = session.snapshot();
        assert!(snapshot.steps.iter().all(|s| s.status == StepStatus::Passed));
        assert_eq!(snapshot.steps[0].as_string, "visit \"/cart\"");
        assert_eq!(snapshot.test_suite.as_deref(), Some("checkout"));
        assert_eq!(driver.methods(), vec!["click_on"]);
        assert_eq!(driver.frame_switches(), 1);
        assert_eq!(
            driver.navigations(),
            vec!["http://localhost:3004", "http://localhost:3000/cart"]
        );
    }

    #[test]
    fn test_start_answered_from_push_queue_is_never_lost() {
        let mut config = Config::default();
        config.run.reload_test_files = true;

        for _ in 0..20 {
            let Fixture {
                mut controller,
                driver,
                queue,
                _dir,
            } = fixture(SPEC, config.clone());
            let ui = answer_from_queue(controller.session().clone(), queue);

            let (done_tx, done_rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = done_tx.send(controller.run_test("checkout pays"));
            });
            let end = done_rx
                .recv_timeout(Duration::from_secs(10))
                .expect("test thread stalled waiting for start");

            assert_eq!(end.unwrap(), TestEnd::Finished(RunStatus::Passed));
            // gate, the pause before click_on, the end of the run
            assert_eq!(ui.join().unwrap(), 3);
            assert_eq!(driver.methods(), vec!["click_on"]);
        }
    }

    #[test]
    fn test_malformed_visit_fails_the_test() {
        let source = "describe \"links\" do\n  it \"breaks\" do\n    visit \"http://[bad\"\n    click_on \"Never\"\n  end\nend\n";
        let Fixture {
            mut controller,
            driver,
            queue,
            _dir,
        } = fixture(source, config());
        let session = controller.session().clone();
        session.set_next_pause_policy(PausePolicy::Never);

        let ui = drive(session.clone(), vec![Command::Start { pause_at_step: None }]);
        let end = controller.run_test("links breaks").unwrap();
        ui.join().unwrap();

        assert_eq!(end, TestEnd::Finished(RunStatus::Failed));
        let snapshot = session.snapshot();
        assert!(snapshot
            .test_error
            .as_deref()
            .is_some_and(|e| e.contains("http://[bad")));
        assert_eq!(snapshot.steps[0].status, StepStatus::Failed);
        assert_eq!(snapshot.steps[1].status, StepStatus::Pending);
        assert!(driver.methods().is_empty());
        assert!(queue.drain().iter().any(Option::is_none));
    }

    #[test]
    fn test_go_back_drives_the_frame_again() {
        let source = "describe \"history\" do\n  it \"returns\" do\n    visit \"/a\"\n    go_back\n    click_on \"Home\"\n  end\nend\n";
        let Fixture {
            mut controller,
            driver,
            _dir,
            ..
        } = fixture(source, config());
        let session = controller.session().clone();
        session.set_next_pause_policy(PausePolicy::Never);

        let ui = drive(session, vec![Command::Start { pause_at_step: None }]);
        let end = controller.run_test("history returns").unwrap();
        ui.join().unwrap();

        assert_eq!(end, TestEnd::Finished(RunStatus::Passed));
        assert_eq!(driver.methods(), vec!["go_back", "click_on"]);
        assert_eq!(driver.frame_switches(), 2);
    }

    #[test]
    fn test_exit_at_gate_skips_the_body() {
        let (mut controller, driver, _file) = controller(SPEC);
        let ui = drive(controller.session().clone(), vec![Command::Exit]);
        let report = controller
            .run_suite(&["checkout pays".to_string(), "checkout is empty".to_string()])
            .unwrap();
        ui.join().unwrap();

        assert!(report.exited);
        assert!(report.results.is_empty());
        assert!(driver.methods().is_empty());
    }

    #[test]
    fn test_test_without_steps_is_an_error() {
        let (mut controller, _driver, _file) = controller(SPEC);
        let err = controller.run_test("checkout is empty").unwrap_err();
        assert!(matches!(err, Error::NoSteps(ref id) if id == "checkout is empty"));
        assert!(!controller.tracer.is_attached());
    }

    #[test]
    fn test_unknown_test_is_an_error() {
        let (mut controller, _driver, _file) = controller(SPEC);
        let err = controller.run_test("checkout refunds").unwrap_err();
        assert!(matches!(err, Error::TestNotFound { .. }));
    }
}
