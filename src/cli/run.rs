//! `stepdeck run`: serve the control UI and run tests on a blocking thread

use std::path::PathBuf;

use colored::Colorize;

use crate::common::{config::Config, Error, Result};
use crate::driver::LoggingDriver;
use crate::extract::{self, TriggerSet};
use crate::server::UiServer;
use crate::session::{PausePolicy, RunStatus, Session, SessionController, SuiteReport};

/// Options of the `run` command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub file: PathBuf,
    pub tests: Vec<String>,
    pub port: Option<u16>,
    pub no_pause: bool,
    pub pause_at: Option<usize>,
    pub app_host: Option<String>,
    pub triggers: Vec<String>,
    pub no_watch: bool,
    pub delay_ms: Option<u64>,
}

impl RunOptions {
    /// Layer command-line overrides on top of the config file
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(app_host) = &self.app_host {
            config.run.app_host = app_host.clone();
        }
        if self.no_watch {
            config.run.reload_test_files = false;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.run.action_delay_ms = delay_ms;
        }
        config.steps.extra.extend(self.triggers.iter().cloned());
    }

    pub fn initial_policy(&self) -> Option<PausePolicy> {
        if self.no_pause {
            Some(PausePolicy::Never)
        } else {
            self.pause_at.map(PausePolicy::AtIndex)
        }
    }
}

pub(super) async fn run(options: RunOptions) -> Result<()> {
    let mut config = Config::load()?;
    options.apply(&mut config);

    let source = std::fs::read_to_string(&options.file)
        .map_err(|e| Error::file_read(&options.file, &e))?;
    let selectors = if options.tests.is_empty() {
        extract::list_tests(&source)?
            .into_iter()
            .map(|case| case.id)
            .collect()
    } else {
        options.tests.clone()
    };
    if selectors.is_empty() {
        return Err(Error::test_not_found(
            "any test",
            &options.file.display().to_string(),
        ));
    }

    let server = UiServer::new(config.clone());
    let (session, commands) = Session::new(config.clone(), server.broadcaster());
    server.serve_session(&session);
    let handle = server.start().await?;

    println!(
        "{} {}",
        "Control UI:".cyan(),
        config.ui_origin().white().bold()
    );

    let triggers = TriggerSet::from_config(&config.steps);
    let driver = LoggingDriver::new(config.run.action_delay_ms);
    let mut controller = SessionController::new(session, commands, driver, &options.file, triggers)?;
    if let Some(policy) = options.initial_policy() {
        controller = controller.with_initial_policy(policy);
    }

    // The controller blocks while steps are paused, keep it off the runtime
    let report = tokio::task::spawn_blocking(move || controller.run_suite(&selectors))
        .await
        .map_err(|e| Error::Internal(format!("test thread failed: {}", e)))??;

    handle.shutdown();
    print_report(&report);

    let failed = report
        .results
        .iter()
        .filter(|(_, status)| *status != RunStatus::Passed)
        .count();
    if failed > 0 {
        return Err(Error::TestsFailed {
            failed,
            total: report.results.len(),
        });
    }
    Ok(())
}

fn print_report(report: &SuiteReport) {
    println!("\n{}", "Results:".cyan());
    for (test, status) in &report.results {
        match status {
            RunStatus::Passed => println!("  {} {}", "✓".green(), test),
            other => println!("  {} {} {}", "✗".red(), test, other.to_string().dimmed()),
        }
    }
    if report.exited {
        println!("  {}", "Exited before all tests ran".yellow());
    } else if report.all_passed() {
        println!("\n{} {}", "✓".green().bold(), "All tests passed".green().bold());
    }
}
