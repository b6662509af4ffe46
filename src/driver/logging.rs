//! Dry-run driver for the CLI
//!
//! Logs every page action instead of driving a browser, optionally sleeping
//! after each one so the step-by-step flow can be followed in the UI.

use std::time::Duration;

use crate::common::Result;

use super::{Action, PageDriver};

#[derive(Debug, Default)]
pub struct LoggingDriver {
    delay: Duration,
    current_url: Option<String>,
}

impl LoggingDriver {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            current_url: None,
        }
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl PageDriver for LoggingDriver {
    fn navigate(&mut self, url: &str) -> Result<bool> {
        tracing::info!(url, "navigate");
        self.current_url = Some(url.to_string());
        self.pause();
        Ok(true)
    }

    fn current_url(&mut self) -> Result<Option<String>> {
        Ok(self.current_url.clone())
    }

    fn drive_embedded_frame(&mut self) -> Result<()> {
        tracing::debug!("Switched to embedded frame");
        Ok(())
    }

    fn perform(&mut self, action: &Action) -> Result<()> {
        tracing::info!(
            method = %action.method,
            line = action.line,
            source = %action.source,
            "page action"
        );
        self.pause();
        Ok(())
    }
}
