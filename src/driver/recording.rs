//! In-memory driver that records every call
//!
//! Clones share the same log, so a test can keep one handle while the
//! controller owns another.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, Result};

use super::{Action, PageDriver};

#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    log: Arc<Mutex<Log>>,
}

#[derive(Debug, Default)]
struct Log {
    navigations: Vec<String>,
    actions: Vec<Action>,
    frame_switches: usize,
    failures: HashMap<String, String>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `method` action fail with `message`; navigations never fail
    pub fn fail_on(&self, method: &str, message: &str) {
        self.log
            .lock()
            .failures
            .insert(method.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.log.lock().failures.clear();
    }

    pub fn navigations(&self) -> Vec<String> {
        self.log.lock().navigations.clone()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.log.lock().actions.clone()
    }

    /// Methods of performed actions, in order
    pub fn methods(&self) -> Vec<String> {
        self.log
            .lock()
            .actions
            .iter()
            .map(|a| a.method.clone())
            .collect()
    }

    pub fn frame_switches(&self) -> usize {
        self.log.lock().frame_switches
    }
}

impl PageDriver for RecordingDriver {
    fn navigate(&mut self, url: &str) -> Result<bool> {
        self.log.lock().navigations.push(url.to_string());
        Ok(true)
    }

    fn current_url(&mut self) -> Result<Option<String>> {
        Ok(self.log.lock().navigations.last().cloned())
    }

    fn drive_embedded_frame(&mut self) -> Result<()> {
        self.log.lock().frame_switches += 1;
        Ok(())
    }

    fn perform(&mut self, action: &Action) -> Result<()> {
        let mut log = self.log.lock();
        log.actions.push(action.clone());
        match log.failures.get(&action.method) {
            Some(message) => Err(Error::Driver(message.clone())),
            None => Ok(()),
        }
    }
}
