//! Browser events forwarded by the in-page instrumentation

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event as posted by the page; payloads are not interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub id: Value,
    /// Milliseconds since the Unix epoch, same clock as step timestamps
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_id: Option<Value>,
}

/// Event with the step it happened during
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEvent {
    #[serde(flatten)]
    pub event: FrameEvent,
    pub step_index: Option<usize>,
}

/// Bounded buffer of events for the current run, oldest dropped first
#[derive(Debug)]
pub struct EventLog {
    max_events: usize,
    events: VecDeque<RecordedEvent>,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            events: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: FrameEvent, step_index: Option<usize>) {
        if self.max_events == 0 {
            return;
        }
        while self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(RecordedEvent { event, step_index });
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_vec(&self) -> Vec<RecordedEvent> {
        self.events.iter().cloned().collect()
    }
}
