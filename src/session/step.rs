//! Steps and the per-run step table

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extract::StepDescriptor;

/// Lifecycle of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Paused,
    Passed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One observable action of the running test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub index: usize,
    pub method: String,
    pub line: u32,
    pub column: u32,
    pub block_depth: u32,
    /// Source text of the call; `visit` steps show the resolved URL once known
    pub as_string: String,
    pub status: StepStatus,
    pub start_at: Option<i64>,
    pub end_at: Option<i64>,
    pub paused_at: Option<i64>,
    pub permalink: Option<String>,
}

impl Step {
    /// Milliseconds the step ran for, once finished
    pub fn elapsed_ms(&self) -> Option<i64> {
        Some(self.end_at? - self.start_at?)
    }
}

/// Editor deep link for a source line
pub fn permalink(scheme: &str, source: &Path, line: u32) -> String {
    format!("{}://file/{}:{}", scheme, source.display(), line)
}

/// Ordered steps of one run, indexed by source line
///
/// Entries are mutated in place but never reordered or removed. A reset
/// builds a new table.
#[derive(Debug, Clone, Default)]
pub struct StepTable {
    steps: Vec<Step>,
    by_line: HashMap<u32, usize>,
}

impl StepTable {
    /// Build a fresh table with every step pending
    pub fn build(
        descriptors: Vec<StepDescriptor>,
        source: &Path,
        editor_scheme: Option<&str>,
    ) -> Self {
        let steps: Vec<Step> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, d)| Step {
                index,
                permalink: editor_scheme.map(|scheme| permalink(scheme, source, d.line)),
                method: d.method,
                line: d.line,
                column: d.column,
                block_depth: d.block_depth,
                as_string: d.as_string,
                status: StepStatus::Pending,
                start_at: None,
                end_at: None,
                paused_at: None,
            })
            .collect();

        let by_line = steps.iter().map(|s| (s.line, s.index)).collect();
        Self { steps, by_line }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    /// Index of the step that starts on `line`
    pub fn index_at_line(&self, line: u32) -> Option<usize> {
        self.by_line.get(&line).copied()
    }

    /// Step whose run window contains `timestamp`
    ///
    /// A step that has started but not ended owns everything after its start.
    /// When windows overlap the latest-started step wins.
    pub fn step_for_timestamp(&self, timestamp: i64) -> Option<usize> {
        self.steps
            .iter()
            .filter(|step| match (step.start_at, step.end_at) {
                (Some(start), Some(end)) => start <= timestamp && timestamp <= end,
                (Some(start), None) => start <= timestamp,
                _ => false,
            })
            .max_by_key(|step| step.start_at)
            .map(|step| step.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(method: &str, line: u32) -> StepDescriptor {
        StepDescriptor {
            method: method.to_string(),
            line,
            column: 5,
            block_depth: 0,
            as_string: format!("{method} x"),
        }
    }

    fn table() -> StepTable {
        StepTable::build(
            vec![descriptor("visit", 3), descriptor("click_on", 4)],
            Path::new("/app/spec/system/a_spec.rb"),
            Some("vscode"),
        )
    }

    #[test]
    fn test_build_assigns_indices_and_permalinks() {
        let table = table();
        assert_eq!(table.len(), 2);
        for (i, step) in table.steps().iter().enumerate() {
            assert_eq!(step.index, i);
            assert_eq!(step.status, StepStatus::Pending);
        }
        assert_eq!(
            table.get(1).unwrap().permalink.as_deref(),
            Some("vscode://file//app/spec/system/a_spec.rb:4")
        );
        assert_eq!(table.index_at_line(4), Some(1));
        assert_eq!(table.index_at_line(5), None);
    }

    #[test]
    fn test_no_permalink_without_scheme() {
        let table = StepTable::build(vec![descriptor("visit", 1)], Path::new("a.rb"), None);
        assert_eq!(table.get(0).unwrap().permalink, None);
    }

    #[test]
    fn test_step_for_timestamp() {
        let mut table = table();
        {
            let first = table.get_mut(0).unwrap();
            first.start_at = Some(100);
            first.end_at = Some(200);
        }
        table.get_mut(1).unwrap().start_at = Some(200);

        assert_eq!(table.step_for_timestamp(50), None);
        assert_eq!(table.step_for_timestamp(150), Some(0));
        assert_eq!(table.step_for_timestamp(200), Some(1));
        assert_eq!(table.step_for_timestamp(10_000), Some(1));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&StepStatus::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }
}
