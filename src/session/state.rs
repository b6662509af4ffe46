//! Run record, pause policy and derived run status

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::common::{Error, Result};

use super::step::{Step, StepStatus, StepTable};

/// Where the tracer should stop before running a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PausePolicy {
    /// Pause before every step
    #[default]
    Always,
    /// Run through without pausing
    Never,
    /// Pause only before the step with this index
    AtIndex(usize),
}

impl PausePolicy {
    /// Whether the step at `index` must pause
    pub fn pauses_at(&self, index: usize) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::AtIndex(n) => *n == index,
        }
    }

    /// Parse the `pause_at_step` command parameter
    ///
    /// `None` means the parameter was absent and the policy stays as is.
    /// `true` pauses everywhere, an integer pauses at that step, `null` or
    /// `false` disables pausing.
    pub fn from_param(value: Option<&Value>) -> Result<Option<Self>> {
        let Some(value) = value else {
            return Ok(None);
        };
        match value {
            Value::Null | Value::Bool(false) => Ok(Some(Self::Never)),
            Value::Bool(true) => Ok(Some(Self::Always)),
            Value::Number(n) => n
                .as_u64()
                .map(|n| Some(Self::AtIndex(n as usize)))
                .ok_or_else(|| {
                    Error::InvalidParams(format!(
                        "pause_at_step must be a non-negative step index, got {n}"
                    ))
                }),
            other => Err(Error::InvalidParams(format!(
                "pause_at_step must be true, null or a step index, got {other}"
            ))),
        }
    }
}

/// Wire form matches the `pause_at_step` parameter: `true`, index or `null`
impl Serialize for PausePolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Always => serializer.serialize_bool(true),
            Self::Never => serializer.serialize_none(),
            Self::AtIndex(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

/// Status of the run as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Paused,
    Running,
    Passed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paused => write!(f, "paused"),
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal result of a test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub passed: bool,
    pub error: Option<String>,
    pub backtrace: Vec<String>,
}

impl TestResult {
    pub fn status(&self) -> RunStatus {
        if self.passed {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }
}

/// Identity of the test being run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestInfo {
    pub suite: Option<String>,
    pub name: String,
}

/// Mutable state of the current run, shared between the test thread and
/// the server behind one lock
#[derive(Debug, Default)]
pub struct RunRecord {
    pub test: Option<TestInfo>,
    pub table: StepTable,
    pub pause_policy: PausePolicy,
    pub current_step: Option<usize>,
    pub result: Option<TestResult>,
    /// Policy to use for the next run instead of the default
    pub next_pause_policy: Option<PausePolicy>,
    /// The test thread is blocked on the command queue
    pub awaiting_command: bool,
    /// A reset or exit signal is queued and not yet consumed
    pub abort_pending: bool,
}

impl RunRecord {
    /// Derived status: terminal result first, then the pause policy and steps
    pub fn test_status(&self) -> RunStatus {
        if let Some(result) = &self.result {
            return result.status();
        }
        match self.pause_policy {
            PausePolicy::Never => RunStatus::Running,
            PausePolicy::Always | PausePolicy::AtIndex(_) => {
                let steps = self.table.steps();
                if steps.iter().any(|s| s.status == StepStatus::Running) {
                    RunStatus::Running
                } else if steps.iter().all(|s| s.start_at.is_none()) {
                    RunStatus::Pending
                } else {
                    RunStatus::Paused
                }
            }
        }
    }

    /// Wall time from the first step's start to the last finished step's
    /// end, minus the time later steps spent paused
    pub fn test_duration_ms(&self) -> Option<i64> {
        test_duration_ms(self.table.steps())
    }

    pub fn snapshot(&self) -> Snapshot {
        let test = self.test.clone().unwrap_or_default();
        Snapshot {
            event: "steps_updated",
            steps: self.table.steps().to_vec(),
            current_step_index: self.current_step,
            pause_at_step: self.pause_policy,
            test_suite: test.suite,
            test_name: test.name,
            test_status: self.test_status(),
            test_error: self.result.as_ref().and_then(|r| r.error.clone()),
            test_backtrace: self
                .result
                .as_ref()
                .map(|r| r.backtrace.clone())
                .unwrap_or_default(),
            test_duration_ms: self.test_duration_ms(),
        }
    }
}

pub fn test_duration_ms(steps: &[Step]) -> Option<i64> {
    let start_at = steps.first()?.start_at?;
    let last_ended = steps.iter().rposition(|s| s.end_at.is_some())?;
    let end_at = steps[last_ended].end_at?;

    let paused: i64 = steps[1..=last_ended]
        .iter()
        .filter_map(|s| Some(s.start_at? - s.paused_at?))
        .sum();

    Some(end_at - start_at - paused)
}

/// Complete view of the run pushed to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub event: &'static str,
    pub steps: Vec<Step>,
    pub current_step_index: Option<usize>,
    pub pause_at_step: PausePolicy,
    pub test_suite: Option<String>,
    pub test_name: String,
    pub test_status: RunStatus,
    pub test_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_backtrace: Vec<String>,
    pub test_duration_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::StepDescriptor;
    use serde_json::json;
    use std::path::Path;

    fn record(lines: &[u32]) -> RunRecord {
        let descriptors = lines
            .iter()
            .map(|&line| StepDescriptor {
                method: "click_on".to_string(),
                line,
                column: 1,
                block_depth: 0,
                as_string: "click_on x".to_string(),
            })
            .collect();
        RunRecord {
            table: StepTable::build(descriptors, Path::new("t.rb"), None),
            ..Default::default()
        }
    }

    #[test]
    fn test_pause_param_parsing() {
        assert_eq!(PausePolicy::from_param(None).unwrap(), None);
        assert_eq!(
            PausePolicy::from_param(Some(&json!(true))).unwrap(),
            Some(PausePolicy::Always)
        );
        assert_eq!(
            PausePolicy::from_param(Some(&json!(null))).unwrap(),
            Some(PausePolicy::Never)
        );
        assert_eq!(
            PausePolicy::from_param(Some(&json!(false))).unwrap(),
            Some(PausePolicy::Never)
        );
        assert_eq!(
            PausePolicy::from_param(Some(&json!(2))).unwrap(),
            Some(PausePolicy::AtIndex(2))
        );
        assert!(PausePolicy::from_param(Some(&json!(-1))).is_err());
        assert!(PausePolicy::from_param(Some(&json!("soon"))).is_err());
    }

    #[test]
    fn test_pause_policy_wire_form() {
        assert_eq!(serde_json::to_value(PausePolicy::Always).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(PausePolicy::Never).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(PausePolicy::AtIndex(3)).unwrap(), json!(3));
    }

    #[test]
    fn test_status_derivation() {
        let mut rec = record(&[1, 2]);
        assert_eq!(rec.test_status(), RunStatus::Pending);

        rec.table.get_mut(0).unwrap().status = StepStatus::Paused;
        assert_eq!(rec.test_status(), RunStatus::Pending);

        {
            let step = rec.table.get_mut(0).unwrap();
            step.status = StepStatus::Running;
            step.start_at = Some(10);
        }
        assert_eq!(rec.test_status(), RunStatus::Running);

        rec.table.get_mut(0).unwrap().status = StepStatus::Passed;
        assert_eq!(rec.test_status(), RunStatus::Paused);

        rec.pause_policy = PausePolicy::Never;
        assert_eq!(rec.test_status(), RunStatus::Running);

        rec.result = Some(TestResult {
            passed: false,
            error: Some("boom".to_string()),
            backtrace: Vec::new(),
        });
        assert_eq!(rec.test_status(), RunStatus::Failed);
    }

    #[test]
    fn test_duration_subtracts_pauses_after_first_step() {
        let mut rec = record(&[1, 2, 3]);
        assert_eq!(rec.test_duration_ms(), None);

        {
            let s = rec.table.get_mut(0).unwrap();
            s.paused_at = Some(0);
            s.start_at = Some(1_000);
            s.end_at = Some(1_100);
        }
        {
            let s = rec.table.get_mut(1).unwrap();
            s.paused_at = Some(1_100);
            s.start_at = Some(6_100);
            s.end_at = Some(6_300);
        }
        // wall 5_300, paused 5_000 at step 2
        assert_eq!(rec.test_duration_ms(), Some(300));

        // a still-paused step does not count
        rec.table.get_mut(2).unwrap().paused_at = Some(6_300);
        assert_eq!(rec.test_duration_ms(), Some(300));
    }

    #[test]
    fn test_duration_needs_an_ended_step() {
        let mut rec = record(&[1]);
        rec.table.get_mut(0).unwrap().start_at = Some(5);
        assert_eq!(rec.test_duration_ms(), None);
    }

    #[test]
    fn test_snapshot_shape() {
        let mut rec = record(&[4]);
        rec.test = Some(TestInfo {
            suite: Some("basic".to_string()),
            name: "basic can visit root".to_string(),
        });
        let value = serde_json::to_value(rec.snapshot()).unwrap();
        assert_eq!(value["event"], "steps_updated");
        assert_eq!(value["pause_at_step"], true);
        assert_eq!(value["test_status"], "pending");
        assert_eq!(value["current_step_index"], json!(null));
        assert_eq!(value["steps"][0]["status"], "pending");
        assert_eq!(value["steps"][0]["line"], 4);
        assert!(value.get("test_backtrace").is_none());
    }
}
