//! Command intake wire types
//!
//! The UI posts `{"command": "...", "params": {...}}` to
//! `/api/steps/command`. Unknown commands and malformed parameters are
//! request errors; they never reach the test thread.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::{Error, Result};
use crate::session::PausePolicy;

/// Raw command request as posted by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: Map::new(),
        }
    }

    /// Add a parameter
    pub fn param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// Typed command for the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Resume; `None` keeps the current pause policy
    Start { pause_at_step: Option<PausePolicy> },
    /// Pause before the next step
    Stop,
    /// Abort and rerun the current test
    Reset,
    /// Abort and leave the test run
    Exit,
}

impl Command {
    pub fn parse(request: &CommandRequest) -> Result<Self> {
        match request.command.as_str() {
            "start" => Ok(Self::Start {
                pause_at_step: PausePolicy::from_param(request.params.get("pause_at_step"))?,
            }),
            "stop" => Ok(Self::Stop),
            "reset" => Ok(Self::Reset),
            "exit" => Ok(Self::Exit),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::Exit => "exit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> CommandRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse(&request(json!({"command": "start"}))).unwrap(),
            Command::Start { pause_at_step: None }
        );
        assert_eq!(
            Command::parse(&request(json!({"command": "start", "params": {"pause_at_step": 1}})))
                .unwrap(),
            Command::Start {
                pause_at_step: Some(PausePolicy::AtIndex(1))
            }
        );
        assert_eq!(
            Command::parse(&request(json!({"command": "stop", "params": {}}))).unwrap(),
            Command::Stop
        );
        assert_eq!(Command::parse(&CommandRequest::new("reset")).unwrap(), Command::Reset);
        assert_eq!(Command::parse(&CommandRequest::new("exit")).unwrap(), Command::Exit);
    }

    #[test]
    fn test_unknown_command() {
        let err = Command::parse(&CommandRequest::new("rewind")).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(ref c) if c == "rewind"));
    }

    #[test]
    fn test_invalid_pause_param() {
        let req = CommandRequest::new("start").param("pause_at_step", json!("next"));
        assert!(matches!(Command::parse(&req), Err(Error::InvalidParams(_))));
    }
}
