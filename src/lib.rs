//! stepdeck - interactive step debugger for browser system tests
//!
//! Extracts the page actions of a Ruby system test as steps, runs the test
//! body one step at a time and lets a browser UI control the run over a
//! push channel and a command endpoint.

pub mod cli;
pub mod commands;
pub mod common;
pub mod driver;
pub mod extract;
pub mod parser;
pub mod runner;
pub mod server;
pub mod session;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use server::{Command, CommandRequest, UiServer};
pub use session::{PausePolicy, RunStatus, Session, SessionController, Snapshot};
