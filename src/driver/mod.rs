//! Page-driver interface and adapters
//!
//! The browser automation layer is an external collaborator. The session
//! only ever talks to it through [`PageDriver`], from the test thread.

mod frame;
mod logging;
mod recording;

pub use frame::{resolve_url, FrameDriver};
pub use logging::LoggingDriver;
pub use recording::RecordingDriver;

use crate::common::Result;

/// Argument of a page action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    /// Literal value, or the source text of an expression
    pub text: String,
    /// Whether `text` is a literal value (string, symbol, number, constant)
    pub literal: bool,
}

impl Arg {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            literal: true,
        }
    }

    pub fn expr(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            literal: false,
        }
    }
}

/// One page action performed by a test step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub method: String,
    pub args: Vec<Arg>,
    /// Keyword arguments (`with: "x"`)
    pub options: Vec<(String, Arg)>,
    pub line: u32,
    /// Source text of the call
    pub source: String,
}

impl Action {
    pub fn new(method: impl Into<String>, line: u32) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
            options: Vec::new(),
            line,
            source: String::new(),
        }
    }

    pub fn first_arg(&self) -> Option<&Arg> {
        self.args.first()
    }

    pub fn option(&self, key: &str) -> Option<&Arg> {
        self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Capability the host browser driver must provide
///
/// Any method may be a no-op when no browser session is active. A failing
/// page action is reported as [`crate::common::Error::Driver`] and becomes a
/// test failure; any other error aborts the run.
pub trait PageDriver: Send {
    /// Load `url` in the driven window or frame; false if nothing was loaded
    fn navigate(&mut self, url: &str) -> Result<bool>;

    /// URL currently loaded, if any
    fn current_url(&mut self) -> Result<Option<String>>;

    /// Switch all further commands to the embedded test frame
    fn drive_embedded_frame(&mut self) -> Result<()>;

    /// Perform any other page action
    fn perform(&mut self, action: &Action) -> Result<()>;
}

impl<D: PageDriver + ?Sized> PageDriver for Box<D> {
    fn navigate(&mut self, url: &str) -> Result<bool> {
        (**self).navigate(url)
    }

    fn current_url(&mut self) -> Result<Option<String>> {
        (**self).current_url()
    }

    fn drive_embedded_frame(&mut self) -> Result<()> {
        (**self).drive_embedded_frame()
    }

    fn perform(&mut self, action: &Action) -> Result<()> {
        (**self).perform(action)
    }
}
