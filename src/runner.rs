//! Script runner
//!
//! Executes a located test body statement by statement. There is no host
//! line hook to subscribe to, so the runner raises the line-boundary
//! callback itself: once per statement, and again for a step call that
//! sits on a later line inside the same statement. Step calls are handed
//! to the host to perform; everything else is walked for nested step calls
//! but otherwise not evaluated.

use std::path::Path;

use crate::common::{Error, Result};
use crate::driver::{Action, Arg};
use crate::extract::{TestCase, TriggerSet};
use crate::parser::{BeginClauses, Node, NodeKind};
use crate::session::{ControlSignal, RunOutcome};

/// Frames kept after the first one that points into the test file
const BACKTRACE_CONTEXT: usize = 5;

/// What the runner needs from whoever is driving the test
pub trait TestHost {
    /// Called before the runner enters a new source line
    fn on_line(&mut self, line: u32) -> Result<Option<ControlSignal>>;

    /// Perform a step call
    fn perform(&mut self, action: &Action) -> Result<()>;
}

/// A failing assertion or page action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub message: String,
    pub line: u32,
    /// Innermost frame first
    pub backtrace: Vec<String>,
}

impl TestFailure {
    /// Frames from the first one in `source_path`, plus a few callers
    pub fn relevant_backtrace(&self, source_path: &str) -> Vec<String> {
        slice_backtrace(&self.backtrace, source_path)
    }
}

impl std::fmt::Display for TestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Keep the first frame mentioning `source_path` and the frames after it
pub fn slice_backtrace(frames: &[String], source_path: &str) -> Vec<String> {
    match frames.iter().position(|f| f.contains(source_path)) {
        Some(start) => frames
            .iter()
            .skip(start)
            .take(BACKTRACE_CONTEXT + 1)
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

enum Halt {
    Failed(TestFailure),
    Signal(ControlSignal),
    Fatal(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    /// `next`/`break`: leave the enclosing block body
    Next,
    /// `return`: leave the test
    Return,
}

type Exec<T> = std::result::Result<T, Halt>;

/// Runs one test body against a [`TestHost`]
pub struct ScriptRunner<'a> {
    source: &'a str,
    path: String,
    test: &'a TestCase,
    triggers: &'a TriggerSet,
    last_line: Option<u32>,
    /// Line being executed at each block nesting level, outermost first
    frames: Vec<u32>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(source: &'a str, path: &Path, test: &'a TestCase, triggers: &'a TriggerSet) -> Self {
        Self {
            source,
            path: path.display().to_string(),
            test,
            triggers,
            last_line: None,
            frames: Vec::new(),
        }
    }

    pub fn run<H: TestHost>(&mut self, body: &Node, host: &mut H) -> Result<RunOutcome> {
        self.last_line = None;
        self.frames = vec![self.test.line];

        match self.exec_body(body, host) {
            Ok(_) => Ok(RunOutcome::Completed(Ok(()))),
            Err(Halt::Failed(failure)) => Ok(RunOutcome::Completed(Err(failure))),
            Err(Halt::Signal(signal)) => Ok(signal.into()),
            Err(Halt::Fatal(e)) => Err(e),
        }
    }

    fn exec_body<H: TestHost>(&mut self, body: &Node, host: &mut H) -> Exec<Flow> {
        for statement in body.statements() {
            self.enter_line(statement.span.line, host)?;
            let flow = self.eval(statement, host)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn eval<H: TestHost>(&mut self, node: &Node, host: &mut H) -> Exec<Flow> {
        match &node.kind {
            NodeKind::Send {
                receiver,
                method,
                args,
            } => {
                if self.triggers.contains(method) {
                    self.perform(node, host)?;
                    return Ok(Flow::Normal);
                }
                if receiver.is_none() && (method == "raise" || method == "fail") {
                    self.enter_line(node.span.line, host)?;
                    return Err(Halt::Failed(self.failure(raise_message(args), node.span.line, None)));
                }
                for child in node.children() {
                    self.eval(child, host)?;
                }
                Ok(Flow::Normal)
            }
            NodeKind::Block { call, body, .. } => {
                if call.method_name().is_some_and(|m| self.triggers.contains(m)) {
                    self.perform(call, host)?;
                } else {
                    self.eval(call, host)?;
                }
                self.frames.push(body.span.line);
                let flow = self.exec_body(body, host);
                self.frames.pop();
                match flow? {
                    Flow::Return => Ok(Flow::Return),
                    Flow::Normal | Flow::Next => Ok(Flow::Normal),
                }
            }
            NodeKind::Seq(_) => self.exec_body(node, host),
            NodeKind::Begin(clauses) => self.eval_begin(clauses, host),
            NodeKind::If {
                cond,
                then_body,
                else_body,
                negated,
            } => {
                let taken = match literal_truth(cond) {
                    Some(truth) => truth != *negated,
                    None => {
                        self.eval(cond, host)?;
                        true
                    }
                };
                if taken {
                    self.exec_body(then_body, host)
                } else if let Some(else_body) = else_body {
                    self.exec_body(else_body, host)
                } else {
                    Ok(Flow::Normal)
                }
            }
            NodeKind::While { cond, body } => {
                if literal_truth(cond) == Some(false) {
                    return Ok(Flow::Normal);
                }
                self.eval(cond, host)?;
                match self.exec_body(body, host)? {
                    Flow::Return => Ok(Flow::Return),
                    Flow::Normal | Flow::Next => Ok(Flow::Normal),
                }
            }
            // definitions only run when called, which the runner never does
            NodeKind::Def { .. } | NodeKind::Class { .. } | NodeKind::Module { .. } => {
                Ok(Flow::Normal)
            }
            NodeKind::Expr { op, children } => {
                if op == "->" || op == "regex" {
                    return Ok(Flow::Normal);
                }
                for child in children {
                    self.eval(child, host)?;
                }
                Ok(match op.as_str() {
                    "return" => Flow::Return,
                    "next" | "break" => Flow::Next,
                    _ => Flow::Normal,
                })
            }
            NodeKind::Array(items) | NodeKind::Hash(items) => {
                for item in items {
                    self.eval(item, host)?;
                }
                Ok(Flow::Normal)
            }
            NodeKind::Str(_)
            | NodeKind::Sym(_)
            | NodeKind::Number(_)
            | NodeKind::True
            | NodeKind::False
            | NodeKind::Nil
            | NodeKind::SelfRef
            | NodeKind::Const(_)
            | NodeKind::Var(_) => Ok(Flow::Normal),
        }
    }

    fn eval_begin<H: TestHost>(&mut self, clauses: &BeginClauses, host: &mut H) -> Exec<Flow> {
        let depth = self.frames.len();
        let mut result = self.exec_body(&clauses.body, host);

        result = match result {
            Err(Halt::Failed(failure)) => match clauses.rescues.first() {
                Some(rescue) => {
                    tracing::debug!(error = %failure, "Failure rescued by the test");
                    self.frames.truncate(depth);
                    self.exec_body(rescue, host)
                }
                None => Err(Halt::Failed(failure)),
            },
            Ok(Flow::Normal) => match &clauses.else_body {
                Some(else_body) => self.exec_body(else_body, host),
                None => Ok(Flow::Normal),
            },
            other => other,
        };

        // control signals and fatal errors skip ensure blocks
        if let (Some(ensure), Ok(_) | Err(Halt::Failed(_))) = (&clauses.ensure, &result) {
            let frames = self.frames.clone();
            self.frames.truncate(depth);
            match self.exec_body(ensure, host) {
                Ok(Flow::Normal) => {}
                other => return other,
            }
            self.frames = frames;
        }
        result
    }

    /// Report `line` to the host if execution moved to a new line
    fn enter_line<H: TestHost>(&mut self, line: u32, host: &mut H) -> Exec<()> {
        if self.last_line == Some(line) {
            return Ok(());
        }
        self.last_line = Some(line);
        if let Some(current) = self.frames.last_mut() {
            *current = line;
        }

        match host.on_line(line) {
            Ok(None) => Ok(()),
            Ok(Some(signal)) => Err(Halt::Signal(signal)),
            Err(e) => Err(Halt::Fatal(e)),
        }
    }

    fn perform<H: TestHost>(&mut self, call: &Node, host: &mut H) -> Exec<()> {
        let line = call.span.line;
        self.enter_line(line, host)?;

        // whatever a page action trips over came from the test, so it fails the test
        let action = self.action(call);
        host.perform(&action).map_err(|e| {
            let message = match e {
                Error::Driver(message) => message,
                other => other.to_string(),
            };
            Halt::Failed(self.failure(message, line, Some(action.method.as_str())))
        })
    }

    fn action(&self, call: &Node) -> Action {
        let mut action = Action::new(call.method_name().unwrap_or_default(), call.span.line);
        action.source = call.span.text(self.source).to_string();

        if let NodeKind::Send { args, .. } = &call.kind {
            for arg in args {
                match &arg.kind {
                    NodeKind::Hash(pairs) => {
                        for pair in pairs.chunks(2) {
                            if let [key, value] = pair {
                                action.options.push((self.arg(key).text, self.arg(value)));
                            }
                        }
                    }
                    _ => action.args.push(self.arg(arg)),
                }
            }
        }
        action
    }

    fn arg(&self, node: &Node) -> Arg {
        match &node.kind {
            NodeKind::Str(s) | NodeKind::Sym(s) | NodeKind::Number(s) | NodeKind::Const(s) => {
                Arg::literal(s.clone())
            }
            NodeKind::True => Arg::literal("true"),
            NodeKind::False => Arg::literal("false"),
            NodeKind::Nil => Arg::literal("nil"),
            _ => Arg::expr(node.span.text(self.source)),
        }
    }

    /// Build a failure with a backtrace that looks like the test framework's
    fn failure(&self, message: String, line: u32, driver_method: Option<&str>) -> TestFailure {
        let mut backtrace = Vec::new();
        if let Some(method) = driver_method {
            backtrace.push(format!("<page driver>:in '{method}'"));
        }

        let name = &self.test.id;
        let depth = self.frames.len();
        for (level, frame_line) in self.frames.iter().enumerate().rev() {
            let frame_line = if level + 1 == depth { line } else { *frame_line };
            let label = match level {
                0 => name.clone(),
                1 => format!("block in {name}"),
                n => format!("block ({n} levels) in {name}"),
            };
            backtrace.push(format!("{}:{}:in '{}'", self.path, frame_line, label));
        }
        backtrace.push("stepdeck/runner:in 'run'".to_string());
        backtrace.push("stepdeck/session:in 'run_test'".to_string());
        backtrace.push("stepdeck/session:in 'run_suite'".to_string());

        TestFailure {
            message,
            line,
            backtrace,
        }
    }
}

/// Message of `raise "text"` / `raise SomeError, "text"`
fn raise_message(args: &[Node]) -> String {
    args.iter()
        .find_map(|a| a.as_str().map(String::from))
        .or_else(|| {
            args.iter().find_map(|a| match &a.kind {
                NodeKind::Const(c) => Some(c.clone()),
                _ => None,
            })
        })
        .unwrap_or_else(|| "unhandled exception".to_string())
}

/// Truth value of a literal condition, `None` when it needs evaluating
fn literal_truth(cond: &Node) -> Option<bool> {
    match &cond.kind {
        NodeKind::True
        | NodeKind::Str(_)
        | NodeKind::Sym(_)
        | NodeKind::Number(_)
        | NodeKind::Array(_)
        | NodeKind::Hash(_) => Some(true),
        NodeKind::False | NodeKind::Nil => Some(false),
        NodeKind::Expr { op, children } if op == "!" && children.len() == 1 => {
            literal_truth(&children[0]).map(|truth| !truth)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{self, TestStyle};

    /// Host that records lines and actions and fails on chosen methods
    #[derive(Default)]
    struct ScriptHost {
        lines: Vec<u32>,
        performed: Vec<String>,
        fail_on: Option<&'static str>,
        signal_at: Option<(u32, ControlSignal)>,
    }

    impl TestHost for ScriptHost {
        fn on_line(&mut self, line: u32) -> Result<Option<ControlSignal>> {
            self.lines.push(line);
            Ok(self
                .signal_at
                .filter(|(at, _)| *at == line)
                .map(|(_, signal)| signal))
        }

        fn perform(&mut self, action: &Action) -> Result<()> {
            self.performed.push(action.method.clone());
            if self.fail_on == Some(action.method.as_str()) {
                return Err(Error::Driver(format!("expected to find {}", action.source)));
            }
            Ok(())
        }
    }

    fn run(source: &str, selector: &str, host: &mut ScriptHost) -> RunOutcome {
        let located = extract::locate(source, "spec/t_spec.rb", selector).unwrap();
        let triggers = TriggerSet::default();
        let mut runner = ScriptRunner::new(
            source,
            Path::new("/app/spec/t_spec.rb"),
            &located.case,
            &triggers,
        );
        runner.run(&located.body, host).unwrap()
    }

    const SPEC: &str = r#"describe "t" do
  it "x" do
    visit "/login"
    fill_in "Email", with: "a@b.c"
    within "form" do
      click_on "Go"
    end
    expect(page).to have_text("Welcome")
  end
end
"#;

    #[test]
    fn test_lines_and_actions_in_order() {
        let mut host = ScriptHost::default();
        let outcome = run(SPEC, "t x", &mut host);

        assert!(matches!(outcome, RunOutcome::Completed(Ok(()))));
        assert_eq!(host.lines, vec![3, 4, 5, 6, 8]);
        assert_eq!(
            host.performed,
            vec!["visit", "fill_in", "within", "click_on", "have_text"]
        );
    }

    #[test]
    fn test_driver_failure_stops_the_test() {
        let mut host = ScriptHost {
            fail_on: Some("click_on"),
            ..Default::default()
        };
        let outcome = run(SPEC, "t x", &mut host);

        let RunOutcome::Completed(Err(failure)) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.line, 6);
        assert!(failure.message.contains("click_on \"Go\""));
        assert_eq!(failure.backtrace[0], "<page driver>:in 'click_on'");
        assert_eq!(failure.backtrace[1], "/app/spec/t_spec.rb:6:in 'block in t x'");
        assert_eq!(failure.backtrace[2], "/app/spec/t_spec.rb:5:in 't x'");
        assert!(!host.performed.contains(&"have_text".to_string()));

        let relevant = failure.relevant_backtrace("/app/spec/t_spec.rb");
        assert_eq!(relevant[0], "/app/spec/t_spec.rb:6:in 'block in t x'");
        assert!(relevant.len() <= BACKTRACE_CONTEXT + 1);
    }

    #[test]
    fn test_any_action_error_fails_the_test() {
        struct BadUrlHost;

        impl TestHost for BadUrlHost {
            fn on_line(&mut self, _line: u32) -> Result<Option<ControlSignal>> {
                Ok(None)
            }

            fn perform(&mut self, action: &Action) -> Result<()> {
                Err(Error::InvalidUrl {
                    url: action.first_arg().map(|a| a.text.clone()).unwrap_or_default(),
                    reason: "invalid IPv6 address".to_string(),
                })
            }
        }

        let source = "describe \"t\" do\n  it \"x\" do\n    visit \"http://[bad\"\n  end\nend\n";
        let located = extract::locate(source, "spec/t_spec.rb", "t x").unwrap();
        let triggers = TriggerSet::default();
        let mut runner = ScriptRunner::new(source, Path::new("/app/spec/t_spec.rb"), &located.case, &triggers);
        let outcome = runner.run(&located.body, &mut BadUrlHost).unwrap();

        let RunOutcome::Completed(Err(failure)) = outcome else {
            panic!("expected a failed test");
        };
        assert_eq!(failure.line, 3);
        assert!(failure.message.contains("http://[bad"));
        assert_eq!(failure.backtrace[0], "<page driver>:in 'visit'");
    }

    #[test]
    fn test_signal_aborts_remaining_statements() {
        let mut host = ScriptHost {
            signal_at: Some((4, ControlSignal::Reset)),
            ..Default::default()
        };
        let outcome = run(SPEC, "t x", &mut host);
        assert!(matches!(outcome, RunOutcome::ResetRequested));
        assert_eq!(host.performed, vec!["visit"]);
    }

    #[test]
    fn test_rescue_ensure_and_raise() {
        let source = r#"describe "t" do
  it "x" do
    begin
      click_on "Missing"
    rescue
      click_on "Fallback"
    ensure
      visit "/done"
    end
    raise "boom" if true
    visit "/never"
  end
end
"#;
        let mut host = ScriptHost {
            fail_on: Some("click_on"),
            ..Default::default()
        };
        // the rescue body fails too, so ensure runs and the failure propagates
        let outcome = run(source, "t x", &mut host);
        assert!(matches!(outcome, RunOutcome::Completed(Err(ref f)) if f.line == 6));
        assert_eq!(host.performed, vec!["click_on", "click_on", "visit"]);

        let mut host = ScriptHost::default();
        let outcome = run(source, "t x", &mut host);
        let RunOutcome::Completed(Err(failure)) = outcome else {
            panic!("expected raise to fail the test");
        };
        assert_eq!(failure.message, "boom");
        assert_eq!(failure.line, 10);
        assert_eq!(host.performed, vec!["click_on", "visit"]);
    }

    #[test]
    fn test_literal_conditions_and_return() {
        let source = r#"describe "t" do
  it "x" do
    click_on "a" if false
    unless ENV["CI"]
      click_on "b"
    end
    if nil
      click_on "c"
    else
      click_on "d"
    end
    return
    click_on "e"
  end
end
"#;
        let mut host = ScriptHost::default();
        run(source, "t x", &mut host);
        assert_eq!(host.performed, vec!["click_on", "click_on"]);
        assert_eq!(host.lines, vec![3, 4, 5, 7, 10, 12]);
    }

    #[test]
    fn test_helper_definitions_are_not_run() {
        let source = r#"class LoginTest < ApplicationSystemTestCase
  def sign_in
    click_on "Sign in"
  end

  test "logs in" do
    3.times do
      visit "/"
    end
  end
end
"#;
        let located = extract::locate(source, "login_test.rb", "test_logs_in").unwrap();
        assert_eq!(located.case.style, TestStyle::Minitest);
        let mut host = ScriptHost::default();
        let outcome = run(source, "test_logs_in", &mut host);
        assert!(matches!(outcome, RunOutcome::Completed(Ok(()))));
        assert_eq!(host.performed, vec!["visit"]);
    }

    #[test]
    fn test_slice_backtrace_without_match() {
        let frames = vec!["a.rb:1".to_string()];
        assert!(slice_backtrace(&frames, "b.rb").is_empty());
    }
}
